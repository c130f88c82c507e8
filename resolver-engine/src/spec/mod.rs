//! Schema-bound type system: field types, the schema registration table and
//! validated selection trees.

mod field_type;
mod schema;
mod selection;

use std::fmt;

use displaydoc::Display;
pub use field_type::FieldType;
pub use schema::ArgumentDefinition;
pub use schema::FieldDefinition;
pub use schema::ObjectType;
pub use schema::Schema;
pub use schema::SchemaBuilder;
pub use selection::ArgumentValue;
pub use selection::Condition;
pub use selection::FieldSelection;
pub use selection::IncludeSkip;
pub use selection::Operation;
pub use selection::Selection;
pub use selection::SelectionSet;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::graphql::ErrorExtension;
use crate::json_ext::Object;

pub(crate) const TYPENAME: &str = "__typename";

/// Schema and selection validation errors.
///
/// Raised while building a [`Schema`] or an [`Operation`]; they never reach
/// execution.
#[derive(Error, Debug, Display, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SpecError {
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
    /// unknown type '{0}'
    UnknownType(String),
    /// invalid type error, expected an input type instead of '{0}'
    InvalidType(String),
    /// cannot query field '{0}' on type '{1}'
    UnknownField(String, String),
    /// unknown argument '{0}' on field '{1}'
    UnknownArgument(String, String),
    /// invalid value for argument '{0}' on field '{1}'
    ArgumentTypeMismatch(String, String),
    /// missing required argument '{0}' on field '{1}'
    MissingArgument(String, String),
    /// field '{0}' of type '{1}' is a leaf and cannot have a selection set
    LeafSelection(String, String),
    /// field '{0}' of type '{1}' must have a selection set
    MissingSelection(String, String),
    /// type '{0}' is defined more than once
    DuplicateType(String),
    /// field '{0}' is defined more than once on type '{1}'
    DuplicateField(String, String),
    /// response key '{0}' is selected more than once
    DuplicateResponseKey(String),
    /// the schema has no root type for {0} operations
    UnsupportedOperation(OperationKind),
}

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::RecursionLimitExceeded => "RECURSION_LIMIT_EXCEEDED",
            SpecError::UnknownType(_) => "UNKNOWN_TYPE",
            SpecError::InvalidType(_) => "INVALID_TYPE",
            SpecError::UnknownField(_, _) => "INVALID_FIELD",
            SpecError::DuplicateType(_) | SpecError::DuplicateField(_, _) => "INVALID_SCHEMA",
            SpecError::UnsupportedOperation(_) => "OPERATION_NOT_SUPPORTED",
            SpecError::UnknownArgument(_, _)
            | SpecError::ArgumentTypeMismatch(_, _)
            | SpecError::MissingArgument(_, _)
            | SpecError::LeafSelection(_, _)
            | SpecError::MissingSelection(_, _)
            | SpecError::DuplicateResponseKey(_) => "GRAPHQL_VALIDATION_FAILED",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            SpecError::UnknownType(ty) | SpecError::InvalidType(ty) => {
                obj.insert("type", ty.clone().into());
            }
            SpecError::UnknownField(field, ty)
            | SpecError::LeafSelection(field, ty)
            | SpecError::MissingSelection(field, ty) => {
                obj.insert("type", ty.clone().into());
                obj.insert("field", field.clone().into());
            }
            SpecError::UnknownArgument(argument, field)
            | SpecError::ArgumentTypeMismatch(argument, field)
            | SpecError::MissingArgument(argument, field) => {
                obj.insert("field", field.clone().into());
                obj.insert("argument", argument.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}

/// The kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }

    /// Whether root fields must run one after another in declared order.
    pub(crate) fn is_serial(&self) -> bool {
        matches!(self, OperationKind::Mutation)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
