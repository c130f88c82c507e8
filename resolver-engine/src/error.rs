//! Field resolution errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// Error types for field resolution.
///
/// A `FieldError` is always localized to the field it was produced for: it
/// never aborts sibling or unrelated resolutions. It is converted to a
/// [`struct@Error`] carrying the field's path when the response is assembled.
#[derive(Error, Display, Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum FieldError {
    /// {message}
    ResolverFault {
        /// The message reported by the resolver.
        message: String,

        /// Extra extensions reported by the resolver.
        #[serde(skip)]
        extensions: Object,
    },

    /// cannot view {found} value as {expected}
    TypeMismatch {
        /// The requested shape.
        expected: String,

        /// The JSON kind that was actually found.
        found: String,
    },

    /// missing argument '{name}'
    ArgumentMissing {
        /// Name of the argument.
        name: String,
    },

    /// invalid value for argument '{name}': {reason}
    ArgumentTypeMismatch {
        /// Name of the argument.
        name: String,

        /// Why the value could not be coerced.
        reason: String,
    },

    /// service '{service}' is not registered
    ServiceNotFound {
        /// Name of the requested service type.
        service: String,
    },

    /// field resolution was cancelled
    Cancelled,

    /// Cannot return null for non-nullable field {type_name}.{field_name}
    NonNullViolation {
        /// The type declaring the field.
        type_name: String,

        /// The field that resolved to null.
        field_name: String,
    },

    /// Cannot return null for non-nullable array element of type {item_type} at index {index}
    NonNullListItem {
        /// The declared type of the list items.
        item_type: String,

        /// Position of the item in the list.
        index: usize,
    },
}

impl FieldError {
    /// A resolver failure with the given message.
    pub fn fault(message: impl std::fmt::Display) -> Self {
        FieldError::ResolverFault {
            message: message.to_string(),
            extensions: Object::new(),
        }
    }

    /// A resolver failure carrying extra extensions for the client.
    pub fn fault_with_extensions(message: impl std::fmt::Display, extensions: Object) -> Self {
        FieldError::ResolverFault {
            message: message.to_string(),
            extensions,
        }
    }

    /// Whether the error reports a null in a non-nullable position.
    pub fn is_non_null_violation(&self) -> bool {
        matches!(
            self,
            FieldError::NonNullViolation { .. } | FieldError::NonNullListItem { .. }
        )
    }

    pub(crate) fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        FieldError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Convert the field error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>, locations: Vec<Location>) -> Error {
        let mut extensions = match self {
            FieldError::ResolverFault { extensions, .. } => extensions.clone(),
            _ => Object::new(),
        };
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        if let Some(details) = self.custom_extension_details() {
            for (key, value) in details {
                extensions.entry(key).or_insert(value);
            }
        }

        Error::builder()
            .message(self.to_string())
            .locations(locations)
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

impl ErrorExtension for FieldError {
    fn extension_code(&self) -> String {
        match self {
            FieldError::ResolverFault { .. } => "RESOLVER_FAULT",
            FieldError::TypeMismatch { .. } => "TYPE_MISMATCH",
            FieldError::ArgumentMissing { .. } => "ARGUMENT_MISSING",
            FieldError::ArgumentTypeMismatch { .. } => "ARGUMENT_TYPE_MISMATCH",
            FieldError::ServiceNotFound { .. } => "SERVICE_NOT_FOUND",
            FieldError::Cancelled => "CANCELLED",
            FieldError::NonNullViolation { .. } | FieldError::NonNullListItem { .. } => {
                "NON_NULL_VIOLATION"
            }
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            FieldError::ArgumentMissing { name } | FieldError::ArgumentTypeMismatch { name, .. } => {
                obj.insert("argument", Value::from(name.clone()));
            }
            FieldError::ServiceNotFound { service } => {
                obj.insert("service", Value::from(service.clone()));
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}

impl From<serde_json::Error> for FieldError {
    fn from(error: serde_json::Error) -> Self {
        FieldError::fault(error)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn graphql_error_carries_kind_tag() {
        let error = FieldError::ArgumentMissing {
            name: "id".to_string(),
        }
        .to_graphql_error(Some(Path::from(vec!["person"])), Vec::new());

        assert_eq!(error.message, "missing argument 'id'");
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({
                "message": "missing argument 'id'",
                "path": ["person"],
                "extensions": {"code": "ARGUMENT_MISSING", "argument": "id"}
            })
        );
    }

    #[test]
    fn resolver_extensions_are_kept() {
        let mut extensions = Object::new();
        extensions.insert("retryable", Value::Bool(true));
        let error = FieldError::fault_with_extensions("upstream timed out", extensions)
            .to_graphql_error(None, vec![Location { line: 1, column: 3 }]);

        assert_eq!(error.extension_code().as_deref(), Some("RESOLVER_FAULT"));
        assert_eq!(error.extensions.get("retryable"), Some(&Value::Bool(true)));
        assert_eq!(error.locations, vec![Location { line: 1, column: 3 }]);
    }

    #[test]
    fn non_null_violation_message() {
        let error = FieldError::NonNullViolation {
            type_name: "Person".to_string(),
            field_name: "name".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot return null for non-nullable field Person.name"
        );
    }
}
