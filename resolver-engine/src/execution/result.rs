use serde::Serialize;

use crate::error::FieldError;
use crate::graphql::Location;
use crate::json_ext::Value;
use crate::spec::FieldType;

/// The outcome of resolving an operation, before assembly.
///
/// It mirrors the shape of the selection tree: every selected field holds
/// either a value or the error its resolution produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTree {
    pub root: ResultObject,
}

/// The resolved fields of one object, in declared selection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultObject {
    pub type_name: String,
    pub entries: Vec<ResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub response_key: String,
    pub field_name: String,
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    pub node: ResultNode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultNode {
    /// A scalar or enum value, or null.
    Leaf(Value),
    Object(ResultObject),
    List(Vec<ResultNode>),
    /// The field failed to resolve.
    Error(FieldError),
}

impl ResultObject {
    pub fn get(&self, response_key: &str) -> Option<&ResultNode> {
        self.entries
            .iter()
            .find(|entry| entry.response_key == response_key)
            .map(|entry| &entry.node)
    }
}
