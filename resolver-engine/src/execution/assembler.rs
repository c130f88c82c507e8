//! Turns a [`ResultTree`] into a response.
//!
//! Assembly is a pure walk over the outcomes: output keys follow declared
//! selection order and errors are recorded in walk order, so assembling the
//! same tree twice yields identical responses.
//!
//! A null in a non-null position (because the field failed, or resolved to
//! null) nullifies the closest nullable ancestor. The failing field's own
//! error and a `NON_NULL_VIOLATION` at that ancestor are both recorded.
//! When several children of an object bubble, the first one in selection
//! order is reported at the ancestor.

use crate::error::FieldError;
use crate::graphql;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::FieldType;
use crate::spec::Schema;

use super::ResultNode;
use super::ResultObject;
use super::ResultTree;

/// A null escaping a non-null position, carrying the violation to record
/// at the ancestor that absorbs it.
struct Bubble(FieldError);

enum Failure {
    Field(FieldError),
    Bubble(Bubble),
}

#[derive(Clone, Copy)]
enum Position<'a> {
    Field {
        parent_type: &'a str,
        field_name: &'a str,
    },
    ListItem {
        item_type: &'a FieldType,
        index: usize,
    },
}

impl Position<'_> {
    fn violation(&self) -> FieldError {
        match self {
            Position::Field {
                parent_type,
                field_name,
            } => FieldError::NonNullViolation {
                type_name: parent_type.to_string(),
                field_name: field_name.to_string(),
            },
            Position::ListItem { item_type, index } => FieldError::NonNullListItem {
                item_type: item_type.to_string(),
                index: *index,
            },
        }
    }
}

/// Assemble the response for `tree`.
pub fn assemble(schema: &Schema, tree: &ResultTree) -> graphql::Response {
    let mut assembler = Assembler {
        schema,
        errors: Vec::new(),
    };
    let data = match assembler.complete_object(&tree.root, &Path::empty()) {
        Ok(object) => Value::Object(object),
        Err(Bubble(violation)) => {
            assembler.record(&violation, None, &[]);
            Value::Null
        }
    };

    graphql::Response::builder()
        .data(data)
        .errors(assembler.errors)
        .build()
}

struct Assembler<'a> {
    schema: &'a Schema,
    errors: Vec<graphql::Error>,
}

impl Assembler<'_> {
    fn record(&mut self, error: &FieldError, path: Option<&Path>, locations: &[Location]) {
        self.errors
            .push(error.to_graphql_error(path.cloned(), locations.to_vec()));
    }

    fn complete_object(&mut self, object: &ResultObject, path: &Path) -> Result<Object, Bubble> {
        let mut output = Object::new();
        let mut bubble = None;
        for entry in &object.entries {
            let position = Position::Field {
                parent_type: &object.type_name,
                field_name: &entry.field_name,
            };
            let field_path = path.join(entry.response_key.as_str());
            match self.complete(
                &entry.field_type,
                &entry.node,
                position,
                &field_path,
                &entry.locations,
            ) {
                Ok(value) => {
                    output.insert(entry.response_key.as_str(), value);
                }
                Err(failure) => {
                    // keep walking so that sibling errors are still reported
                    bubble.get_or_insert(failure);
                    output.insert(entry.response_key.as_str(), Value::Null);
                }
            }
        }

        match bubble {
            Some(bubble) => Err(bubble),
            None => Ok(output),
        }
    }

    fn complete(
        &mut self,
        field_type: &FieldType,
        node: &ResultNode,
        position: Position<'_>,
        path: &Path,
        locations: &[Location],
    ) -> Result<Value, Bubble> {
        let (non_null, field_type) = match field_type {
            FieldType::NonNull(inner) => (true, inner.as_ref()),
            field_type => (false, field_type),
        };

        let outcome = match (field_type, node) {
            (_, ResultNode::Error(error)) => Err(Failure::Field(error.clone())),
            (_, ResultNode::Leaf(Value::Null)) => Ok(Value::Null),
            (FieldType::List(item_type), ResultNode::List(items)) => {
                self.complete_list(item_type, items, path, locations)
            }
            (_, ResultNode::List(_)) => Err(Failure::Field(FieldError::type_mismatch(
                field_type.to_string(),
                "array",
            ))),
            (_, ResultNode::Object(object)) => self
                .complete_object(object, path)
                .map(Value::Object)
                .map_err(Failure::Bubble),
            (_, ResultNode::Leaf(value)) => self
                .complete_leaf(field_type, value)
                .map_err(Failure::Field),
        };

        match outcome {
            Ok(Value::Null) if non_null => {
                let violation = position.violation();
                self.record(&violation, Some(path), locations);
                Err(Bubble(violation))
            }
            Ok(value) => Ok(value),
            Err(Failure::Field(error)) => {
                self.record(&error, Some(path), locations);
                if non_null {
                    Err(Bubble(position.violation()))
                } else {
                    Ok(Value::Null)
                }
            }
            Err(Failure::Bubble(bubble)) if non_null => Err(bubble),
            Err(Failure::Bubble(Bubble(violation))) => {
                self.record(&violation, Some(path), locations);
                Ok(Value::Null)
            }
        }
    }

    fn complete_list(
        &mut self,
        item_type: &FieldType,
        items: &[ResultNode],
        path: &Path,
        locations: &[Location],
    ) -> Result<Value, Failure> {
        let mut output = Vec::with_capacity(items.len());
        let mut bubble = None;
        for (index, item) in items.iter().enumerate() {
            let position = Position::ListItem { item_type, index };
            match self.complete(item_type, item, position, &path.join(index), locations) {
                Ok(value) => output.push(value),
                Err(failure) => {
                    bubble.get_or_insert(failure);
                    output.push(Value::Null);
                }
            }
        }

        match bubble {
            Some(bubble) => Err(Failure::Bubble(bubble)),
            None => Ok(Value::Array(output)),
        }
    }

    fn complete_leaf(&self, field_type: &FieldType, value: &Value) -> Result<Value, FieldError> {
        let mismatch = || FieldError::type_mismatch(field_type.to_string(), value.json_type_name());
        match (field_type, value) {
            (FieldType::Int, Value::Number(number)) => number
                .as_i64()
                .or_else(|| {
                    // integral floats such as 3.0 are accepted as integers
                    number
                        .as_f64()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .filter(|f| (i32::MIN as f64..=i32::MAX as f64).contains(f))
                        .map(|f| f as i64)
                })
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::from)
                .ok_or_else(mismatch),
            (FieldType::Float, Value::Number(_)) => Ok(value.clone()),
            (FieldType::String, Value::String(_)) => Ok(value.clone()),
            (FieldType::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (FieldType::Id, Value::String(_)) => Ok(value.clone()),
            (FieldType::Id, Value::Number(number)) if number.is_i64() || number.is_u64() => {
                Ok(Value::from(number.to_string()))
            }
            (FieldType::Named(name), _) if self.schema.custom_scalars.contains(name) => {
                Ok(value.clone())
            }
            (FieldType::Named(name), Value::String(s)) => match self.schema.enums.get(name) {
                Some(values) if values.contains(s.as_str()) => Ok(value.clone()),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::execution::ResultEntry;
    use crate::spec::ObjectType;

    fn schema() -> Schema {
        Schema::builder()
            .object(ObjectType::new("Query"))
            .enum_type("Color", ["RED"])
            .build()
            .unwrap()
    }

    fn entry(key: &str, field_type: FieldType, node: ResultNode) -> ResultEntry {
        ResultEntry {
            response_key: key.to_string(),
            field_name: key.to_string(),
            field_type,
            locations: Vec::new(),
            node,
        }
    }

    fn object(type_name: &str, entries: Vec<ResultEntry>) -> ResultNode {
        ResultNode::Object(ResultObject {
            type_name: type_name.to_string(),
            entries,
        })
    }

    fn tree(entries: Vec<ResultEntry>) -> ResultTree {
        ResultTree {
            root: ResultObject {
                type_name: "Query".to_string(),
                entries,
            },
        }
    }

    fn codes(response: &graphql::Response) -> Vec<(Option<String>, String)> {
        response
            .errors
            .iter()
            .map(|e| {
                (
                    e.path.as_ref().map(|p| p.to_string()),
                    e.extension_code().unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn bubbles_to_nearest_nullable_ancestor() {
        let tree = tree(vec![
            entry(
                "person",
                FieldType::named("Person"),
                object(
                    "Person",
                    vec![
                        entry(
                            "name",
                            FieldType::non_null(FieldType::String),
                            ResultNode::Error(FieldError::fault("no name")),
                        ),
                        entry("age", FieldType::Int, ResultNode::Leaf(json!(36))),
                    ],
                ),
            ),
            entry("greeting", FieldType::String, ResultNode::Leaf(json!("hi"))),
        ]);

        let response = assemble(&schema(), &tree);
        assert_eq!(response.data, Some(json!({"person": null, "greeting": "hi"})));
        assert_eq!(
            codes(&response),
            vec![
                (Some("/person/name".into()), "RESOLVER_FAULT".into()),
                (Some("/person".into()), "NON_NULL_VIOLATION".into()),
            ]
        );
        assert_eq!(
            response.errors[1].message,
            "Cannot return null for non-nullable field Person.name"
        );
    }

    #[test]
    fn non_null_chain_reaches_root() {
        let tree = tree(vec![entry(
            "viewer",
            FieldType::non_null(FieldType::named("User")),
            object(
                "User",
                vec![entry(
                    "id",
                    FieldType::non_null(FieldType::Id),
                    ResultNode::Leaf(Value::Null),
                )],
            ),
        )]);

        let response = assemble(&schema(), &tree);
        assert_eq!(response.data, Some(Value::Null));
        assert_eq!(
            codes(&response),
            vec![
                (Some("/viewer/id".into()), "NON_NULL_VIOLATION".into()),
                (None, "NON_NULL_VIOLATION".into()),
            ]
        );
    }

    #[test]
    fn first_bubble_wins() {
        let tree = tree(vec![entry(
            "pair",
            FieldType::named("Pair"),
            object(
                "Pair",
                vec![
                    entry(
                        "left",
                        FieldType::non_null(FieldType::Int),
                        ResultNode::Error(FieldError::Cancelled),
                    ),
                    entry(
                        "right",
                        FieldType::non_null(FieldType::Int),
                        ResultNode::Leaf(Value::Null),
                    ),
                ],
            ),
        )]);

        let response = assemble(&schema(), &tree);
        assert_eq!(response.data, Some(json!({"pair": null})));
        assert_eq!(
            codes(&response),
            vec![
                (Some("/pair/left".into()), "CANCELLED".into()),
                (Some("/pair/right".into()), "NON_NULL_VIOLATION".into()),
                (Some("/pair".into()), "NON_NULL_VIOLATION".into()),
            ]
        );
        assert_eq!(
            response.errors[2].message,
            "Cannot return null for non-nullable field Pair.left"
        );
    }

    #[test]
    fn list_items() {
        let tree = tree(vec![
            entry(
                "nullable_items",
                FieldType::list(FieldType::Int),
                ResultNode::List(vec![
                    ResultNode::Leaf(json!(1)),
                    ResultNode::Error(FieldError::fault("boom")),
                    ResultNode::Leaf(json!(3)),
                ]),
            ),
            entry(
                "strict_items",
                FieldType::list(FieldType::non_null(FieldType::Int)),
                ResultNode::List(vec![ResultNode::Leaf(json!(1)), ResultNode::Leaf(Value::Null)]),
            ),
        ]);

        let response = assemble(&schema(), &tree);
        assert_eq!(
            response.data,
            Some(json!({"nullable_items": [1, null, 3], "strict_items": null}))
        );
        assert_eq!(
            codes(&response),
            vec![
                (Some("/nullable_items/1".into()), "RESOLVER_FAULT".into()),
                (Some("/strict_items/1".into()), "NON_NULL_VIOLATION".into()),
                (Some("/strict_items".into()), "NON_NULL_VIOLATION".into()),
            ]
        );
        assert!(response.errors[1].message.contains("at index 1"));
    }

    #[test]
    fn leaf_values_are_checked() {
        let tree = tree(vec![
            entry("int", FieldType::Int, ResultNode::Leaf(json!(3_000_000_000i64))),
            entry("whole", FieldType::Int, ResultNode::Leaf(json!(3.0))),
            entry("half", FieldType::Int, ResultNode::Leaf(json!(2.5))),
            entry("id", FieldType::Id, ResultNode::Leaf(json!(7))),
            entry("color", FieldType::named("Color"), ResultNode::Leaf(json!("RED"))),
            entry("shade", FieldType::named("Color"), ResultNode::Leaf(json!("BLUE"))),
            entry("flag", FieldType::Boolean, ResultNode::Leaf(json!("yes"))),
        ]);

        let response = assemble(&schema(), &tree);
        assert_eq!(
            response.data,
            Some(json!({
                "int": null,
                "whole": 3,
                "half": null,
                "id": "7",
                "color": "RED",
                "shade": null,
                "flag": null
            }))
        );
        assert_eq!(response.error_codes(), vec!["TYPE_MISMATCH"; 4]);
        assert_eq!(response.errors[3].message, "cannot view string value as Boolean");
    }

    #[test]
    fn assembly_is_idempotent() {
        let tree = tree(vec![
            entry("b", FieldType::String, ResultNode::Error(FieldError::fault("x"))),
            entry("a", FieldType::Int, ResultNode::Leaf(json!(1))),
        ]);
        let schema = schema();
        let first = serde_json::to_string(&assemble(&schema, &tree)).unwrap();
        let second = serde_json::to_string(&assemble(&schema, &tree)).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(r#"{"data":{"b":null,"a":1}"#));
    }
}
