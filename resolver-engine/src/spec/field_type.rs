use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Value;
use crate::spec::Schema;

#[derive(Debug)]
pub(crate) struct InvalidValue;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
    /// String
    String,
    /// Int
    Int,
    /// Float
    Float,
    /// Id
    Id,
    /// Boolean
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Id => write!(f, "ID"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FieldType {
    /// A reference to a named type, mapping builtin scalar names to their variant.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "ID" => Self::Id,
            "Boolean" => Self::Boolean,
            _ => Self::Named(name),
        }
    }

    pub fn list(inner: FieldType) -> Self {
        Self::List(Box::new(inner))
    }

    pub fn non_null(inner: FieldType) -> Self {
        Self::NonNull(Box::new(inner))
    }

    // This function validates input values according to the graphql specification.
    // Each of the values are validated against the "input coercion" rules.
    pub(crate) fn validate_input_value(
        &self,
        value: &Value,
        schema: &Schema,
    ) -> Result<(), InvalidValue> {
        match (self, value) {
            (FieldType::String, Value::String(_)) => Ok(()),
            // Spec: https://spec.graphql.org/June2018/#sec-Int
            (FieldType::Int, maybe_int) => {
                if maybe_int == &Value::Null || is_valid_int(maybe_int) {
                    Ok(())
                } else {
                    Err(InvalidValue)
                }
            }
            // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
            (FieldType::Float, maybe_float) => {
                if maybe_float == &Value::Null || maybe_float.as_f64().is_some() {
                    Ok(())
                } else {
                    Err(InvalidValue)
                }
            }
            // "The ID scalar type represents a unique identifier, often used to refetch an object
            // or as the key for a cache. The ID type is serialized in the same way as a String;
            // however, it is not intended to be human-readable. While it is often numeric, it
            // should always serialize as a String."
            //
            // In practice it seems Int works too
            (FieldType::Id, Value::String(_)) => Ok(()),
            (FieldType::Id, maybe_int) => {
                if maybe_int == &Value::Null || is_valid_int(maybe_int) {
                    Ok(())
                } else {
                    Err(InvalidValue)
                }
            }
            (FieldType::Boolean, Value::Bool(_)) => Ok(()),
            (FieldType::List(inner_ty), Value::Array(vec)) => vec
                .iter()
                .try_for_each(|x| inner_ty.validate_input_value(x, schema)),
            // For coercion from single value to list
            (FieldType::List(inner_ty), val) if val != &Value::Null => {
                inner_ty.validate_input_value(val, schema)
            }
            (FieldType::NonNull(inner_ty), value) => {
                if value.is_null() {
                    Err(InvalidValue)
                } else {
                    inner_ty.validate_input_value(value, schema)
                }
            }
            (FieldType::Named(name), _) if schema.custom_scalars.contains(name) => Ok(()),
            (FieldType::Named(name), Value::String(s)) => match schema.enums.get(name) {
                Some(values) if values.contains(s.as_str()) => Ok(()),
                _ => Err(InvalidValue),
            },
            // NOTE: graphql's types are all optional by default
            (_, Value::Null) => Ok(()),
            _ => Err(InvalidValue),
        }
    }

    /// Coerce an input value that passed [`FieldType::validate_input_value`]:
    /// a single value in a list position becomes a one-item list and integer
    /// IDs become strings.
    pub(crate) fn coerce_input_value(&self, value: Value) -> Value {
        match (self, value) {
            (FieldType::NonNull(inner_ty), value) => inner_ty.coerce_input_value(value),
            (_, Value::Null) => Value::Null,
            (FieldType::List(inner_ty), Value::Array(items)) => Value::Array(
                items
                    .into_iter()
                    .map(|item| inner_ty.coerce_input_value(item))
                    .collect(),
            ),
            (FieldType::List(inner_ty), value) => {
                Value::Array(vec![inner_ty.coerce_input_value(value)])
            }
            (FieldType::Id, Value::Number(number)) => Value::from(
                number
                    .as_i64()
                    .map(|i| i.to_string())
                    .unwrap_or_else(|| number.to_string()),
            ),
            (_, value) => value,
        }
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> Option<&str> {
        match self {
            FieldType::Named(name) => Some(name.as_str()),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => None,
        }
    }

    pub fn is_builtin_scalar(&self) -> bool {
        match self {
            FieldType::Named(_) | FieldType::List(_) | FieldType::NonNull(_) => false,
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => true,
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }
}

fn is_valid_int(value: &Value) -> bool {
    value
        .as_i64()
        .and_then(|i| i32::try_from(i).ok())
        .is_some()
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn schema() -> Schema {
        Schema::builder()
            .object(crate::spec::ObjectType::new("Query"))
            .enum_type("Color", ["RED", "GREEN"])
            .custom_scalar("DateTime")
            .build()
            .unwrap()
    }

    #[test]
    fn display() {
        let ty = FieldType::non_null(FieldType::list(FieldType::non_null(FieldType::named(
            "User",
        ))));
        assert_eq!(ty.to_string(), "[User!]!");
        assert_eq!(ty.inner_type_name(), Some("User"));
        assert_eq!(FieldType::named("ID"), FieldType::Id);
    }

    #[test]
    fn input_coercion() {
        let schema = schema();
        let int = FieldType::Int;
        assert!(int.validate_input_value(&json!(3), &schema).is_ok());
        assert!(int.validate_input_value(&json!(3_000_000_000i64), &schema).is_err());
        assert!(int.validate_input_value(&json!("3"), &schema).is_err());

        let ids = FieldType::list(FieldType::non_null(FieldType::Id));
        assert!(ids.validate_input_value(&json!(["a", 2]), &schema).is_ok());
        assert!(ids.validate_input_value(&json!("single"), &schema).is_ok());
        assert!(ids.validate_input_value(&json!([null]), &schema).is_err());

        let color = FieldType::named("Color");
        assert!(color.validate_input_value(&json!("RED"), &schema).is_ok());
        assert!(color.validate_input_value(&json!("BLUE"), &schema).is_err());

        let date = FieldType::non_null(FieldType::named("DateTime"));
        assert_eq!(
            date.coerce_input_value(json!({"any": "shape"})),
            json!({"any": "shape"})
        );
        assert!(date.validate_input_value(&json!({"any": "shape"}), &schema).is_ok());
        assert!(date.validate_input_value(&Value::Null, &schema).is_err());
    }

    #[test]
    fn input_coercion_normalizes_values() {
        let ids = FieldType::non_null(FieldType::list(FieldType::non_null(FieldType::Id)));
        assert_eq!(ids.coerce_input_value(json!("single")), json!(["single"]));
        assert_eq!(ids.coerce_input_value(json!(["a", 2])), json!(["a", "2"]));
        assert_eq!(ids.coerce_input_value(json!(7)), json!(["7"]));

        let matrix = FieldType::list(FieldType::list(FieldType::Int));
        assert_eq!(matrix.coerce_input_value(json!(3)), json!([[3]]));
        assert_eq!(matrix.coerce_input_value(Value::Null), Value::Null);

        assert_eq!(FieldType::Id.coerce_input_value(json!(42)), json!("42"));
        assert_eq!(FieldType::Int.coerce_input_value(json!(42)), json!(42));
    }
}
