use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::FieldError;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldDefinition;
use crate::spec::FieldType;
use crate::spec::OperationKind;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::spec::TYPENAME;

const DEFAULT_RECURSION_LIMIT: usize = 512;

/// The value given to an argument in a selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArgumentValue {
    Literal(Value),
    Variable(String),
}

/// An unbound field selection, as handed over by a query parser.
///
/// It is checked against a [`Schema`] when building an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    name: String,
    alias: Option<String>,
    arguments: Vec<(String, ArgumentValue)>,
    include_skip: IncludeSkip,
    location: Option<Location>,
    selections: Vec<FieldSelection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            include_skip: IncludeSkip::default(),
            location: None,
            selections: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn argument(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.arguments.push((name.into(), value));
        self
    }

    pub fn literal(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.argument(name, ArgumentValue::Literal(value.into()))
    }

    pub fn variable(self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        self.argument(name, ArgumentValue::Variable(variable.into()))
    }

    /// `@skip(if: ...)`
    pub fn skip_if(mut self, condition: Condition) -> Self {
        self.include_skip.skip = condition;
        self
    }

    /// `@include(if: ...)`
    pub fn include_if(mut self, condition: Condition) -> Self {
        self.include_skip.include = condition;
        self
    }

    /// Source position of the field in the query document.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Some(Location { line, column });
        self
    }

    pub fn select(mut self, selection: FieldSelection) -> Self {
        self.selections.push(selection);
        self
    }

    fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The ordered selections made on one object.
pub type SelectionSet = Vec<Arc<Selection>>;

/// A field selection bound to its schema definition.
#[derive(Debug)]
pub struct Selection {
    pub(crate) name: String,
    pub(crate) alias: Option<String>,
    pub(crate) parent_type: String,
    /// `None` for `__typename`.
    pub(crate) definition: Option<Arc<FieldDefinition>>,
    pub(crate) field_type: FieldType,
    pub(crate) arguments: Vec<(String, ArgumentValue)>,
    pub(crate) include_skip: IncludeSkip,
    pub(crate) location: Option<Location>,
    pub(crate) selection_set: SelectionSet,
}

impl Selection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The key under which the field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn parent_type(&self) -> &str {
        &self.parent_type
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn definition(&self) -> Option<&Arc<FieldDefinition>> {
        self.definition.as_ref()
    }

    pub fn selection_set(&self) -> &[Arc<Selection>] {
        &self.selection_set
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub(crate) fn locations(&self) -> Vec<Location> {
        self.location.into_iter().collect()
    }

    /// Coerce the selection's arguments against their declarations.
    ///
    /// The result follows declaration order. Literals are kept as-is,
    /// variables are read from `variables` and missing values fall back to
    /// the declared default. Optional arguments without any value are
    /// omitted.
    pub(crate) fn coerce_arguments(
        &self,
        schema: &Schema,
        variables: &Object,
    ) -> Result<Object, FieldError> {
        let mut coerced = Object::new();
        let Some(definition) = &self.definition else {
            return Ok(coerced);
        };

        for argument in definition.arguments() {
            let provided = self
                .arguments
                .iter()
                .find(|(name, _)| name == argument.name())
                .and_then(|(_, value)| match value {
                    ArgumentValue::Literal(value) => Some(value.clone()),
                    ArgumentValue::Variable(variable) => variables.get(variable.as_str()).cloned(),
                });

            let value = match provided.or_else(|| argument.default_value.clone()) {
                Some(value) => value,
                None if argument.field_type().is_non_null() => {
                    return Err(FieldError::ArgumentMissing {
                        name: argument.name().to_string(),
                    });
                }
                None => continue,
            };

            if argument
                .field_type()
                .validate_input_value(&value, schema)
                .is_err()
            {
                return Err(FieldError::ArgumentTypeMismatch {
                    name: argument.name().to_string(),
                    reason: format!("expected {}", argument.field_type()),
                });
            }
            coerced.insert(argument.name(), argument.field_type().coerce_input_value(value));
        }

        Ok(coerced)
    }
}

/// An operation whose selections were validated against a schema.
#[derive(Debug)]
pub struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) root_type: String,
    pub(crate) selection_set: SelectionSet,
}

#[buildstructor::buildstructor]
impl Operation {
    /// Bind selections to `schema`.
    ///
    /// Every selected field, argument and sub-selection is checked here so
    /// that execution never meets an unknown field.
    #[builder(visibility = "pub")]
    #[allow(clippy::needless_lifetimes)] // needed by buildstructor-generated code
    fn new<'a>(
        schema: &'a Schema,
        kind: Option<OperationKind>,
        selections: Vec<FieldSelection>,
        max_depth: Option<usize>,
    ) -> Result<Self, SpecError> {
        let kind = kind.unwrap_or_default();
        let root_type = schema
            .root_operation_name(kind)
            .ok_or(SpecError::UnsupportedOperation(kind))?
            .to_string();
        let binder = Binder {
            schema,
            max_depth: max_depth.unwrap_or(DEFAULT_RECURSION_LIMIT),
        };
        let selection_set = binder.bind_selection_set(&root_type, &selections, 0)?;

        Ok(Self {
            kind,
            root_type,
            selection_set,
        })
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn root_type(&self) -> &str {
        &self.root_type
    }

    pub fn selection_set(&self) -> &[Arc<Selection>] {
        &self.selection_set
    }
}

struct Binder<'a> {
    schema: &'a Schema,
    max_depth: usize,
}

impl Binder<'_> {
    fn bind_selection_set(
        &self,
        parent_type: &str,
        selections: &[FieldSelection],
        depth: usize,
    ) -> Result<SelectionSet, SpecError> {
        if depth > self.max_depth {
            tracing::error!(
                "selection processing recursion limit({}) exceeded",
                self.max_depth
            );
            return Err(SpecError::RecursionLimitExceeded);
        }

        let mut response_keys = HashSet::new();
        let mut selection_set = Vec::with_capacity(selections.len());
        for selection in selections {
            if selection.include_skip.statically_skipped() {
                continue;
            }
            if !response_keys.insert(selection.response_key()) {
                return Err(SpecError::DuplicateResponseKey(
                    selection.response_key().to_string(),
                ));
            }
            selection_set.push(Arc::new(self.bind_field(parent_type, selection, depth)?));
        }
        Ok(selection_set)
    }

    fn bind_field(
        &self,
        parent_type: &str,
        selection: &FieldSelection,
        depth: usize,
    ) -> Result<Selection, SpecError> {
        if selection.name == TYPENAME {
            if let Some((argument, _)) = selection.arguments.first() {
                return Err(SpecError::UnknownArgument(
                    argument.clone(),
                    TYPENAME.to_string(),
                ));
            }
            if !selection.selections.is_empty() {
                return Err(SpecError::LeafSelection(
                    TYPENAME.to_string(),
                    parent_type.to_string(),
                ));
            }
            return Ok(Selection {
                name: selection.name.clone(),
                alias: selection.alias.clone(),
                parent_type: parent_type.to_string(),
                definition: None,
                field_type: FieldType::non_null(FieldType::String),
                arguments: Vec::new(),
                include_skip: selection.include_skip.clone(),
                location: selection.location,
                selection_set: Vec::new(),
            });
        }

        let definition = self
            .schema
            .lookup(parent_type, &selection.name)
            .ok_or_else(|| {
                SpecError::UnknownField(selection.name.clone(), parent_type.to_string())
            })?
            .clone();
        let qualified_name = || format!("{parent_type}.{}", selection.name);

        for (name, value) in &selection.arguments {
            let argument = definition
                .argument_definition(name)
                .ok_or_else(|| SpecError::UnknownArgument(name.clone(), qualified_name()))?;
            if let ArgumentValue::Literal(literal) = value {
                if argument
                    .field_type()
                    .validate_input_value(literal, self.schema)
                    .is_err()
                {
                    return Err(SpecError::ArgumentTypeMismatch(
                        name.clone(),
                        qualified_name(),
                    ));
                }
            }
        }
        if let Some(missing) = definition.arguments().iter().find(|argument| {
            argument.is_required()
                && !selection
                    .arguments
                    .iter()
                    .any(|(name, _)| name == argument.name())
        }) {
            return Err(SpecError::MissingArgument(
                missing.name().to_string(),
                qualified_name(),
            ));
        }

        let field_type = definition.field_type().clone();
        let selection_set = match field_type.inner_type_name() {
            Some(child_type) if self.schema.is_object_type(child_type) => {
                if selection.selections.is_empty() {
                    return Err(SpecError::MissingSelection(
                        selection.name.clone(),
                        field_type.to_string(),
                    ));
                }
                self.bind_selection_set(child_type, &selection.selections, depth + 1)?
            }
            _ if !selection.selections.is_empty() => {
                return Err(SpecError::LeafSelection(
                    selection.name.clone(),
                    field_type.to_string(),
                ));
            }
            _ => Vec::new(),
        };

        Ok(Selection {
            name: selection.name.clone(),
            alias: selection.alias.clone(),
            parent_type: parent_type.to_string(),
            definition: Some(definition),
            field_type,
            arguments: selection.arguments.clone(),
            include_skip: selection.include_skip.clone(),
            location: selection.location,
            selection_set,
        })
    }
}

/// `@skip` and `@include` conditions of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

/// The `if` argument of `@skip` or `@include`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Yes,
    No,
    Variable(String),
}

impl Default for IncludeSkip {
    fn default() -> Self {
        Self {
            include: Condition::Yes,
            skip: Condition::No,
        }
    }
}

impl IncludeSkip {
    pub(crate) fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    pub(crate) fn should_skip(&self, variables: &Object) -> bool {
        // a missing or non boolean variable leaves the default in place
        self.skip.eval(variables).unwrap_or(false) || !self.include.eval(variables).unwrap_or(true)
    }
}

impl Condition {
    pub(crate) fn eval(&self, variables: &Object) -> Option<bool> {
        match self {
            Condition::Yes => Some(true),
            Condition::No => Some(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|v| v.as_bool()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::spec::ArgumentDefinition;
    use crate::spec::ObjectType;

    fn schema() -> Schema {
        Schema::builder()
            .object(
                ObjectType::new("Query")
                    .with_field(
                        FieldDefinition::new("person", FieldType::named("Person")).argument(
                            ArgumentDefinition::new("id", FieldType::non_null(FieldType::Id)),
                        ),
                    )
                    .with_field(
                        FieldDefinition::new("people", FieldType::list(FieldType::named("Person")))
                            .argument(ArgumentDefinition::new("first", FieldType::Int).default_value(10))
                            .argument(ArgumentDefinition::new("after", FieldType::String)),
                    ),
            )
            .object(
                ObjectType::new("Person")
                    .with_field(FieldDefinition::new("name", FieldType::non_null(FieldType::String)))
                    .with_field(FieldDefinition::new("friend", FieldType::named("Person"))),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn binds_nested_selections() {
        let schema = schema();
        let operation = Operation::builder()
            .schema(&schema)
            .selection(
                FieldSelection::new("person")
                    .alias("me")
                    .literal("id", "1")
                    .at(1, 3)
                    .select(FieldSelection::new("__typename"))
                    .select(FieldSelection::new("name")),
            )
            .build()
            .unwrap();

        assert_eq!(operation.kind(), OperationKind::Query);
        assert_eq!(operation.root_type(), "Query");
        let me = &operation.selection_set()[0];
        assert_eq!(me.response_key(), "me");
        assert_eq!(me.location(), Some(Location { line: 1, column: 3 }));
        let children: Vec<_> = me
            .selection_set()
            .iter()
            .map(|s| (s.name(), s.parent_type(), s.definition().is_none()))
            .collect();
        assert_eq!(
            children,
            vec![("__typename", "Person", true), ("name", "Person", false)]
        );
    }

    #[test]
    fn rejects_invalid_selections() {
        let schema = schema();
        let bind = |selection: FieldSelection| {
            Operation::builder()
                .schema(&schema)
                .selection(selection)
                .build()
                .unwrap_err()
        };

        assert_eq!(
            bind(FieldSelection::new("ghost")),
            SpecError::UnknownField("ghost".into(), "Query".into())
        );
        assert_eq!(
            bind(FieldSelection::new("person").select(FieldSelection::new("name"))),
            SpecError::MissingArgument("id".into(), "Query.person".into())
        );
        assert_eq!(
            bind(
                FieldSelection::new("person")
                    .literal("id", true)
                    .select(FieldSelection::new("name"))
            ),
            SpecError::ArgumentTypeMismatch("id".into(), "Query.person".into())
        );
        assert_eq!(
            bind(FieldSelection::new("person").literal("id", "1")),
            SpecError::MissingSelection("person".into(), "Person".into())
        );
        assert_eq!(
            bind(
                FieldSelection::new("people")
                    .literal("last", 1)
                    .select(FieldSelection::new("name"))
            ),
            SpecError::UnknownArgument("last".into(), "Query.people".into())
        );
    }

    #[test]
    fn rejects_selection_on_leaf_and_duplicate_keys() {
        let schema = schema();
        let err = Operation::builder()
            .schema(&schema)
            .selection(
                FieldSelection::new("people").select(
                    FieldSelection::new("name").select(FieldSelection::new("length")),
                ),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, SpecError::LeafSelection("name".into(), "String!".into()));

        let err = Operation::builder()
            .schema(&schema)
            .selection(FieldSelection::new("people").select(FieldSelection::new("name")))
            .selection(
                FieldSelection::new("person")
                    .alias("people")
                    .literal("id", 1)
                    .select(FieldSelection::new("name")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, SpecError::DuplicateResponseKey("people".into()));
    }

    #[test]
    fn recursion_limit() {
        let schema = schema();
        let mut selection = FieldSelection::new("name");
        for _ in 0..4 {
            selection = FieldSelection::new("friend").select(selection);
        }
        let operation = || {
            Operation::builder()
                .schema(&schema)
                .selection(FieldSelection::new("people").select(selection.clone()))
        };

        assert!(operation().max_depth(5).build().is_ok());
        assert_eq!(
            operation().max_depth(4).build().unwrap_err(),
            SpecError::RecursionLimitExceeded
        );
    }

    #[test]
    fn mutation_requires_a_root_type() {
        let schema = schema();
        let err = Operation::builder()
            .schema(&schema)
            .kind(OperationKind::Mutation)
            .build()
            .unwrap_err();
        assert_eq!(err, SpecError::UnsupportedOperation(OperationKind::Mutation));
    }

    #[test]
    fn statically_skipped_selections_are_dropped() {
        let schema = schema();
        let operation = Operation::builder()
            .schema(&schema)
            .selection(
                FieldSelection::new("people")
                    .skip_if(Condition::Yes)
                    .select(FieldSelection::new("name")),
            )
            .selection(
                FieldSelection::new("people")
                    .alias("others")
                    .include_if(Condition::Variable("withOthers".into()))
                    .select(FieldSelection::new("name")),
            )
            .build()
            .unwrap();

        assert_eq!(operation.selection_set().len(), 1);
        let others = &operation.selection_set()[0];
        assert!(!others.include_skip.should_skip(&Object::new()));
        let variables = json!({"withOthers": false});
        assert!(others.include_skip.should_skip(variables.as_object().unwrap()));
    }

    #[test]
    fn argument_coercion() {
        let schema = schema();
        let operation = Operation::builder()
            .schema(&schema)
            .selection(
                FieldSelection::new("people")
                    .variable("after", "cursor")
                    .select(FieldSelection::new("name")),
            )
            .selection(
                FieldSelection::new("person")
                    .variable("id", "id")
                    .select(FieldSelection::new("name")),
            )
            .build()
            .unwrap();
        let people = &operation.selection_set()[0];
        let person = &operation.selection_set()[1];

        let variables = json!({"cursor": "abc", "id": 4});
        let variables = variables.as_object().unwrap();
        assert_eq!(
            Value::Object(person.coerce_arguments(&schema, variables).unwrap()),
            json!({"id": "4"})
        );
        assert_eq!(
            Value::Object(people.coerce_arguments(&schema, variables).unwrap()),
            json!({"first": 10, "after": "abc"})
        );
        assert_eq!(
            Value::Object(people.coerce_arguments(&schema, &Object::new()).unwrap()),
            json!({"first": 10})
        );
        assert_eq!(
            person.coerce_arguments(&schema, &Object::new()).unwrap_err(),
            FieldError::ArgumentMissing { name: "id".into() }
        );
        let variables = json!({"id": 4.5});
        assert!(matches!(
            person
                .coerce_arguments(&schema, variables.as_object().unwrap())
                .unwrap_err(),
            FieldError::ArgumentTypeMismatch { name, .. } if name == "id"
        ));
    }
}
