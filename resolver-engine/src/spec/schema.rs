//! Schema and the field registration table.

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use derivative::Derivative;

use crate::json_ext::Value;
use crate::resolver::PropertyResolver;
use crate::resolver::Resolver;
use crate::resolver::ResolverBinding;
use crate::spec::FieldType;
use crate::spec::OperationKind;
use crate::spec::SpecError;

const DEFAULT_QUERY_TYPE: &str = "Query";

/// A resolved schema: object types whose fields are bound to resolvers.
///
/// Built once through [`Schema::builder`] and immutable afterwards.
#[derive(Debug)]
pub struct Schema {
    pub(crate) object_types: HashMap<String, ObjectType>,
    pub(crate) custom_scalars: HashSet<String>,
    pub(crate) enums: HashMap<String, HashSet<String>>,
    query_type: String,
    mutation_type: Option<String>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Look up the definition of `field_name` on `type_name`.
    pub fn lookup(&self, type_name: &str, field_name: &str) -> Option<&Arc<FieldDefinition>> {
        self.object_types.get(type_name)?.field(field_name)
    }

    pub fn object_type(&self, type_name: &str) -> Option<&ObjectType> {
        self.object_types.get(type_name)
    }

    pub fn is_object_type(&self, type_name: &str) -> bool {
        self.object_types.contains_key(type_name)
    }

    pub(crate) fn has_type(&self, name: &str) -> bool {
        self.object_types.contains_key(name)
            || self.custom_scalars.contains(name)
            || self.enums.contains_key(name)
    }

    /// Name of the root type for the given kind of operation.
    pub fn root_operation_name(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
        }
    }
}

/// Accumulates the explicit registration table of a [`Schema`].
#[derive(Default)]
pub struct SchemaBuilder {
    object_types: Vec<ObjectType>,
    custom_scalars: Vec<String>,
    enums: Vec<(String, HashSet<String>)>,
    query_type: Option<String>,
    mutation_type: Option<String>,
}

impl SchemaBuilder {
    pub fn object(mut self, object_type: ObjectType) -> Self {
        self.object_types.push(object_type);
        self
    }

    pub fn custom_scalar(mut self, name: impl Into<String>) -> Self {
        self.custom_scalars.push(name.into());
        self
    }

    pub fn enum_type<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums
            .push((name.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Root type for queries, `Query` when not set.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = Some(name.into());
        self
    }

    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Schema, SpecError> {
        let mut schema = Schema {
            object_types: HashMap::new(),
            custom_scalars: HashSet::new(),
            enums: HashMap::new(),
            query_type: self
                .query_type
                .unwrap_or_else(|| DEFAULT_QUERY_TYPE.to_string()),
            mutation_type: self.mutation_type,
        };

        for name in self.custom_scalars {
            if schema.has_type(&name) || FieldType::named(name.as_str()).is_builtin_scalar() {
                return Err(SpecError::DuplicateType(name));
            }
            schema.custom_scalars.insert(name);
        }
        for (name, values) in self.enums {
            if schema.has_type(&name) {
                return Err(SpecError::DuplicateType(name));
            }
            schema.enums.insert(name, values);
        }
        for object_type in self.object_types {
            object_type.check_duplicates()?;
            if schema.has_type(&object_type.name) {
                return Err(SpecError::DuplicateType(object_type.name));
            }
            schema
                .object_types
                .insert(object_type.name.clone(), object_type);
        }

        for root in std::iter::once(&schema.query_type).chain(schema.mutation_type.as_ref()) {
            if !schema.object_types.contains_key(root) {
                return Err(SpecError::UnknownType(root.clone()));
            }
        }

        for object_type in schema.object_types.values() {
            for field in &object_type.fields {
                if let Some(name) = field.field_type.inner_type_name() {
                    if !schema.has_type(name) {
                        return Err(SpecError::UnknownType(name.to_string()));
                    }
                }
                for argument in &field.arguments {
                    if let Some(name) = argument.field_type.inner_type_name() {
                        if schema.object_types.contains_key(name) || !schema.has_type(name) {
                            return Err(SpecError::InvalidType(argument.field_type.to_string()));
                        }
                    }
                    if let Some(default) = &argument.default_value {
                        if argument
                            .field_type
                            .validate_input_value(default, &schema)
                            .is_err()
                        {
                            return Err(SpecError::ArgumentTypeMismatch(
                                argument.name.clone(),
                                format!("{}.{}", object_type.name, field.name),
                            ));
                        }
                    }
                }
            }
        }

        tracing::debug!(
            object_types = schema.object_types.len(),
            "schema registration table built"
        );
        Ok(schema)
    }
}

/// An object type and its fields, in declaration order.
#[derive(Debug)]
pub struct ObjectType {
    pub(crate) name: String,
    pub(crate) fields: Vec<Arc<FieldDefinition>>,
    index: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl ObjectType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            index: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDefinition>> {
        self.index.get(name).map(|i| &self.fields[*i])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldDefinition>> {
        self.fields.iter()
    }

    /// Register a field. Registering the same name twice is reported by
    /// [`SchemaBuilder::build`].
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        if self.index.contains_key(&field.name) {
            self.duplicates.push(field.name.clone());
        } else {
            self.index.insert(field.name.clone(), self.fields.len());
            self.fields.push(Arc::new(field));
        }
        self
    }

    pub(crate) fn check_duplicates(&self) -> Result<(), SpecError> {
        match self.duplicates.first() {
            Some(field) => Err(SpecError::DuplicateField(field.clone(), self.name.clone())),
            None => Ok(()),
        }
    }
}

/// A field of an object type bound to its resolver.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FieldDefinition {
    pub(crate) name: String,
    pub(crate) field_type: FieldType,
    pub(crate) arguments: Vec<ArgumentDefinition>,
    pub(crate) resolver: ResolverBinding,
    pub(crate) binds_parent: bool,
    #[derivative(Debug = "ignore")]
    pub(crate) required_services: Vec<(TypeId, &'static str)>,
}

impl FieldDefinition {
    /// A field resolved by reading the same-named key of the parent object,
    /// until a resolver is bound.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            resolver: ResolverBinding::Schema(Arc::new(PropertyResolver::new(name.clone()))),
            name,
            field_type,
            arguments: Vec::new(),
            binds_parent: false,
            required_services: Vec::new(),
        }
    }

    pub fn argument(mut self, argument: ArgumentDefinition) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Bind a resolver owned by the schema (one instance for the schema's lifetime).
    pub fn resolver(mut self, resolver: impl Resolver) -> Self {
        self.resolver = ResolverBinding::Schema(Arc::new(resolver));
        self
    }

    /// Bind a resolver instantiated once per request.
    pub fn per_request_resolver<F, R>(mut self, factory: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Resolver,
    {
        self.resolver =
            ResolverBinding::Request(Arc::new(move || Arc::new(factory()) as Arc<dyn Resolver>));
        self
    }

    /// Bind a resolver whose lifetime is managed by the caller.
    pub fn external_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = ResolverBinding::External(resolver);
        self
    }

    /// Declare that the resolver reads its parent value: resolution fails
    /// when the parent value is null.
    pub fn binds_parent(mut self) -> Self {
        self.binds_parent = true;
        self
    }

    /// Declare a service the resolver needs from the registry.
    pub fn requires_service<T: Send + Sync + 'static>(mut self) -> Self {
        self.required_services
            .push((TypeId::of::<T>(), std::any::type_name::<T>()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn arguments(&self) -> &[ArgumentDefinition] {
        &self.arguments
    }

    pub fn resolver_binding(&self) -> &ResolverBinding {
        &self.resolver
    }

    pub(crate) fn argument_definition(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.arguments.iter().find(|argument| argument.name == name)
    }
}

/// An argument declaration: name, type and optional default value.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentDefinition {
    pub(crate) name: String,
    pub(crate) field_type: FieldType,
    pub(crate) default_value: Option<Value>,
}

impl ArgumentDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default_value: None,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Whether a value must be supplied by the selection.
    pub(crate) fn is_required(&self) -> bool {
        self.field_type.is_non_null() && self.default_value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::resolver::ResolverLifetime;
    use crate::resolver::resolver_fn;

    fn person() -> ObjectType {
        ObjectType::new("Person")
            .with_field(FieldDefinition::new(
                "name",
                FieldType::non_null(FieldType::String),
            ))
            .with_field(FieldDefinition::new("friend", FieldType::named("Person")))
    }

    #[test]
    fn lookup_fields() {
        let schema = Schema::builder()
            .object(
                ObjectType::new("Query").with_field(
                    FieldDefinition::new("person", FieldType::named("Person"))
                        .resolver(resolver_fn(|_| async { Ok(json!({"name": "Ada"})) })),
                ),
            )
            .object(person())
            .build()
            .unwrap();

        let field = schema.lookup("Query", "person").unwrap();
        assert_eq!(field.field_type(), &FieldType::named("Person"));
        assert_eq!(field.resolver_binding().lifetime(), ResolverLifetime::Schema);
        assert!(schema.lookup("Query", "missing").is_none());
        assert!(schema.lookup("Missing", "person").is_none());
        assert_eq!(
            schema
                .object_type("Person")
                .unwrap()
                .fields()
                .map(|f| f.name())
                .collect::<Vec<_>>(),
            vec!["name", "friend"]
        );
        assert_eq!(schema.root_operation_name(OperationKind::Query), Some("Query"));
        assert_eq!(schema.root_operation_name(OperationKind::Mutation), None);
    }

    #[test]
    fn unknown_output_type() {
        let err = Schema::builder()
            .object(
                ObjectType::new("Query")
                    .with_field(FieldDefinition::new("ghost", FieldType::named("Ghost"))),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownType(name) if name == "Ghost"));
    }

    #[test]
    fn missing_root_type() {
        let err = Schema::builder()
            .object(person())
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownType(name) if name == "Query"));

        let err = Schema::builder()
            .object(ObjectType::new("Query"))
            .mutation_type("Mutation")
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownType(name) if name == "Mutation"));
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = Schema::builder()
            .object(ObjectType::new("Query"))
            .object(ObjectType::new("Query"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::DuplicateType(name) if name == "Query"));

        let err = Schema::builder()
            .object(
                ObjectType::new("Query")
                    .with_field(FieldDefinition::new("a", FieldType::Int))
                    .with_field(FieldDefinition::new("a", FieldType::String)),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::DuplicateField(field, ty) if field == "a" && ty == "Query"));
    }

    #[test]
    fn argument_defaults_are_checked() {
        let err = Schema::builder()
            .object(
                ObjectType::new("Query").with_field(
                    FieldDefinition::new("items", FieldType::list(FieldType::Int))
                        .argument(ArgumentDefinition::new("first", FieldType::Int).default_value("ten")),
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SpecError::ArgumentTypeMismatch(arg, field) if arg == "first" && field == "Query.items"));
    }
}
