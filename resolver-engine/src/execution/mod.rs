//! Resolution of bound selection trees.
//!
//! Sibling fields are resolved concurrently; a field's sub-selections start
//! once its own resolver produced a value. Root fields of a mutation are
//! resolved one after another.

mod assembler;
mod result;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::prelude::*;
use futures::stream;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use self::assembler::assemble;
pub use self::result::ResultEntry;
pub use self::result::ResultNode;
pub use self::result::ResultObject;
pub use self::result::ResultTree;
use crate::configuration::ExecutionConfig;
use crate::context::ResolverContext;
use crate::context::Scope;
use crate::error::FieldError;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::loader::LoaderCache;
use crate::resolver::Resolver;
use crate::resolver::ResolverBinding;
use crate::service_registry::ServiceRegistry;
use crate::spec::FieldDefinition;
use crate::spec::FieldSelection;
use crate::spec::FieldType;
use crate::spec::Operation;
use crate::spec::OperationKind;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

pub(crate) const EXECUTE_SPAN_NAME: &str = "execute";
pub(crate) const RESOLVE_FIELD_SPAN_NAME: &str = "resolve_field";

/// A request to execute one operation.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub operation: Arc<Operation>,
    pub root_value: Value,
    pub variables: Object,
    pub services: ServiceRegistry,
    pub cancellation: CancellationToken,
    pub deadline: Option<Instant>,
}

#[buildstructor::buildstructor]
impl ExecutionRequest {
    /// Returns a builder for an [`ExecutionRequest`].
    ///
    /// `operation` is required. The root value defaults to null, services to
    /// an empty registry and the cancellation token to a fresh one. Without
    /// a deadline, the configured timeout (if any) applies.
    #[builder(visibility = "pub")]
    fn new(
        operation: Arc<Operation>,
        root_value: Option<Value>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        variables: JsonMap<ByteString, Value>,
        services: Option<ServiceRegistry>,
        cancellation: Option<CancellationToken>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            operation,
            root_value: root_value.unwrap_or_default(),
            variables,
            services: services.unwrap_or_default(),
            cancellation: cancellation.unwrap_or_default(),
            deadline,
        }
    }
}

/// Executes operations against a schema.
#[derive(Debug, Clone)]
pub struct Executor {
    schema: Arc<Schema>,
    config: Arc<ExecutionConfig>,
}

impl Executor {
    pub fn new(schema: Arc<Schema>, config: ExecutionConfig) -> Self {
        Self {
            schema,
            config: Arc::new(config),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Bind selections to the executor's schema, within the configured depth limit.
    pub fn prepare(
        &self,
        kind: OperationKind,
        selections: Vec<FieldSelection>,
    ) -> Result<Arc<Operation>, SpecError> {
        Operation::builder()
            .schema(&self.schema)
            .kind(kind)
            .selections(selections)
            .max_depth(self.config.max_depth)
            .build()
            .map(Arc::new)
    }

    /// Execute the operation and return a [`Response`].
    ///
    /// Field failures never fail the whole request: they are reported in the
    /// response's errors next to the partial data.
    pub async fn execute(&self, request: ExecutionRequest) -> Response {
        let tree = self.resolve(request).await;
        assemble(&self.schema, &tree)
    }

    /// Resolve the operation into its outcome tree, without assembling it.
    pub async fn resolve(&self, request: ExecutionRequest) -> ResultTree {
        let ExecutionRequest {
            operation,
            root_value,
            variables,
            services,
            cancellation,
            deadline,
        } = request;

        let span = tracing::info_span!(
            EXECUTE_SPAN_NAME,
            "graphql.operation.kind" = %operation.kind(),
            "otel.kind" = "INTERNAL"
        );

        async move {
            let cancellation = cancellation.child_token();
            let deadline = deadline.or_else(|| self.config.timeout.map(|t| Instant::now() + t));
            let watchdog = deadline.map(|deadline| {
                let cancellation = cancellation.clone();
                tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    tracing::debug!("request deadline reached");
                    cancellation.cancel();
                })
            });

            let state = Arc::new(RequestState {
                schema: self.schema.clone(),
                services,
                variables,
                loader: LoaderCache::new(),
                cancellation,
                deadline,
                resolvers: DashMap::new(),
            });
            let parameters = ExecutionParameters {
                state: &state,
                config: &self.config,
            };
            let root_path = Path::empty();
            let root_scope = Scope::default();
            let parent = Parent {
                type_name: operation.root_type(),
                value: &root_value,
                path: &root_path,
                context: None,
                scope: &root_scope,
            };
            let entries = parameters
                .resolve_selection_set(
                    operation.selection_set(),
                    parent,
                    operation.kind().is_serial(),
                )
                .await;

            if let Some(watchdog) = watchdog {
                watchdog.abort();
            }

            ResultTree {
                root: ResultObject {
                    type_name: operation.root_type().to_string(),
                    entries,
                },
            }
        }
        .instrument(span)
        .await
    }
}

/// State shared by every resolution of one request.
pub(crate) struct RequestState {
    pub(crate) schema: Arc<Schema>,
    pub(crate) services: ServiceRegistry,
    pub(crate) variables: Object,
    pub(crate) loader: LoaderCache,
    pub(crate) cancellation: CancellationToken,
    deadline: Option<Instant>,
    resolvers: DashMap<(String, String), Arc<dyn Resolver>>,
}

impl RequestState {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn resolver(&self, selection: &Selection, definition: &FieldDefinition) -> Arc<dyn Resolver> {
        match definition.resolver_binding() {
            ResolverBinding::Schema(resolver) | ResolverBinding::External(resolver) => {
                resolver.clone()
            }
            ResolverBinding::Request(factory) => self
                .resolvers
                .entry((selection.parent_type().to_string(), selection.name().to_string()))
                .or_insert_with(|| factory())
                .value()
                .clone(),
        }
    }
}

struct ExecutionParameters<'a> {
    state: &'a Arc<RequestState>,
    config: &'a ExecutionConfig,
}

/// The object whose selection set is being resolved.
#[derive(Clone, Copy)]
struct Parent<'a> {
    type_name: &'a str,
    value: &'a Value,
    path: &'a Path,
    context: Option<&'a ResolverContext>,
    scope: &'a Scope,
}

impl ExecutionParameters<'_> {
    fn concurrency_limit(&self) -> usize {
        self.config.max_concurrency.unwrap_or(usize::MAX).max(1)
    }

    fn resolve_selection_set<'b>(
        &'b self,
        selection_set: &'b [Arc<Selection>],
        parent: Parent<'b>,
        serial: bool,
    ) -> BoxFuture<'b, Vec<ResultEntry>> {
        Box::pin(async move {
            let fields: Vec<_> = selection_set
                .iter()
                .filter(|selection| !selection.include_skip.should_skip(&self.state.variables))
                .map(|selection| self.resolve_field(selection, parent))
                .collect();

            if serial {
                let mut entries = Vec::with_capacity(fields.len());
                for field in fields {
                    entries.push(field.await);
                }
                entries
            } else {
                // runs concurrently, yields in declared order
                stream::iter(fields)
                    .buffered(self.concurrency_limit())
                    .collect()
                    .await
            }
        })
    }

    fn resolve_field<'b>(
        &'b self,
        selection: &'b Arc<Selection>,
        parent: Parent<'b>,
    ) -> BoxFuture<'b, ResultEntry> {
        let path = parent.path.join(selection.response_key());
        let span = tracing::debug_span!(
            RESOLVE_FIELD_SPAN_NAME,
            "graphql.path" = %path,
            "graphql.field.name" = selection.name(),
            "graphql.field.type" = %selection.field_type(),
        );

        Box::pin(
            async move {
                let node = self.resolve_node(selection, parent, &path).await;
                ResultEntry {
                    response_key: selection.response_key().to_string(),
                    field_name: selection.name().to_string(),
                    field_type: selection.field_type().clone(),
                    locations: selection.locations(),
                    node,
                }
            }
            .instrument(span),
        )
    }

    async fn resolve_node(
        &self,
        selection: &Arc<Selection>,
        parent: Parent<'_>,
        path: &Path,
    ) -> ResultNode {
        let Some(definition) = selection.definition() else {
            // __typename
            return ResultNode::Leaf(Value::from(parent.type_name));
        };

        if self.state.is_cancelled() {
            tracing::debug!("cancelled before the resolver started");
            return ResultNode::Error(FieldError::Cancelled);
        }
        if definition.binds_parent && parent.value.is_null() {
            return ResultNode::Error(FieldError::type_mismatch(parent.type_name, "null"));
        }
        if let Some((_, service)) = definition
            .required_services
            .iter()
            .find(|(type_id, _)| !self.state.services.contains_id(*type_id))
        {
            return ResultNode::Error(FieldError::ServiceNotFound {
                service: service.to_string(),
            });
        }
        let arguments =
            match selection.coerce_arguments(&self.state.schema, &self.state.variables) {
                Ok(arguments) => arguments,
                Err(error) => return ResultNode::Error(error),
            };

        let resolver = self.state.resolver(selection, definition);
        let ctx = ResolverContext::new(
            parent.context.cloned(),
            parent.value.clone(),
            path.clone(),
            selection.clone(),
            arguments,
            parent.scope.clone(),
            self.state.clone(),
        );
        let value = match self.invoke(resolver, ctx.clone()).await {
            Ok(value) => value,
            Err(error) => return ResultNode::Error(error),
        };

        let scope = ctx.child_scope();
        self.complete_value(
            selection,
            selection.field_type(),
            value,
            path.clone(),
            &ctx,
            &scope,
        )
        .await
    }

    async fn invoke(
        &self,
        resolver: Arc<dyn Resolver>,
        ctx: ResolverContext,
    ) -> Result<Value, FieldError> {
        let result = if self.config.spawn_resolvers {
            let task = async move { resolver.resolve(ctx).await };
            match tokio::spawn(task.in_current_span()).await {
                Ok(result) => result,
                Err(error) if error.is_panic() => Err(panicked(error.into_panic())),
                Err(_) => Err(FieldError::Cancelled),
            }
        } else {
            AssertUnwindSafe(resolver.resolve(ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panicked(payload)))
        };

        if let Err(error) = &result {
            failfast_debug!(error = %error, "field resolution failed");
        }
        result
    }

    fn complete_value<'b>(
        &'b self,
        selection: &'b Arc<Selection>,
        field_type: &'b FieldType,
        value: Value,
        path: Path,
        ctx: &'b ResolverContext,
        scope: &'b Scope,
    ) -> BoxFuture<'b, ResultNode> {
        Box::pin(async move {
            match field_type {
                FieldType::NonNull(inner) => {
                    self.complete_value(selection, inner, value, path, ctx, scope)
                        .await
                }
                _ if value.is_null() => ResultNode::Leaf(Value::Null),
                FieldType::List(item_type) => match value {
                    Value::Array(items) => {
                        let items: Vec<_> = items
                            .into_iter()
                            .enumerate()
                            .map(|(index, item)| {
                                self.complete_value(selection, item_type, item, path.join(index), ctx, scope)
                            })
                            .collect();
                        ResultNode::List(
                            stream::iter(items)
                                .buffered(self.concurrency_limit())
                                .collect()
                                .await,
                        )
                    }
                    other => ResultNode::Error(FieldError::type_mismatch(
                        field_type.to_string(),
                        other.json_type_name(),
                    )),
                },
                _ => match field_type
                    .inner_type_name()
                    .filter(|name| self.state.schema.is_object_type(name))
                {
                    Some(type_name) if value.is_object() => {
                        let parent = Parent {
                            type_name,
                            value: &value,
                            path: &path,
                            context: Some(ctx),
                            scope,
                        };
                        let entries = self
                            .resolve_selection_set(selection.selection_set(), parent, false)
                            .await;
                        ResultNode::Object(ResultObject {
                            type_name: type_name.to_string(),
                            entries,
                        })
                    }
                    Some(type_name) => ResultNode::Error(FieldError::type_mismatch(
                        type_name,
                        value.json_type_name(),
                    )),
                    // leaves are checked when assembling
                    None => ResultNode::Leaf(value),
                },
            }
        })
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> FieldError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    failfast_error!(panic = %message, "resolver panicked");
    FieldError::fault(format!("resolver panicked: {message}"))
}
