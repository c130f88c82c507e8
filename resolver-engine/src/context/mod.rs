//! Per-field execution handle passed to resolvers.

mod scope;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
pub use scope::Scope;
use serde::Serialize;
use serde::de::DeserializeOwned;
use static_assertions::assert_impl_all;
use tokio_util::sync::CancellationToken;

use crate::error::FieldError;
use crate::execution::RequestState;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::spec::FieldDefinition;
use crate::spec::FieldType;
use crate::spec::Schema;
use crate::spec::Selection;

/// The single point of contact between a resolver and the engine.
///
/// One context is created per field resolution. It is cheap to clone and
/// links to the context of the resolver that produced its parent value, so
/// ancestors can be walked on demand.
#[derive(Clone)]
pub struct ResolverContext {
    inner: Arc<Inner>,
}

assert_impl_all!(ResolverContext: Send, Sync);

struct Inner {
    parent: Option<ResolverContext>,
    parent_value: Value,
    path: Path,
    selection: Arc<Selection>,
    arguments: Object,
    scope: Scope,
    local: Mutex<HashMap<String, Value>>,
    request: Arc<RequestState>,
}

impl ResolverContext {
    pub(crate) fn new(
        parent: Option<ResolverContext>,
        parent_value: Value,
        path: Path,
        selection: Arc<Selection>,
        arguments: Object,
        scope: Scope,
        request: Arc<RequestState>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                parent,
                parent_value,
                path,
                selection,
                arguments,
                scope,
                local: Mutex::new(HashMap::new()),
                request,
            }),
        }
    }

    /// The value of the object this field is selected on.
    pub fn parent_value(&self) -> &Value {
        &self.inner.parent_value
    }

    /// View the parent value as `T`.
    pub fn parent<T: DeserializeOwned>(&self) -> Result<T, FieldError> {
        serde_json_bytes::from_value(self.inner.parent_value.clone()).map_err(|_| {
            FieldError::type_mismatch(
                std::any::type_name::<T>(),
                self.inner.parent_value.json_type_name(),
            )
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn field_name(&self) -> &str {
        self.inner.selection.name()
    }

    pub fn response_key(&self) -> &str {
        self.inner.selection.response_key()
    }

    pub fn field_type(&self) -> &FieldType {
        self.inner.selection.field_type()
    }

    pub fn parent_type(&self) -> &str {
        self.inner.selection.parent_type()
    }

    pub fn selection(&self) -> &Arc<Selection> {
        &self.inner.selection
    }

    pub fn field_definition(&self) -> Option<&Arc<FieldDefinition>> {
        self.inner.selection.definition()
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.request.schema
    }

    /// Coerced arguments, in declaration order.
    pub fn arguments(&self) -> &Object {
        &self.inner.arguments
    }

    /// Get an argument as `T`.
    ///
    /// Fails with [`FieldError::ArgumentMissing`] if the argument has no
    /// value and [`FieldError::ArgumentTypeMismatch`] if the value cannot
    /// be viewed as `T`.
    pub fn argument<T: DeserializeOwned>(&self, name: &str) -> Result<T, FieldError> {
        self.argument_opt(name)?
            .ok_or_else(|| FieldError::ArgumentMissing {
                name: name.to_string(),
            })
    }

    /// Get an optional argument as `T`; `None` when absent or null.
    pub fn argument_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, FieldError> {
        match self.inner.arguments.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json_bytes::from_value(value.clone())
                .map(Some)
                .map_err(|error| FieldError::ArgumentTypeMismatch {
                    name: name.to_string(),
                    reason: error.to_string(),
                }),
        }
    }

    /// Get a shared service from the registry.
    pub fn service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, FieldError> {
        self.inner
            .request
            .services
            .get::<T>()
            .ok_or_else(|| FieldError::ServiceNotFound {
                service: std::any::type_name::<T>().to_string(),
            })
    }

    /// Write a scoped value, visible to this field's descendants.
    pub fn insert_scoped(&self, key: impl Into<String>, value: impl Serialize) -> Result<(), FieldError> {
        let value = serde_json_bytes::to_value(value)?;
        self.inner.local.lock().insert(key.into(), value);
        Ok(())
    }

    /// Read a scoped value written by this resolver or one of its ancestors.
    pub fn scoped<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, FieldError> {
        let local = self.inner.local.lock().get(key).cloned();
        match local.or_else(|| self.inner.scope.get(key).cloned()) {
            Some(value) => Ok(Some(serde_json_bytes::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// The scope inherited from ancestors.
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    /// The context of the resolver that produced the parent value.
    pub fn parent_context(&self) -> Option<&ResolverContext> {
        self.inner.parent.as_ref()
    }

    /// Parent values from the closest to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &Value> {
        std::iter::successors(Some(self), |ctx| ctx.parent_context()).map(|ctx| ctx.parent_value())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.request.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.request.is_cancelled()
    }

    /// Variables of the request.
    pub fn variables(&self) -> &Object {
        &self.inner.request.variables
    }

    /// Load a value through the request's loader cache.
    ///
    /// Concurrent loads of the same key share one invocation of `loader`,
    /// and completed results are reused for the rest of the request.
    pub async fn load<F, Fut>(&self, key: impl Into<String>, loader: F) -> Result<Value, FieldError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FieldError>>,
    {
        self.inner.request.loader.load(key, loader).await
    }

    pub(crate) fn child_scope(&self) -> Scope {
        self.inner.scope.fork(self.inner.local.lock().clone())
    }
}

impl fmt::Debug for ResolverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverContext")
            .field("path", &self.inner.path)
            .field("parent_type", &self.parent_type())
            .field("field_name", &self.field_name())
            .field("arguments", &self.inner.arguments)
            .finish()
    }
}
