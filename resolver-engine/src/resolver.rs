//! Resolver functions and how they are owned.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ResolverContext;
use crate::error::FieldError;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// Produces the value of one field.
///
/// Implementations may suspend (e.g. to fetch data); the engine polls them
/// without blocking other resolutions.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    async fn resolve(&self, ctx: ResolverContext) -> Result<Value, FieldError>;
}

#[async_trait]
impl<R> Resolver for Arc<R>
where
    R: Resolver + ?Sized,
{
    async fn resolve(&self, ctx: ResolverContext) -> Result<Value, FieldError> {
        self.as_ref().resolve(ctx).await
    }
}

/// See [`resolver_fn`].
pub struct FnResolver<F>(F);

/// Build a resolver from an async closure.
///
/// ```ignore
/// let hello = resolver_fn(|ctx| async move {
///     let name: String = ctx.argument("name")?;
///     Ok(Value::from(format!("hello {name}")))
/// });
/// ```
pub fn resolver_fn<F, Fut>(f: F) -> FnResolver<F>
where
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    FnResolver(f)
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    async fn resolve(&self, ctx: ResolverContext) -> Result<Value, FieldError> {
        (self.0)(ctx).await
    }
}

/// See [`sync_resolver`].
pub struct SyncResolver<F>(F);

/// Build a resolver from a closure that never suspends.
pub fn sync_resolver<F>(f: F) -> SyncResolver<F>
where
    F: Fn(&ResolverContext) -> Result<Value, FieldError> + Send + Sync + 'static,
{
    SyncResolver(f)
}

#[async_trait]
impl<F> Resolver for SyncResolver<F>
where
    F: Fn(&ResolverContext) -> Result<Value, FieldError> + Send + Sync + 'static,
{
    async fn resolve(&self, ctx: ResolverContext) -> Result<Value, FieldError> {
        (self.0)(&ctx)
    }
}

/// Reads a key of the parent object.
///
/// Bound to every field that does not declare its own resolver.
#[derive(Debug, Clone)]
pub struct PropertyResolver {
    key: String,
}

impl PropertyResolver {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl Resolver for PropertyResolver {
    async fn resolve(&self, ctx: ResolverContext) -> Result<Value, FieldError> {
        match ctx.parent_value() {
            Value::Object(object) => Ok(object.get(self.key.as_str()).cloned().unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(FieldError::type_mismatch("object", other.json_type_name())),
        }
    }
}

/// Who owns a field's resolver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverLifetime {
    /// One instance for the lifetime of the schema.
    Schema,
    /// A fresh instance for each request, shared by that request's invocations.
    Request,
    /// An instance whose lifetime is managed by the caller.
    External,
}

/// Factory producing per-request resolver instances.
pub type ResolverFactory = Arc<dyn Fn() -> Arc<dyn Resolver> + Send + Sync>;

/// The resolver bound to a field, with its ownership declaration.
#[derive(Clone)]
pub enum ResolverBinding {
    Schema(Arc<dyn Resolver>),
    Request(ResolverFactory),
    External(Arc<dyn Resolver>),
}

impl ResolverBinding {
    pub fn lifetime(&self) -> ResolverLifetime {
        match self {
            ResolverBinding::Schema(_) => ResolverLifetime::Schema,
            ResolverBinding::Request(_) => ResolverLifetime::Request,
            ResolverBinding::External(_) => ResolverLifetime::External,
        }
    }
}

impl fmt::Debug for ResolverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolverBinding")
            .field(&self.lifetime())
            .finish()
    }
}
