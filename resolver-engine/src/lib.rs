//! A field-resolver execution engine for GraphQL selection trees.
//!
//! Given a [`Schema`] binding object type fields to resolvers and an
//! [`Operation`] whose selections were validated against that schema, the
//! [`Executor`] walks the selection tree, invokes resolvers (siblings
//! concurrently, children once their parent value is known) and assembles a
//! [`graphql::Response`] holding partial data and path-qualified errors.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod json_ext;

mod configuration;
pub mod context;
pub mod error;
pub mod execution;
pub mod graphql;
mod loader;
pub mod resolver;
mod service_registry;
pub mod spec;

pub use configuration::Configuration;
pub use configuration::ConfigurationError;
pub use configuration::ExecutionConfig;
pub use context::ResolverContext;
pub use context::Scope;
pub use error::FieldError;
pub use execution::ExecutionRequest;
pub use execution::Executor;
pub use loader::LoaderCache;
pub use resolver::Resolver;
pub use resolver::ResolverBinding;
pub use service_registry::ServiceRegistry;
pub use spec::Operation;
pub use spec::OperationKind;
pub use spec::Schema;
pub use spec::SpecError;
pub use tokio_util::sync::CancellationToken;
