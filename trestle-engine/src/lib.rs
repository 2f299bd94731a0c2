//! Resolver batching and dispatch engine.
//!
//! Business logic lives in independently-authored resolvers; this crate
//! collects every resolver invocation demanded by one in-flight request,
//! deduplicates and groups them by resolver identity, executes each group
//! exactly once against the resolver's batch entry point, and fans results
//! back out to the individual call sites. An instrumentation chain observes
//! every phase without altering outcomes, and a concurrent module bootstrap
//! builds the resolver registry at startup.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]

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

mod batching;
mod bootstrap;
mod configuration;
mod context;
mod engine;
mod error;
mod global_id;
mod instrumentation;
mod json_ext;
mod registry;
mod resolver;
mod selector;
pub mod services;
mod spec;

pub use batching::BatchCoordinator;
pub use batching::FieldResultReceiver;
pub use batching::NodeResultReceiver;
pub use bootstrap::bootstrap;
pub use bootstrap::ModuleLoader;
pub use bootstrap::TenantModule;
pub use configuration::Configuration;
pub use configuration::NodeCacheConfig;
pub use context::Context;
pub use context::Entries;
pub use engine::Engine;
pub use error::BootstrapError;
pub use error::GlobalIdError;
pub use error::ResolveError;
pub use global_id::GlobalId;
pub use global_id::GlobalIdCodec;
pub use instrumentation::ChainedInstrumentation;
pub use instrumentation::Instrumentation;
pub use instrumentation::InstrumentationState;
pub use instrumentation::NoopInstrumentation;
pub use instrumentation::StateSlots;
pub use json_ext::Object;
pub use registry::ResolverRegistry;
pub use resolver::FieldResolver;
pub use resolver::NodeResolver;
pub use resolver::ResolvedNodes;
pub use resolver::ResolvedValues;
pub use resolver::ResolverFlavor;
pub use resolver::ResolverMetadata;
pub use selector::DeferredAccessor;
pub use selector::FieldSelector;
pub use selector::NodeSelector;
pub use selector::ObjectData;
pub use spec::RequiredSelectionSet;
pub use spec::Schema;
pub use spec::Selection;
pub use spec::SelectionSet;
pub use spec::StaticSchema;
