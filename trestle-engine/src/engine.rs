//! Engine assembly.
//!
//! An [`Engine`] is built once after bootstrap and shared across all
//! concurrent requests; everything per-request hangs off the
//! [`BatchCoordinator`] it hands out.

use std::sync::Arc;

use crate::batching::BatchCoordinator;
use crate::configuration::Configuration;
use crate::context::Context;
use crate::global_id::GlobalIdCodec;
use crate::instrumentation::ChainedInstrumentation;
use crate::instrumentation::Instrumentation;
use crate::registry::ResolverRegistry;
use crate::services::node::NodeFieldResolver;
use crate::services::node::NodesFieldResolver;
use crate::services::AccessChecker;
use crate::services::SelectionSetFetcher;
use crate::spec::Schema;

/// The resolver dispatch engine.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ResolverRegistry>,
    instrumentation: Arc<ChainedInstrumentation>,
    fetcher: Option<Arc<dyn SelectionSetFetcher>>,
    checker: Option<Arc<dyn AccessChecker>>,
    schema: Arc<dyn Schema>,
    codec: GlobalIdCodec,
    configuration: Arc<Configuration>,
}

#[buildstructor::buildstructor]
impl Engine {
    /// Builds an engine.
    ///
    /// Builder methods:
    ///
    /// * `.registry(ResolverRegistry)` — required; usually the output of
    ///   [`bootstrap()`](crate::bootstrap()).
    /// * `.schema(Arc<dyn Schema>)` — required.
    /// * `.instrumentation(Arc<dyn Instrumentation>)` — optional, may be
    ///   called multiple times; chain order is call order, first outermost.
    /// * `.fetcher(Arc<dyn SelectionSetFetcher>)` — optional; required at
    ///   runtime only by resolvers declaring required selection sets.
    /// * `.access_checker(Arc<dyn AccessChecker>)` — optional.
    /// * `.configuration(Configuration)` — optional.
    #[builder(visibility = "pub")]
    fn new(
        registry: ResolverRegistry,
        schema: Arc<dyn Schema>,
        instrumentations: Vec<Arc<dyn Instrumentation>>,
        fetcher: Option<Arc<dyn SelectionSetFetcher>>,
        access_checker: Option<Arc<dyn AccessChecker>>,
        configuration: Option<Configuration>,
    ) -> Self {
        let mut registry = registry;
        registry.register_field_if_absent(Arc::new(NodeFieldResolver::default()));
        registry.register_field_if_absent(Arc::new(NodesFieldResolver::default()));

        Self {
            registry: Arc::new(registry),
            instrumentation: Arc::new(ChainedInstrumentation::new(instrumentations)),
            fetcher,
            checker: access_checker,
            schema,
            codec: GlobalIdCodec,
            configuration: Arc::new(configuration.unwrap_or_default()),
        }
    }
}

impl Engine {
    /// Starts a new request, returning its batching coordinator.
    ///
    /// The instrumentation chain creates the request's state here, once.
    pub fn new_request(&self) -> BatchCoordinator {
        let state = self.instrumentation.create_state();
        let context = Context::new(
            Arc::clone(&self.schema),
            self.codec.clone(),
            Arc::clone(&self.configuration),
            state,
        );
        BatchCoordinator::new(
            context,
            Arc::clone(&self.registry),
            Arc::clone(&self.instrumentation),
            self.fetcher.clone(),
            self.checker.clone(),
        )
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}
