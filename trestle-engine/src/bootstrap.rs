//! Concurrent module bootstrap.
//!
//! Discovery produces the set of tenant module identifiers; every module is
//! then constructed concurrently. The whole operation is all-or-nothing: a
//! single failing module fails the bootstrap, remaining constructions are
//! aborted, and no partial registry is ever exposed.

use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;

use crate::error::BootstrapError;
use crate::registry::ResolverRegistry;
use crate::resolver::FieldResolver;
use crate::resolver::NodeResolver;

/// One tenant module's resolvers.
///
/// Construction must be idempotent and side-effect-free apart from
/// returning a fresh value.
pub trait TenantModule: Send + Sync {
    fn module_id(&self) -> &str;

    fn field_resolvers(&self) -> Vec<Arc<dyn FieldResolver>>;

    fn node_resolvers(&self) -> Vec<Arc<dyn NodeResolver>> {
        Vec::new()
    }
}

/// Discovers and constructs tenant modules.
#[async_trait]
pub trait ModuleLoader: Send + Sync + 'static {
    /// The identifiers of every tenant module to bootstrap.
    async fn discover(&self) -> Result<Vec<String>, BoxError>;

    /// Constructs one module.
    async fn load(&self, module_id: &str) -> Result<Box<dyn TenantModule>, BoxError>;
}

/// Discovers all tenant modules and builds the resolver registry.
#[tracing::instrument(skip_all)]
pub async fn bootstrap(loader: Arc<dyn ModuleLoader>) -> Result<ResolverRegistry, BootstrapError> {
    let module_ids = loader
        .discover()
        .await
        .map_err(|source| BootstrapError::DiscoveryFailed { source })?;
    tracing::info!(modules = module_ids.len(), "bootstrapping tenant modules");

    let mut handles = Vec::with_capacity(module_ids.len());
    for module_id in module_ids {
        let loader = Arc::clone(&loader);
        let id = module_id.clone();
        handles.push((
            module_id,
            tokio::spawn(async move { loader.load(&id).await }),
        ));
    }

    // Fail fast: the first failure wins and the rest are aborted.
    let mut modules = Vec::with_capacity(handles.len());
    let mut failure: Option<BootstrapError> = None;
    for (module_id, handle) in handles {
        if failure.is_some() {
            handle.abort();
            continue;
        }
        match handle.await {
            Ok(Ok(module)) => modules.push(module),
            Ok(Err(source)) => {
                failure = Some(BootstrapError::ModuleFailed {
                    module: module_id,
                    source,
                })
            }
            Err(join_error) => failure = Some(BootstrapError::JoinFailed(join_error)),
        }
    }
    if let Some(err) = failure {
        tracing::error!(error = %err, "module bootstrap failed");
        return Err(err);
    }

    let mut registry = ResolverRegistry::default();
    for module in &modules {
        tracing::debug!(module = module.module_id(), "registering module resolvers");
        for resolver in module.field_resolvers() {
            registry.register_field(resolver)?;
        }
        for resolver in module.node_resolvers() {
            registry.register_node(resolver)?;
        }
    }
    Ok(registry)
}
