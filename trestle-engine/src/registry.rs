//! Resolver registry.
//!
//! Built once by bootstrap, then read-only and shared across all concurrent
//! requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::BootstrapError;
use crate::resolver::FieldResolver;
use crate::resolver::NodeResolver;

/// All resolvers known to the engine, keyed by coordinate.
#[derive(Default)]
pub struct ResolverRegistry {
    fields: HashMap<String, Arc<dyn FieldResolver>>,
    nodes: HashMap<String, Arc<dyn NodeResolver>>,
}

impl ResolverRegistry {
    /// Registers a field resolver under its own coordinate.
    pub fn register_field(&mut self, resolver: Arc<dyn FieldResolver>) -> Result<(), BootstrapError> {
        let id = resolver.resolver_id().to_string();
        if self.fields.insert(id.clone(), resolver).is_some() {
            return Err(BootstrapError::DuplicateResolver { resolver_id: id });
        }
        Ok(())
    }

    /// Registers a node resolver under its type name.
    pub fn register_node(&mut self, resolver: Arc<dyn NodeResolver>) -> Result<(), BootstrapError> {
        let id = resolver.type_name().to_string();
        if self.nodes.insert(id.clone(), resolver).is_some() {
            return Err(BootstrapError::DuplicateResolver { resolver_id: id });
        }
        Ok(())
    }

    /// Registers a field resolver unless its coordinate is already taken.
    ///
    /// Used for engine-provided resolvers, which tenant modules may
    /// override.
    pub(crate) fn register_field_if_absent(&mut self, resolver: Arc<dyn FieldResolver>) {
        let id = resolver.resolver_id().to_string();
        self.fields.entry(id).or_insert(resolver);
    }

    pub fn field(&self, resolver_id: &str) -> Option<Arc<dyn FieldResolver>> {
        self.fields.get(resolver_id).map(Arc::clone)
    }

    pub fn node(&self, type_name: &str) -> Option<Arc<dyn NodeResolver>> {
        self.nodes.get(type_name).map(Arc::clone)
    }

    pub fn has_field(&self, resolver_id: &str) -> bool {
        self.fields.contains_key(resolver_id)
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.nodes.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}
