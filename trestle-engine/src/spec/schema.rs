//! Schema boundary.
//!
//! Schema definition, parsing and validation live in an external layer.
//! The engine only needs to ask whether a decoded type exists and whether
//! it implements the Node capability, so that is the whole contract.

use std::collections::HashSet;

/// Read-only schema handle shared across all requests.
pub trait Schema: Send + Sync + 'static {
    /// Whether `type_name` is defined in the schema.
    fn has_type(&self, type_name: &str) -> bool;

    /// Whether `type_name` implements the Node capability.
    fn implements_node(&self, type_name: &str) -> bool;

    /// Whether a node resolver may be registered for `type_name`.
    fn is_node_resolvable(&self, type_name: &str) -> bool {
        self.implements_node(type_name)
    }
}

/// A fixed in-memory schema handle.
///
/// Enough for tests and for embedders whose schema layer already produced a
/// flat list of types.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    types: HashSet<String>,
    node_types: HashSet<String>,
}

impl StaticSchema {
    pub fn new<I, S>(types: I, node_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let node_types: HashSet<String> = node_types.into_iter().map(Into::into).collect();
        let mut types: HashSet<String> = types.into_iter().map(Into::into).collect();
        types.extend(node_types.iter().cloned());
        Self { types, node_types }
    }
}

impl Schema for StaticSchema {
    fn has_type(&self, type_name: &str) -> bool {
        self.types.contains(type_name)
    }

    fn implements_node(&self, type_name: &str) -> bool {
        self.node_types.contains(type_name)
    }
}
