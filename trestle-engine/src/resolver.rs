//! Resolver contracts.
//!
//! These are the extension points business-logic authors implement. Both
//! variants share the batch entry-point shape: one call per selector group,
//! a result entry per selector. The engine enforces the contract rules
//! (single-selector invocation for non-batching resolvers, result-count
//! checks) before and after resolver code runs; see
//! [`services`](crate::services).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;
use tower::BoxError;

use crate::error::ResolveError;
use crate::selector::FieldSelector;
use crate::selector::NodeSelector;
use crate::selector::ObjectData;
use crate::spec::RequiredSelectionSet;
use crate::Context;

/// Where a resolver came from. Consumed only by instrumentation; has no
/// effect on execution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverFlavor {
    /// Authored by a tenant module.
    Tenant,
    /// Provided by the engine itself.
    System,
    /// Emitted by code generation.
    Generated,
}

/// Tenant-digestible descriptive data attached to a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverMetadata {
    pub name: String,
    pub flavor: ResolverFlavor,
}

impl ResolverMetadata {
    pub fn tenant(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor: ResolverFlavor::Tenant,
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flavor: ResolverFlavor::System,
        }
    }
}

/// Results of one field-resolver batch call, keyed by selector.
pub type ResolvedValues = HashMap<FieldSelector, Result<Value, ResolveError>>;

/// Results of one node-resolver batch call, keyed by selector.
pub type ResolvedNodes = HashMap<NodeSelector, Result<ObjectData, ResolveError>>;

/// A resolver for one field coordinate.
#[async_trait]
pub trait FieldResolver: Send + Sync + 'static {
    /// Stable coordinate identifying this resolver, e.g. `"User.friends"`.
    /// Unique within a registry; the batching group key.
    fn resolver_id(&self) -> &str;

    fn metadata(&self) -> &ResolverMetadata;

    /// Selections this resolver needs materialized on its parent object.
    fn object_selection_set(&self) -> Option<&RequiredSelectionSet> {
        None
    }

    /// Selections this resolver needs materialized on the query root.
    fn query_selection_set(&self) -> Option<&RequiredSelectionSet> {
        None
    }

    /// Whether this resolver accepts more than one selector per call.
    fn is_batching(&self) -> bool {
        false
    }

    /// True iff either required-selection-set slot is declared.
    fn has_required_selection_sets(&self) -> bool {
        self.object_selection_set().is_some() || self.query_selection_set().is_some()
    }

    /// Resolves a group of selectors.
    ///
    /// Must return a result entry for every selector passed in. An `Err`
    /// fails the whole group; a failed entry fails only its own selector.
    async fn batch_resolve(
        &self,
        selectors: Vec<FieldSelector>,
        ctx: &Context,
    ) -> Result<ResolvedValues, BoxError>;
}

/// A resolver for one Node-implementing type.
#[async_trait]
pub trait NodeResolver: Send + Sync + 'static {
    /// The Node type this resolver serves. Unique within a registry.
    fn type_name(&self) -> &str;

    fn metadata(&self) -> &ResolverMetadata;

    /// Whether this resolver accepts more than one selector per call.
    fn is_batching(&self) -> bool {
        false
    }

    /// Whether the output depends on the requested sub-selection.
    ///
    /// When false, results may be cached by id alone across different
    /// sub-selections; when true, the sub-selection is part of the cache
    /// key.
    fn is_selective(&self) -> bool {
        false
    }

    /// Resolves a group of node selectors. Same contract rules as
    /// [`FieldResolver::batch_resolve`].
    async fn batch_resolve(
        &self,
        selectors: Vec<NodeSelector>,
        ctx: &Context,
    ) -> Result<ResolvedNodes, BoxError>;
}
