//! System node lookup.
//!
//! `Query.node` and `Query.nodes` are the engine-provided entry points for
//! fetching any Node-implementing object by global id: decode the id,
//! require the decoded type to exist and implement Node, and emit a node
//! reference for the engine to resolve through the type's node resolver.
//!
//! This module also holds the request-scoped node result cache. Whether the
//! requested sub-selection participates in the cache key is the resolving
//! node resolver's choice via `is_selective`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json_bytes::json;
use serde_json_bytes::Value;
use tower::BoxError;

use crate::global_id::GlobalId;
use crate::resolver::FieldResolver;
use crate::resolver::ResolvedValues;
use crate::resolver::ResolverMetadata;
use crate::selector::FieldSelector;
use crate::selector::NodeSelector;
use crate::selector::ObjectData;
use crate::spec::SelectionSet;
use crate::Context;
use crate::ResolveError;

/// A reference to a node, produced by
/// [`Context::create_node_reference`](crate::Context::create_node_reference).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReference {
    id: GlobalId,
    raw: String,
}

impl NodeReference {
    pub(crate) fn new(id: GlobalId, raw: impl Into<String>) -> Self {
        Self {
            id,
            raw: raw.into(),
        }
    }

    pub fn id(&self) -> &GlobalId {
        &self.id
    }

    /// The serialized global id this reference was created from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The engine value form of this reference.
    pub fn to_value(&self) -> Value {
        json!({
            "__typename": self.id.type_name(),
            "id": self.raw.as_str(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NodeCacheKey {
    type_name: String,
    id: String,
    /// Present only for selective resolvers.
    selections: Option<SelectionSet>,
}

/// Request-scoped cache of successful node resolutions.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeCache {
    entries: Arc<DashMap<NodeCacheKey, ObjectData>>,
    enabled: bool,
}

impl NodeCache {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            entries: Default::default(),
            enabled,
        }
    }

    fn key(type_name: &str, selector: &NodeSelector, selective: bool) -> NodeCacheKey {
        NodeCacheKey {
            type_name: type_name.to_string(),
            id: selector.id.clone(),
            selections: if selective {
                selector.selections.clone()
            } else {
                None
            },
        }
    }

    pub(crate) fn get(
        &self,
        type_name: &str,
        selector: &NodeSelector,
        selective: bool,
    ) -> Option<ObjectData> {
        if !self.enabled {
            return None;
        }
        self.entries
            .get(&Self::key(type_name, selector, selective))
            .map(|entry| entry.value().clone())
    }

    pub(crate) fn insert(
        &self,
        type_name: &str,
        selector: &NodeSelector,
        selective: bool,
        data: ObjectData,
    ) {
        if self.enabled {
            self.entries
                .insert(Self::key(type_name, selector, selective), data);
        }
    }
}

fn id_argument(selector: &FieldSelector) -> Result<&str, ResolveError> {
    match selector.arguments.get("id") {
        Some(Value::String(id)) => Ok(id.as_str()),
        _ => Err(ResolveError::ResolverFailed {
            resolver_id: "Query.node".to_string(),
            reason: "required argument 'id' is missing or not a string".to_string(),
        }),
    }
}

/// The `Query.node(id: ID!)` resolver.
#[derive(Debug)]
pub(crate) struct NodeFieldResolver {
    metadata: ResolverMetadata,
}

impl Default for NodeFieldResolver {
    fn default() -> Self {
        Self {
            metadata: ResolverMetadata::system("NodeFieldResolver"),
        }
    }
}

#[async_trait]
impl FieldResolver for NodeFieldResolver {
    fn resolver_id(&self) -> &str {
        "Query.node"
    }

    fn metadata(&self) -> &ResolverMetadata {
        &self.metadata
    }

    fn is_batching(&self) -> bool {
        true
    }

    async fn batch_resolve(
        &self,
        selectors: Vec<FieldSelector>,
        ctx: &Context,
    ) -> Result<ResolvedValues, BoxError> {
        let mut results = ResolvedValues::with_capacity(selectors.len());
        for selector in selectors {
            let result = id_argument(&selector).and_then(|raw| {
                ctx.create_node_reference(raw, None)
                    .map(|reference| reference.to_value())
            });
            results.insert(selector, result);
        }
        Ok(results)
    }
}

/// The `Query.nodes(ids: [ID!]!)` resolver.
///
/// One bad id fails its whole selector; the error names the offending id.
#[derive(Debug)]
pub(crate) struct NodesFieldResolver {
    metadata: ResolverMetadata,
}

impl Default for NodesFieldResolver {
    fn default() -> Self {
        Self {
            metadata: ResolverMetadata::system("NodesFieldResolver"),
        }
    }
}

fn ids_argument(selector: &FieldSelector) -> Result<Vec<String>, ResolveError> {
    let values = match selector.arguments.get("ids") {
        Some(Value::Array(values)) => values,
        _ => {
            return Err(ResolveError::ResolverFailed {
                resolver_id: "Query.nodes".to_string(),
                reason: "required argument 'ids' is missing or not a list".to_string(),
            })
        }
    };
    values
        .iter()
        .map(|value| match value {
            Value::String(id) => Ok(id.as_str().to_string()),
            other => Err(ResolveError::ResolverFailed {
                resolver_id: "Query.nodes".to_string(),
                reason: format!("expected a string id, got {other:?}"),
            }),
        })
        .collect()
}

#[async_trait]
impl FieldResolver for NodesFieldResolver {
    fn resolver_id(&self) -> &str {
        "Query.nodes"
    }

    fn metadata(&self) -> &ResolverMetadata {
        &self.metadata
    }

    fn is_batching(&self) -> bool {
        true
    }

    async fn batch_resolve(
        &self,
        selectors: Vec<FieldSelector>,
        ctx: &Context,
    ) -> Result<ResolvedValues, BoxError> {
        let mut results = ResolvedValues::with_capacity(selectors.len());
        for selector in selectors {
            let result = ids_argument(&selector).and_then(|ids| {
                ids.iter()
                    .map(|raw| {
                        ctx.create_node_reference(raw, None)
                            .map(|reference| reference.to_value())
                    })
                    .collect::<Result<Vec<Value>, ResolveError>>()
                    .map(Value::Array)
            });
            results.insert(selector, result);
        }
        Ok(results)
    }
}
