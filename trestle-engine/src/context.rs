//! Provide a [`Context`] for one in-flight request.
//!
//! The context travels with every resolver invocation in the request and
//! carries a DashMap which allows additional data to be passed back and
//! forth along the dispatch pipeline, plus the handles resolvers are
//! entitled to: the schema, the global id codec, and the node reference
//! factory. It never crosses requests.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json_bytes::Value;
use tokio_util::sync::CancellationToken;
use tower::BoxError;

use crate::configuration::Configuration;
use crate::error::ResolveError;
use crate::global_id::GlobalIdCodec;
use crate::instrumentation::InstrumentationState;
use crate::services::node::NodeCache;
use crate::services::NodeReference;
use crate::spec::Schema;

/// Holds [`Context`] entries.
pub type Entries = Arc<DashMap<String, Value>>;

/// Per-request execution context.
#[derive(Clone)]
pub struct Context {
    entries: Entries,
    schema: Arc<dyn Schema>,
    codec: GlobalIdCodec,
    configuration: Arc<Configuration>,
    instrumentation_state: InstrumentationState,
    cancellation: CancellationToken,
    pub(crate) node_cache: NodeCache,
}

impl Context {
    pub(crate) fn new(
        schema: Arc<dyn Schema>,
        codec: GlobalIdCodec,
        configuration: Arc<Configuration>,
        instrumentation_state: InstrumentationState,
    ) -> Self {
        let node_cache = NodeCache::new(configuration.node_cache.enabled);
        Self {
            entries: Default::default(),
            schema,
            codec,
            configuration,
            instrumentation_state,
            cancellation: CancellationToken::new(),
            node_cache,
        }
    }

    /// Gets a custom entry.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de>,
    {
        self.entries
            .get(&key.into())
            .map(|v| serde_json_bytes::from_value(v.value().clone()))
            .transpose()
            .map_err(|e| e.into())
    }

    /// Inserts a custom entry, returning the previous value if any.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<V>, BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de> + Serialize,
    {
        match serde_json_bytes::to_value(value) {
            Ok(value) => self
                .entries
                .insert(key.into(), value)
                .map(serde_json_bytes::from_value)
                .transpose()
                .map_err(|e| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Updates an entry in place, inserting `default()` first if absent.
    pub fn upsert<K, V>(
        &self,
        key: K,
        upsert: impl Fn(V) -> V,
        default: impl Fn() -> V,
    ) -> Result<(), BoxError>
    where
        K: Into<String>,
        V: for<'de> serde::Deserialize<'de> + Serialize,
    {
        let key = key.into();
        self.entries
            .entry(key.clone())
            .or_try_insert_with(|| serde_json_bytes::to_value((default)()))?;
        let mut result = Ok(());
        self.entries
            .alter(&key, |_, v| match serde_json_bytes::from_value(v.clone()) {
                Ok(value) => match serde_json_bytes::to_value((upsert)(value)) {
                    Ok(value) => value,
                    Err(e) => {
                        result = Err(e);
                        v
                    }
                },
                Err(e) => {
                    result = Err(e);
                    v
                }
            });
        result.map_err(|e| e.into())
    }

    /// The schema handle supplied by the validation layer.
    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }

    /// The global id codec.
    pub fn codec(&self) -> &GlobalIdCodec {
        &self.codec
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The per-request instrumentation state.
    pub fn instrumentation_state(&self) -> &InstrumentationState {
        &self.instrumentation_state
    }

    /// Cancels the owning request. In-flight resolver calls are raced
    /// against this; outstanding call sites fail with
    /// [`ResolveError::RequestCancelled`].
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Builds a validated [`NodeReference`] from a serialized global id.
    ///
    /// The decoded type must exist in the schema and implement Node; when
    /// `expected_type` is given the decoded type must match it.
    pub fn create_node_reference(
        &self,
        raw: &str,
        expected_type: Option<&str>,
    ) -> Result<NodeReference, ResolveError> {
        let id = self.codec.deserialize(raw).map_err(ResolveError::from)?;
        if !self.schema.has_type(id.type_name()) {
            return Err(ResolveError::TypeNotFound {
                type_name: id.type_name().to_string(),
                id: raw.to_string(),
            });
        }
        if !self.schema.implements_node(id.type_name()) {
            return Err(ResolveError::NotANodeType {
                type_name: id.type_name().to_string(),
                id: raw.to_string(),
            });
        }
        if let Some(expected) = expected_type {
            if expected != id.type_name() {
                return Err(ResolveError::UnexpectedNodeType {
                    expected: expected.to_string(),
                    actual: id.type_name().to_string(),
                    id: raw.to_string(),
                });
            }
        }
        Ok(NodeReference::new(id, raw))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.entries.len())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
