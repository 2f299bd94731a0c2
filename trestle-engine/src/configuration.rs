//! Engine configuration.

use serde::Deserialize;
use serde::Serialize;

/// Configuration for the dispatch engine.
///
/// Collaborator implementations (instrumentation, fetcher, access checker)
/// are injected through the engine builder rather than named here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Request-scoped node result cache.
    pub node_cache: NodeCacheConfig,
}

/// Node cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NodeCacheConfig {
    /// Whether successful node resolutions are reused within a request.
    pub enabled: bool,
}

impl Default for NodeCacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_the_node_cache() {
        let configuration: Configuration = serde_json::from_str("{}").unwrap();
        assert!(configuration.node_cache.enabled);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Configuration, _> = serde_json::from_str(r#"{"node_cahce": {}}"#);
        assert!(result.is_err());
    }
}
