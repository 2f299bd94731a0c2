//! Typed request/response pairs for the instrumented execution pipeline.
//!
//! Each extension point the instrumentation chain can wrap has a concrete
//! request and response type and a boxed service alias, mirroring the
//! stage-per-service layering of the rest of the stack. The inner services
//! (resolver invocation, selection fetch, access check) enforce the
//! resolver contract, so instrumentation wrapped around them observes
//! contract violations as well as resolver outcomes.

pub(crate) mod access;
pub(crate) mod fetch;
pub(crate) mod node;
pub(crate) mod resolve;

use std::fmt;
use std::sync::Arc;

use tower::util::BoxService;
use tower::BoxError;

pub use access::AccessChecker;
pub use fetch::ProjectionFetcher;
pub use fetch::SelectionSetFetcher;
pub use node::NodeReference;

use crate::error::ResolveError;
use crate::resolver::FieldResolver;
use crate::resolver::NodeResolver;
use crate::resolver::ResolvedNodes;
use crate::resolver::ResolvedValues;
use crate::selector::FieldSelector;
use crate::selector::NodeSelector;
use crate::selector::ObjectData;
use crate::spec::RequiredSelectionSet;
use crate::Context;

/// Request for one field-resolver batch invocation.
pub struct ResolveRequest {
    pub resolver: Arc<dyn FieldResolver>,
    pub selectors: Vec<FieldSelector>,
    pub context: Context,
}

impl fmt::Debug for ResolveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveRequest")
            .field("resolver", &self.resolver.resolver_id())
            .field("selectors", &self.selectors.len())
            .finish()
    }
}

/// Response of one field-resolver batch invocation.
#[derive(Debug)]
pub struct ResolveResponse {
    pub results: ResolvedValues,
}

/// Request for one node-resolver batch invocation.
pub struct NodeResolveRequest {
    pub resolver: Arc<dyn NodeResolver>,
    pub selectors: Vec<NodeSelector>,
    pub context: Context,
}

impl fmt::Debug for NodeResolveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeResolveRequest")
            .field("resolver", &self.resolver.type_name())
            .field("selectors", &self.selectors.len())
            .finish()
    }
}

/// Response of one node-resolver batch invocation.
#[derive(Debug)]
pub struct NodeResolveResponse {
    pub results: ResolvedNodes,
}

/// Which object a required selection set applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchScope {
    /// The resolver's parent object.
    Object,
    /// The request's query root.
    Query,
}

/// Request to materialize a resolver's required selection set.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub scope: FetchScope,
    /// The object the selections are fetched against, as far as it is
    /// already materialized.
    pub object: Arc<ObjectData>,
    pub required: RequiredSelectionSet,
    /// The resolver declaring the prerequisite, for diagnostics.
    pub resolver_id: String,
    pub context: Context,
}

/// Response carrying the materialized prerequisite data.
#[derive(Debug)]
pub struct FetchResponse {
    pub data: ObjectData,
}

/// The selector an access check applies to.
#[derive(Debug, Clone)]
pub enum CheckedSelector {
    Field(FieldSelector),
    Node(NodeSelector),
}

/// Request for one access-check execution.
#[derive(Debug, Clone)]
pub struct AccessCheckRequest {
    pub resolver_id: String,
    pub selector: CheckedSelector,
    pub context: Context,
}

/// Response of a passing access check.
#[derive(Debug)]
pub struct AccessCheckResponse;

pub type ResolveService = BoxService<ResolveRequest, ResolveResponse, BoxError>;
pub type NodeResolveService = BoxService<NodeResolveRequest, NodeResolveResponse, BoxError>;
pub type FetchService = BoxService<FetchRequest, FetchResponse, BoxError>;
pub type AccessCheckService = BoxService<AccessCheckRequest, AccessCheckResponse, BoxError>;

/// A synchronous prerequisite fetch, ready to run.
pub type SyncFetch = Box<dyn FnOnce() -> Result<ObjectData, ResolveError> + Send>;
