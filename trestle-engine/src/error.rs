//! Error types for resolver dispatch.
//!
//! Failures are attached at the smallest granularity that correlation
//! allows: a single selector wherever possible, the whole resolver group
//! where it is not (see [`ResolveError::BatchSizeMismatch`]).

use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use tower::BoxError;

/// Error types for selector resolution.
///
/// These are cheap to clone because group-fatal variants are broadcast to
/// every call site waiting on the poisoned group.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[ignore_extra_doc_attributes]
pub enum ResolveError {
    /// No resolver registered for id '{resolver_id}'.
    UnknownResolver {
        /// The resolver id that was requested.
        resolver_id: String,
    },

    /// Resolver '{resolver_id}' does not batch but was invoked with {selector_count} selectors.
    ///
    /// An unbatched resolver has no defined semantics for multiple inputs in
    /// one call, so this is a programming error and resolver code never runs.
    UnbatchedResolverViolation {
        /// The offending resolver.
        resolver_id: String,

        /// How many selectors were handed to it.
        selector_count: usize,
    },

    /// Resolver '{resolver_id}' returned {actual} results for {expected} selectors.
    ///
    /// Partial correlation cannot be safely inferred, so every selector in
    /// the batch is failed with this error.
    BatchSizeMismatch {
        /// The offending resolver.
        resolver_id: String,

        /// The number of selectors submitted.
        expected: usize,

        /// The number of result entries returned.
        actual: usize,
    },

    /// Resolver '{resolver_id}' returned no result for a submitted selector.
    MissingResult {
        /// The resolver that dropped the selector.
        resolver_id: String,
    },

    /// Resolver '{resolver_id}' failed: {reason}
    ResolverFailed {
        /// The resolver that failed.
        resolver_id: String,

        /// The failure reason.
        reason: String,
    },

    /// Fetching a required selection set failed: {reason}
    FetchFailed {
        /// The failure reason.
        reason: String,
    },

    /// Access check denied resolver '{resolver_id}': {reason}
    AccessDenied {
        /// The resolver the check gated.
        resolver_id: String,

        /// The denial reason.
        reason: String,
    },

    /// The owning request was cancelled.
    RequestCancelled,

    /// Global id '{id}' names type '{type_name}' which is not in the schema.
    TypeNotFound {
        /// The decoded type name.
        type_name: String,

        /// The offending serialized global id.
        id: String,
    },

    /// Global id '{id}' names type '{type_name}' which does not implement Node.
    NotANodeType {
        /// The decoded type name.
        type_name: String,

        /// The offending serialized global id.
        id: String,
    },

    /// Global id '{id}' names type '{actual}' where '{expected}' was required.
    UnexpectedNodeType {
        /// The type the call site required.
        expected: String,

        /// The type the id actually names.
        actual: String,

        /// The offending serialized global id.
        id: String,
    },

    /// Invalid global id: {reason}
    ///
    /// Carried in clonable form where the structured [`GlobalIdError`] has
    /// already been rendered.
    MalformedGlobalId {
        /// The rendered codec error.
        reason: String,
    },
}

impl ResolveError {
    /// Recover a `ResolveError` that crossed a service boundary as a
    /// [`BoxError`].
    ///
    /// Anything else becomes [`ResolveError::ResolverFailed`] with the
    /// rendered source as its reason.
    pub(crate) fn from_box_error(err: BoxError, resolver_id: &str) -> Self {
        match err.downcast::<ResolveError>() {
            Ok(resolve_error) => *resolve_error,
            Err(other) => ResolveError::ResolverFailed {
                resolver_id: resolver_id.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Error in the global identifier codec.
#[derive(Error, Debug)]
pub enum GlobalIdError {
    /// Invalid global id '{raw}' (decoded content: '{decoded}').
    #[error("invalid global id '{raw}' (decoded content: '{decoded}'): {source}")]
    InvalidGlobalId {
        /// The raw serialized input.
        raw: String,

        /// Whatever content was recovered before the failure.
        decoded: String,

        /// The underlying decode failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl GlobalIdError {
    /// The serialized input that failed to decode.
    pub fn raw(&self) -> &str {
        match self {
            GlobalIdError::InvalidGlobalId { raw, .. } => raw,
        }
    }
}

impl From<GlobalIdError> for ResolveError {
    fn from(err: GlobalIdError) -> Self {
        ResolveError::MalformedGlobalId {
            reason: err.to_string(),
        }
    }
}

/// Error types for module bootstrap.
#[derive(Error, Display, Debug)]
pub enum BootstrapError {
    /// Module discovery failed: {source}
    DiscoveryFailed {
        /// The underlying failure.
        #[source]
        source: BoxError,
    },

    /// Module '{module}' failed to load: {source}
    ModuleFailed {
        /// The module that failed.
        module: String,

        /// The underlying failure.
        #[source]
        source: BoxError,
    },

    /// Module bootstrap task panicked: {0}
    JoinFailed(#[from] JoinError),

    /// Resolver id '{resolver_id}' is registered by more than one module.
    DuplicateResolver {
        /// The clashing resolver id.
        resolver_id: String,
    },
}
