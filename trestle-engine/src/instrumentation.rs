//! Instrumentation chain.
//!
//! Cross-cutting observers wrap three lifecycle extension points — resolver
//! execution, selection fetch (async and sync variants), and access-check
//! execution — without changing their return value or failure behavior.
//! Every default implementation is identity wrapping, so an instrumentation
//! only overrides the points it cares about.
//!
//! Composition nests: the first instrumentation in the chain is outermost,
//! so its "before" logic runs first and its "after" logic runs last.
//! Folding is associative, which keeps chain order well-defined no matter
//! how sub-chains are assembled.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tower::util::BoxService;

use crate::services::resolve::FieldInvocationService;
use crate::services::resolve::NodeInvocationService;
use crate::services::AccessCheckService;
use crate::services::FetchRequest;
use crate::services::FetchService;
use crate::services::NodeResolveService;
use crate::services::ResolveService;
use crate::services::SyncFetch;

/// Typed storage slots for instrumentation state.
///
/// Each instrumentation keys its slot by its own state type, so distinct
/// instrumentations never collide.
#[derive(Default)]
pub struct StateSlots {
    slots: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl StateSlots {
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.slots.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut())
    }
}

/// Opaque per-request instrumentation state.
///
/// Created once per request by the chain and threaded through every
/// lifecycle callback via the request context. Mutable only through the
/// chain's own callbacks; resolver code never sees it.
#[derive(Clone, Default)]
pub struct InstrumentationState {
    slots: Arc<parking_lot::Mutex<StateSlots>>,
}

impl InstrumentationState {
    /// Locks the slots for interaction; the lock drops when the closure
    /// returns.
    pub fn with_lock<T, F: FnOnce(&mut StateSlots) -> T>(&self, func: F) -> T {
        let mut guard = self.slots.lock();
        func(&mut guard)
    }

    /// The shared no-op state used when no instrumentation is configured.
    pub(crate) fn shared_noop() -> Self {
        static NOOP: Lazy<InstrumentationState> = Lazy::new(InstrumentationState::default);
        NOOP.clone()
    }
}

impl fmt::Debug for InstrumentationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationState").finish_non_exhaustive()
    }
}

/// A cross-cutting observer of resolver dispatch.
///
/// Implementations must be failure-transparent: a wrapped service's outcome
/// (value or error) is passed through unchanged after any after-hooks run,
/// and a wrapper never converts a success into a failure or vice versa.
/// Callbacks must be safe to invoke concurrently from multiple resolver
/// groups sharing one [`InstrumentationState`].
pub trait Instrumentation: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once per request so this instrumentation can seed its typed
    /// state slot.
    fn create_state(&self, _state: &InstrumentationState) {}

    /// Wraps field-resolver execution.
    fn resolve_service(&self, service: ResolveService) -> ResolveService {
        service
    }

    /// Wraps node-resolver execution.
    fn node_resolve_service(&self, service: NodeResolveService) -> NodeResolveService {
        service
    }

    /// Wraps an asynchronous selection fetch.
    fn fetch_service(&self, service: FetchService) -> FetchService {
        service
    }

    /// Wraps a synchronous selection fetch.
    fn sync_fetch(&self, _request: &FetchRequest, fetch: SyncFetch) -> SyncFetch {
        fetch
    }

    /// Wraps access-check execution.
    fn access_service(&self, service: AccessCheckService) -> AccessCheckService {
        service
    }
}

/// The stateless no-op instrumentation.
///
/// Injected explicitly where no instrumentation is configured; wraps
/// nothing and shares the no-op state singleton.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {}

/// An ordered chain of instrumentations composed by nesting.
#[derive(Clone, Default)]
pub struct ChainedInstrumentation {
    instrumentations: Vec<Arc<dyn Instrumentation>>,
}

impl ChainedInstrumentation {
    pub fn new(instrumentations: Vec<Arc<dyn Instrumentation>>) -> Self {
        Self { instrumentations }
    }

    pub fn is_empty(&self) -> bool {
        self.instrumentations.is_empty()
    }

    /// Creates the per-request state, giving every chain member its slot.
    ///
    /// With no members the shared no-op singleton is reused rather than
    /// allocating per request.
    pub fn create_state(&self) -> InstrumentationState {
        if self.instrumentations.is_empty() {
            return InstrumentationState::shared_noop();
        }
        let state = InstrumentationState::default();
        for instrumentation in &self.instrumentations {
            instrumentation.create_state(&state);
        }
        state
    }

    pub(crate) fn field_pipeline(&self) -> ResolveService {
        self.instrumentations
            .iter()
            .rev()
            .fold(BoxService::new(FieldInvocationService), |acc, i| {
                i.resolve_service(acc)
            })
    }

    pub(crate) fn node_pipeline(&self) -> NodeResolveService {
        self.instrumentations
            .iter()
            .rev()
            .fold(BoxService::new(NodeInvocationService), |acc, i| {
                i.node_resolve_service(acc)
            })
    }

    pub(crate) fn fetch_pipeline(&self, inner: FetchService) -> FetchService {
        self.instrumentations
            .iter()
            .rev()
            .fold(inner, |acc, i| i.fetch_service(acc))
    }

    pub(crate) fn sync_fetch_pipeline(&self, request: &FetchRequest, fetch: SyncFetch) -> SyncFetch {
        self.instrumentations
            .iter()
            .rev()
            .fold(fetch, |acc, i| i.sync_fetch(request, acc))
    }

    pub(crate) fn access_pipeline(&self, inner: AccessCheckService) -> AccessCheckService {
        self.instrumentations
            .iter()
            .rev()
            .fold(inner, |acc, i| i.access_service(acc))
    }
}

impl fmt::Debug for ChainedInstrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.instrumentations.iter().map(|i| i.name()))
            .finish()
    }
}
