//! Core structures used to implement resolver batching within one request.
//!
//! As the query is walked, every call site that needs a resolver registers
//! interest here as a (selector, waiter) pair. Closing the scheduling
//! window with [`BatchCoordinator::dispatch_all`] drains the accumulated
//! interest, deduplicates selectors by value equality, invokes each
//! resolver group exactly once through the instrumented pipeline, and fans
//! results back out over the waiters' oneshot channels.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use futures::future::join_all;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json_bytes::Value;
use tokio::sync::oneshot;
use tower::util::BoxService;
use tower::ServiceExt;

use crate::error::ResolveError;
use crate::instrumentation::ChainedInstrumentation;
use crate::registry::ResolverRegistry;
use crate::resolver::FieldResolver;
use crate::selector::FieldSelector;
use crate::selector::NodeSelector;
use crate::selector::ObjectData;
use crate::services::access::AccessCheckerService;
use crate::services::fetch::FetcherService;
use crate::services::AccessCheckRequest;
use crate::services::AccessChecker;
use crate::services::CheckedSelector;
use crate::services::FetchRequest;
use crate::services::FetchScope;
use crate::services::NodeResolveRequest;
use crate::services::ResolveRequest;
use crate::services::SelectionSetFetcher;
use crate::spec::RequiredSelectionSet;
use crate::Context;

/// Receives one call site's field resolution result.
pub type FieldResultReceiver = oneshot::Receiver<Result<Value, ResolveError>>;

/// Receives one call site's node resolution result.
pub type NodeResultReceiver = oneshot::Receiver<Result<ObjectData, ResolveError>>;

type FieldSender = oneshot::Sender<Result<Value, ResolveError>>;
type NodeSender = oneshot::Sender<Result<ObjectData, ResolveError>>;

#[derive(Default)]
struct PendingSelectors {
    fields: HashMap<String, Vec<(FieldSelector, FieldSender)>>,
    nodes: HashMap<String, Vec<(NodeSelector, NodeSender)>>,
}

impl PendingSelectors {
    fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.nodes.is_empty()
    }
}

/// Per-request batching coordinator.
///
/// Submission from independent subtree walkers may proceed concurrently;
/// the pending-selector set is the only shared mutable state and sits
/// behind a mutex. Dropping the coordinator drops all pending senders,
/// which surfaces to waiters as closed channels.
pub struct BatchCoordinator {
    context: Context,
    registry: Arc<ResolverRegistry>,
    instrumentation: Arc<ChainedInstrumentation>,
    fetcher: Option<Arc<dyn SelectionSetFetcher>>,
    checker: Option<Arc<dyn AccessChecker>>,
    pending: Mutex<PendingSelectors>,
}

impl BatchCoordinator {
    pub(crate) fn new(
        context: Context,
        registry: Arc<ResolverRegistry>,
        instrumentation: Arc<ChainedInstrumentation>,
        fetcher: Option<Arc<dyn SelectionSetFetcher>>,
        checker: Option<Arc<dyn AccessChecker>>,
    ) -> Self {
        Self {
            context,
            registry,
            instrumentation,
            fetcher,
            checker,
            pending: Mutex::new(PendingSelectors::default()),
        }
    }

    /// The owning request's context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Registers interest in one field resolution.
    ///
    /// Required selection sets are materialized and attached before the
    /// selector joins the pending set, so `batch_resolve` never sees a
    /// selector with unresolved prerequisites. The returned receiver
    /// resolves once a later [`dispatch_all`](Self::dispatch_all) window
    /// includes this selector.
    pub async fn submit_field(
        &self,
        resolver_id: &str,
        selector: FieldSelector,
    ) -> FieldResultReceiver {
        let (tx, rx) = oneshot::channel();
        if self.context.is_cancelled() {
            let _ = tx.send(Err(ResolveError::RequestCancelled));
            return rx;
        }
        let resolver = match self.registry.field(resolver_id) {
            Some(resolver) => resolver,
            None => {
                let _ = tx.send(Err(ResolveError::UnknownResolver {
                    resolver_id: resolver_id.to_string(),
                }));
                return rx;
            }
        };

        let selector = if resolver.has_required_selection_sets() {
            match self.attach_prerequisites(&resolver, selector).await {
                Ok(selector) => selector,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return rx;
                }
            }
        } else {
            selector
        };

        if let Err(err) = self
            .run_access_check(resolver_id, CheckedSelector::Field(selector.clone()))
            .await
        {
            let _ = tx.send(Err(err));
            return rx;
        }

        tracing::debug!(resolver = resolver_id, "registering field selector");
        self.pending
            .lock()
            .fields
            .entry(resolver_id.to_string())
            .or_default()
            .push((selector, tx));
        rx
    }

    /// Registers interest in one node resolution.
    ///
    /// Served straight from the node cache when the type's resolver allows
    /// it (`is_selective` decides whether the requested sub-selection is
    /// part of the cache key).
    pub async fn submit_node(&self, type_name: &str, selector: NodeSelector) -> NodeResultReceiver {
        let (tx, rx) = oneshot::channel();
        if self.context.is_cancelled() {
            let _ = tx.send(Err(ResolveError::RequestCancelled));
            return rx;
        }
        let resolver = match self.registry.node(type_name) {
            Some(resolver) => resolver,
            None => {
                let _ = tx.send(Err(ResolveError::UnknownResolver {
                    resolver_id: type_name.to_string(),
                }));
                return rx;
            }
        };

        if let Some(hit) = self
            .context
            .node_cache
            .get(type_name, &selector, resolver.is_selective())
        {
            tracing::debug!(type_name, "node cache hit");
            let _ = tx.send(Ok(hit));
            return rx;
        }

        if let Err(err) = self
            .run_access_check(type_name, CheckedSelector::Node(selector.clone()))
            .await
        {
            let _ = tx.send(Err(err));
            return rx;
        }

        tracing::debug!(type_name, "registering node selector");
        self.pending
            .lock()
            .nodes
            .entry(type_name.to_string())
            .or_default()
            .push((selector, tx));
        rx
    }

    /// Closes the scheduling window and resolves everything submitted so
    /// far.
    ///
    /// Groups for different resolver identities run concurrently with no
    /// ordering guarantee. Re-entrant submissions made while a group runs
    /// are picked up by a follow-up window before this call returns.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn dispatch_all(&self) {
        loop {
            let pending = {
                let mut guard = self.pending.lock();
                mem::take(&mut *guard)
            };
            if pending.is_empty() {
                break;
            }

            let mut groups: Vec<BoxFuture<'_, ()>> = Vec::new();
            for (resolver_id, waiters) in pending.fields {
                groups.push(Box::pin(self.run_field_group(resolver_id, waiters)));
            }
            for (type_name, waiters) in pending.nodes {
                groups.push(Box::pin(self.run_node_group(type_name, waiters)));
            }
            join_all(groups).await;
        }
    }

    async fn run_field_group(
        &self,
        resolver_id: String,
        waiters: Vec<(FieldSelector, FieldSender)>,
    ) {
        let Some(resolver) = self.registry.field(&resolver_id) else {
            for (_, tx) in waiters {
                let _ = tx.send(Err(ResolveError::UnknownResolver {
                    resolver_id: resolver_id.clone(),
                }));
            }
            return;
        };

        // Dedup by selector value equality. The merge is commutative: any
        // call site producing an equal selector joins the same entry, so
        // registration order cannot change the outcome.
        let mut order: Vec<FieldSelector> = Vec::new();
        let mut senders: HashMap<FieldSelector, Vec<FieldSender>> = HashMap::new();
        for (selector, tx) in waiters {
            match senders.get_mut(&selector) {
                Some(list) => list.push(tx),
                None => {
                    order.push(selector.clone());
                    senders.insert(selector, vec![tx]);
                }
            }
        }
        tracing::debug!(
            resolver = resolver_id.as_str(),
            distinct = order.len(),
            "dispatching field batch"
        );

        if resolver.is_batching() || order.len() == 1 {
            self.invoke_field_batch(&resolver, &resolver_id, order, &mut senders)
                .await;
        } else {
            // A non-batching resolver still gets every distinct selector,
            // one serialized call each.
            for selector in order {
                self.invoke_field_batch(&resolver, &resolver_id, vec![selector], &mut senders)
                    .await;
            }
        }
    }

    async fn invoke_field_batch(
        &self,
        resolver: &Arc<dyn FieldResolver>,
        resolver_id: &str,
        selectors: Vec<FieldSelector>,
        senders: &mut HashMap<FieldSelector, Vec<FieldSender>>,
    ) {
        if self.context.is_cancelled() {
            fail_selectors(&selectors, senders, ResolveError::RequestCancelled);
            return;
        }

        let request = ResolveRequest {
            resolver: Arc::clone(resolver),
            selectors: selectors.clone(),
            context: self.context.clone(),
        };
        let service = self.instrumentation.field_pipeline();
        let token = self.context.cancellation();
        let outcome = tokio::select! {
            _ = token.cancelled() => Err(ResolveError::RequestCancelled),
            result = service.oneshot(request) => {
                result.map_err(|err| ResolveError::from_box_error(err, resolver_id))
            }
        };

        match outcome {
            Ok(response) => {
                for selector in selectors {
                    let result = match response.results.get(&selector) {
                        Some(Ok(value)) => Ok(value.clone()),
                        Some(Err(err)) => Err(err.clone()),
                        None => {
                            failfast_debug!(
                                "resolver {} returned no result for a submitted selector",
                                resolver_id
                            );
                            Err(ResolveError::MissingResult {
                                resolver_id: resolver_id.to_string(),
                            })
                        }
                    };
                    if let Some(txs) = senders.remove(&selector) {
                        for tx in txs {
                            let _ = tx.send(result.clone());
                        }
                    }
                }
            }
            Err(err) => fail_selectors(&selectors, senders, err),
        }
    }

    async fn run_node_group(&self, type_name: String, waiters: Vec<(NodeSelector, NodeSender)>) {
        let Some(resolver) = self.registry.node(&type_name) else {
            for (_, tx) in waiters {
                let _ = tx.send(Err(ResolveError::UnknownResolver {
                    resolver_id: type_name.clone(),
                }));
            }
            return;
        };

        let mut order: Vec<NodeSelector> = Vec::new();
        let mut senders: HashMap<NodeSelector, Vec<NodeSender>> = HashMap::new();
        for (selector, tx) in waiters {
            match senders.get_mut(&selector) {
                Some(list) => list.push(tx),
                None => {
                    order.push(selector.clone());
                    senders.insert(selector, vec![tx]);
                }
            }
        }
        tracing::debug!(
            type_name = type_name.as_str(),
            distinct = order.len(),
            "dispatching node batch"
        );

        if resolver.is_batching() || order.len() == 1 {
            self.invoke_node_batch(&resolver, &type_name, order, &mut senders)
                .await;
        } else {
            for selector in order {
                self.invoke_node_batch(&resolver, &type_name, vec![selector], &mut senders)
                    .await;
            }
        }
    }

    async fn invoke_node_batch(
        &self,
        resolver: &Arc<dyn crate::resolver::NodeResolver>,
        type_name: &str,
        selectors: Vec<NodeSelector>,
        senders: &mut HashMap<NodeSelector, Vec<NodeSender>>,
    ) {
        if self.context.is_cancelled() {
            fail_selectors(&selectors, senders, ResolveError::RequestCancelled);
            return;
        }

        let request = NodeResolveRequest {
            resolver: Arc::clone(resolver),
            selectors: selectors.clone(),
            context: self.context.clone(),
        };
        let service = self.instrumentation.node_pipeline();
        let token = self.context.cancellation();
        let outcome = tokio::select! {
            _ = token.cancelled() => Err(ResolveError::RequestCancelled),
            result = service.oneshot(request) => {
                result.map_err(|err| ResolveError::from_box_error(err, type_name))
            }
        };

        match outcome {
            Ok(response) => {
                for selector in selectors {
                    let result = match response.results.get(&selector) {
                        Some(Ok(data)) => Ok(data.clone()),
                        Some(Err(err)) => Err(err.clone()),
                        None => {
                            failfast_debug!(
                                "node resolver {} returned no result for a submitted selector",
                                type_name
                            );
                            Err(ResolveError::MissingResult {
                                resolver_id: type_name.to_string(),
                            })
                        }
                    };
                    if let Ok(data) = &result {
                        self.context.node_cache.insert(
                            type_name,
                            &selector,
                            resolver.is_selective(),
                            data.clone(),
                        );
                    }
                    if let Some(txs) = senders.remove(&selector) {
                        for tx in txs {
                            let _ = tx.send(result.clone());
                        }
                    }
                }
            }
            Err(err) => fail_selectors(&selectors, senders, err),
        }
    }

    async fn run_access_check(
        &self,
        resolver_id: &str,
        selector: CheckedSelector,
    ) -> Result<(), ResolveError> {
        let Some(checker) = &self.checker else {
            return Ok(());
        };
        let request = AccessCheckRequest {
            resolver_id: resolver_id.to_string(),
            selector,
            context: self.context.clone(),
        };
        let service = self
            .instrumentation
            .access_pipeline(BoxService::new(AccessCheckerService::new(Arc::clone(
                checker,
            ))));
        match service.oneshot(request).await {
            Ok(_) => Ok(()),
            Err(err) => Err(ResolveError::from_box_error(err, resolver_id)),
        }
    }

    /// Materializes the resolver's declared selection sets and attaches
    /// them to the selector.
    ///
    /// Runs strictly before the selector joins the pending set; prerequisite
    /// fetching is never interleaved with the batch call itself.
    async fn attach_prerequisites(
        &self,
        resolver: &Arc<dyn FieldResolver>,
        mut selector: FieldSelector,
    ) -> Result<FieldSelector, ResolveError> {
        if let Some(required) = resolver.object_selection_set() {
            let (base, had_value) = match (&selector.object_value, &selector.object_accessor) {
                (Some(value), _) => (Arc::clone(value), true),
                (None, Some(accessor)) => (accessor(), false),
                (None, None) => (
                    Arc::new(ObjectData::new(required.type_condition.clone(), Default::default())),
                    false,
                ),
            };
            let fetched = self
                .fetch_required(resolver.resolver_id(), FetchScope::Object, base.clone(), required)
                .await?;
            let attached = if had_value {
                // Keep what the call site already materialized; the fetch
                // only fills in the declared prerequisites.
                let mut merged = (*base).clone();
                merged.merge_fields(&fetched);
                merged
            } else {
                fetched
            };
            selector = selector.with_object_value(Arc::new(attached));
        }

        if let Some(required) = resolver.query_selection_set() {
            let (base, had_value) = match (&selector.query_value, &selector.query_accessor) {
                (Some(value), _) => (Arc::clone(value), true),
                (None, Some(accessor)) => (accessor(), false),
                (None, None) => (
                    Arc::new(ObjectData::new(required.type_condition.clone(), Default::default())),
                    false,
                ),
            };
            let fetched = self
                .fetch_required(resolver.resolver_id(), FetchScope::Query, base.clone(), required)
                .await?;
            let attached = if had_value {
                let mut merged = (*base).clone();
                merged.merge_fields(&fetched);
                merged
            } else {
                fetched
            };
            selector = selector.with_query_value(Arc::new(attached));
        }

        Ok(selector)
    }

    async fn fetch_required(
        &self,
        resolver_id: &str,
        scope: FetchScope,
        object: Arc<ObjectData>,
        required: &RequiredSelectionSet,
    ) -> Result<ObjectData, ResolveError> {
        let Some(fetcher) = &self.fetcher else {
            return Err(ResolveError::FetchFailed {
                reason: format!(
                    "resolver '{resolver_id}' declares required selection sets \
                     but no selection fetcher is configured"
                ),
            });
        };
        let request = FetchRequest {
            scope,
            object,
            required: required.clone(),
            resolver_id: resolver_id.to_string(),
            context: self.context.clone(),
        };

        if let Some(sync) = fetcher.try_fetch_sync(&request) {
            let wrapped = self.instrumentation.sync_fetch_pipeline(&request, sync);
            return wrapped();
        }

        let service = self
            .instrumentation
            .fetch_pipeline(BoxService::new(FetcherService::new(Arc::clone(fetcher))));
        match service.oneshot(request).await {
            Ok(response) => Ok(response.data),
            Err(err) => Err(match err.downcast::<ResolveError>() {
                Ok(resolve_error) => *resolve_error,
                Err(other) => ResolveError::FetchFailed {
                    reason: other.to_string(),
                },
            }),
        }
    }
}

fn fail_selectors<S: std::hash::Hash + Eq, T>(
    selectors: &[S],
    senders: &mut HashMap<S, Vec<oneshot::Sender<Result<T, ResolveError>>>>,
    err: ResolveError,
) {
    for selector in selectors {
        if let Some(txs) = senders.remove(selector) {
            for tx in txs {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json_bytes::json;
    use tower::BoxError;

    use super::*;
    use crate::context::test::test_context;
    use crate::instrumentation::Instrumentation;
    use crate::selector::DeferredAccessor;
    use crate::json_ext::Object;
    use crate::resolver::FieldResolver;
    use crate::resolver::NodeResolver;
    use crate::resolver::ResolvedNodes;
    use crate::resolver::ResolvedValues;
    use crate::resolver::ResolverMetadata;
    use crate::services::ProjectionFetcher;
    use crate::services::ResolveService;
    use crate::spec::RequiredSelectionSet;
    use crate::spec::SelectionSet;

    fn obj(value: Value) -> Object {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn sel(k: &str) -> FieldSelector {
        FieldSelector::builder()
            .arguments(obj(json!({ "k": k })))
            .build()
    }

    fn coordinator(
        fields: Vec<Arc<dyn FieldResolver>>,
        nodes: Vec<Arc<dyn NodeResolver>>,
        instrumentations: Vec<Arc<dyn Instrumentation>>,
        fetcher: Option<Arc<dyn SelectionSetFetcher>>,
        checker: Option<Arc<dyn AccessChecker>>,
    ) -> BatchCoordinator {
        let mut registry = ResolverRegistry::default();
        for resolver in fields {
            registry.register_field(resolver).unwrap();
        }
        for resolver in nodes {
            registry.register_node(resolver).unwrap();
        }
        BatchCoordinator::new(
            test_context(),
            Arc::new(registry),
            Arc::new(ChainedInstrumentation::new(instrumentations)),
            fetcher,
            checker,
        )
    }

    struct EchoResolver {
        metadata: ResolverMetadata,
        batching: bool,
        calls: AtomicUsize,
        sizes: Mutex<Vec<usize>>,
    }

    impl EchoResolver {
        fn new(batching: bool) -> Arc<Self> {
            Arc::new(Self {
                metadata: ResolverMetadata::tenant("Echo"),
                batching,
                calls: AtomicUsize::new(0),
                sizes: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FieldResolver for EchoResolver {
        fn resolver_id(&self) -> &str {
            "Test.echo"
        }

        fn metadata(&self) -> &ResolverMetadata {
            &self.metadata
        }

        fn is_batching(&self) -> bool {
            self.batching
        }

        async fn batch_resolve(
            &self,
            selectors: Vec<FieldSelector>,
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes.lock().push(selectors.len());
            Ok(selectors
                .into_iter()
                .map(|selector| {
                    let value = selector.arguments.get("k").cloned().unwrap_or(Value::Null);
                    (selector, Ok(value))
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn equal_selectors_collapse_into_one_batch_call() {
        let resolver = EchoResolver::new(true);
        let coordinator = coordinator(vec![resolver.clone()], vec![], vec![], None, None);

        let parent = Arc::new(ObjectData::new("Test", obj(json!({"id": "1"}))));
        let first = {
            let parent = Arc::clone(&parent);
            FieldSelector::builder()
                .arguments(obj(json!({ "k": "a" })))
                .object_accessor(Arc::new(move || Arc::clone(&parent)) as DeferredAccessor)
                .build()
        };
        let second = {
            let parent = Arc::clone(&parent);
            FieldSelector::builder()
                .arguments(obj(json!({ "k": "a" })))
                .object_accessor(Arc::new(move || Arc::clone(&parent)) as DeferredAccessor)
                .build()
        };

        let rx1 = coordinator.submit_field("Test.echo", first).await;
        let rx2 = coordinator.submit_field("Test.echo", second).await;
        let rx3 = coordinator.submit_field("Test.echo", sel("b")).await;
        coordinator.dispatch_all().await;

        assert_eq!(resolver.calls(), 1);
        assert_eq!(*resolver.sizes.lock(), vec![2]);
        assert_eq!(rx1.await.unwrap().unwrap(), json!("a"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("a"));
        assert_eq!(rx3.await.unwrap().unwrap(), json!("b"));
    }

    #[tokio::test]
    async fn non_batching_resolvers_get_one_call_per_distinct_selector() {
        let resolver = EchoResolver::new(false);
        let coordinator = coordinator(vec![resolver.clone()], vec![], vec![], None, None);

        let rx1 = coordinator.submit_field("Test.echo", sel("a")).await;
        let rx2 = coordinator.submit_field("Test.echo", sel("b")).await;
        let rx3 = coordinator.submit_field("Test.echo", sel("a")).await;
        coordinator.dispatch_all().await;

        assert_eq!(resolver.calls(), 2);
        assert_eq!(*resolver.sizes.lock(), vec![1, 1]);
        assert_eq!(rx1.await.unwrap().unwrap(), json!("a"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("b"));
        assert_eq!(rx3.await.unwrap().unwrap(), json!("a"));
    }

    #[tokio::test]
    async fn unknown_resolvers_fail_at_submission() {
        let coordinator = coordinator(vec![], vec![], vec![], None, None);
        let rx = coordinator.submit_field("No.such", sel("a")).await;
        assert_eq!(
            rx.await.unwrap().unwrap_err(),
            ResolveError::UnknownResolver {
                resolver_id: "No.such".to_string()
            }
        );
    }

    struct FlakyResolver {
        metadata: ResolverMetadata,
    }

    #[async_trait]
    impl FieldResolver for FlakyResolver {
        fn resolver_id(&self) -> &str {
            "Test.flaky"
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
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            Ok(selectors
                .into_iter()
                .map(|selector| {
                    let result = match selector.arguments.get("k") {
                        Some(Value::String(k)) if k.as_str() == "bad" => {
                            Err(ResolveError::ResolverFailed {
                                resolver_id: "Test.flaky".to_string(),
                                reason: "backend said no".to_string(),
                            })
                        }
                        other => Ok(other.cloned().unwrap_or(Value::Null)),
                    };
                    (selector, result)
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn one_selector_failure_does_not_poison_siblings() {
        let resolver = Arc::new(FlakyResolver {
            metadata: ResolverMetadata::tenant("Flaky"),
        });
        let coordinator = coordinator(vec![resolver], vec![], vec![], None, None);

        let good = coordinator.submit_field("Test.flaky", sel("good")).await;
        let bad = coordinator.submit_field("Test.flaky", sel("bad")).await;
        coordinator.dispatch_all().await;

        assert_eq!(good.await.unwrap().unwrap(), json!("good"));
        let err = bad.await.unwrap().unwrap_err();
        assert!(matches!(err, ResolveError::ResolverFailed { .. }), "{err}");
    }

    struct DroppingResolver {
        metadata: ResolverMetadata,
    }

    #[async_trait]
    impl FieldResolver for DroppingResolver {
        fn resolver_id(&self) -> &str {
            "Test.dropper"
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
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            // Drops the last selector's entry entirely.
            let keep = selectors.len().saturating_sub(1);
            Ok(selectors
                .into_iter()
                .take(keep)
                .map(|selector| (selector, Ok(Value::Null)))
                .collect())
        }
    }

    #[tokio::test]
    async fn size_mismatch_poisons_the_whole_group() {
        let resolver = Arc::new(DroppingResolver {
            metadata: ResolverMetadata::tenant("Dropper"),
        });
        let coordinator = coordinator(vec![resolver], vec![], vec![], None, None);

        let rx1 = coordinator.submit_field("Test.dropper", sel("a")).await;
        let rx2 = coordinator.submit_field("Test.dropper", sel("b")).await;
        let rx3 = coordinator.submit_field("Test.dropper", sel("c")).await;
        coordinator.dispatch_all().await;

        for rx in [rx1, rx2, rx3] {
            let err = rx.await.unwrap().unwrap_err();
            assert_eq!(
                err,
                ResolveError::BatchSizeMismatch {
                    resolver_id: "Test.dropper".to_string(),
                    expected: 3,
                    actual: 2,
                }
            );
            let message = err.to_string();
            assert!(message.contains('3'), "{message}");
            assert!(message.contains('2'), "{message}");
        }
    }

    struct MiskeyedResolver {
        metadata: ResolverMetadata,
    }

    #[async_trait]
    impl FieldResolver for MiskeyedResolver {
        fn resolver_id(&self) -> &str {
            "Test.miskeyed"
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
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            // Right size, wrong keys: the "b" selector's entry is keyed by a
            // selector that was never submitted.
            let mut results = ResolvedValues::new();
            for selector in selectors {
                if selector.arguments.get("k") == Some(&json!("b")) {
                    results.insert(sel("bogus"), Ok(Value::Null));
                } else {
                    results.insert(selector, Ok(json!("ok")));
                }
            }
            Ok(results)
        }
    }

    #[tokio::test]
    async fn a_missing_key_fails_only_its_own_call_site() {
        let resolver = Arc::new(MiskeyedResolver {
            metadata: ResolverMetadata::tenant("Miskeyed"),
        });
        let coordinator = coordinator(vec![resolver], vec![], vec![], None, None);

        let good = coordinator.submit_field("Test.miskeyed", sel("a")).await;
        let orphaned = coordinator.submit_field("Test.miskeyed", sel("b")).await;
        coordinator.dispatch_all().await;

        assert_eq!(good.await.unwrap().unwrap(), json!("ok"));
        assert_eq!(
            orphaned.await.unwrap().unwrap_err(),
            ResolveError::MissingResult {
                resolver_id: "Test.miskeyed".to_string()
            }
        );
    }

    struct UntouchableResolver {
        metadata: ResolverMetadata,
    }

    #[async_trait]
    impl FieldResolver for UntouchableResolver {
        fn resolver_id(&self) -> &str {
            "Test.untouchable"
        }

        fn metadata(&self) -> &ResolverMetadata {
            &self.metadata
        }

        async fn batch_resolve(
            &self,
            _selectors: Vec<FieldSelector>,
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            panic!("resolver business logic must not run");
        }
    }

    #[tokio::test]
    async fn unbatched_violation_fails_before_resolver_code() {
        let service: ResolveService = ChainedInstrumentation::default().field_pipeline();
        let request = ResolveRequest {
            resolver: Arc::new(UntouchableResolver {
                metadata: ResolverMetadata::tenant("Untouchable"),
            }),
            selectors: vec![sel("a"), sel("b")],
            context: test_context(),
        };

        let err = service.oneshot(request).await.unwrap_err();
        assert_eq!(
            ResolveError::from_box_error(err, "Test.untouchable"),
            ResolveError::UnbatchedResolverViolation {
                resolver_id: "Test.untouchable".to_string(),
                selector_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn cancellation_fails_pending_and_new_submissions() {
        let resolver = EchoResolver::new(true);
        let coordinator = coordinator(vec![resolver.clone()], vec![], vec![], None, None);

        let pending = coordinator.submit_field("Test.echo", sel("a")).await;
        coordinator.context().cancel();
        let late = coordinator.submit_field("Test.echo", sel("b")).await;
        coordinator.dispatch_all().await;

        assert_eq!(
            pending.await.unwrap().unwrap_err(),
            ResolveError::RequestCancelled
        );
        assert_eq!(
            late.await.unwrap().unwrap_err(),
            ResolveError::RequestCancelled
        );
        assert_eq!(resolver.calls(), 0);
    }

    struct StuckResolver {
        metadata: ResolverMetadata,
    }

    #[async_trait]
    impl FieldResolver for StuckResolver {
        fn resolver_id(&self) -> &str {
            "Test.stuck"
        }

        fn metadata(&self) -> &ResolverMetadata {
            &self.metadata
        }

        async fn batch_resolve(
            &self,
            selectors: Vec<FieldSelector>,
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(selectors
                .into_iter()
                .map(|selector| (selector, Ok(Value::Null)))
                .collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_races_in_flight_batches() {
        let resolver = Arc::new(StuckResolver {
            metadata: ResolverMetadata::tenant("Stuck"),
        });
        let coordinator = coordinator(vec![resolver], vec![], vec![], None, None);

        let rx = coordinator.submit_field("Test.stuck", sel("a")).await;
        let context = coordinator.context().clone();
        let ((), ()) = tokio::join!(coordinator.dispatch_all(), async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            context.cancel();
        });

        assert_eq!(rx.await.unwrap().unwrap_err(), ResolveError::RequestCancelled);
    }

    struct Recording {
        label: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingService {
        label: &'static str,
        events: Arc<Mutex<Vec<String>>>,
        inner: ResolveService,
    }

    impl tower_service::Service<ResolveRequest> for RecordingService {
        type Response = crate::services::ResolveResponse;
        type Error = tower::BoxError;
        type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

        fn poll_ready(
            &mut self,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.inner.poll_ready(cx)
        }

        fn call(&mut self, req: ResolveRequest) -> Self::Future {
            self.events.lock().push(format!("{}:before", self.label));
            let events = Arc::clone(&self.events);
            let label = self.label;
            let future = self.inner.call(req);
            Box::pin(async move {
                let outcome = future.await;
                events.lock().push(format!("{label}:after"));
                outcome
            })
        }
    }

    impl Instrumentation for Recording {
        fn resolve_service(&self, service: ResolveService) -> ResolveService {
            BoxService::new(RecordingService {
                label: self.label,
                events: Arc::clone(&self.events),
                inner: service,
            })
        }
    }

    #[tokio::test]
    async fn instrumentation_nests_and_stays_transparent() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let resolver = EchoResolver::new(true);
        let coordinator = coordinator(
            vec![resolver],
            vec![],
            vec![
                Arc::new(Recording {
                    label: "outer",
                    events: Arc::clone(&events),
                }),
                Arc::new(Recording {
                    label: "inner",
                    events: Arc::clone(&events),
                }),
            ],
            None,
            None,
        );

        let rx = coordinator.submit_field("Test.echo", sel("a")).await;
        coordinator.dispatch_all().await;

        // Identity-wrapped outcome, onion ordering.
        assert_eq!(rx.await.unwrap().unwrap(), json!("a"));
        assert_eq!(
            *events.lock(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn instrumentation_passes_failures_through_unchanged() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let resolver = Arc::new(DroppingResolver {
            metadata: ResolverMetadata::tenant("Dropper"),
        });
        let coordinator = coordinator(
            vec![resolver],
            vec![],
            vec![Arc::new(Recording {
                label: "observer",
                events: Arc::clone(&events),
            })],
            None,
            None,
        );

        let rx1 = coordinator.submit_field("Test.dropper", sel("a")).await;
        let rx2 = coordinator.submit_field("Test.dropper", sel("b")).await;
        coordinator.dispatch_all().await;

        for rx in [rx1, rx2] {
            assert!(matches!(
                rx.await.unwrap().unwrap_err(),
                ResolveError::BatchSizeMismatch { expected: 2, actual: 1, .. }
            ));
        }
        assert_eq!(*events.lock(), vec!["observer:before", "observer:after"]);
    }

    struct RequiringResolver {
        metadata: ResolverMetadata,
        required: RequiredSelectionSet,
        seen: Mutex<Vec<ObjectData>>,
    }

    #[async_trait]
    impl FieldResolver for RequiringResolver {
        fn resolver_id(&self) -> &str {
            "Test.requiring"
        }

        fn metadata(&self) -> &ResolverMetadata {
            &self.metadata
        }

        fn is_batching(&self) -> bool {
            true
        }

        fn object_selection_set(&self) -> Option<&RequiredSelectionSet> {
            Some(&self.required)
        }

        async fn batch_resolve(
            &self,
            selectors: Vec<FieldSelector>,
            _ctx: &Context,
        ) -> Result<ResolvedValues, BoxError> {
            for selector in &selectors {
                let object = selector
                    .object_value
                    .as_ref()
                    .expect("prerequisites must be attached before batch_resolve");
                self.seen.lock().push((**object).clone());
            }
            Ok(selectors
                .into_iter()
                .map(|selector| (selector, Ok(Value::Null)))
                .collect())
        }
    }

    #[tokio::test]
    async fn prerequisites_are_attached_and_scoped_before_dispatch() {
        let resolver = Arc::new(RequiringResolver {
            metadata: ResolverMetadata::tenant("Requiring"),
            required: RequiredSelectionSet::new("Test", SelectionSet::fields(["id", "name"])),
            seen: Mutex::new(Vec::new()),
        });
        let coordinator = coordinator(
            vec![resolver.clone()],
            vec![],
            vec![],
            Some(Arc::new(ProjectionFetcher)),
            None,
        );

        let parent = Arc::new(ObjectData::new(
            "Test",
            obj(json!({"id": "1", "name": "ada", "secret": "s3cr3t"})),
        ));
        let make_selector = || {
            let parent = Arc::clone(&parent);
            FieldSelector::builder()
                .object_accessor(Arc::new(move || Arc::clone(&parent)) as DeferredAccessor)
                .build()
        };

        let rx1 = coordinator.submit_field("Test.requiring", make_selector()).await;
        let rx2 = coordinator.submit_field("Test.requiring", make_selector()).await;
        coordinator.dispatch_all().await;

        assert!(rx1.await.unwrap().is_ok());
        assert!(rx2.await.unwrap().is_ok());

        // Distinct accessor closures still collapsed into one batch entry.
        let seen = resolver.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0],
            ObjectData::new("Test", obj(json!({"id": "1", "name": "ada"})))
        );
    }

    struct SecretChecker;

    #[async_trait]
    impl AccessChecker for SecretChecker {
        async fn check(&self, request: &AccessCheckRequest) -> Result<(), ResolveError> {
            if let CheckedSelector::Field(selector) = &request.selector {
                if selector.arguments.get("k") == Some(&json!("secret")) {
                    return Err(ResolveError::AccessDenied {
                        resolver_id: request.resolver_id.clone(),
                        reason: "secret selectors are gated".to_string(),
                    });
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn access_denial_is_per_selector() {
        let resolver = EchoResolver::new(true);
        let coordinator = coordinator(
            vec![resolver.clone()],
            vec![],
            vec![],
            None,
            Some(Arc::new(SecretChecker)),
        );

        let open = coordinator.submit_field("Test.echo", sel("open")).await;
        let gated = coordinator.submit_field("Test.echo", sel("secret")).await;
        coordinator.dispatch_all().await;

        assert_eq!(open.await.unwrap().unwrap(), json!("open"));
        assert!(matches!(
            gated.await.unwrap().unwrap_err(),
            ResolveError::AccessDenied { .. }
        ));
        assert_eq!(*resolver.sizes.lock(), vec![1]);
    }

    struct FooNodeResolver {
        metadata: ResolverMetadata,
        selective: bool,
        calls: AtomicUsize,
    }

    impl FooNodeResolver {
        fn new(selective: bool) -> Arc<Self> {
            Arc::new(Self {
                metadata: ResolverMetadata::tenant("FooNode"),
                selective,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl NodeResolver for FooNodeResolver {
        fn type_name(&self) -> &str {
            "Foo"
        }

        fn metadata(&self) -> &ResolverMetadata {
            &self.metadata
        }

        fn is_batching(&self) -> bool {
            true
        }

        fn is_selective(&self) -> bool {
            self.selective
        }

        async fn batch_resolve(
            &self,
            selectors: Vec<NodeSelector>,
            _ctx: &Context,
        ) -> Result<ResolvedNodes, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(selectors
                .into_iter()
                .map(|selector| {
                    let data = ObjectData::new("Foo", obj(json!({"id": selector.id.as_str()})));
                    (selector, Ok(data))
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn non_selective_nodes_are_cached_by_id_alone() {
        let resolver = FooNodeResolver::new(false);
        let coordinator = coordinator(vec![], vec![resolver.clone()], vec![], None, None);

        let first = coordinator
            .submit_node("Foo", NodeSelector::new("abc", Some(SelectionSet::fields(["id"]))))
            .await;
        coordinator.dispatch_all().await;
        assert!(first.await.unwrap().is_ok());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

        // A different sub-selection for the same id is served from cache.
        let second = coordinator
            .submit_node(
                "Foo",
                NodeSelector::new("abc", Some(SelectionSet::fields(["id", "name"]))),
            )
            .await;
        coordinator.dispatch_all().await;
        assert!(second.await.unwrap().is_ok());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn selective_nodes_key_the_cache_on_selections() {
        let resolver = FooNodeResolver::new(true);
        let coordinator = coordinator(vec![], vec![resolver.clone()], vec![], None, None);

        let first = coordinator
            .submit_node("Foo", NodeSelector::new("abc", Some(SelectionSet::fields(["id"]))))
            .await;
        coordinator.dispatch_all().await;
        assert!(first.await.unwrap().is_ok());

        let second = coordinator
            .submit_node(
                "Foo",
                NodeSelector::new("abc", Some(SelectionSet::fields(["id", "name"]))),
            )
            .await;
        coordinator.dispatch_all().await;
        assert!(second.await.unwrap().is_ok());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);

        // The exact selection seen before is a hit.
        let third = coordinator
            .submit_node("Foo", NodeSelector::new("abc", Some(SelectionSet::fields(["id"]))))
            .await;
        coordinator.dispatch_all().await;
        assert!(third.await.unwrap().is_ok());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }
}
