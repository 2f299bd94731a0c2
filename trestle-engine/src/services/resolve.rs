//! Resolver invocation services.
//!
//! These are the innermost services of the instrumented pipeline: they
//! enforce the resolver contract on both sides of the call. The
//! single-selector rule for non-batching resolvers is checked before
//! resolver code runs; the result-count rule is checked after. Both
//! violations leave the service as a [`ResolveError`] boxed into the
//! service error so the coordinator can broadcast them to the whole group.

use std::task::Context as TaskContext;
use std::task::Poll;

use futures::future::BoxFuture;
use tower::BoxError;
use tower_service::Service;

use super::NodeResolveRequest;
use super::NodeResolveResponse;
use super::ResolveRequest;
use super::ResolveResponse;
use crate::error::ResolveError;

/// Invokes a field resolver's batch entry point.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FieldInvocationService;

impl Service<ResolveRequest> for FieldInvocationService {
    type Response = ResolveResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ResolveRequest) -> Self::Future {
        Box::pin(async move {
            let resolver_id = req.resolver.resolver_id().to_string();
            let submitted = req.selectors.len();

            if !req.resolver.is_batching() && submitted > 1 {
                failfast_error!(
                    "unbatched resolver {} invoked with {} selectors",
                    resolver_id,
                    submitted
                );
                return Err(Box::new(ResolveError::UnbatchedResolverViolation {
                    resolver_id,
                    selector_count: submitted,
                }) as BoxError);
            }

            let results = req
                .resolver
                .batch_resolve(req.selectors, &req.context)
                .await
                .map_err(|err| -> BoxError { Box::new(ResolveError::from_box_error(err, &resolver_id)) })?;

            if results.len() != submitted {
                failfast_error!(
                    "resolver {} returned {} results for {} selectors",
                    resolver_id,
                    results.len(),
                    submitted
                );
                return Err(Box::new(ResolveError::BatchSizeMismatch {
                    resolver_id,
                    expected: submitted,
                    actual: results.len(),
                }) as BoxError);
            }

            Ok(ResolveResponse { results })
        })
    }
}

/// Invokes a node resolver's batch entry point.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct NodeInvocationService;

impl Service<NodeResolveRequest> for NodeInvocationService {
    type Response = NodeResolveResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: NodeResolveRequest) -> Self::Future {
        Box::pin(async move {
            let resolver_id = req.resolver.type_name().to_string();
            let submitted = req.selectors.len();

            if !req.resolver.is_batching() && submitted > 1 {
                failfast_error!(
                    "unbatched node resolver {} invoked with {} selectors",
                    resolver_id,
                    submitted
                );
                return Err(Box::new(ResolveError::UnbatchedResolverViolation {
                    resolver_id,
                    selector_count: submitted,
                }) as BoxError);
            }

            let results = req
                .resolver
                .batch_resolve(req.selectors, &req.context)
                .await
                .map_err(|err| -> BoxError { Box::new(ResolveError::from_box_error(err, &resolver_id)) })?;

            if results.len() != submitted {
                failfast_error!(
                    "node resolver {} returned {} results for {} selectors",
                    resolver_id,
                    results.len(),
                    submitted
                );
                return Err(Box::new(ResolveError::BatchSizeMismatch {
                    resolver_id,
                    expected: submitted,
                    actual: results.len(),
                }) as BoxError);
            }

            Ok(NodeResolveResponse { results })
        })
    }
}
