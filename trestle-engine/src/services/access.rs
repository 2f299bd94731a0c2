//! Access-check boundary.
//!
//! A checker gates each distinct selector before it joins a batch. Denials
//! are per-selector failures; sibling selectors are unaffected.

use std::sync::Arc;
use std::task::Context as TaskContext;
use std::task::Poll;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tower::BoxError;
use tower_service::Service;

use super::AccessCheckRequest;
use super::AccessCheckResponse;
use crate::error::ResolveError;

/// Decides whether a selector may be resolved at all.
#[async_trait]
pub trait AccessChecker: Send + Sync + 'static {
    async fn check(&self, request: &AccessCheckRequest) -> Result<(), ResolveError>;
}

/// Adapts an [`AccessChecker`] to the instrumented service pipeline.
pub(crate) struct AccessCheckerService {
    checker: Arc<dyn AccessChecker>,
}

impl AccessCheckerService {
    pub(crate) fn new(checker: Arc<dyn AccessChecker>) -> Self {
        Self { checker }
    }
}

impl Service<AccessCheckRequest> for AccessCheckerService {
    type Response = AccessCheckResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AccessCheckRequest) -> Self::Future {
        let checker = Arc::clone(&self.checker);
        Box::pin(async move {
            match checker.check(&req).await {
                Ok(()) => Ok(AccessCheckResponse),
                Err(err) => Err(Box::new(err) as BoxError),
            }
        })
    }
}
