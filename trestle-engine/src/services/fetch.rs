//! Selection fetch boundary.
//!
//! Materializing a resolver's required selection set is the engine's own
//! recursive field resolution in the full system; here it is an external
//! collaborator behind [`SelectionSetFetcher`]. The coordinator always
//! prefers the synchronous fast path when the fetcher offers one, and both
//! paths run under the instrumentation chain.

use std::sync::Arc;
use std::task::Context as TaskContext;
use std::task::Poll;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tower::BoxError;
use tower_service::Service;

use super::FetchRequest;
use super::FetchResponse;
use super::SyncFetch;
use crate::error::ResolveError;
use crate::json_ext::Object;
use crate::selector::ObjectData;

/// Materializes required selection sets against a parent or query object.
#[async_trait]
pub trait SelectionSetFetcher: Send + Sync + 'static {
    /// Fetches the requested selections.
    async fn fetch(&self, request: &FetchRequest) -> Result<ObjectData, ResolveError>;

    /// A synchronous fast path, if this fetcher can serve `request` without
    /// suspending. The returned closure performs the fetch when invoked.
    fn try_fetch_sync(&self, _request: &FetchRequest) -> Option<SyncFetch> {
        None
    }
}

/// Adapts a [`SelectionSetFetcher`] to the instrumented service pipeline.
pub(crate) struct FetcherService {
    fetcher: Arc<dyn SelectionSetFetcher>,
}

impl FetcherService {
    pub(crate) fn new(fetcher: Arc<dyn SelectionSetFetcher>) -> Self {
        Self { fetcher }
    }
}

impl Service<FetchRequest> for FetcherService {
    type Response = FetchResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: FetchRequest) -> Self::Future {
        let fetcher = Arc::clone(&self.fetcher);
        Box::pin(async move {
            match fetcher.fetch(&req).await {
                Ok(data) => Ok(FetchResponse { data }),
                Err(err) => Err(Box::new(err) as BoxError),
            }
        })
    }
}

/// A fetcher that projects the declared fields out of data the caller has
/// already materialized.
///
/// Enough for embedders whose parent objects always arrive fully resolved;
/// it never suspends, so it always offers the synchronous path.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProjectionFetcher;

fn project(request: &FetchRequest) -> ObjectData {
    let mut fields = Object::new();
    for name in request.required.selection_set.field_names() {
        if let Some(value) = request.object.field(name) {
            fields.insert(name.to_string(), value.clone());
        }
    }
    ObjectData::new(request.required.type_condition.clone(), fields)
}

#[async_trait]
impl SelectionSetFetcher for ProjectionFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<ObjectData, ResolveError> {
        Ok(project(request))
    }

    fn try_fetch_sync(&self, request: &FetchRequest) -> Option<SyncFetch> {
        let projected = project(request);
        Some(Box::new(move || Ok(projected)))
    }
}
