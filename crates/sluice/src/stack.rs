//! Overlay assembly.
//!
//! The composed per-item stack is, outermost to innermost:
//!
//! ```text
//!   retry -> circuit breaker -> rate limiter -> timeout -> operation
//! ```
//!
//! This ordering is part of the engine's contract. Reordering changes
//! semantics: with the rate limiter inside the retry, every attempt pays
//! one token; outside it, a whole retry chain would pay once and retries
//! would bypass the bucket. The adaptive gate is not a layer here; it is
//! applied by the dispatcher at admission time.

use crate::config::ExecutionConfig;
use crate::item::WorkItem;
use futures::future::BoxFuture;
use sluice_circuitbreaker::BreakerLayer;
use sluice_core::context::WorkContext;
use sluice_core::error::{BoxError, ItemError};
use sluice_ratelimiter::RateLimiterLayer;
use sluice_timelimiter::TimeoutConfig;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneService;
use tower::{Layer, Service};

/// The boxed per-worker service driving one item through the overlays.
pub(crate) type ItemService<T, R> = BoxCloneService<WorkItem<T>, R, ItemError>;

/// Adapts the user operation `(payload, cancel) -> value` into a
/// [`Service`] over [`WorkItem`]s.
pub(crate) struct OpService<F> {
    f: Arc<F>,
}

impl<F> OpService<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> Clone for OpService<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<T, R, E, F, Fut> Service<WorkItem<T>> for OpService<F>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, tokio_util::sync::CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    type Response = R;
    type Error = ItemError;
    type Future = BoxFuture<'static, Result<R, ItemError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, item: WorkItem<T>) -> Self::Future {
        let f = Arc::clone(&self.f);
        Box::pin(async move {
            let cancel = item.cancel_token().clone();
            if cancel.is_cancelled() {
                return Err(ItemError::Cancelled);
            }

            let payload = item.into_payload();
            match (f)(payload, cancel.clone()).await {
                Ok(value) => Ok(value),
                Err(_) if cancel.is_cancelled() => Err(ItemError::Cancelled),
                Err(error) => Err(classify_user_error(error.into())),
            }
        })
    }
}

/// User operations may signal a specific [`ItemError`] (e.g. `Transient`)
/// by returning one; anything else is a plain user fault.
fn classify_user_error(error: BoxError) -> ItemError {
    match error.downcast::<ItemError>() {
        Ok(item_error) => *item_error,
        Err(other) => ItemError::UserFault(other),
    }
}

/// Builds the composed stack for one pipeline run. Stateful overlays
/// (breaker circuit, limiter bucket) are created fresh here and shared by
/// every per-worker clone of the returned service.
pub(crate) fn compose<T, R, E, F, Fut>(op: F, config: &ExecutionConfig<R>) -> ItemService<T, R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, tokio_util::sync::CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    // Innermost first; see the module docs for the normative order.
    let mut service: ItemService<T, R> = BoxCloneService::new(OpService::new(op));

    if let Some(limit) = config.per_item_timeout {
        let layer = TimeoutConfig::builder()
            .limit(limit)
            .name(config.name.clone())
            .build();
        service = BoxCloneService::new(layer.layer(service));
    }

    if let Some(rate_limit) = &config.rate_limit {
        let layer = RateLimiterLayer::new(rate_limit.clone());
        service = BoxCloneService::new(layer.layer(service));
    }

    if let Some(breaker) = &config.circuit_breaker {
        let layer = BreakerLayer::new(breaker.clone());
        service = BoxCloneService::new(layer.layer(service));
    }

    let retry = config.retry_layer.clone();
    BoxCloneService::new(retry.layer(service))
}
