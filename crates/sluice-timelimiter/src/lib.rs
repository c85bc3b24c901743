//! Per-item timeout overlay for the sluice engine.
//!
//! Derives a child cancel token from the item's token and substitutes it
//! before invoking the inner operation, so the operation observes
//! cancellation when the deadline elapses. A timer expiry is reported as
//! [`ItemError::Timeout`]; if the item's original token was cancelled
//! externally, the outcome is [`ItemError::Cancelled`] even when the
//! timer fired in the same instant, so the two are distinguishable.
//!
//! # Example
//!
//! ```
//! use sluice_timelimiter::TimeoutConfig;
//! use std::time::Duration;
//!
//! let timeout = TimeoutConfig::builder()
//!     .limit(Duration::from_secs(5))
//!     .on_timeout(|limit| eprintln!("deadline of {limit:?} elapsed"))
//!     .build();
//! ```

mod config;
mod events;
mod layer;

pub use config::{TimeoutConfig, TimeoutConfigBuilder};
pub use events::TimeoutEvent;
pub use layer::TimeoutLayer;

use futures::future::BoxFuture;
use sluice_core::context::WorkContext;
use sluice_core::error::ItemError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::time::timeout;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

/// A [`Service`] that cancels the item's child token when the per-item
/// deadline elapses.
pub struct TimeLimiter<S> {
    inner: S,
    config: Arc<TimeoutConfig>,
}

impl<S> TimeLimiter<S> {
    pub(crate) fn new(inner: S, config: Arc<TimeoutConfig>) -> Self {
        Self { inner, config }
    }
}

impl<S: Clone> Clone for TimeLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req> Service<Req> for TimeLimiter<S>
where
    S: Service<Req, Error = ItemError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: WorkContext + 'static,
{
    type Response = S::Response;
    type Error = ItemError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let mut inner = self.inner.clone();
        let config = Arc::clone(&self.config);
        let limit = config.limit;

        let outer = req.cancel_token().clone();
        let child = outer.child_token();
        let req = req.with_cancel_token(child.clone());

        Box::pin(async move {
            let start = Instant::now();

            match timeout(limit, inner.call(req)).await {
                Ok(result) => {
                    let duration = start.elapsed();

                    #[cfg(feature = "metrics")]
                    histogram!("sluice_timeout_call_seconds", "timeout" => config.name.clone())
                        .record(duration.as_secs_f64());

                    config.event_listeners.emit(&TimeoutEvent::Completed {
                        overlay_name: config.name.clone(),
                        timestamp: Instant::now(),
                        duration,
                    });

                    // The inner operation may have exited with a cancel that
                    // coincides with the timer; unless the outer token
                    // tripped, that is a timeout.
                    match result {
                        Err(ItemError::Cancelled)
                            if !outer.is_cancelled() && duration >= limit =>
                        {
                            Err(ItemError::Timeout { limit })
                        }
                        other => other,
                    }
                }
                Err(_elapsed) => {
                    // The inner future has been dropped; cancel the child so
                    // anything it spawned observes the deadline.
                    child.cancel();

                    if outer.is_cancelled() {
                        return Err(ItemError::Cancelled);
                    }

                    #[cfg(feature = "metrics")]
                    counter!("sluice_timeout_expired_total", "timeout" => config.name.clone())
                        .increment(1);

                    #[cfg(feature = "tracing")]
                    tracing::debug!(timeout = %config.name, limit_ms = limit.as_millis(), "per-item deadline elapsed");

                    config.event_listeners.emit(&TimeoutEvent::TimedOut {
                        overlay_name: config.name.clone(),
                        timestamp: Instant::now(),
                        limit,
                    });

                    Err(ItemError::Timeout { limit })
                }
            }
        })
    }
}
