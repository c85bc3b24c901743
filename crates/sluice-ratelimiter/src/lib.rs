//! Token-bucket rate limiting overlay for the sluice engine.
//!
//! The bucket holds up to `burst_capacity` tokens and refills at
//! `tokens_per_second`, accrued lazily from elapsed time. Each call
//! consumes one token. When the bucket is empty the caller either waits
//! for accrual (the default) or, with `fail_on_empty`, fails immediately
//! with [`ItemError::Throttled`]. Every throttled wait increments the
//! process-wide throttle counter and fires the `on_throttle` callback.
//!
//! # Example
//!
//! ```
//! use sluice_ratelimiter::RateLimiterConfig;
//!
//! let limiter = RateLimiterConfig::builder()
//!     .tokens_per_second(50.0)
//!     .burst_capacity(10)
//!     .on_throttle(|wait| eprintln!("throttled for {wait:?}"))
//!     .build();
//! ```

mod bucket;
mod config;
mod events;
mod layer;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use events::RateLimiterEvent;
pub use layer::RateLimiterLayer;

use bucket::{Acquire, SharedBucket};
use futures::future::BoxFuture;
use sluice_core::counters::EventCounters;
use sluice_core::error::ItemError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

/// A [`Service`] that gates calls through a shared token bucket.
pub struct RateLimiter<S> {
    inner: S,
    config: Arc<RateLimiterConfig>,
    bucket: SharedBucket,
}

impl<S> RateLimiter<S> {
    pub(crate) fn new(inner: S, config: Arc<RateLimiterConfig>, bucket: SharedBucket) -> Self {
        Self {
            inner,
            config,
            bucket,
        }
    }
}

impl<S: Clone> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            bucket: self.bucket.clone(),
        }
    }
}

impl<S, Req> Service<Req> for RateLimiter<S>
where
    S: Service<Req, Error = ItemError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Send + 'static,
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
        let bucket = self.bucket.clone();

        Box::pin(async move {
            let listeners = &config.event_listeners;
            let name = &config.name;

            let acquired = bucket
                .acquire(config.fail_on_empty, |wait| {
                    EventCounters::record_throttle();

                    #[cfg(feature = "metrics")]
                    {
                        counter!("sluice_ratelimiter_throttles_total", "ratelimiter" => name.clone())
                            .increment(1);
                        histogram!("sluice_ratelimiter_wait_seconds", "ratelimiter" => name.clone())
                            .record(wait.as_secs_f64());
                    }

                    #[cfg(feature = "tracing")]
                    tracing::debug!(ratelimiter = %name, wait_ms = wait.as_millis(), "throttled");

                    listeners.emit(&RateLimiterEvent::Throttled {
                        overlay_name: name.clone(),
                        timestamp: Instant::now(),
                        wait,
                    });
                })
                .await;

            match acquired {
                Acquire::Granted { waited } => {
                    listeners.emit(&RateLimiterEvent::PermitAcquired {
                        overlay_name: name.clone(),
                        timestamp: Instant::now(),
                        waited,
                    });
                    inner.call(req).await
                }
                Acquire::Refused { retry_after } => Err(ItemError::Throttled {
                    retry_after: Some(retry_after),
                }),
            }
        })
    }
}
