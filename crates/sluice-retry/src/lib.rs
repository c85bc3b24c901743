//! Retry overlay for the sluice engine.
//!
//! Wraps a per-item operation in a retry loop: failures the transient
//! classifier accepts are retried after a backoff-computed sleep, up to
//! `1 + max_retries` attempts in total. The backoff sleep is cancel-aware,
//! so an external cancel aborts the chain instead of sleeping it out.
//!
//! The decorrelated-jitter strategy keeps its previous-delay carry inside
//! the retry chain itself (never in thread-local storage), so the carry
//! cannot leak across unrelated items on a pooled runtime.
//!
//! # Example
//!
//! ```no_run
//! use sluice_retry::{BackoffStrategy, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::builder()
//!     .max_retries(3)
//!     .base_delay(Duration::from_millis(100))
//!     .backoff(BackoffStrategy::DecorrelatedJitter)
//!     .on_retry(|attempt, delay| {
//!         eprintln!("attempt {attempt} failed, retrying in {delay:?}");
//!     })
//!     .build();
//! ```

mod backoff;
mod config;
mod events;
mod layer;
mod policy;

pub use backoff::{BackoffCarry, BackoffStrategy};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use layer::RetryLayer;
pub use policy::{RetryPolicy, TransientClassifier};

use futures::future::BoxFuture;
use sluice_core::context::WorkContext;
use sluice_core::counters::EventCounters;
use sluice_core::error::ItemError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// A [`Service`] that retries transient failures of the inner operation.
pub struct Retry<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S> Retry<S> {
    /// Creates a new `Retry` wrapping the given service.
    pub fn new(inner: S, config: Arc<RetryConfig>) -> Self {
        Self { inner, config }
    }
}

impl<S: Clone> Clone for Retry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req> Service<Req> for Retry<S>
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
        let mut service = self.inner.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let cancel = req.cancel_token().clone();
            // Per-chain jitter state; dropped (reset) when the chain ends.
            let mut carry = BackoffCarry::default();
            let mut attempt: u32 = 1;

            loop {
                req.record_attempt(attempt);
                let result = service.call(req.clone()).await;

                match result {
                    Ok(response) => {
                        #[cfg(feature = "metrics")]
                        {
                            counter!("sluice_retry_chains_total", "retry" => config.name.clone(), "result" => "success").increment(1);
                            histogram!("sluice_retry_attempts", "retry" => config.name.clone())
                                .record(attempt as f64);
                        }

                        #[cfg(feature = "tracing")]
                        {
                            if attempt > 1 {
                                info!(retry = %config.name, attempts = attempt, "item succeeded after retries");
                            } else {
                                debug!(retry = %config.name, "item succeeded on first attempt");
                            }
                        }

                        config.event_listeners.emit(&RetryEvent::Success {
                            overlay_name: config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt,
                        });
                        return Ok(response);
                    }
                    Err(error) => {
                        if !config.policy.should_retry(&error) {
                            #[cfg(feature = "tracing")]
                            debug!(retry = %config.name, kind = error.kind(), "failure not transient, re-raising");

                            config.event_listeners.emit(&RetryEvent::IgnoredError {
                                overlay_name: config.name.clone(),
                                timestamp: Instant::now(),
                            });
                            return Err(error);
                        }

                        if attempt >= config.policy.max_attempts() {
                            #[cfg(feature = "metrics")]
                            counter!("sluice_retry_chains_total", "retry" => config.name.clone(), "result" => "exhausted").increment(1);

                            #[cfg(feature = "tracing")]
                            warn!(retry = %config.name, attempts = attempt, "retry attempts exhausted");

                            config.event_listeners.emit(&RetryEvent::Exhausted {
                                overlay_name: config.name.clone(),
                                timestamp: Instant::now(),
                                attempts: attempt,
                            });
                            return Err(error);
                        }

                        let delay = config.policy.next_delay(attempt, &mut carry);

                        EventCounters::record_retry();

                        #[cfg(feature = "metrics")]
                        counter!("sluice_retry_attempts_total", "retry" => config.name.clone())
                            .increment(1);

                        #[cfg(feature = "tracing")]
                        debug!(retry = %config.name, attempt, delay_ms = delay.as_millis(), "retrying after delay");

                        config.event_listeners.emit(&RetryEvent::Retry {
                            overlay_name: config.name.clone(),
                            timestamp: Instant::now(),
                            attempt,
                            delay,
                        });

                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => return Err(ItemError::Cancelled),
                        }
                        attempt += 1;
                    }
                }
            }
        })
    }
}
