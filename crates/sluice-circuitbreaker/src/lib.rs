//! Circuit breaker overlay for the sluice engine.
//!
//! Three-phase protection for a downstream resource: `Closed` executes
//! normally and opens after a run of consecutive failures inside the
//! sampling window; `Open` short-circuits every call with
//! [`ItemError::CircuitOpen`] until the open timeout elapses; `HalfOpen`
//! admits a bounded number of probes, closing on enough probe successes
//! and reopening on any probe failure.
//!
//! Phase changes dispatch the `on_state_change` callback fire-and-forget.
//! Counters live under one mutex with O(1) critical sections; no callback
//! or listener ever runs while it is held.
//!
//! # Example
//!
//! ```
//! use sluice_circuitbreaker::BreakerConfig;
//! use std::time::Duration;
//!
//! let breaker = BreakerConfig::builder()
//!     .failure_threshold(3)
//!     .success_threshold(1)
//!     .open_timeout(Duration::from_millis(500))
//!     .on_state_change(|from, to| eprintln!("breaker: {from} -> {to}"))
//!     .build();
//! ```

mod circuit;
mod config;
mod events;
mod layer;

pub use circuit::{CircuitPhase, Transition};
pub use config::{BreakerConfig, BreakerConfigBuilder, StateChangeCallback};
pub use events::BreakerEvent;
pub use layer::BreakerLayer;

use circuit::Circuit;
use futures::future::BoxFuture;
use sluice_core::envelope;
use sluice_core::error::ItemError;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

#[cfg(feature = "metrics")]
use metrics::counter;

/// A [`Service`] that short-circuits calls while its circuit is open.
pub struct CircuitBreaker<S> {
    inner: S,
    config: Arc<BreakerConfig>,
    circuit: Arc<Mutex<Circuit>>,
}

impl<S> CircuitBreaker<S> {
    pub(crate) fn new(inner: S, config: Arc<BreakerConfig>, circuit: Arc<Mutex<Circuit>>) -> Self {
        Self {
            inner,
            config,
            circuit,
        }
    }

    /// Current phase of the breaker.
    pub fn phase(&self) -> CircuitPhase {
        self.circuit.lock().unwrap().phase()
    }

    /// Forces the breaker open, rejecting all calls until the open timeout.
    pub fn force_open(&self) {
        let transition = self.circuit.lock().unwrap().force_open();
        self.emit_transition(transition);
    }

    /// Forces the breaker closed, clearing all counters.
    pub fn force_closed(&self) {
        let transition = self.circuit.lock().unwrap().force_closed();
        self.emit_transition(transition);
    }

    /// Resets the breaker to `Closed` (alias for [`Self::force_closed`]).
    pub fn reset(&self) {
        self.force_closed();
    }

    fn emit_transition(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };
        emit_transition(&self.config, transition);
    }
}

fn emit_transition(config: &BreakerConfig, transition: Transition) {
    #[cfg(feature = "tracing")]
    tracing::info!(
        breaker = %config.name,
        from = %transition.from,
        to = %transition.to,
        "circuit phase transition"
    );

    #[cfg(feature = "metrics")]
    counter!(
        "sluice_breaker_transitions_total",
        "breaker" => config.name.clone(),
        "to" => transition.to.to_string()
    )
    .increment(1);

    config.event_listeners.emit(&BreakerEvent::StateTransition {
        overlay_name: config.name.clone(),
        timestamp: Instant::now(),
        from: transition.from,
        to: transition.to,
    });

    if let Some(callback) = &config.on_state_change {
        let callback = Arc::clone(callback);
        envelope::fire_and_forget("on_state_change", move || {
            callback(transition.from, transition.to)
        });
    }
}

impl<S: Clone> Clone for CircuitBreaker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
            circuit: Arc::clone(&self.circuit),
        }
    }
}

impl<S, Req> Service<Req> for CircuitBreaker<S>
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
        let circuit = Arc::clone(&self.circuit);

        Box::pin(async move {
            let (admitted, transition) = {
                let mut circuit = circuit.lock().unwrap();
                circuit.try_acquire(&config)
            };
            if let Some(transition) = transition {
                emit_transition(&config, transition);
            }

            if !admitted {
                #[cfg(feature = "metrics")]
                counter!("sluice_breaker_rejected_total", "breaker" => config.name.clone())
                    .increment(1);

                config.event_listeners.emit(&BreakerEvent::CallRejected {
                    overlay_name: config.name.clone(),
                    timestamp: Instant::now(),
                });
                return Err(ItemError::CircuitOpen);
            }

            let phase = circuit.lock().unwrap().phase();
            config.event_listeners.emit(&BreakerEvent::CallPermitted {
                overlay_name: config.name.clone(),
                timestamp: Instant::now(),
                phase,
            });

            let result = inner.call(req).await;

            // Cancellation is caller-initiated, not downstream health;
            // release the probe slot without recording either way.
            if matches!(result, Err(ItemError::Cancelled)) {
                circuit.lock().unwrap().release_cancelled();
                return result;
            }

            let succeeded = result.is_ok();
            let (event, transition) = {
                let mut circuit = circuit.lock().unwrap();
                if succeeded {
                    let t = circuit.record_success(&config);
                    (
                        BreakerEvent::SuccessRecorded {
                            overlay_name: config.name.clone(),
                            timestamp: Instant::now(),
                            phase: circuit.phase(),
                        },
                        t,
                    )
                } else {
                    let t = circuit.record_failure(&config);
                    (
                        BreakerEvent::FailureRecorded {
                            overlay_name: config.name.clone(),
                            timestamp: Instant::now(),
                            phase: circuit.phase(),
                        },
                        t,
                    )
                }
            };

            config.event_listeners.emit(&event);
            if let Some(transition) = transition {
                emit_transition(&config, transition);
            }

            result
        })
    }
}
