//! Adaptive concurrency control for the sluice engine.
//!
//! Maintains an effective concurrency limit within
//! `[min_concurrency, max_concurrency]`, re-evaluated once per sampling
//! interval from a trailing window of per-item latencies and outcomes.
//! The policy is AIMD: additive increase of one when the window is fast
//! and healthy, multiplicative decrease (halving) when the success rate
//! drops below the floor or p50 latency breaches `target × 1.25`.
//!
//! The controller never interrupts in-flight work; it only changes the
//! admission rate. The dispatcher observes the effective value through
//! [`AdaptiveGate::admit`] before gating each new admission.
//!
//! # Example
//!
//! ```
//! use sluice_adaptive::{AdaptiveConfig, AdaptiveGate};
//! use std::time::Duration;
//!
//! let gate = AdaptiveGate::new(
//!     AdaptiveConfig::builder()
//!         .min_concurrency(2)
//!         .max_concurrency(32)
//!         .target_latency(Duration::from_millis(50))
//!         .min_success_rate(0.9)
//!         .sampling_interval(Duration::from_millis(250))
//!         .build(),
//! );
//! # let _ = gate.effective_limit();
//! ```

mod config;
mod controller;
mod gate;

pub use config::{AdaptiveConfig, AdaptiveConfigBuilder, LimitChangeCallback};
pub use controller::AdaptiveController;
pub use gate::{AdaptiveGate, AdmitPermit};
