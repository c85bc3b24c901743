//! Core infrastructure for the sluice parallel execution engine.
//!
//! This crate provides shared functionality used across all sluice crates:
//! - The error taxonomy (`ItemError`, `PipelineError`, `ConfigError`)
//! - Event system for observability
//! - Process-wide event counters
//! - The callback envelope (guarded invocation of user callbacks)
//! - The `WorkContext` trait overlays use to reach per-item state

pub mod context;
pub mod counters;
pub mod envelope;
pub mod error;
pub mod events;

pub use context::WorkContext;
pub use counters::{CounterSample, CounterSnapshot, EventCounters};
pub use error::{default_transient, BoxError, ConfigError, ItemError, PipelineError};
pub use events::{EventListener, EventListeners, FnListener, OverlayEvent};
