//! Error taxonomy for the sluice engine.
//!
//! Every failure an item can experience is one [`ItemError`] variant, so
//! overlays compose without per-layer error conversions: the retry overlay
//! classifies an [`ItemError`], the breaker produces one, and the pipeline
//! surfaces them according to its error mode. Run-level failures
//! (source faults, aggregates, cancellation) are [`PipelineError`]s, and
//! option validation failures are [`ConfigError`]s raised before any work
//! starts.

use std::time::Duration;
use thiserror::Error;

/// Boxed error type carried for user-operation and source failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal or retryable failure of a single item.
#[derive(Debug, Error)]
pub enum ItemError {
    /// A failure known to be transient (installed by an adapter or
    /// produced by the default classifier).
    #[error("transient failure: {0}")]
    Transient(#[source] BoxError),

    /// The pipeline's root cancel was observed. Never retried.
    #[error("operation cancelled")]
    Cancelled,

    /// The per-item deadline elapsed.
    #[error("per-item deadline of {limit:?} exceeded")]
    Timeout {
        /// The configured deadline that elapsed.
        limit: Duration,
    },

    /// The circuit breaker is open; the operation was never invoked.
    #[error("circuit is open; call not permitted")]
    CircuitOpen,

    /// The rate limiter refused the call (non-blocking configurations only).
    #[error("rate limit refused the call")]
    Throttled {
        /// Time until a token would have accrued, when known.
        retry_after: Option<Duration>,
    },

    /// Any other error returned by the user operation.
    #[error("operation failed: {0}")]
    UserFault(#[source] BoxError),
}

impl ItemError {
    /// Wraps an arbitrary user error.
    pub fn user<E: Into<BoxError>>(err: E) -> Self {
        ItemError::UserFault(err.into())
    }

    /// Returns true if this is the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ItemError::Timeout { .. })
    }

    /// Returns true if this is the circuit-open variant.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ItemError::CircuitOpen)
    }

    /// Returns true if the pipeline's cancel was observed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ItemError::Cancelled)
    }

    /// A short stable label for counters and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemError::Transient(_) => "transient",
            ItemError::Cancelled => "cancelled",
            ItemError::Timeout { .. } => "timeout",
            ItemError::CircuitOpen => "circuit_open",
            ItemError::Throttled { .. } => "throttled",
            ItemError::UserFault(_) => "user_fault",
        }
    }
}

/// The default transient classifier.
///
/// Timeouts, throttles, explicitly transient errors and plain user faults
/// are retryable; cancellation is final, and retrying into an open breaker
/// is pointless.
pub fn default_transient(error: &ItemError) -> bool {
    match error {
        ItemError::Transient(_) => true,
        ItemError::Timeout { .. } => true,
        ItemError::Throttled { .. } => true,
        ItemError::UserFault(_) => true,
        ItemError::Cancelled => false,
        ItemError::CircuitOpen => false,
    }
}

/// Run-level failure of a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Iterating the source itself failed. Never retried; terminates the run.
    #[error("source iteration failed: {0}")]
    Source(#[source] BoxError),

    /// The root cancel fired before the run completed.
    #[error("pipeline cancelled")]
    Cancelled,

    /// A single item failed in fail-fast mode.
    #[error("item {index} failed after {attempts} attempt(s): {source}")]
    Item {
        /// Source-arrival index of the failed item.
        index: u64,
        /// Attempts made, including the first.
        attempts: u32,
        #[source]
        source: ItemError,
    },

    /// One or more items failed in collect-and-continue mode.
    #[error("{} item(s) failed", failures.len())]
    Aggregate {
        /// Terminal per-index causes, in index order.
        failures: Vec<(u64, ItemError)>,
    },
}

impl PipelineError {
    /// Returns the per-index causes if this is an aggregate failure.
    pub fn failures(&self) -> Option<&[(u64, ItemError)]> {
        match self {
            PipelineError::Aggregate { failures } => Some(failures),
            _ => None,
        }
    }
}

/// Option validation failure, raised at config build time before any work
/// starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A numeric option was outside its permitted range.
    #[error("{option} must be {requirement} (got {value})")]
    OutOfRange {
        /// Name of the offending option.
        option: &'static str,
        /// Human-readable requirement, e.g. "at least 1".
        requirement: &'static str,
        /// The rejected value, rendered.
        value: String,
    },

    /// A mandatory option was left unset.
    #[error("{option} is required")]
    Missing {
        /// Name of the missing option.
        option: &'static str,
    },

    /// Two options are mutually inconsistent.
    #[error("inconsistent options: {reason}")]
    Inconsistent {
        /// What is inconsistent.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Helper for range violations.
    pub fn out_of_range(
        option: &'static str,
        requirement: &'static str,
        value: impl std::fmt::Display,
    ) -> Self {
        ConfigError::OutOfRange {
            option,
            requirement,
            value: value.to_string(),
        }
    }
}
