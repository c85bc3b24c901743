//! Retry policy: how many attempts, which failures, how long between.

use crate::backoff::{BackoffCarry, BackoffStrategy};
use sluice_core::error::{default_transient, ItemError};
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a failure is transient (retryable).
pub type TransientClassifier = Arc<dyn Fn(&ItemError) -> bool + Send + Sync>;

/// The retry policy evaluated once per failed attempt.
#[derive(Clone)]
pub struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) base_delay: Duration,
    pub(crate) strategy: BackoffStrategy,
    pub(crate) classifier: TransientClassifier,
}

impl RetryPolicy {
    /// Creates a policy with the default classifier.
    pub fn new(max_retries: u32, base_delay: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            max_retries,
            base_delay,
            strategy,
            classifier: Arc::new(default_transient),
        }
    }

    /// Total attempts a chain may make (1 + max_retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Whether `error` should be retried at all.
    pub fn should_retry(&self, error: &ItemError) -> bool {
        (self.classifier)(error)
    }

    /// Delay before retry number `attempt` (1-based), threading the
    /// per-chain carry.
    pub fn next_delay(&self, attempt: u32, carry: &mut BackoffCarry) -> Duration {
        self.strategy.delay(self.base_delay, attempt, carry)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("strategy", &self.strategy)
            .finish()
    }
}
