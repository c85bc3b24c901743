//! Chaos injection for resilience tests.

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// The dedicated error raised by injected failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("injected chaos failure")]
pub struct ChaosError;

/// Randomly fails or delays the actions it executes.
///
/// `failure_rate` is the probability in `[0, 1]` that [`execute`] raises
/// a [`ChaosError`] instead of invoking the action; `artificial_delay`
/// is slept before the decision either way.
///
/// [`execute`]: ChaosInjector::execute
pub struct ChaosInjector {
    failure_rate: f64,
    artificial_delay: Option<Duration>,
    rng: Mutex<StdRng>,
}

impl ChaosInjector {
    /// Creates an injector failing with the given probability.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is outside `[0, 1]`.
    pub fn new(failure_rate: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be within [0, 1]"
        );
        Self {
            failure_rate,
            artificial_delay: None,
            rng: Mutex::new(rand::make_rng()),
        }
    }

    /// Adds a fixed artificial delay before every execution.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.artificial_delay = Some(delay);
        self
    }

    /// Seeds the injector for reproducible failure sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// The configured failure probability.
    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Rolls the dice once: true means the next execution would fail.
    pub fn should_fail(&self) -> bool {
        if self.failure_rate <= 0.0 {
            return false;
        }
        if self.failure_rate >= 1.0 {
            return true;
        }
        self.rng.lock().unwrap().random_range(0.0..1.0) < self.failure_rate
    }

    /// Sleeps the artificial delay (if any), then either raises
    /// [`ChaosError`] with probability `failure_rate` or invokes `action`.
    pub async fn execute<F, Fut, T>(&self, action: F) -> Result<T, ChaosError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(delay) = self.artificial_delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail() {
            return Err(ChaosError);
        }

        Ok(action().await)
    }
}

impl std::fmt::Debug for ChaosInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosInjector")
            .field("failure_rate", &self.failure_rate)
            .field("artificial_delay", &self.artificial_delay)
            .finish()
    }
}
