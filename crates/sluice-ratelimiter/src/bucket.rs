//! Token bucket over logical time.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Bucket state, refilled lazily from elapsed time. Critical sections are
/// O(1); sleeps happen with the lock released.
#[derive(Debug)]
struct Bucket {
    tokens_per_second: f64,
    burst_capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(tokens_per_second: f64, burst_capacity: u32) -> Self {
        Self {
            tokens_per_second,
            burst_capacity: burst_capacity as f64,
            // The bucket starts full so the first burst is not throttled.
            tokens: burst_capacity as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.tokens_per_second).min(self.burst_capacity);
        self.last_refill = now;
    }

    /// Takes one token, or reports how long until one accrues.
    fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.tokens_per_second))
        }
    }

    fn available(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquire {
    /// A token was taken, possibly after the given cumulative wait.
    Granted { waited: Duration },
    /// The bucket was empty and the limiter is non-blocking.
    Refused { retry_after: Duration },
}

/// Shared token bucket; clones refer to the same reservoir.
#[derive(Debug, Clone)]
pub(crate) struct SharedBucket {
    state: Arc<Mutex<Bucket>>,
}

impl SharedBucket {
    pub(crate) fn new(tokens_per_second: f64, burst_capacity: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(Bucket::new(tokens_per_second, burst_capacity))),
        }
    }

    /// Acquires one token. Blocking mode waits for accrual (reporting each
    /// wait through `on_wait` before sleeping); non-blocking mode refuses.
    pub(crate) async fn acquire(
        &self,
        fail_on_empty: bool,
        mut on_wait: impl FnMut(Duration),
    ) -> Acquire {
        let mut waited = Duration::ZERO;
        loop {
            let result = {
                let mut bucket = self.state.lock().unwrap();
                bucket.try_acquire()
            };

            match result {
                Ok(()) => return Acquire::Granted { waited },
                Err(wait) => {
                    if fail_on_empty {
                        on_wait(wait);
                        return Acquire::Refused { retry_after: wait };
                    }
                    on_wait(wait);
                    sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Tokens currently available (after a refill).
    pub(crate) fn available(&self) -> f64 {
        self.state.lock().unwrap().available()
    }
}
