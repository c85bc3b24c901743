//! The AIMD decision core.
//!
//! Keeps a trailing window of `(latency, success)` samples and, once per
//! sampling interval, compares the window's p50 latency and success rate
//! against the configured targets:
//!
//! - success rate below the floor, or p50 above `target × 1.25`:
//!   multiplicative decrease (halve, floored at `min_concurrency`);
//! - success rate at/above the floor and p50 below `target × 0.75`:
//!   additive increase (+1, capped at `max_concurrency`);
//! - otherwise hold.

use crate::config::AdaptiveConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bound on retained samples so window maintenance stays cheap.
const MAX_SAMPLES: usize = 512;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    latency: Duration,
    ok: bool,
}

#[derive(Debug)]
struct Window {
    samples: VecDeque<Sample>,
    last_eval: Instant,
}

/// Thread-safe adaptive limit controller.
pub struct AdaptiveController {
    config: AdaptiveConfig,
    limit: AtomicUsize,
    window: Mutex<Window>,
}

impl AdaptiveController {
    /// Creates a controller starting at `max_concurrency`.
    pub fn new(config: AdaptiveConfig) -> Self {
        let initial = config.max_concurrency;
        Self {
            config,
            limit: AtomicUsize::new(initial),
            window: Mutex::new(Window {
                samples: VecDeque::new(),
                last_eval: Instant::now(),
            }),
        }
    }

    /// The current effective concurrency limit.
    pub fn effective_limit(&self) -> usize {
        self.limit.load(Ordering::Relaxed)
    }

    /// The configured ceiling.
    pub fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }

    /// Records one completed item and re-evaluates if a sampling interval
    /// has elapsed. Returns `Some((old, new))` when the limit changed; the
    /// caller dispatches the change callback outside this call's lock.
    pub fn record(&self, latency: Duration, ok: bool) -> Option<(usize, usize)> {
        let now = Instant::now();
        let decision = {
            let mut window = self.window.lock().unwrap();
            window.samples.push_back(Sample {
                at: now,
                latency,
                ok,
            });
            if window.samples.len() > MAX_SAMPLES {
                window.samples.pop_front();
            }

            if now.duration_since(window.last_eval) < self.config.sampling_interval {
                return None;
            }
            window.last_eval = now;

            // Trailing window: keep two sampling intervals of history.
            let horizon = self.config.sampling_interval * 2;
            while let Some(front) = window.samples.front() {
                if now.duration_since(front.at) > horizon {
                    window.samples.pop_front();
                } else {
                    break;
                }
            }

            self.decide(&window.samples)
        };

        match decision {
            Decision::Hold => None,
            Decision::Decrease => self.adjust(|limit| {
                (limit / 2).max(self.config.min_concurrency)
            }),
            Decision::Increase => self.adjust(|limit| {
                (limit + 1).min(self.config.max_concurrency)
            }),
        }
    }

    fn decide(&self, samples: &VecDeque<Sample>) -> Decision {
        if samples.is_empty() {
            return Decision::Hold;
        }

        let total = samples.len();
        let successes = samples.iter().filter(|s| s.ok).count();
        let success_rate = successes as f64 / total as f64;

        let mut latencies: Vec<Duration> = samples.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();
        let p50 = latencies[total / 2];

        let target = self.config.target_latency;
        let high_water = target.mul_f64(1.25);
        let low_water = target.mul_f64(0.75);

        if success_rate < self.config.min_success_rate || p50 > high_water {
            Decision::Decrease
        } else if p50 < low_water {
            Decision::Increase
        } else {
            Decision::Hold
        }
    }

    fn adjust(&self, f: impl Fn(usize) -> usize) -> Option<(usize, usize)> {
        let old = self.limit.load(Ordering::Relaxed);
        let new = f(old);
        if new == old {
            return None;
        }
        self.limit.store(new, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::debug!(old, new, "adaptive limit adjusted");

        #[cfg(feature = "metrics")]
        metrics::gauge!("sluice_adaptive_limit").set(new as f64);

        Some((old, new))
    }
}

impl std::fmt::Debug for AdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveController")
            .field("limit", &self.effective_limit())
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Increase,
    Decrease,
    Hold,
}
