//! Process-wide event counters.
//!
//! [`EventCounters`] is a singleton shared by every pipeline in the
//! process: values are monotonic for the process lifetime. Per-run
//! statistics must therefore be computed as deltas between
//! [`EventCounters::snapshot`]s taken at run start and run end.
//!
//! Counters use lock-free atomic increments; gauges are plain atomic
//! stores. The f64-valued gauges are stored as their bit patterns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static ITEMS_STARTED: AtomicU64 = AtomicU64::new(0);
static ITEMS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static RETRIES_TOTAL: AtomicU64 = AtomicU64::new(0);
static FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);
static THROTTLE_EVENTS: AtomicU64 = AtomicU64::new(0);
static DRAIN_EVENTS: AtomicU64 = AtomicU64::new(0);
static CALLBACK_FAILURES: AtomicU64 = AtomicU64::new(0);

static CURRENT_CONCURRENCY: AtomicU64 = AtomicU64::new(0);
static ERROR_RATE_BITS: AtomicU64 = AtomicU64::new(0);
static ITEMS_PER_SECOND_BITS: AtomicU64 = AtomicU64::new(0);

/// Handle to the process-wide counter set.
pub struct EventCounters;

impl EventCounters {
    /// An item entered the worker stage.
    pub fn record_item_started() {
        ITEMS_STARTED.fetch_add(1, Ordering::Relaxed);
    }

    /// An item produced a successful outcome.
    pub fn record_item_completed() {
        ITEMS_COMPLETED.fetch_add(1, Ordering::Relaxed);
    }

    /// A retry attempt was scheduled.
    pub fn record_retry() {
        RETRIES_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    /// An item produced a terminal failure.
    pub fn record_failure() {
        FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller waited on (or was refused by) the rate limiter.
    pub fn record_throttle() {
        THROTTLE_EVENTS.fetch_add(1, Ordering::Relaxed);
    }

    /// The request channel drained after source exhaustion.
    pub fn record_drain() {
        DRAIN_EVENTS.fetch_add(1, Ordering::Relaxed);
    }

    /// A fire-and-forget callback or listener panicked.
    pub fn record_callback_failure() {
        CALLBACK_FAILURES.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker began executing the user operation.
    pub fn enter_concurrency() {
        CURRENT_CONCURRENCY.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker finished executing the user operation.
    pub fn exit_concurrency() {
        CURRENT_CONCURRENCY.fetch_sub(1, Ordering::Relaxed);
    }

    /// Updates the error-rate gauge (failures / started, `[0, 1]`).
    pub fn set_error_rate(rate: f64) {
        ERROR_RATE_BITS.store(rate.to_bits(), Ordering::Relaxed);
    }

    /// Updates the throughput gauge.
    pub fn set_items_per_second(rate: f64) {
        ITEMS_PER_SECOND_BITS.store(rate.to_bits(), Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of every counter and gauge.
    pub fn snapshot() -> CounterSnapshot {
        CounterSnapshot {
            items_started: ITEMS_STARTED.load(Ordering::Relaxed),
            items_completed: ITEMS_COMPLETED.load(Ordering::Relaxed),
            retries_total: RETRIES_TOTAL.load(Ordering::Relaxed),
            failures_total: FAILURES_TOTAL.load(Ordering::Relaxed),
            throttle_events: THROTTLE_EVENTS.load(Ordering::Relaxed),
            drain_events: DRAIN_EVENTS.load(Ordering::Relaxed),
            callback_failures: CALLBACK_FAILURES.load(Ordering::Relaxed),
            current_concurrency: CURRENT_CONCURRENCY.load(Ordering::Relaxed),
            error_rate: f64::from_bits(ERROR_RATE_BITS.load(Ordering::Relaxed)),
            items_per_second: f64::from_bits(ITEMS_PER_SECOND_BITS.load(Ordering::Relaxed)),
        }
    }

    /// Renders the current values as named samples for subscribers.
    pub fn samples() -> Vec<CounterSample> {
        let snap = Self::snapshot();
        vec![
            CounterSample::count("items-started", "Items Started", snap.items_started),
            CounterSample::count("items-completed", "Items Completed", snap.items_completed),
            CounterSample::count("retries-total", "Total Retries", snap.retries_total),
            CounterSample::count("failures-total", "Total Failures", snap.failures_total),
            CounterSample::count("throttle-events", "Throttle Events", snap.throttle_events),
            CounterSample::count("drain-events", "Drain Events", snap.drain_events),
            CounterSample::count(
                "callback-failures",
                "Callback Failures",
                snap.callback_failures,
            ),
            CounterSample {
                name: "current-concurrency",
                display_name: "Current Concurrency",
                value: snap.current_concurrency as f64,
                display_units: "workers",
            },
            CounterSample {
                name: "error-rate",
                display_name: "Error Rate",
                value: snap.error_rate,
                display_units: "ratio",
            },
            CounterSample {
                name: "items-per-second",
                display_name: "Throughput",
                value: snap.items_per_second,
                display_units: "items/s",
            },
        ]
    }
}

/// Point-in-time view of the process-wide counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSnapshot {
    pub items_started: u64,
    pub items_completed: u64,
    pub retries_total: u64,
    pub failures_total: u64,
    pub throttle_events: u64,
    pub drain_events: u64,
    pub callback_failures: u64,
    pub current_concurrency: u64,
    pub error_rate: f64,
    pub items_per_second: f64,
}

impl CounterSnapshot {
    /// Per-run delta between two snapshots (`self` is the later one).
    ///
    /// Gauges are carried from the later snapshot; monotonic counters are
    /// subtracted.
    pub fn delta_since(&self, start: &CounterSnapshot) -> CounterSnapshot {
        CounterSnapshot {
            items_started: self.items_started - start.items_started,
            items_completed: self.items_completed - start.items_completed,
            retries_total: self.retries_total - start.retries_total,
            failures_total: self.failures_total - start.failures_total,
            throttle_events: self.throttle_events - start.throttle_events,
            drain_events: self.drain_events - start.drain_events,
            callback_failures: self.callback_failures - start.callback_failures,
            current_concurrency: self.current_concurrency,
            error_rate: self.error_rate,
            items_per_second: self.items_per_second,
        }
    }

    /// Throughput over `elapsed` implied by this (delta) snapshot.
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            0.0
        } else {
            self.items_completed as f64 / elapsed.as_secs_f64()
        }
    }
}

/// One named counter value handed to counter-stream subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterSample {
    /// Stable machine name, e.g. `items-started`.
    pub name: &'static str,
    /// Human-readable name.
    pub display_name: &'static str,
    /// Current value.
    pub value: f64,
    /// Unit label, e.g. `items` or `items/s`.
    pub display_units: &'static str,
}

impl CounterSample {
    fn count(name: &'static str, display_name: &'static str, value: u64) -> Self {
        Self {
            name,
            display_name,
            value: value as f64,
            display_units: "items",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn deltas_isolate_a_run() {
        let start = EventCounters::snapshot();

        EventCounters::record_item_started();
        EventCounters::record_item_started();
        EventCounters::record_item_completed();
        EventCounters::record_failure();
        EventCounters::record_retry();

        let delta = EventCounters::snapshot().delta_since(&start);
        assert_eq!(delta.items_started, 2);
        assert_eq!(delta.items_completed, 1);
        assert_eq!(delta.failures_total, 1);
        assert_eq!(delta.retries_total, 1);
    }

    #[test]
    #[serial]
    fn concurrency_gauge_tracks_enter_exit() {
        let before = EventCounters::snapshot().current_concurrency;
        EventCounters::enter_concurrency();
        EventCounters::enter_concurrency();
        assert_eq!(EventCounters::snapshot().current_concurrency, before + 2);
        EventCounters::exit_concurrency();
        EventCounters::exit_concurrency();
        assert_eq!(EventCounters::snapshot().current_concurrency, before);
    }

    #[test]
    fn samples_carry_stable_names() {
        let samples = EventCounters::samples();
        let names: Vec<&str> = samples.iter().map(|s| s.name).collect();
        for expected in [
            "items-started",
            "items-completed",
            "retries-total",
            "failures-total",
            "throttle-events",
            "drain-events",
            "callback-failures",
            "current-concurrency",
            "error-rate",
            "items-per-second",
        ] {
            assert!(names.contains(&expected), "missing counter {expected}");
        }
    }

    #[test]
    fn throughput_handles_zero_elapsed() {
        let snap = EventCounters::snapshot();
        assert_eq!(snap.throughput(Duration::ZERO), 0.0);
    }
}
