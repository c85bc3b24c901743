//! Periodic progress reporting.

use super::RunStats;
use sluice_core::counters::EventCounters;
use sluice_core::envelope;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Point-in-time progress of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Items with a terminal outcome so far.
    pub items_completed: u64,
    /// Total items, when the source size is known up front.
    pub total_items: Option<u64>,
    /// `items_completed / total_items`, in `[0, 100]`.
    pub percent_complete: Option<f64>,
    /// Terminal outcomes per second since the run started.
    pub items_per_second: f64,
    /// Time since the run started.
    pub elapsed: Duration,
    /// Naive ETA from the current rate, when the total is known.
    pub estimated_remaining: Option<Duration>,
}

/// Callback receiving progress snapshots.
pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Progress reporting options. Default cadence: 100 ms.
#[derive(Clone)]
pub struct ProgressSettings {
    pub(crate) report_interval: Duration,
    pub(crate) on_progress: Option<ProgressCallback>,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_millis(100),
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for ProgressSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSettings")
            .field("report_interval", &self.report_interval)
            .finish()
    }
}

impl ProgressSettings {
    /// How often snapshots are emitted.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// The snapshot callback (fire-and-forget; panics are contained).
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }
}

/// The periodic reporter task. Teardown signals cancel, waits briefly for
/// the task, and lets it make a final emission so totals are not lost.
pub(crate) struct ProgressReporter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub(crate) fn spawn(
        settings: ProgressSettings,
        stats: Arc<RunStats>,
        total: Option<u64>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(settings.report_interval) => {
                        emit(&settings, &stats, total);
                    }
                    _ = token.cancelled() => {
                        // Final emission before exiting.
                        emit(&settings, &stats, total);
                        break;
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    /// Signals the task without waiting; used when the owner cannot await.
    pub(crate) fn cancel_now(&self) {
        self.cancel.cancel();
    }

    /// Cancels and awaits the task with a timeout. Idempotent with
    /// [`Self::cancel_now`].
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if tokio::time::timeout(Duration::from_secs(1), self.handle)
            .await
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("progress reporter did not stop in time");
        }
    }
}

fn snapshot(stats: &RunStats, total: Option<u64>) -> ProgressSnapshot {
    let elapsed = stats.started_at().elapsed();
    let completed = stats.terminal();
    let items_per_second = if elapsed.is_zero() {
        0.0
    } else {
        completed as f64 / elapsed.as_secs_f64()
    };

    let percent_complete = total.map(|total| {
        if total == 0 {
            100.0
        } else {
            completed as f64 * 100.0 / total as f64
        }
    });

    let estimated_remaining = total.and_then(|total| {
        let remaining = total.saturating_sub(completed);
        if remaining == 0 {
            Some(Duration::ZERO)
        } else if items_per_second > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / items_per_second))
        } else {
            None
        }
    });

    ProgressSnapshot {
        items_completed: completed,
        total_items: total,
        percent_complete,
        items_per_second,
        elapsed,
        estimated_remaining,
    }
}

fn emit(settings: &ProgressSettings, stats: &RunStats, total: Option<u64>) {
    let snap = snapshot(stats, total);

    EventCounters::set_items_per_second(snap.items_per_second);
    let started = stats.started();
    if started > 0 {
        EventCounters::set_error_rate(stats.failed() as f64 / started as f64);
    }

    if let Some(callback) = &settings.on_progress {
        let callback = Arc::clone(callback);
        let snap = snap.clone();
        envelope::fire_and_forget("on_progress", move || callback(&snap));
    }
}
