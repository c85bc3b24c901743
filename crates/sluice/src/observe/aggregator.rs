//! Trailing-window metric aggregation over raw counter samples.

use sluice_core::counters::{CounterSample, EventCounters};
use sluice_core::envelope;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Aggregate of one metric over the trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedMetrics {
    /// Stable counter name (see [`EventCounters::samples`]).
    pub name: &'static str,
    /// Smallest sampled value in the window.
    pub min: f64,
    /// Largest sampled value in the window.
    pub max: f64,
    /// Mean of the sampled values.
    pub average: f64,
    /// The most recent sample.
    pub current: f64,
    /// Samples in the window.
    pub sample_count: usize,
}

/// Callback receiving one aggregate per metric per window.
pub type SampleCallback = Arc<dyn Fn(&[AggregatedMetrics]) + Send + Sync>;

/// Metric aggregation options. Default: sample every second, aggregate a
/// ten-second trailing window.
#[derive(Clone)]
pub struct MetricsSettings {
    pub(crate) sample_interval: Duration,
    pub(crate) window: Duration,
    pub(crate) on_sample: Option<SampleCallback>,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            window: Duration::from_secs(10),
            on_sample: None,
        }
    }
}

impl std::fmt::Debug for MetricsSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSettings")
            .field("sample_interval", &self.sample_interval)
            .field("window", &self.window)
            .finish()
    }
}

impl MetricsSettings {
    /// How often the counters are sampled.
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Length of the trailing window aggregates are computed over.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// The aggregate callback (fire-and-forget; panics are contained).
    pub fn on_sample<F>(mut self, f: F) -> Self
    where
        F: Fn(&[AggregatedMetrics]) + Send + Sync + 'static,
    {
        self.on_sample = Some(Arc::new(f));
        self
    }
}

/// The periodic sampler task; same teardown discipline as the progress
/// reporter.
pub(crate) struct MetricsSampler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl MetricsSampler {
    pub(crate) fn spawn(settings: MetricsSettings) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut window: VecDeque<(Instant, Vec<CounterSample>)> = VecDeque::new();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(settings.sample_interval) => {
                        sample_and_emit(&settings, &mut window);
                    }
                    _ = token.cancelled() => {
                        sample_and_emit(&settings, &mut window);
                        break;
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    pub(crate) fn cancel_now(&self) {
        self.cancel.cancel();
    }

    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if tokio::time::timeout(Duration::from_secs(1), self.handle)
            .await
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("metrics sampler did not stop in time");
        }
    }
}

fn sample_and_emit(settings: &MetricsSettings, window: &mut VecDeque<(Instant, Vec<CounterSample>)>) {
    let now = Instant::now();
    window.push_back((now, EventCounters::samples()));
    while let Some((at, _)) = window.front() {
        if now.duration_since(*at) > settings.window {
            window.pop_front();
        } else {
            break;
        }
    }

    let aggregates = aggregate(window);
    if let Some(callback) = &settings.on_sample {
        let callback = Arc::clone(callback);
        envelope::fire_and_forget("on_metrics_sample", move || callback(&aggregates));
    }
}

fn aggregate(window: &VecDeque<(Instant, Vec<CounterSample>)>) -> Vec<AggregatedMetrics> {
    let Some((_, latest)) = window.back() else {
        return Vec::new();
    };

    latest
        .iter()
        .map(|sample| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut sum = 0.0;
            let mut count = 0usize;

            for (_, samples) in window {
                if let Some(s) = samples.iter().find(|s| s.name == sample.name) {
                    min = min.min(s.value);
                    max = max.max(s.value);
                    sum += s.value;
                    count += 1;
                }
            }

            AggregatedMetrics {
                name: sample.name,
                min,
                max,
                average: sum / count as f64,
                current: sample.value,
                sample_count: count,
            }
        })
        .collect()
}
