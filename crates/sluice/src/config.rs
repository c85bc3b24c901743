//! Pipeline configuration.

use crate::events::PipelineEvent;
use crate::observe::{MetricsSettings, ProgressSettings};
use sluice_adaptive::{AdaptiveConfig, AdaptiveConfigBuilder};
use sluice_circuitbreaker::{BreakerConfig, BreakerConfigBuilder};
use sluice_core::error::{ConfigError, ItemError};
use sluice_core::events::{EventListener, EventListeners};
use sluice_ratelimiter::{RateLimiterConfig, RateLimiterConfigBuilder};
use sluice_retry::{BackoffStrategy, RetryConfig, RetryLayer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How per-item failures surface at the run level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// First terminal failure cancels the run; a single error surfaces.
    #[default]
    FailFast,
    /// Failures accumulate; collecting operators raise one aggregate
    /// error containing per-index causes at the end.
    CollectAndContinue,
    /// Failures are swallowed; observable via counters and callbacks only.
    BestEffort,
}

pub(crate) type StartCallback = Arc<dyn Fn(u64) + Send + Sync>;
pub(crate) type CompleteCallback = Arc<dyn Fn(u64, u32, Duration) + Send + Sync>;
pub(crate) type ErrorCallback = Arc<dyn Fn(u64, &ItemError) + Send + Sync>;
pub(crate) type DrainCallback = Arc<dyn Fn() + Send + Sync>;
pub(crate) type FallbackNotify = Arc<dyn Fn(u64) + Send + Sync>;
pub(crate) type FallbackFn<R> = Arc<dyn Fn(&ItemError) -> Option<R> + Send + Sync>;

/// Immutable configuration for one pipeline run.
///
/// Built by [`ExecutionConfig::builder`]; validation happens at build
/// time, before any work starts. The generic parameter is the operation's
/// success type, used only by the optional [fallback]
/// hook (`ExecutionConfig<()>` for side-effect pipelines).
///
/// [fallback]: ExecutionConfigBuilder::fallback
pub struct ExecutionConfig<R> {
    pub(crate) name: String,
    pub(crate) max_concurrency: usize,
    pub(crate) ordered_output: bool,
    pub(crate) channel_capacity: usize,
    pub(crate) error_mode: ErrorMode,
    pub(crate) per_item_timeout: Option<Duration>,
    pub(crate) retry_layer: RetryLayer,
    pub(crate) circuit_breaker: Option<BreakerConfig>,
    pub(crate) rate_limit: Option<RateLimiterConfig>,
    pub(crate) adaptive: Option<AdaptiveConfig>,
    pub(crate) progress: Option<ProgressSettings>,
    pub(crate) metrics: Option<MetricsSettings>,
    pub(crate) cancel_token: Option<CancellationToken>,
    pub(crate) on_start: Option<StartCallback>,
    pub(crate) on_complete: Option<CompleteCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_drain: Option<DrainCallback>,
    pub(crate) on_fallback: Option<FallbackNotify>,
    pub(crate) fallback: Option<FallbackFn<R>>,
    pub(crate) event_listeners: EventListeners<PipelineEvent>,
}

// Manual impl: the config is cloneable regardless of whether R is.
impl<R> Clone for ExecutionConfig<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_concurrency: self.max_concurrency,
            ordered_output: self.ordered_output,
            channel_capacity: self.channel_capacity,
            error_mode: self.error_mode,
            per_item_timeout: self.per_item_timeout,
            retry_layer: self.retry_layer.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            rate_limit: self.rate_limit.clone(),
            adaptive: self.adaptive.clone(),
            progress: self.progress.clone(),
            metrics: self.metrics.clone(),
            cancel_token: self.cancel_token.clone(),
            on_start: self.on_start.clone(),
            on_complete: self.on_complete.clone(),
            on_error: self.on_error.clone(),
            on_drain: self.on_drain.clone(),
            on_fallback: self.on_fallback.clone(),
            fallback: self.fallback.clone(),
            event_listeners: self.event_listeners.clone(),
        }
    }
}

impl<R> std::fmt::Debug for ExecutionConfig<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("name", &self.name)
            .field("max_concurrency", &self.max_concurrency)
            .field("ordered_output", &self.ordered_output)
            .field("channel_capacity", &self.channel_capacity)
            .field("error_mode", &self.error_mode)
            .field("per_item_timeout", &self.per_item_timeout)
            .field("retry_layer", &self.retry_layer)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limit", &self.rate_limit)
            .field("adaptive", &self.adaptive)
            .field("progress", &self.progress)
            .field("metrics", &self.metrics)
            .field("cancel_token", &self.cancel_token)
            .finish()
    }
}

impl<R> ExecutionConfig<R> {
    /// Creates a new builder with defaults.
    pub fn builder() -> ExecutionConfigBuilder<R> {
        ExecutionConfigBuilder::new()
    }

    /// Preset for I/O-bound work: wide pool, jittered retries.
    pub fn io_bound() -> ExecutionConfigBuilder<R> {
        Self::builder()
            .max_concurrency(32)
            .max_retries(3)
            .base_delay(Duration::from_millis(100))
            .backoff_strategy(BackoffStrategy::ExponentialJitter)
    }

    /// Preset for CPU-bound work: one worker per core, no retries.
    pub fn cpu_bound() -> ExecutionConfigBuilder<R> {
        Self::builder().max_concurrency(default_concurrency()).max_retries(0)
    }

    /// The configured worker count.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Whether results are emitted in source order.
    pub fn ordered_output(&self) -> bool {
        self.ordered_output
    }

    /// The configured error mode.
    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Builder for [`ExecutionConfig`].
///
/// Defaults: worker count = available parallelism, no retries, unordered
/// output, fail-fast error mode, request-channel capacity of
/// `2 × max_concurrency`.
pub struct ExecutionConfigBuilder<R> {
    name: String,
    max_concurrency: usize,
    max_retries: u32,
    base_delay: Duration,
    backoff: BackoffStrategy,
    is_transient: Option<sluice_retry::TransientClassifier>,
    on_retry: Option<Arc<dyn Fn(u32, Duration) + Send + Sync>>,
    per_item_timeout: Option<Duration>,
    error_mode: ErrorMode,
    ordered_output: bool,
    channel_capacity: Option<usize>,
    circuit_breaker: Option<BreakerConfigBuilder>,
    rate_limit: Option<RateLimiterConfigBuilder>,
    adaptive: Option<AdaptiveConfigBuilder>,
    progress: Option<ProgressSettings>,
    metrics: Option<MetricsSettings>,
    cancel_token: Option<CancellationToken>,
    on_start: Option<StartCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    on_drain: Option<DrainCallback>,
    on_fallback: Option<FallbackNotify>,
    fallback: Option<FallbackFn<R>>,
    event_listeners: EventListeners<PipelineEvent>,
}

impl<R> Default for ExecutionConfigBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ExecutionConfigBuilder<R> {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_concurrency: default_concurrency(),
            max_retries: 0,
            base_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Exponential,
            is_transient: None,
            on_retry: None,
            per_item_timeout: None,
            error_mode: ErrorMode::default(),
            ordered_output: false,
            channel_capacity: None,
            circuit_breaker: None,
            rate_limit: None,
            adaptive: None,
            progress: None,
            metrics: None,
            cancel_token: None,
            on_start: None,
            on_complete: None,
            on_error: None,
            on_drain: None,
            on_fallback: None,
            fallback: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Names the pipeline; the name labels events, logs and metrics.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Worker count; at most this many user operations run at once.
    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = workers;
        self
    }

    /// Retries after the first attempt (0 disables retrying).
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Initial retry delay fed into the backoff strategy.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Backoff strategy for retries.
    pub fn backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Replaces the transient classifier used by the retry overlay.
    pub fn is_transient<F>(mut self, f: F) -> Self
    where
        F: Fn(&ItemError) -> bool + Send + Sync + 'static,
    {
        self.is_transient = Some(Arc::new(f));
        self
    }

    /// Per-item hard deadline.
    pub fn per_item_timeout(mut self, timeout: Duration) -> Self {
        self.per_item_timeout = Some(timeout);
        self
    }

    /// How failures surface; see [`ErrorMode`].
    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Emit results in ascending source order.
    pub fn ordered_output(mut self, ordered: bool) -> Self {
        self.ordered_output = ordered;
        self
    }

    /// Request-channel depth (backpressure against fast producers).
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Attaches a circuit breaker; see [`BreakerConfigBuilder`].
    pub fn circuit_breaker<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(BreakerConfigBuilder) -> BreakerConfigBuilder,
    {
        self.circuit_breaker = Some(configure(BreakerConfig::builder()));
        self
    }

    /// Attaches a rate limiter; see [`RateLimiterConfigBuilder`].
    pub fn rate_limit<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(RateLimiterConfigBuilder) -> RateLimiterConfigBuilder,
    {
        self.rate_limit = Some(configure(RateLimiterConfig::builder()));
        self
    }

    /// Attaches adaptive concurrency control; see
    /// [`AdaptiveConfigBuilder`].
    pub fn adaptive_concurrency<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(AdaptiveConfigBuilder) -> AdaptiveConfigBuilder,
    {
        self.adaptive = Some(configure(AdaptiveConfig::builder()));
        self
    }

    /// Enables periodic progress reporting.
    pub fn progress<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(ProgressSettings) -> ProgressSettings,
    {
        self.progress = Some(configure(ProgressSettings::default()));
        self
    }

    /// Enables trailing-window metric aggregation.
    pub fn metrics<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(MetricsSettings) -> MetricsSettings,
    {
        self.metrics = Some(configure(MetricsSettings::default()));
        self
    }

    /// External cancel token governing the run.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Awaited lifecycle callback fired with the item index before the
    /// operation begins. A panic here fails the item.
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Awaited lifecycle callback fired with `(index, attempts, latency)`
    /// after a success. A panic here fails the item.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, u32, Duration) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Fire-and-forget callback for terminal failures.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, &ItemError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Fire-and-forget callback fired once per retry with
    /// `(failed_attempt, delay)`.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    /// Fire-and-forget callback fired when the request channel drains
    /// after source exhaustion (once per run).
    pub fn on_drain<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_drain = Some(Arc::new(f));
        self
    }

    /// Fire-and-forget callback fired when a fallback value replaced a
    /// failure.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(f));
        self
    }

    /// Installs a fallback: terminal failures (other than cancellation)
    /// are offered to `f`, and a `Some` return converts the item into a
    /// success.
    pub fn fallback<F>(mut self, f: F) -> Self
    where
        F: Fn(&ItemError) -> Option<R> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(f));
        self
    }

    /// Registers a listener for [`PipelineEvent`]s.
    pub fn on_pipeline_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<PipelineEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Validates the options and builds the config.
    pub fn build(self) -> Result<ExecutionConfig<R>, ConfigError> {
        if self.max_concurrency < 1 {
            return Err(ConfigError::out_of_range(
                "max_concurrency",
                "at least 1",
                self.max_concurrency,
            ));
        }
        if let Some(capacity) = self.channel_capacity {
            if capacity < 1 {
                return Err(ConfigError::out_of_range(
                    "channel_capacity",
                    "at least 1",
                    capacity,
                ));
            }
        }
        if let Some(timeout) = self.per_item_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::out_of_range(
                    "per_item_timeout",
                    "non-zero",
                    "0s",
                ));
            }
        }
        if let Some(progress) = &self.progress {
            if progress.report_interval.is_zero() {
                return Err(ConfigError::out_of_range(
                    "progress.report_interval",
                    "non-zero",
                    "0s",
                ));
            }
        }
        if let Some(metrics) = &self.metrics {
            if metrics.sample_interval.is_zero() {
                return Err(ConfigError::out_of_range(
                    "metrics.sample_interval",
                    "non-zero",
                    "0s",
                ));
            }
        }

        let circuit_breaker = self
            .circuit_breaker
            .map(|builder| builder.into_config())
            .transpose()?;
        let rate_limit = self
            .rate_limit
            .map(|builder| builder.into_config())
            .transpose()?;
        let adaptive = self
            .adaptive
            .map(|builder| builder.into_config())
            .transpose()?;

        if let Some(adaptive) = &adaptive {
            // Workers are the physical bound; an adaptive ceiling above
            // them could never be reached.
            if adaptive.max_concurrency() > self.max_concurrency {
                return Err(ConfigError::Inconsistent {
                    reason: "adaptive_concurrency.max exceeds max_concurrency",
                });
            }
        }

        let mut retry = RetryConfig::builder()
            .max_retries(self.max_retries)
            .base_delay(self.base_delay)
            .backoff(self.backoff)
            .name(self.name.clone());
        if let Some(classifier) = self.is_transient {
            retry = retry.classify(move |error| classifier(error));
        }
        if let Some(on_retry) = self.on_retry {
            retry = retry.on_retry(move |attempt, delay| on_retry(attempt, delay));
        }
        let retry_layer = retry.build();

        Ok(ExecutionConfig {
            name: self.name,
            max_concurrency: self.max_concurrency,
            ordered_output: self.ordered_output,
            channel_capacity: self
                .channel_capacity
                .unwrap_or(self.max_concurrency.saturating_mul(2)),
            error_mode: self.error_mode,
            per_item_timeout: self.per_item_timeout,
            retry_layer,
            circuit_breaker,
            rate_limit,
            adaptive,
            progress: self.progress,
            metrics: self.metrics,
            cancel_token: self.cancel_token,
            on_start: self.on_start,
            on_complete: self.on_complete,
            on_error: self.on_error,
            on_drain: self.on_drain,
            on_fallback: self.on_fallback,
            fallback: self.fallback,
            event_listeners: self.event_listeners,
        })
    }
}
