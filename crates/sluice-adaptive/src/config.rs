use sluice_core::error::ConfigError;
use std::sync::Arc;
use std::time::Duration;

/// Fired when the effective limit changes: `(old, new)`.
pub type LimitChangeCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Configuration for the adaptive concurrency controller.
#[derive(Clone)]
pub struct AdaptiveConfig {
    pub(crate) min_concurrency: usize,
    pub(crate) max_concurrency: usize,
    pub(crate) target_latency: Duration,
    pub(crate) min_success_rate: f64,
    pub(crate) sampling_interval: Duration,
    pub(crate) on_limit_change: Option<LimitChangeCallback>,
}

impl AdaptiveConfig {
    /// Creates a new builder.
    pub fn builder() -> AdaptiveConfigBuilder {
        AdaptiveConfigBuilder::new()
    }

    /// The configured floor.
    pub fn min_concurrency(&self) -> usize {
        self.min_concurrency
    }

    /// The configured ceiling (also the starting limit).
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

impl std::fmt::Debug for AdaptiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveConfig")
            .field("min_concurrency", &self.min_concurrency)
            .field("max_concurrency", &self.max_concurrency)
            .field("target_latency", &self.target_latency)
            .field("min_success_rate", &self.min_success_rate)
            .field("sampling_interval", &self.sampling_interval)
            .finish()
    }
}

/// Builder for [`AdaptiveConfig`].
///
/// Defaults: limits `[1, 16]`, 100 ms target latency, 90% minimum success
/// rate, 250 ms sampling interval.
pub struct AdaptiveConfigBuilder {
    min_concurrency: usize,
    max_concurrency: usize,
    target_latency: Duration,
    min_success_rate: f64,
    sampling_interval: Duration,
    on_limit_change: Option<LimitChangeCallback>,
}

impl Default for AdaptiveConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveConfigBuilder {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            min_concurrency: 1,
            max_concurrency: 16,
            target_latency: Duration::from_millis(100),
            min_success_rate: 0.9,
            sampling_interval: Duration::from_millis(250),
            on_limit_change: None,
        }
    }

    /// Floor for the effective limit. Must be at least 1.
    pub fn min_concurrency(mut self, min: usize) -> Self {
        self.min_concurrency = min;
        self
    }

    /// Ceiling for the effective limit (also the starting value).
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// The latency SLO; p50 is compared against `1.25×` and `0.75×` of it.
    pub fn target_latency(mut self, target: Duration) -> Self {
        self.target_latency = target;
        self
    }

    /// Success rate below which the limit decreases. Must be in `[0, 1]`.
    pub fn min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate;
        self
    }

    /// How often the trailing window is re-evaluated.
    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Registers a callback fired with `(old, new)` on each limit change.
    pub fn on_limit_change<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_limit_change = Some(Arc::new(f));
        self
    }

    /// Builds the config.
    ///
    /// # Panics
    ///
    /// Panics if the limits are zero or inverted, or the success rate is
    /// outside `[0, 1]`.
    pub fn build(self) -> AdaptiveConfig {
        self.into_config().expect("invalid adaptive concurrency config")
    }

    /// Finishes the builder, reporting option violations as
    /// [`ConfigError`]s instead of panicking.
    pub fn into_config(self) -> Result<AdaptiveConfig, ConfigError> {
        if self.min_concurrency < 1 {
            return Err(ConfigError::out_of_range(
                "min_concurrency",
                "at least 1",
                self.min_concurrency,
            ));
        }
        if self.max_concurrency < self.min_concurrency {
            return Err(ConfigError::out_of_range(
                "max_concurrency",
                "at least min_concurrency",
                self.max_concurrency,
            ));
        }
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(ConfigError::out_of_range(
                "min_success_rate",
                "within [0, 1]",
                self.min_success_rate,
            ));
        }
        if self.sampling_interval.is_zero() {
            return Err(ConfigError::out_of_range(
                "sampling_interval",
                "non-zero",
                "0s",
            ));
        }

        Ok(AdaptiveConfig {
            min_concurrency: self.min_concurrency,
            max_concurrency: self.max_concurrency,
            target_latency: self.target_latency,
            min_success_rate: self.min_success_rate,
            sampling_interval: self.sampling_interval,
            on_limit_change: self.on_limit_change,
        })
    }
}
