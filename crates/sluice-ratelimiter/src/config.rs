use crate::events::RateLimiterEvent;
use sluice_core::error::ConfigError;
use sluice_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for the rate limiter overlay.
#[derive(Clone)]
pub struct RateLimiterConfig {
    pub(crate) tokens_per_second: f64,
    pub(crate) burst_capacity: u32,
    pub(crate) fail_on_empty: bool,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Creates a new builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

impl std::fmt::Debug for RateLimiterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterConfig")
            .field("tokens_per_second", &self.tokens_per_second)
            .field("burst_capacity", &self.burst_capacity)
            .field("fail_on_empty", &self.fail_on_empty)
            .field("name", &self.name)
            .finish()
    }
}

/// Builder for [`RateLimiterConfig`].
///
/// Defaults: 10 tokens/second, burst of 10, blocking acquisition.
pub struct RateLimiterConfigBuilder {
    tokens_per_second: f64,
    burst_capacity: u32,
    fail_on_empty: bool,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            tokens_per_second: 10.0,
            burst_capacity: 10,
            fail_on_empty: false,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Steady-state refill rate. Must be positive.
    pub fn tokens_per_second(mut self, rate: f64) -> Self {
        self.tokens_per_second = rate;
        self
    }

    /// Maximum tokens the bucket holds. Must be at least 1.
    pub fn burst_capacity(mut self, capacity: u32) -> Self {
        self.burst_capacity = capacity;
        self
    }

    /// When true, an empty bucket refuses the call with `Throttled`
    /// instead of waiting for a token to accrue.
    pub fn fail_on_empty(mut self, fail: bool) -> Self {
        self.fail_on_empty = fail;
        self
    }

    /// Registers a callback fired with the wait time whenever a caller is
    /// throttled.
    pub fn on_throttle<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Throttled { wait, .. } = event {
                f(*wait);
            }
        }));
        self
    }

    /// Sets the name for this limiter instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the rate limiter layer.
    ///
    /// # Panics
    ///
    /// Panics if `tokens_per_second` is not positive or `burst_capacity`
    /// is zero.
    pub fn build(self) -> crate::RateLimiterLayer {
        crate::RateLimiterLayer::new(self.into_config().expect("invalid rate limiter config"))
    }

    /// Finishes the builder, reporting option violations as
    /// [`ConfigError`]s instead of panicking.
    pub fn into_config(self) -> Result<RateLimiterConfig, ConfigError> {
        if self.tokens_per_second <= 0.0 {
            return Err(ConfigError::out_of_range(
                "tokens_per_second",
                "positive",
                self.tokens_per_second,
            ));
        }
        if self.burst_capacity < 1 {
            return Err(ConfigError::out_of_range(
                "burst_capacity",
                "at least 1",
                self.burst_capacity,
            ));
        }

        Ok(RateLimiterConfig {
            tokens_per_second: self.tokens_per_second,
            burst_capacity: self.burst_capacity,
            fail_on_empty: self.fail_on_empty,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}
