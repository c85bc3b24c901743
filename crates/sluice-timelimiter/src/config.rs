use crate::events::TimeoutEvent;
use sluice_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for the timeout overlay.
pub struct TimeoutConfig {
    pub(crate) limit: Duration,
    pub(crate) event_listeners: EventListeners<TimeoutEvent>,
    pub(crate) name: String,
}

impl TimeoutConfig {
    /// Creates a new builder.
    pub fn builder() -> TimeoutConfigBuilder {
        TimeoutConfigBuilder::new()
    }
}

/// Builder for [`TimeoutConfig`]. Default limit: 30 seconds.
pub struct TimeoutConfigBuilder {
    limit: Duration,
    event_listeners: EventListeners<TimeoutEvent>,
    name: String,
}

impl Default for TimeoutConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutConfigBuilder {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            limit: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// The per-item hard deadline. Must be non-zero.
    pub fn limit(mut self, limit: Duration) -> Self {
        self.limit = limit;
        self
    }

    /// Registers a callback fired when a deadline elapses.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeoutEvent::TimedOut { limit, .. } = event {
                f(*limit);
            }
        }));
        self
    }

    /// Sets the name for this instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the timeout layer.
    ///
    /// # Panics
    ///
    /// Panics if the limit is zero.
    pub fn build(self) -> crate::TimeoutLayer {
        assert!(!self.limit.is_zero(), "timeout limit must be non-zero");
        crate::TimeoutLayer::new(TimeoutConfig {
            limit: self.limit,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let _layer = TimeoutConfig::builder().build();
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_limit_is_rejected() {
        let _ = TimeoutConfig::builder().limit(Duration::ZERO).build();
    }
}
