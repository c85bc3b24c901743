use crate::circuit::CircuitPhase;
use crate::events::BreakerEvent;
use sluice_core::error::ConfigError;
use sluice_core::events::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Fired when the breaker changes phase. Dispatched fire-and-forget,
/// never under the state mutex.
pub type StateChangeCallback = Arc<dyn Fn(CircuitPhase, CircuitPhase) + Send + Sync>;

/// Configuration for the circuit breaker overlay.
#[derive(Clone)]
pub struct BreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) success_threshold: u32,
    pub(crate) open_timeout: Duration,
    pub(crate) sampling_duration: Duration,
    pub(crate) on_state_change: Option<StateChangeCallback>,
    pub(crate) event_listeners: EventListeners<BreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    /// Creates a new builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

impl std::fmt::Debug for BreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("open_timeout", &self.open_timeout)
            .field("sampling_duration", &self.sampling_duration)
            .field("name", &self.name)
            .finish()
    }
}

/// Builder for [`BreakerConfig`].
///
/// Defaults: 5 consecutive failures within 60 s open the circuit, 30 s
/// open timeout, one probe success closes it again.
pub struct BreakerConfigBuilder {
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
    sampling_duration: Duration,
    on_state_change: Option<StateChangeCallback>,
    event_listeners: EventListeners<BreakerEvent>,
    name: String,
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerConfigBuilder {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            open_timeout: Duration::from_secs(30),
            sampling_duration: Duration::from_secs(60),
            on_state_change: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Consecutive failures within the sampling window that open the
    /// circuit. Must be at least 1.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Probe successes required to close a half-open circuit. Also bounds
    /// how many probes may be outstanding at once. Must be at least 1.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// How long the circuit stays open before probing.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Window within which failures must be consecutive to count toward
    /// the threshold.
    pub fn sampling_duration(mut self, duration: Duration) -> Self {
        self.sampling_duration = duration;
        self
    }

    /// Registers the state-change callback.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitPhase, CircuitPhase) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    /// Registers a callback fired when a call is short-circuited.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, BreakerEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Sets the name for this breaker instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the breaker layer.
    ///
    /// # Panics
    ///
    /// Panics if `failure_threshold` or `success_threshold` is zero.
    pub fn build(self) -> crate::BreakerLayer {
        crate::BreakerLayer::new(self.into_config().expect("invalid circuit breaker config"))
    }

    /// Finishes the builder, reporting option violations as
    /// [`ConfigError`]s instead of panicking.
    pub fn into_config(self) -> Result<BreakerConfig, ConfigError> {
        if self.failure_threshold < 1 {
            return Err(ConfigError::out_of_range(
                "failure_threshold",
                "at least 1",
                self.failure_threshold,
            ));
        }
        if self.success_threshold < 1 {
            return Err(ConfigError::out_of_range(
                "success_threshold",
                "at least 1",
                self.success_threshold,
            ));
        }

        Ok(BreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout: self.open_timeout,
            sampling_duration: self.sampling_duration,
            on_state_change: self.on_state_change,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}
