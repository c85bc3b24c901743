use crate::{TimeLimiter, TimeoutConfig};
use std::sync::Arc;
use tower::Layer;

/// A [`Layer`] that applies a per-item deadline to an item operation.
#[derive(Clone)]
pub struct TimeoutLayer {
    config: Arc<TimeoutConfig>,
}

impl TimeoutLayer {
    /// Creates a new `TimeoutLayer` with the given configuration.
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeLimiter<S>;

    fn layer(&self, service: S) -> Self::Service {
        TimeLimiter::new(service, Arc::clone(&self.config))
    }
}
