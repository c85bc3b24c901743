use crate::{Retry, RetryConfig};
use std::sync::Arc;
use tower::Layer;

/// A [`Layer`] that wraps an item operation with a retry loop.
///
/// ```
/// use sluice_retry::{BackoffStrategy, RetryConfig};
/// use std::time::Duration;
///
/// let layer = RetryConfig::builder()
///     .max_retries(3)
///     .base_delay(Duration::from_millis(50))
///     .backoff(BackoffStrategy::ExponentialJitter)
///     .build();
/// ```
#[derive(Clone)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    /// Creates a new `RetryLayer` with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl std::fmt::Debug for RetryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryLayer")
            .field("config", &self.config)
            .finish()
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, Arc::clone(&self.config))
    }
}
