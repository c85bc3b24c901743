use crate::bucket::SharedBucket;
use crate::{RateLimiter, RateLimiterConfig};
use std::sync::Arc;
use tower::Layer;

/// A [`Layer`] that applies token-bucket rate limiting to an item
/// operation.
///
/// All services produced by one layer draw from the same bucket, so a
/// worker pool layering its per-worker clones shares one reservoir.
#[derive(Clone)]
pub struct RateLimiterLayer {
    config: Arc<RateLimiterConfig>,
    bucket: SharedBucket,
}

impl RateLimiterLayer {
    /// Creates a new `RateLimiterLayer` with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        let bucket = SharedBucket::new(config.tokens_per_second, config.burst_capacity);
        Self {
            config: Arc::new(config),
            bucket,
        }
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiter<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimiter::new(service, Arc::clone(&self.config), self.bucket.clone())
    }
}
