use crate::backoff::BackoffStrategy;
use crate::events::RetryEvent;
use crate::policy::RetryPolicy;
use sluice_core::error::ItemError;
use sluice_core::events::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the retry overlay.
pub struct RetryConfig {
    pub(crate) policy: RetryPolicy,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl RetryConfig {
    /// Creates a new builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("policy", &self.policy)
            .field("name", &self.name)
            .finish()
    }
}

/// Builder for [`RetryConfig`].
///
/// Defaults: no retries, 100 ms base delay, exponential backoff, the
/// default transient classifier.
pub struct RetryConfigBuilder {
    max_retries: u32,
    base_delay: Duration,
    strategy: BackoffStrategy,
    classifier: Option<crate::policy::TransientClassifier>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(100),
            strategy: BackoffStrategy::Exponential,
            classifier: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Retries after the first attempt; total attempts are `1 + max_retries`.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Initial backoff delay fed into the strategy.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Backoff strategy; see [`BackoffStrategy`].
    pub fn backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the transient classifier. Returning `false` re-raises the
    /// failure immediately.
    pub fn classify<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&ItemError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Sets the name for this retry instance (used in events).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback fired when a retry is about to be scheduled.
    ///
    /// Receives the 1-based number of the attempt that failed and the
    /// backoff delay before the next one.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback fired when the chain ends in success; receives
    /// the total attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback fired when every attempt has been exhausted.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the retry layer.
    pub fn build(self) -> crate::RetryLayer {
        let mut policy = RetryPolicy::new(self.max_retries, self.base_delay, self.strategy);
        if let Some(classifier) = self.classifier {
            policy.classifier = classifier;
        }

        crate::RetryLayer::new(RetryConfig {
            policy,
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
        let _layer = RetryConfig::builder().build();
    }

    #[test]
    fn builder_custom_values() {
        let _layer = RetryConfig::builder()
            .max_retries(5)
            .base_delay(Duration::from_millis(25))
            .backoff(BackoffStrategy::DecorrelatedJitter)
            .name("bulk-import")
            .build();
    }

    #[test]
    fn listener_sugar_compiles() {
        let _layer = RetryConfig::builder()
            .on_retry(|_, _| {})
            .on_success(|_| {})
            .on_exhausted(|_| {})
            .build();
    }
}
