use sluice_core::events::OverlayEvent;
use std::time::{Duration, Instant};

/// Events emitted by the retry overlay.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be scheduled after a failed attempt.
    Retry {
        overlay_name: String,
        timestamp: Instant,
        /// 1-based number of the attempt that just failed.
        attempt: u32,
        /// Backoff delay before the next attempt.
        delay: Duration,
    },
    /// The chain ended in success (possibly after retries).
    Success {
        overlay_name: String,
        timestamp: Instant,
        /// Total attempts made, including the first.
        attempts: u32,
    },
    /// The chain exhausted every attempt and failed.
    Exhausted {
        overlay_name: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// A failure was classified non-transient and re-raised immediately.
    IgnoredError {
        overlay_name: String,
        timestamp: Instant,
    },
}

impl OverlayEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "Retry",
            RetryEvent::Success { .. } => "Success",
            RetryEvent::Exhausted { .. } => "Exhausted",
            RetryEvent::IgnoredError { .. } => "IgnoredError",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn overlay_name(&self) -> &str {
        match self {
            RetryEvent::Retry { overlay_name, .. }
            | RetryEvent::Success { overlay_name, .. }
            | RetryEvent::Exhausted { overlay_name, .. }
            | RetryEvent::IgnoredError { overlay_name, .. } => overlay_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_stable() {
        let now = Instant::now();
        let retry = RetryEvent::Retry {
            overlay_name: "test".to_string(),
            timestamp: now,
            attempt: 1,
            delay: Duration::from_millis(10),
        };
        assert_eq!(retry.event_type(), "Retry");
        assert_eq!(retry.overlay_name(), "test");

        let exhausted = RetryEvent::Exhausted {
            overlay_name: "test".to_string(),
            timestamp: now,
            attempts: 4,
        };
        assert_eq!(exhausted.event_type(), "Exhausted");
    }
}
