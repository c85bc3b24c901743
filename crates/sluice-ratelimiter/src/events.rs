use sluice_core::events::OverlayEvent;
use std::time::{Duration, Instant};

/// Events emitted by the rate limiter overlay.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A token was granted, possibly after waiting.
    PermitAcquired {
        overlay_name: String,
        timestamp: Instant,
        /// Cumulative time spent waiting for accrual.
        waited: Duration,
    },
    /// The caller was throttled: a wait began, or the limiter refused in
    /// non-blocking mode.
    Throttled {
        overlay_name: String,
        timestamp: Instant,
        /// Time until the next token accrues.
        wait: Duration,
    },
}

impl OverlayEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "PermitAcquired",
            RateLimiterEvent::Throttled { .. } => "Throttled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::Throttled { timestamp, .. } => *timestamp,
        }
    }

    fn overlay_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { overlay_name, .. }
            | RateLimiterEvent::Throttled { overlay_name, .. } => overlay_name,
        }
    }
}
