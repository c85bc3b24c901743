use sluice_core::events::OverlayEvent;
use std::time::{Duration, Instant};

/// Events emitted by the timeout overlay.
#[derive(Debug, Clone)]
pub enum TimeoutEvent {
    /// The call completed (success or failure) within the deadline.
    Completed {
        overlay_name: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The per-item deadline elapsed and the item's child token was
    /// cancelled.
    TimedOut {
        overlay_name: String,
        timestamp: Instant,
        limit: Duration,
    },
}

impl OverlayEvent for TimeoutEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TimeoutEvent::Completed { .. } => "Completed",
            TimeoutEvent::TimedOut { .. } => "TimedOut",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            TimeoutEvent::Completed { timestamp, .. }
            | TimeoutEvent::TimedOut { timestamp, .. } => *timestamp,
        }
    }

    fn overlay_name(&self) -> &str {
        match self {
            TimeoutEvent::Completed { overlay_name, .. }
            | TimeoutEvent::TimedOut { overlay_name, .. } => overlay_name,
        }
    }
}
