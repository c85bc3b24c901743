use crate::circuit::CircuitPhase;
use sluice_core::events::OverlayEvent;
use std::time::Instant;

/// Events emitted by the circuit breaker overlay.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker changed phase.
    StateTransition {
        overlay_name: String,
        timestamp: Instant,
        from: CircuitPhase,
        to: CircuitPhase,
    },
    /// A call was admitted (including half-open probes).
    CallPermitted {
        overlay_name: String,
        timestamp: Instant,
        phase: CircuitPhase,
    },
    /// A call was short-circuited.
    CallRejected {
        overlay_name: String,
        timestamp: Instant,
    },
    /// An admitted call succeeded.
    SuccessRecorded {
        overlay_name: String,
        timestamp: Instant,
        phase: CircuitPhase,
    },
    /// An admitted call failed.
    FailureRecorded {
        overlay_name: String,
        timestamp: Instant,
        phase: CircuitPhase,
    },
}

impl OverlayEvent for BreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "StateTransition",
            BreakerEvent::CallPermitted { .. } => "CallPermitted",
            BreakerEvent::CallRejected { .. } => "CallRejected",
            BreakerEvent::SuccessRecorded { .. } => "SuccessRecorded",
            BreakerEvent::FailureRecorded { .. } => "FailureRecorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BreakerEvent::StateTransition { timestamp, .. }
            | BreakerEvent::CallPermitted { timestamp, .. }
            | BreakerEvent::CallRejected { timestamp, .. }
            | BreakerEvent::SuccessRecorded { timestamp, .. }
            | BreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn overlay_name(&self) -> &str {
        match self {
            BreakerEvent::StateTransition { overlay_name, .. }
            | BreakerEvent::CallPermitted { overlay_name, .. }
            | BreakerEvent::CallRejected { overlay_name, .. }
            | BreakerEvent::SuccessRecorded { overlay_name, .. }
            | BreakerEvent::FailureRecorded { overlay_name, .. } => overlay_name,
        }
    }
}
