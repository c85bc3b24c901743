use sluice_core::events::OverlayEvent;
use std::time::{Duration, Instant};

/// Events emitted by the pipeline itself (overlays emit their own).
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// An item entered the worker stage.
    ItemStarted {
        overlay_name: String,
        timestamp: Instant,
        index: u64,
    },
    /// An item produced a successful outcome.
    ItemSucceeded {
        overlay_name: String,
        timestamp: Instant,
        index: u64,
        attempts: u32,
        duration: Duration,
    },
    /// An item produced a terminal failure.
    ItemFailed {
        overlay_name: String,
        timestamp: Instant,
        index: u64,
        /// Stable error-kind label (see `ItemError::kind`).
        kind: &'static str,
        attempts: u32,
    },
    /// A fallback value replaced a terminal failure.
    FallbackApplied {
        overlay_name: String,
        timestamp: Instant,
        index: u64,
    },
    /// The request channel drained after source exhaustion.
    Drained {
        overlay_name: String,
        timestamp: Instant,
    },
}

impl OverlayEvent for PipelineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::ItemStarted { .. } => "ItemStarted",
            PipelineEvent::ItemSucceeded { .. } => "ItemSucceeded",
            PipelineEvent::ItemFailed { .. } => "ItemFailed",
            PipelineEvent::FallbackApplied { .. } => "FallbackApplied",
            PipelineEvent::Drained { .. } => "Drained",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            PipelineEvent::ItemStarted { timestamp, .. }
            | PipelineEvent::ItemSucceeded { timestamp, .. }
            | PipelineEvent::ItemFailed { timestamp, .. }
            | PipelineEvent::FallbackApplied { timestamp, .. }
            | PipelineEvent::Drained { timestamp, .. } => *timestamp,
        }
    }

    fn overlay_name(&self) -> &str {
        match self {
            PipelineEvent::ItemStarted { overlay_name, .. }
            | PipelineEvent::ItemSucceeded { overlay_name, .. }
            | PipelineEvent::ItemFailed { overlay_name, .. }
            | PipelineEvent::FallbackApplied { overlay_name, .. }
            | PipelineEvent::Drained { overlay_name, .. } => overlay_name,
        }
    }
}
