//! Per-item context seen by overlays.
//!
//! Overlays stay generic over the request type; the engine's work item
//! implements [`WorkContext`] so the timeout overlay can re-root the
//! item's cancel token and the retry overlay can record attempts and
//! abort backoff sleeps on cancellation.

use tokio_util::sync::CancellationToken;

/// Access to the per-item state overlays need.
///
/// The attempt counter is logically part of the work item: retries do not
/// mint new items, they bump the attempt on the same one, so
/// [`WorkContext::record_attempt`] must be visible through clones of the
/// request (the retry overlay clones the request for each attempt).
pub trait WorkContext: Clone + Send {
    /// The cancel token governing this item.
    fn cancel_token(&self) -> &CancellationToken;

    /// Replaces the item's cancel token, returning the item.
    ///
    /// Used by the timeout overlay to substitute a child token whose
    /// cancellation it controls.
    fn with_cancel_token(self, token: CancellationToken) -> Self;

    /// Records that attempt `attempt` (1-based) is starting.
    fn record_attempt(&self, attempt: u32);
}
