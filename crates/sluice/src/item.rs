//! Work items and outcomes.

use sluice_core::context::WorkContext;
use sluice_core::error::ItemError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One input paired with its slot identity.
///
/// The index is assigned in source-arrival order and never reused;
/// retries bump the shared attempt counter on the same item instead of
/// minting a new one. Cloning (which the retry overlay does once per
/// attempt) shares the counter and the cancel token.
pub struct WorkItem<T> {
    index: u64,
    payload: T,
    cancel: CancellationToken,
    attempt: Arc<AtomicU32>,
}

impl<T> WorkItem<T> {
    pub(crate) fn new(index: u64, payload: T, cancel: CancellationToken) -> Self {
        Self {
            index,
            payload,
            cancel,
            attempt: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Source-arrival index, 0-based and strictly increasing.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The payload carried by this item.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Attempts recorded so far (0 before the first call begins).
    pub fn attempts(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    pub(crate) fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Clone> Clone for WorkItem<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            payload: self.payload.clone(),
            cancel: self.cancel.clone(),
            attempt: Arc::clone(&self.attempt),
        }
    }
}

impl<T: Clone + Send> WorkContext for WorkItem<T> {
    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn record_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::SeqCst);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("index", &self.index)
            .field("payload", &self.payload)
            .field("attempts", &self.attempts())
            .finish()
    }
}

/// Terminal result of one item.
#[derive(Debug)]
pub enum Outcome<R> {
    /// The operation produced a value.
    Success {
        /// Source-arrival index of the item.
        index: u64,
        /// The produced value.
        value: R,
    },
    /// The operation failed terminally (after any retries).
    Failure {
        /// Source-arrival index of the item.
        index: u64,
        /// The terminal error.
        error: ItemError,
        /// Attempts made, including the first.
        attempts: u32,
    },
}

impl<R> Outcome<R> {
    /// The item's source-arrival index.
    pub fn index(&self) -> u64 {
        match self {
            Outcome::Success { index, .. } | Outcome::Failure { index, .. } => *index,
        }
    }

    /// True for the success variant.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// The value, if this outcome is a success.
    pub fn into_value(self) -> Option<R> {
        match self {
            Outcome::Success { value, .. } => Some(value),
            Outcome::Failure { .. } => None,
        }
    }
}
