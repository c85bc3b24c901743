//! Lazy result streaming.

use crate::item::Outcome;
use crate::pipeline::RunningPipeline;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Lazy sequence of [`Outcome`]s produced by a streaming operator.
///
/// Dropping the stream cancels the pipeline: the source stops, in-flight
/// work observes cancellation, and the periodic observers make their
/// final emission.
pub struct OutcomeStream<R> {
    inner: RunningPipeline<R>,
}

impl<R> OutcomeStream<R> {
    pub(crate) fn new(inner: RunningPipeline<R>) -> Self {
        Self { inner }
    }

    /// Cancels the pipeline without consuming the stream; already
    /// produced outcomes can still be drained. Idempotent.
    pub fn cancel(&self) {
        self.inner.root.cancel();
    }

    /// True once the pipeline's root cancel has fired.
    pub fn is_cancelled(&self) -> bool {
        self.inner.root.is_cancelled()
    }
}

impl<R> Stream for OutcomeStream<R> {
    type Item = Outcome<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.inner.outcomes.poll_recv(cx)
    }
}

impl<R> Unpin for OutcomeStream<R> {}

impl<R> Drop for OutcomeStream<R> {
    fn drop(&mut self) {
        self.inner.root.cancel();
        if let Some(progress) = self.inner.progress.take() {
            // Signal only; the detached task makes its final emission.
            progress.cancel_now();
        }
        if let Some(metrics) = self.inner.metrics.take() {
            metrics.cancel_now();
        }
    }
}
