//! Subscription interface over the process-wide counter stream.
//!
//! Counters are shared by every pipeline in the process; a subscriber
//! receives the full sample set on its own interval and computes per-run
//! figures as deltas (see [`sluice_core::CounterSnapshot::delta_since`]).

use sluice_core::counters::{CounterSample, EventCounters};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A live counter subscription; dropping it stops the sampler.
pub struct CounterSubscription {
    receiver: mpsc::Receiver<Vec<CounterSample>>,
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl CounterSubscription {
    /// Receives the next sample set; `None` after [`Self::close`].
    pub async fn recv(&mut self) -> Option<Vec<CounterSample>> {
        self.receiver.recv().await
    }

    /// Stops the sampler; pending samples may still be received.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CounterSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Samples every process-wide counter on `interval` and delivers the
/// samples until the subscription is dropped.
pub fn subscribe_counters(interval: Duration) -> CounterSubscription {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let (tx, receiver) = mpsc::channel(16);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if tx.send(EventCounters::samples()).await.is_err() {
                        break;
                    }
                }
                _ = token.cancelled() => break,
            }
        }
    });

    CounterSubscription {
        receiver,
        cancel,
        _handle: handle,
    }
}
