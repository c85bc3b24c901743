//! Deterministic virtual time.
//!
//! [`VirtualClock`] keeps a logical "now" that only moves when a test
//! calls [`VirtualClock::advance`]. Advancing executes every pending
//! delay whose deadline falls inside the advanced span, in deadline
//! order, stepping `now` to each deadline before finally settling on the
//! target. This makes `advance(a); advance(b)` indistinguishable from
//! `advance(a + b)`.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

struct ClockInner {
    now: Duration,
    seq: u64,
    pending: BTreeMap<(Duration, u64), oneshot::Sender<bool>>,
}

/// A manually driven clock for deterministic timer tests.
#[derive(Clone)]
pub struct VirtualClock {
    inner: Arc<Mutex<ClockInner>>,
}

impl VirtualClock {
    /// Creates a clock at logical time zero.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                now: Duration::ZERO,
                seq: 0,
                pending: BTreeMap::new(),
            })),
        }
    }

    /// The current logical time.
    pub fn now(&self) -> Duration {
        self.inner.lock().unwrap().now
    }

    /// Number of delays not yet elapsed or cancelled.
    pub fn pending_delays(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    /// Creates a delay completing `duration` after the current logical
    /// time. A zero duration completes immediately.
    ///
    /// The returned future resolves to `true` when the delay elapsed and
    /// `false` when it was cancelled by [`VirtualClock::reset`].
    pub fn delay(&self, duration: Duration) -> VirtualDelay {
        if duration.is_zero() {
            return VirtualDelay::immediate();
        }

        let mut inner = self.inner.lock().unwrap();
        let deadline = inner.now + duration;
        let seq = inner.seq;
        inner.seq += 1;

        let (tx, rx) = oneshot::channel();
        inner.pending.insert((deadline, seq), tx);
        VirtualDelay::pending(rx)
    }

    /// Moves logical time forward by `duration`, firing every delay whose
    /// deadline falls within the span, in deadline order.
    pub fn advance(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        let target = inner.now + duration;

        while let Some(((deadline, seq), tx)) = inner.pending.pop_first() {
            if deadline > target {
                // Not due yet; put it back and stop.
                inner.pending.insert((deadline, seq), tx);
                break;
            }
            // Time steps to each deadline in turn before reaching the target.
            inner.now = deadline;
            let _ = tx.send(true);
        }

        inner.now = target;
    }

    /// Cancels all pending delays and rewinds logical time to zero.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        for (_, tx) in std::mem::take(&mut inner.pending) {
            let _ = tx.send(false);
        }
        inner.now = Duration::ZERO;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now", &self.now())
            .field("pending_delays", &self.pending_delays())
            .finish()
    }
}

enum DelayState {
    Immediate,
    Pending(oneshot::Receiver<bool>),
}

/// Future returned by [`VirtualClock::delay`].
pub struct VirtualDelay {
    state: DelayState,
}

impl VirtualDelay {
    fn immediate() -> Self {
        Self {
            state: DelayState::Immediate,
        }
    }

    fn pending(rx: oneshot::Receiver<bool>) -> Self {
        Self {
            state: DelayState::Pending(rx),
        }
    }
}

impl Future for VirtualDelay {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            DelayState::Immediate => Poll::Ready(true),
            DelayState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(elapsed)) => Poll::Ready(elapsed),
                // A dropped clock counts as cancellation.
                Poll::Ready(Err(_)) => Poll::Ready(false),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
