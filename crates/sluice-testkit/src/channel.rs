//! A FIFO channel double with telemetry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

/// Error returned when writing to a completed channel.
#[derive(Debug, Error)]
#[error("channel write side is completed")]
pub struct ChannelCompleted<T>(pub T);

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
    completed: AtomicBool,
    write_count: AtomicU64,
    read_count: AtomicU64,
    readable: Notify,
    writable: Notify,
}

/// Bounded or unbounded FIFO with write/read telemetry.
///
/// Unlike a production channel, both sides live on one handle so tests
/// can inspect counts without threading split halves around.
#[derive(Clone)]
pub struct FakeChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FakeChannel<T> {
    /// Creates a channel holding at most `capacity` items.
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity >= 1, "capacity must be at least 1");
        Self::with_capacity(Some(capacity))
    }

    /// Creates a channel with no capacity bound.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                capacity,
                completed: AtomicBool::new(false),
                write_count: AtomicU64::new(0),
                read_count: AtomicU64::new(0),
                readable: Notify::new(),
                writable: Notify::new(),
            }),
        }
    }

    /// Writes one item, waiting for room in a bounded channel.
    pub async fn write(&self, item: T) -> Result<(), ChannelCompleted<T>> {
        loop {
            let writable = self.shared.writable.notified();

            if self.shared.completed.load(Ordering::SeqCst) {
                return Err(ChannelCompleted(item));
            }

            {
                let mut queue = self.shared.queue.lock().unwrap();
                let full = self
                    .shared
                    .capacity
                    .is_some_and(|capacity| queue.len() >= capacity);
                if !full {
                    queue.push_back(item);
                    self.shared.write_count.fetch_add(1, Ordering::SeqCst);
                    self.shared.readable.notify_waiters();
                    return Ok(());
                }
            }

            writable.await;
        }
    }

    /// Reads one item; `None` once the channel is completed and drained.
    pub async fn read(&self) -> Option<T> {
        loop {
            let readable = self.shared.readable.notified();

            {
                let mut queue = self.shared.queue.lock().unwrap();
                if let Some(item) = queue.pop_front() {
                    self.shared.read_count.fetch_add(1, Ordering::SeqCst);
                    self.shared.writable.notify_waiters();
                    return Some(item);
                }
            }

            if self.shared.completed.load(Ordering::SeqCst) {
                return None;
            }

            readable.await;
        }
    }

    /// Takes one item without waiting.
    pub fn try_read(&self) -> Option<T> {
        let mut queue = self.shared.queue.lock().unwrap();
        let item = queue.pop_front();
        if item.is_some() {
            self.shared.read_count.fetch_add(1, Ordering::SeqCst);
            self.shared.writable.notify_waiters();
        }
        item
    }

    /// Closes the write side; readers drain what remains.
    pub fn complete(&self) {
        self.shared.completed.store(true, Ordering::SeqCst);
        self.shared.readable.notify_waiters();
        self.shared.writable.notify_waiters();
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total successful writes.
    pub fn write_count(&self) -> u64 {
        self.shared.write_count.load(Ordering::SeqCst)
    }

    /// Total successful reads.
    pub fn read_count(&self) -> u64 {
        self.shared.read_count.load(Ordering::SeqCst)
    }
}

impl<T> std::fmt::Debug for FakeChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeChannel")
            .field("len", &self.len())
            .field("write_count", &self.write_count())
            .field("read_count", &self.read_count())
            .finish()
    }
}
