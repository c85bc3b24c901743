//! Event system shared by the engine and its overlays.
//!
//! Each overlay (retry, breaker, limiter, timeout) and the pipeline itself
//! emits typed events through an [`EventListeners`] collection. Listeners
//! are fire-and-forget: a panicking listener is caught, logged, counted,
//! and never prevents the remaining listeners from running.

#[cfg(feature = "tracing")]
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::counters::EventCounters;

/// Trait for events emitted by the engine or an overlay.
pub trait OverlayEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g., "retry", "state_transition").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the overlay or pipeline instance that emitted
    /// this event.
    fn overlay_name(&self) -> &str;
}

/// Trait for listening to overlay events.
pub trait EventListener<E: OverlayEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: OverlayEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: OverlayEvent> EventListeners<E> {
    /// Creates a new empty event listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener to the collection.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// A panicking listener is caught so the remaining listeners still run.
    /// Each caught panic increments the process-wide `callback-failures`
    /// counter; with the `tracing` feature enabled it is also logged.
    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(_panic_payload) = result {
                EventCounters::record_callback_failure();

                #[cfg(feature = "tracing")]
                log_listener_panic(index, event, _panic_payload.as_ref());

                #[cfg(feature = "metrics")]
                record_listener_panic_metric(event);

                #[cfg(not(feature = "tracing"))]
                let _ = index;
            }
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: OverlayEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: OverlayEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

#[cfg(feature = "tracing")]
fn log_listener_panic<E: OverlayEvent>(
    index: usize,
    event: &E,
    panic_payload: &(dyn Any + Send),
) {
    let panic_message = panic_payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic_payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    tracing::warn!(
        listener_index = index,
        overlay = event.overlay_name(),
        event_type = event.event_type(),
        panic_message = %panic_message,
        "event listener panicked"
    );
}

#[cfg(feature = "metrics")]
fn record_listener_panic_metric<E: OverlayEvent>(event: &E) {
    let overlay_label = event.overlay_name().to_string();
    let event_type_label = event.event_type().to_string();

    metrics::counter!(
        "sluice_event_listener_panics_total",
        "overlay" => overlay_label,
        "event_type" => event_type_label
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestEvent {
        name: String,
        timestamp: Instant,
    }

    impl OverlayEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "test"
        }

        fn timestamp(&self) -> Instant {
            self.timestamp
        }

        fn overlay_name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn listeners_receive_every_emit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(move |_event: &TestEvent| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        let event = TestEvent {
            name: "test".to_string(),
            timestamp: Instant::now(),
        };

        listeners.emit(&event);
        listeners.emit(&event);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_the_rest() {
        let survivors = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&survivors);

        let before = EventCounters::snapshot().callback_failures;

        let mut listeners = EventListeners::new();
        listeners.add(FnListener::new(|_: &TestEvent| panic!("boom")));
        listeners.add(FnListener::new(move |_: &TestEvent| {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        listeners.emit(&TestEvent {
            name: "panic-test".to_string(),
            timestamp: Instant::now(),
        });

        assert_eq!(survivors.load(Ordering::SeqCst), 1);
        assert!(EventCounters::snapshot().callback_failures > before);
    }

    #[test]
    fn len_and_is_empty() {
        let mut listeners: EventListeners<TestEvent> = EventListeners::new();
        assert!(listeners.is_empty());
        listeners.add(FnListener::new(|_: &TestEvent| {}));
        assert_eq!(listeners.len(), 1);
    }
}
