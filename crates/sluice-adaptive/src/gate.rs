//! Admission gate over the adaptive controller.
//!
//! The dispatcher calls [`AdaptiveGate::admit`] before handing a worker a
//! new item; the returned permit is completed with the item's latency and
//! outcome. In-flight work is never interrupted by a limit decrease: the
//! gate only slows admissions until completions bring the in-flight count
//! back under the effective limit.

use crate::config::AdaptiveConfig;
use crate::controller::AdaptiveController;
use sluice_core::envelope;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct GateShared {
    controller: AdaptiveController,
    in_flight: AtomicUsize,
    notify: Notify,
    config: AdaptiveConfig,
}

/// Gate handed to the dispatcher; clones share one controller.
#[derive(Clone)]
pub struct AdaptiveGate {
    shared: Arc<GateShared>,
}

impl AdaptiveGate {
    /// Creates a gate from the given configuration.
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            shared: Arc::new(GateShared {
                controller: AdaptiveController::new(config.clone()),
                in_flight: AtomicUsize::new(0),
                notify: Notify::new(),
                config,
            }),
        }
    }

    /// The current effective concurrency limit.
    pub fn effective_limit(&self) -> usize {
        self.shared.controller.effective_limit()
    }

    /// Items currently admitted but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    /// Waits until the effective limit admits one more item.
    pub async fn admit(&self) -> AdmitPermit {
        loop {
            // Register for wakeups before re-checking, so a release between
            // the check and the await cannot be missed.
            let notified = self.shared.notify.notified();

            if self.try_admit() {
                return AdmitPermit {
                    shared: Arc::clone(&self.shared),
                    completed: false,
                };
            }

            notified.await;
        }
    }

    fn try_admit(&self) -> bool {
        loop {
            let current = self.shared.in_flight.load(Ordering::Relaxed);
            if current >= self.shared.controller.effective_limit() {
                return false;
            }
            if self
                .shared
                .in_flight
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }
}

impl std::fmt::Debug for AdaptiveGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveGate")
            .field("effective_limit", &self.effective_limit())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Proof of admission; completing (or dropping) it releases the slot.
pub struct AdmitPermit {
    shared: Arc<GateShared>,
    completed: bool,
}

impl AdmitPermit {
    /// Reports the item's latency and outcome to the controller and
    /// releases the admission slot.
    pub fn complete(mut self, latency: Duration, ok: bool) {
        self.completed = true;
        let change = self.shared.controller.record(latency, ok);
        self.release();

        if let Some((old, new)) = change {
            if let Some(callback) = &self.shared.config.on_limit_change {
                let callback = Arc::clone(callback);
                envelope::fire_and_forget("on_limit_change", move || callback(old, new));
            }
        }
    }

    fn release(&self) {
        self.shared.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.shared.notify.notify_waiters();
    }
}

impl Drop for AdmitPermit {
    fn drop(&mut self) {
        if !self.completed {
            self.release();
        }
    }
}
