//! Guarded invocation of user callbacks.
//!
//! Two disciplines, per the engine contract:
//! - fire-and-forget callbacks swallow panics, log them, and bump the
//!   `callback-failures` counter;
//! - awaited lifecycle callbacks report the panic to the caller, which
//!   treats it as the item having failed.
//!
//! Callbacks must never be invoked while an internal mutex is held; the
//! envelope takes closures by value so call sites naturally run them after
//! releasing their locks.

use crate::counters::EventCounters;
use crate::error::{BoxError, ItemError};

/// Invokes a fire-and-forget callback, swallowing any panic.
pub fn fire_and_forget<F: FnOnce()>(label: &'static str, f: F) {
    if let Err(_payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        EventCounters::record_callback_failure();

        #[cfg(feature = "tracing")]
        tracing::warn!(callback = label, "callback panicked; continuing");

        #[cfg(not(feature = "tracing"))]
        let _ = label;
    }
}

/// Invokes an awaited lifecycle callback; a panic becomes an [`ItemError`].
pub fn awaited<F: FnOnce()>(label: &'static str, f: F) -> Result<(), ItemError> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(()) => Ok(()),
        Err(payload) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(callback = label, "lifecycle callback panicked");

            let message = payload
                .downcast_ref::<&'static str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            let cause: BoxError = format!("{label} callback panicked: {message}").into();
            Err(ItemError::UserFault(cause))
        }
    }
}
