//! Concurrency assertions for pool tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Tracks live and high-water concurrency across threads.
///
/// Call [`enter`] at the top of the section under test and hold the
/// returned guard for its duration. The high-water mark is maintained
/// with a compare-and-set loop, so it is a true maximum even under
/// contention.
///
/// [`enter`]: ConcurrencyAsserter::enter
#[derive(Clone, Default)]
pub struct ConcurrencyAsserter {
    inner: Arc<Counts>,
}

#[derive(Default)]
struct Counts {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyAsserter {
    /// Creates a fresh asserter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the tracked section, returning a guard that exits on drop.
    pub fn enter(&self) -> ConcurrencyGuard {
        let observed = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;

        let mut max = self.inner.max.load(Ordering::SeqCst);
        while observed > max {
            match self.inner.max.compare_exchange(
                max,
                observed,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => max = actual,
            }
        }

        ConcurrencyGuard {
            counts: Arc::clone(&self.inner),
        }
    }

    /// Sections currently inside a guard.
    pub fn current(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    /// Highest concurrency ever observed.
    pub fn max_observed(&self) -> usize {
        self.inner.max.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConcurrencyAsserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyAsserter")
            .field("current", &self.current())
            .field("max_observed", &self.max_observed())
            .finish()
    }
}

/// Scoped token returned by [`ConcurrencyAsserter::enter`].
pub struct ConcurrencyGuard {
    counts: Arc<Counts>,
}

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        self.counts.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_scope_tracks_current() {
        let asserter = ConcurrencyAsserter::new();
        assert_eq!(asserter.current(), 0);
        {
            let _a = asserter.enter();
            let _b = asserter.enter();
            assert_eq!(asserter.current(), 2);
        }
        assert_eq!(asserter.current(), 0);
        assert_eq!(asserter.max_observed(), 2);
    }

    #[test]
    fn max_is_a_high_water_mark_across_threads() {
        let asserter = ConcurrencyAsserter::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let asserter = asserter.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let _guard = asserter.enter();
                    std::hint::black_box(());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(asserter.current(), 0);
        assert!(asserter.max_observed() >= 1);
        assert!(asserter.max_observed() <= 8);
    }
}
