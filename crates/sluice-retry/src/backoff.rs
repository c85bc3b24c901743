//! Backoff strategies for the retry overlay.
//!
//! Delays are computed per retry chain: the decorrelated-jitter strategy
//! carries its previous delay in a [`BackoffCarry`] that lives on the
//! retry loop's stack, so state never leaks between unrelated items (as
//! it would with thread-local carry on a pooled runtime).

use rand::RngExt;
use std::time::Duration;

/// How long to wait before retry attempt *n* (1-based, counted after the
/// first failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * 2^(n-1)`.
    Exponential,
    /// Uniform random in `[0, base * 2^(n-1))`.
    ExponentialJitter,
    /// First retry uniform in `[0, base)`; afterwards uniform in
    /// `[base, 3 * prev_delay)`, carrying the previous delay across the
    /// chain.
    DecorrelatedJitter,
    /// `base * n`.
    Linear,
    /// Uniform random in `[0, base * n)`.
    LinearJitter,
}

/// Per-chain backoff state.
///
/// One carry per retry chain; dropped when the chain ends, which resets
/// the decorrelated-jitter state.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackoffCarry {
    prev_delay: Option<Duration>,
}

impl BackoffStrategy {
    /// Computes the delay before retry `attempt` (1-based).
    pub fn delay(&self, base: Duration, attempt: u32, carry: &mut BackoffCarry) -> Duration {
        match self {
            BackoffStrategy::Exponential => scale_pow2(base, attempt),
            BackoffStrategy::ExponentialJitter => uniform_below(scale_pow2(base, attempt)),
            BackoffStrategy::DecorrelatedJitter => {
                let delay = match carry.prev_delay {
                    None => uniform_below(base),
                    Some(prev) => uniform_between(base, prev.saturating_mul(3)),
                };
                carry.prev_delay = Some(delay);
                delay
            }
            BackoffStrategy::Linear => base.saturating_mul(attempt),
            BackoffStrategy::LinearJitter => uniform_below(base.saturating_mul(attempt)),
        }
    }
}

fn scale_pow2(base: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(32);
    base.saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX))
}

/// Uniform in `[0, upper)`; zero when the range is empty.
fn uniform_below(upper: Duration) -> Duration {
    if upper.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::rng().random_range(0.0..upper.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Uniform in `[low, high)`; `low` when the range is empty.
fn uniform_between(low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    let secs = rand::rng().random_range(low.as_secs_f64()..high.as_secs_f64());
    Duration::from_secs_f64(secs)
}
