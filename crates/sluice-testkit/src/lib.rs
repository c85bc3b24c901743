//! Testing primitives for the sluice engine.
//!
//! Everything here is public API intended for downstream test suites as
//! much as for sluice's own:
//!
//! - [`VirtualClock`]: deterministic logical time with deadline-ordered
//!   delay execution;
//! - [`ChaosInjector`]: probabilistic failure and latency injection;
//! - [`ConcurrencyAsserter`]: scoped concurrency tracking with a true
//!   high-water mark;
//! - [`FakeChannel`]: a FIFO double with write/read telemetry.

mod channel;
mod chaos;
mod concurrency;
mod virtual_time;

pub use channel::{ChannelCompleted, FakeChannel};
pub use chaos::{ChaosError, ChaosInjector};
pub use concurrency::{ConcurrencyAsserter, ConcurrencyGuard};
pub use virtual_time::{VirtualClock, VirtualDelay};
