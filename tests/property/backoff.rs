//! Backoff strategy bounds hold for arbitrary bases and attempts.

use proptest::prelude::*;
use sluice::BackoffStrategy;
use sluice_retry::BackoffCarry;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: exponential delay is exactly `base * 2^(n-1)`.
    #[test]
    fn exponential_is_deterministic(base_ms in 1u64..500, attempt in 1u32..10) {
        let base = Duration::from_millis(base_ms);
        let mut carry = BackoffCarry::default();
        let delay = BackoffStrategy::Exponential.delay(base, attempt, &mut carry);
        prop_assert_eq!(delay, base * 2u32.pow(attempt - 1));
    }

    /// Property: jittered strategies stay below their ceilings.
    #[test]
    fn jitter_stays_below_the_ceiling(base_ms in 1u64..500, attempt in 1u32..10) {
        let base = Duration::from_millis(base_ms);
        let mut carry = BackoffCarry::default();

        let exp = BackoffStrategy::ExponentialJitter.delay(base, attempt, &mut carry);
        prop_assert!(exp < base * 2u32.pow(attempt - 1));

        let lin = BackoffStrategy::LinearJitter.delay(base, attempt, &mut carry);
        prop_assert!(lin < base * attempt);
    }

    /// Property: decorrelated jitter starts below base and afterwards
    /// stays within `[base, 3 * prev)` (collapsing to `base` when the
    /// range is empty).
    #[test]
    fn decorrelated_respects_its_carry(base_ms in 1u64..200, chain_len in 2usize..6) {
        let base = Duration::from_millis(base_ms);
        let mut carry = BackoffCarry::default();

        let first = BackoffStrategy::DecorrelatedJitter.delay(base, 1, &mut carry);
        prop_assert!(first < base);

        let mut prev = first;
        for attempt in 2..=chain_len as u32 {
            let delay = BackoffStrategy::DecorrelatedJitter.delay(base, attempt, &mut carry);
            if prev * 3 <= base {
                prop_assert_eq!(delay, base);
            } else {
                prop_assert!(delay >= base);
                prop_assert!(delay < prev * 3);
            }
            prev = delay;
        }
    }

    /// Property: linear delay grows by exactly one base per attempt.
    #[test]
    fn linear_is_deterministic(base_ms in 1u64..500, attempt in 1u32..10) {
        let base = Duration::from_millis(base_ms);
        let mut carry = BackoffCarry::default();
        let delay = BackoffStrategy::Linear.delay(base, attempt, &mut carry);
        prop_assert_eq!(delay, base * attempt);
    }
}
