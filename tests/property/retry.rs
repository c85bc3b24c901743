//! Retry invariants:
//! - a chain never exceeds 1 + max_retries attempts
//! - success stops the chain immediately

use proptest::prelude::*;
use sluice::{select_parallel, BoxError, ExecutionConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: an always-failing item is attempted exactly
    /// `1 + max_retries` times.
    #[test]
    fn attempts_never_exceed_the_budget(max_retries in 0u32..6) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let calls = Arc::new(AtomicU32::new(0));
            let c = Arc::clone(&calls);

            let config = ExecutionConfig::builder()
                .max_concurrency(1)
                .max_retries(max_retries)
                .base_delay(Duration::from_millis(1))
                .build()
                .unwrap();

            let result = select_parallel(
                [0u32],
                move |_n, _cancel| {
                    let c = Arc::clone(&c);
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, BoxError>("always".into())
                    }
                },
                config,
            )
            .await;

            prop_assert!(result.is_err());
            prop_assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
            Ok(())
        })?;
    }

    /// Property: a chain stops at its first success.
    #[test]
    fn success_stops_the_chain(
        max_retries in 1u32..6,
        succeed_on in 1u32..6,
    ) {
        if succeed_on > max_retries + 1 {
            return Ok(());
        }

        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let calls = Arc::new(AtomicU32::new(0));
            let c = Arc::clone(&calls);

            let config = ExecutionConfig::builder()
                .max_concurrency(1)
                .max_retries(max_retries)
                .base_delay(Duration::from_millis(1))
                .build()
                .unwrap();

            let result = select_parallel(
                [0u32],
                move |n, _cancel| {
                    let c = Arc::clone(&c);
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) + 1 < succeed_on {
                            Err::<u32, BoxError>("not yet".into())
                        } else {
                            Ok(n)
                        }
                    }
                },
                config,
            )
            .await;

            prop_assert!(result.is_ok());
            prop_assert_eq!(calls.load(Ordering::SeqCst), succeed_on);
            Ok(())
        })?;
    }
}
