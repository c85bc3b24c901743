//! Pipeline invariants:
//! - ordered identity round-trips the source
//! - every item produces exactly one outcome
//! - observed concurrency never exceeds the worker count

use proptest::prelude::*;
use sluice::{select_parallel, select_parallel_stream, BoxError, ErrorMode, ExecutionConfig};
use sluice_testkit::ConcurrencyAsserter;
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: ordered identity returns the source unchanged.
    #[test]
    fn ordered_identity_round_trips(source in proptest::collection::vec(any::<u32>(), 0..100)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let config = ExecutionConfig::builder()
                .max_concurrency(4)
                .ordered_output(true)
                .build()
                .unwrap();

            let out = select_parallel(
                source.clone(),
                |n: u32, _cancel| async move { Ok::<_, BoxError>(n) },
                config,
            )
            .await
            .unwrap();

            prop_assert_eq!(out, source);
            Ok(())
        })?;
    }

    /// Property: every item yields exactly one outcome, whatever mix of
    /// successes and failures the run produces.
    #[test]
    fn exactly_one_outcome_per_item(
        len in 0usize..80,
        fail_modulus in 1u32..10,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            use futures::StreamExt;

            let config = ExecutionConfig::builder()
                .max_concurrency(4)
                .error_mode(ErrorMode::CollectAndContinue)
                .build()
                .unwrap();

            let stream = select_parallel_stream(
                futures::stream::iter(0u32..len as u32),
                move |n, _cancel| async move {
                    if n % fail_modulus == 0 {
                        Err::<u32, BoxError>("boom".into())
                    } else {
                        Ok(n)
                    }
                },
                config,
            );

            let outcomes: Vec<_> = stream.collect().await;
            prop_assert_eq!(outcomes.len(), len);

            let mut indexes: Vec<u64> = outcomes.iter().map(|o| o.index()).collect();
            indexes.sort_unstable();
            indexes.dedup();
            prop_assert_eq!(indexes.len(), len, "duplicate outcome for some index");
            Ok(())
        })?;
    }

    /// Property: observed concurrency stays within the configured bound.
    #[test]
    fn concurrency_never_exceeds_the_bound(
        workers in 1usize..8,
        len in 1usize..40,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let asserter = ConcurrencyAsserter::new();
            let observer = asserter.clone();

            let config = ExecutionConfig::builder()
                .max_concurrency(workers)
                .build()
                .unwrap();

            let out = select_parallel(
                0..len as u32,
                move |n, _cancel| {
                    let asserter = observer.clone();
                    async move {
                        let _guard = asserter.enter();
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        Ok::<_, BoxError>(n)
                    }
                },
                config,
            )
            .await
            .unwrap();

            prop_assert_eq!(out.len(), len);
            prop_assert!(asserter.max_observed() <= workers);
            Ok(())
        })?;
    }

    /// Property: best-effort streaming yields one success per item when
    /// the operation never fails.
    #[test]
    fn stream_count_matches_source_under_best_effort(len in 0usize..60) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            use futures::StreamExt;

            let config = ExecutionConfig::builder()
                .max_concurrency(4)
                .error_mode(ErrorMode::BestEffort)
                .build()
                .unwrap();

            let stream = select_parallel_stream(
                futures::stream::iter(0u32..len as u32),
                |n, _cancel| async move { Ok::<_, BoxError>(n) },
                config,
            );

            let count = stream.count().await;
            prop_assert_eq!(count, len);
            Ok(())
        })?;
    }
}
