//! Ordered output under jittered latency: results come back in source
//! order even when completions are thoroughly shuffled.

use rand::RngExt;
use sluice::{select_parallel, BoxError, ErrorMode, ExecutionConfig};
use std::time::Duration;

#[tokio::test]
async fn hundred_items_come_back_in_order() {
    let config = ExecutionConfig::builder()
        .max_concurrency(16)
        .ordered_output(true)
        .build()
        .unwrap();

    let out = select_parallel(
        1u32..=100,
        |n, _cancel| async move {
            let sleep_ms = rand::rng().random_range(1..=10);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            Ok::<_, BoxError>(n)
        },
        config,
    )
    .await
    .unwrap();

    assert_eq!(out, (1..=100).collect::<Vec<_>>());
}

#[tokio::test]
async fn ordered_failures_keep_their_slots() {
    let config = ExecutionConfig::builder()
        .max_concurrency(8)
        .ordered_output(true)
        .error_mode(ErrorMode::CollectAndContinue)
        .build()
        .unwrap();

    let err = select_parallel(
        0u32..20,
        |n, _cancel| async move {
            let sleep_ms = rand::rng().random_range(1..=5);
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
            if n % 5 == 0 {
                Err::<u32, BoxError>("every fifth".into())
            } else {
                Ok(n)
            }
        },
        config,
    )
    .await
    .unwrap_err();

    let failures = err.failures().expect("aggregate");
    let indexes: Vec<u64> = failures.iter().map(|(i, _)| *i).collect();
    assert_eq!(indexes, vec![0, 5, 10, 15]);
}
