//! Bounded parallelism under load: every item completes and observed
//! concurrency never exceeds the configured worker count.

use rand::RngExt;
use sluice::{select_parallel, BoxError, ExecutionConfig};
use sluice_testkit::ConcurrencyAsserter;
use std::time::Duration;

#[tokio::test]
async fn thirty_items_through_five_workers() {
    let asserter = ConcurrencyAsserter::new();
    let observer = asserter.clone();

    let config = ExecutionConfig::builder()
        .max_concurrency(5)
        .build()
        .unwrap();

    let out = select_parallel(
        1u32..=30,
        move |n, _cancel| {
            let asserter = observer.clone();
            async move {
                let _guard = asserter.enter();
                let sleep_ms = rand::rng().random_range(20..=50);
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                Ok::<_, BoxError>(n)
            }
        },
        config,
    )
    .await
    .unwrap();

    assert_eq!(out.len(), 30);
    assert!(
        asserter.max_observed() <= 5,
        "observed concurrency {} exceeded the bound",
        asserter.max_observed()
    );
    assert_eq!(asserter.current(), 0);
}

#[tokio::test]
async fn single_worker_serializes_the_run() {
    let asserter = ConcurrencyAsserter::new();
    let observer = asserter.clone();

    let config = ExecutionConfig::builder()
        .max_concurrency(1)
        .ordered_output(true)
        .build()
        .unwrap();

    let out = select_parallel(
        0u32..10,
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

    assert_eq!(out, (0..10).collect::<Vec<_>>());
    assert_eq!(asserter.max_observed(), 1);
}
