//! Retry until success: transient failures are retried on the same item
//! and the retry callback sees every scheduled retry.

use sluice::{select_parallel, BackoffStrategy, BoxError, ExecutionConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn third_attempt_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let retries = Arc::new(AtomicUsize::new(0));
    let completions = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&calls);
    let r = Arc::clone(&retries);
    let done = Arc::clone(&completions);

    let config = ExecutionConfig::builder()
        .max_concurrency(1)
        .max_retries(3)
        .base_delay(Duration::from_millis(10))
        .backoff_strategy(BackoffStrategy::Exponential)
        .on_retry(move |_attempt, _delay| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .on_complete(move |_index, attempts, _latency| {
            assert_eq!(attempts, 3);
            done.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let out = select_parallel(
        ["payload"],
        move |s, _cancel| {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err::<&str, BoxError>("transient outage".into())
                } else {
                    Ok(s)
                }
            }
        },
        config,
    )
    .await
    .unwrap();

    assert_eq!(out, vec!["payload"]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_chains_report_their_attempts() {
    let config = ExecutionConfig::builder()
        .max_concurrency(1)
        .max_retries(2)
        .base_delay(Duration::from_millis(1))
        .build()
        .unwrap();

    let err = select_parallel(
        [1u32],
        |_n, _cancel| async move { Err::<u32, BoxError>("always broken".into()) },
        config,
    )
    .await
    .unwrap_err();

    match err {
        sluice::PipelineError::Item { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected Item error, got {other:?}"),
    }
}

#[tokio::test]
async fn classifier_blocks_retries_for_permanent_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);

    let config = ExecutionConfig::builder()
        .max_concurrency(1)
        .max_retries(5)
        .base_delay(Duration::from_millis(1))
        .is_transient(|_error| false)
        .build()
        .unwrap();

    let _ = select_parallel(
        [1u32],
        move |_n, _cancel| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, BoxError>("permanent".into())
            }
        },
        config,
    )
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
