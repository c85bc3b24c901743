//! Cancellation mid-flight over an infinite source: the run terminates
//! promptly and only in-flight items are lost.

use futures::StreamExt;
use sluice::{select_parallel_stream, BoxError, CancellationToken, ExecutionConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn cancel_bounds_lost_work_by_the_worker_count() {
    let started = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&started);

    let cancel = CancellationToken::new();
    let config = ExecutionConfig::builder()
        .max_concurrency(8)
        .cancel_token(cancel.clone())
        .on_start(move |_index| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let stream = select_parallel_stream(
        futures::stream::iter(0u64..),
        |n, _cancel| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, BoxError>(n)
        },
        config,
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
    });

    let outcomes: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("run must terminate within bounded time after cancel");

    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    let started = started.load(Ordering::SeqCst);
    assert!(
        started - successes <= 8,
        "lost more than a worker pool's worth of items: started {started}, completed {successes}"
    );
}

#[tokio::test]
async fn cancelling_twice_is_a_no_op() {
    let cancel = CancellationToken::new();
    let config = ExecutionConfig::builder()
        .max_concurrency(2)
        .cancel_token(cancel.clone())
        .build()
        .unwrap();

    let stream = select_parallel_stream(
        futures::stream::iter(0u64..),
        |n, _cancel| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, BoxError>(n)
        },
        config,
    );

    cancel.cancel();
    cancel.cancel();
    stream.cancel();

    let outcomes: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
        .await
        .expect("idempotent cancel still terminates");
    // Nothing after the cancel point is owed an outcome.
    let _ = outcomes;
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_pipeline() {
    let started = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&started);

    let config = ExecutionConfig::builder()
        .max_concurrency(4)
        .on_start(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    let mut stream = select_parallel_stream(
        futures::stream::iter(0u64..),
        |n, _cancel| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, BoxError>(n)
        },
        config,
    );

    let _ = stream.next().await;
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_drop = started.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        started.load(Ordering::SeqCst) <= after_drop + 4,
        "workers kept admitting items after the stream was dropped"
    );
}
