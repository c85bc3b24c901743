//! Progress reporting, metric aggregation and the counter stream,
//! exercised through whole pipeline runs.

use serial_test::serial;
use sluice::{
    select_parallel, subscribe_counters, BoxError, ExecutionConfig, ProgressSnapshot,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn progress_reports_cover_the_whole_run() {
    let snapshots: Arc<Mutex<Vec<ProgressSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);

    let config = ExecutionConfig::builder()
        .max_concurrency(4)
        .progress(|p| {
            p.report_interval(Duration::from_millis(10)).on_progress(move |snap| {
                sink.lock().unwrap().push(snap.clone());
            })
        })
        .build()
        .unwrap();

    let out = select_parallel(
        0u32..40,
        |n, _cancel| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BoxError>(n)
        },
        config,
    )
    .await
    .unwrap();
    assert_eq!(out.len(), 40);

    let snapshots = snapshots.lock().unwrap();
    assert!(snapshots.len() >= 2, "expected periodic reports");

    // The teardown emission must carry the final totals.
    let last = snapshots.last().unwrap();
    assert_eq!(last.items_completed, 40);
    assert_eq!(last.total_items, Some(40));
    assert_eq!(last.percent_complete, Some(100.0));
    assert_eq!(last.estimated_remaining, Some(Duration::ZERO));

    // Completed counts never go backwards.
    let mut previous = 0;
    for snap in snapshots.iter() {
        assert!(snap.items_completed >= previous);
        previous = snap.items_completed;
    }
}

#[tokio::test]
async fn metrics_aggregates_arrive_per_window() {
    let windows = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&windows);

    let config = ExecutionConfig::builder()
        .max_concurrency(4)
        .metrics(|m| {
            m.sample_interval(Duration::from_millis(10))
                .window(Duration::from_millis(100))
                .on_sample(move |aggregates| {
                    sink.lock().unwrap().push(aggregates.to_vec());
                })
        })
        .build()
        .unwrap();

    let _ = select_parallel(
        0u32..30,
        |n, _cancel| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, BoxError>(n)
        },
        config,
    )
    .await
    .unwrap();

    let windows = windows.lock().unwrap();
    assert!(!windows.is_empty());

    let last = windows.last().unwrap();
    let names: Vec<&str> = last.iter().map(|a| a.name).collect();
    assert!(names.contains(&"items-started"));
    assert!(names.contains(&"items-completed"));

    for aggregate in last {
        assert!(aggregate.min <= aggregate.average);
        assert!(aggregate.average <= aggregate.max);
        assert!(aggregate.sample_count >= 1);
    }
}

#[tokio::test]
#[serial]
async fn counter_stream_delivers_live_values() {
    let mut subscription = subscribe_counters(Duration::from_millis(5));

    let config = ExecutionConfig::builder()
        .max_concurrency(4)
        .build()
        .unwrap();
    let _ = select_parallel(
        0u32..10,
        |n, _cancel| async move { Ok::<_, BoxError>(n) },
        config,
    )
    .await
    .unwrap();

    // Early samples may predate the run; keep reading until the counters
    // have caught up.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let mut latest = 0.0;
    while tokio::time::Instant::now() < deadline {
        let Some(samples) = subscription.recv().await else {
            break;
        };
        let started = samples
            .iter()
            .find(|s| s.name == "items-started")
            .expect("items-started sample");
        assert_eq!(started.display_units, "items");
        latest = started.value;
        if latest >= 10.0 {
            break;
        }
    }
    assert!(latest >= 10.0, "counter stream never observed the run");
}
