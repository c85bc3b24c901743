//! Adaptive concurrency reacts to an SLO breach: when latency grows with
//! load, the effective limit falls and never exceeds the original cap.

use sluice::{select_parallel, BoxError, ExecutionConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn effective_concurrency_halves_under_slow_latency() {
    let limits: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&limits);

    let in_flight = Arc::new(AtomicUsize::new(0));
    let load = Arc::clone(&in_flight);

    let config = ExecutionConfig::builder()
        .max_concurrency(32)
        .adaptive_concurrency(|a| {
            a.min_concurrency(2)
                .max_concurrency(32)
                .target_latency(Duration::from_millis(50))
                .min_success_rate(0.5)
                .sampling_interval(Duration::from_millis(50))
                .on_limit_change(move |_old, new| {
                    observed.lock().unwrap().push(new);
                })
        })
        .build()
        .unwrap();

    // Latency grows with concurrent load, simulating a saturated
    // downstream.
    let out = select_parallel(
        0u32..200,
        move |n, _cancel| {
            let load = Arc::clone(&load);
            async move {
                let concurrent = load.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(8 * concurrent as u64)).await;
                load.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BoxError>(n)
            }
        },
        config,
    )
    .await
    .unwrap();

    assert_eq!(out.len(), 200);

    let limits = limits.lock().unwrap();
    assert!(!limits.is_empty(), "the controller never adjusted");
    let lowest = *limits.iter().min().unwrap();
    assert!(
        lowest <= 16,
        "expected the limit to fall to at least half of 32, lowest was {lowest}"
    );
    assert!(
        limits.iter().all(|&l| l <= 32),
        "the limit must never exceed the original cap"
    );
}
