//! The circuit trips after sustained failures, short-circuits while
//! open, then recovers through a successful probe.

use futures::StreamExt;
use sluice::{select_parallel_stream, BoxError, CircuitPhase, ErrorMode, ExecutionConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn trips_short_circuits_and_recovers() {
    let fail = Arc::new(AtomicBool::new(true));
    let transitions: Arc<Mutex<Vec<(CircuitPhase, CircuitPhase)>>> =
        Arc::new(Mutex::new(Vec::new()));

    let f = Arc::clone(&fail);
    let t = Arc::clone(&transitions);

    let config = ExecutionConfig::builder()
        .max_concurrency(1)
        .error_mode(ErrorMode::CollectAndContinue)
        .circuit_breaker(|cb| {
            cb.failure_threshold(3)
                .success_threshold(1)
                .open_timeout(Duration::from_millis(500))
                .on_state_change(move |from, to| {
                    t.lock().unwrap().push((from, to));
                })
        })
        .build()
        .unwrap();

    let (tx, rx) = futures::channel::mpsc::unbounded::<u32>();
    let mut stream = select_parallel_stream(
        rx,
        move |n, _cancel| {
            let fail = Arc::clone(&f);
            async move {
                if fail.load(Ordering::SeqCst) {
                    Err::<u32, BoxError>("downstream down".into())
                } else {
                    Ok(n)
                }
            }
        },
        config,
    );

    // First three execute and fail; the remaining two short-circuit.
    for n in 0..5 {
        tx.unbounded_send(n).unwrap();
    }
    let mut kinds = Vec::new();
    for _ in 0..5 {
        let outcome = stream.next().await.expect("outcome");
        match outcome {
            sluice::Outcome::Failure { error, .. } => kinds.push(error.kind()),
            other => panic!("expected failure, got {other:?}"),
        }
    }
    assert_eq!(kinds[..3], ["user_fault", "user_fault", "user_fault"]);
    assert_eq!(kinds[3..], ["circuit_open", "circuit_open"]);

    // After the open timeout a probe succeeds and closes the circuit.
    tokio::time::sleep(Duration::from_millis(600)).await;
    fail.store(false, Ordering::SeqCst);

    for n in 5..8 {
        tx.unbounded_send(n).unwrap();
    }
    for _ in 5..8 {
        let outcome = stream.next().await.expect("outcome");
        assert!(outcome.is_success(), "post-recovery items must succeed");
    }

    drop(tx);
    assert!(stream.next().await.is_none());

    let transitions = transitions.lock().unwrap();
    assert!(transitions.contains(&(CircuitPhase::Closed, CircuitPhase::Open)));
    assert!(transitions.contains(&(CircuitPhase::Open, CircuitPhase::HalfOpen)));
    assert!(transitions.contains(&(CircuitPhase::HalfOpen, CircuitPhase::Closed)));
}
