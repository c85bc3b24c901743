//! Bounded-parallel asynchronous processing of item streams.
//!
//! `sluice` drives a source sequence (finite or infinite) through a
//! user-supplied per-item operation under a contract that bounds in-flight
//! work and queued work, retries transient failures, limits request rate,
//! trips on sustained errors, adapts concurrency to observed latency,
//! reports progress, and surfaces failures according to a configurable
//! error policy.
//!
//! Each invocation builds a self-contained pipeline of four stages wired
//! with bounded channels: source → dispatcher → worker pool → result
//! stage (streaming or collecting, optionally order-preserving). The
//! per-item operation is wrapped by resilience overlays assembled in a
//! fixed order, outermost to innermost:
//!
//! ```text
//! retry -> circuit breaker -> rate limiter -> timeout -> operation
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sluice::{select_parallel, BackoffStrategy, ErrorMode, ExecutionConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExecutionConfig::builder()
//!     .max_concurrency(8)
//!     .max_retries(3)
//!     .base_delay(Duration::from_millis(50))
//!     .backoff_strategy(BackoffStrategy::ExponentialJitter)
//!     .ordered_output(true)
//!     .error_mode(ErrorMode::CollectAndContinue)
//!     .build()?;
//!
//! let doubled = select_parallel(
//!     1u32..=100,
//!     |n, _cancel| async move { Ok::<_, sluice::BoxError>(n * 2) },
//!     config,
//! )
//! .await?;
//! assert_eq!(doubled.len(), 100);
//! # Ok(())
//! # }
//! ```
//!
//! # Counters are process-wide
//!
//! [`EventCounters`] is shared by every pipeline in the process. To
//! isolate one run's statistics, take a snapshot before and after and use
//! [`CounterSnapshot::delta_since`].

pub mod config;
pub mod events;
pub mod item;
pub mod observe;
mod pipeline;
mod stack;
mod stream;

pub use config::{ErrorMode, ExecutionConfig, ExecutionConfigBuilder};
pub use events::PipelineEvent;
pub use item::{Outcome, WorkItem};
pub use observe::{
    subscribe_counters, AggregatedMetrics, CounterSubscription, MetricsSettings, ProgressSettings,
    ProgressSnapshot,
};
pub use stream::OutcomeStream;

pub use sluice_circuitbreaker::CircuitPhase;
pub use sluice_core::counters::{CounterSample, CounterSnapshot, EventCounters};
pub use sluice_core::error::{BoxError, ConfigError, ItemError, PipelineError};
pub use sluice_retry::BackoffStrategy;
pub use tokio_util::sync::CancellationToken;

use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// Applies `op` to every item of a finite source with bounded
/// parallelism and materializes the results.
///
/// With `ordered_output` the result order matches the source order;
/// otherwise results arrive in completion order. Failures surface per the
/// configured [`ErrorMode`].
pub async fn select_parallel<I, T, R, E, F, Fut>(
    source: I,
    op: F,
    config: ExecutionConfig<R>,
) -> Result<Vec<R>, PipelineError>
where
    I: IntoIterator<Item = T>,
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let items: Vec<T> = source.into_iter().collect();
    let total = items.len() as u64;
    let source = futures::stream::iter(items.into_iter().map(Ok::<T, BoxError>));
    start(source, op, config, Some(total)).collect().await
}

/// Like [`select_parallel`], over a source whose iteration itself can
/// fail; a source error terminates the run with
/// [`PipelineError::Source`].
pub async fn try_select_parallel<S, T, R, E, F, Fut>(
    source: S,
    op: F,
    config: ExecutionConfig<R>,
) -> Result<Vec<R>, PipelineError>
where
    S: Stream<Item = Result<T, BoxError>> + Send + 'static,
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    start(source, op, config, None).collect().await
}

/// Applies `op` to a lazy (possibly infinite) source and returns a lazy
/// stream of [`Outcome`]s.
///
/// Dropping the stream cancels the pipeline. Under
/// [`ErrorMode::BestEffort`] failed items are swallowed and never appear
/// in the stream.
pub fn select_parallel_stream<S, T, R, E, F, Fut>(
    source: S,
    op: F,
    config: ExecutionConfig<R>,
) -> OutcomeStream<R>
where
    S: Stream<Item = T> + Send + 'static,
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let source = source.map(Ok::<T, BoxError>);
    OutcomeStream::new(start(source, op, config, None))
}

/// Runs `action` for every item of a finite source; completes when all
/// items have completed.
pub async fn for_each_parallel<I, T, E, F, Fut>(
    source: I,
    action: F,
    config: ExecutionConfig<()>,
) -> Result<(), PipelineError>
where
    I: IntoIterator<Item = T>,
    T: Clone + Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
{
    select_parallel(source, action, config).await.map(|_| ())
}

/// Groups the source into batches of up to `batch_size` items and applies
/// `op` once per batch.
///
/// # Panics
///
/// Panics if `batch_size` is zero.
pub async fn batch_parallel<I, T, R, E, F, Fut>(
    source: I,
    batch_size: usize,
    op: F,
    config: ExecutionConfig<R>,
) -> Result<Vec<R>, PipelineError>
where
    I: IntoIterator<Item = T>,
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(Vec<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    assert!(batch_size >= 1, "batch_size must be at least 1");

    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut current = Vec::with_capacity(batch_size);
    for item in source {
        current.push(item);
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    select_parallel(batches, op, config).await
}

fn start<S, T, R, E, F, Fut>(
    source: S,
    op: F,
    config: ExecutionConfig<R>,
    total: Option<u64>,
) -> pipeline::RunningPipeline<R>
where
    S: Stream<Item = Result<T, BoxError>> + Send + 'static,
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let config = Arc::new(config);
    let service = stack::compose(op, &config);
    pipeline::spawn(source, service, config, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_testkit::ConcurrencyAsserter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cfg() -> ExecutionConfigBuilder<u32> {
        ExecutionConfig::builder().max_concurrency(4)
    }

    #[tokio::test]
    async fn identity_round_trips_in_order() {
        let config = cfg().ordered_output(true).build().unwrap();
        let out = select_parallel(
            1u32..=50,
            |n, _cancel| async move { Ok::<_, BoxError>(n) },
            config,
        )
        .await
        .unwrap();
        assert_eq!(out, (1..=50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn concurrency_stays_bounded() {
        let asserter = ConcurrencyAsserter::new();
        let observer = asserter.clone();

        let config = ExecutionConfig::builder()
            .max_concurrency(3)
            .build()
            .unwrap();
        let out = select_parallel(
            0u32..30,
            move |n, _cancel| {
                let asserter = observer.clone();
                async move {
                    let _guard = asserter.enter();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok::<_, BoxError>(n)
                }
            },
            config,
        )
        .await
        .unwrap();

        assert_eq!(out.len(), 30);
        assert!(asserter.max_observed() <= 3);
    }

    #[tokio::test]
    async fn fail_fast_surfaces_the_first_error() {
        let config = cfg().error_mode(ErrorMode::FailFast).build().unwrap();
        let err = select_parallel(
            0u32..10,
            |n, _cancel| async move {
                if n == 3 {
                    Err::<u32, BoxError>("broken".into())
                } else {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    Ok(n)
                }
            },
            config,
        )
        .await
        .unwrap_err();

        match err {
            PipelineError::Item { index, .. } => assert_eq!(index, 3),
            other => panic!("expected Item error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn collect_and_continue_aggregates_failures() {
        let config = cfg()
            .error_mode(ErrorMode::CollectAndContinue)
            .build()
            .unwrap();
        let err = select_parallel(
            0u32..10,
            |n, _cancel| async move {
                if n % 2 == 0 {
                    Err::<u32, BoxError>(format!("even {n}").into())
                } else {
                    Ok(n)
                }
            },
            config,
        )
        .await
        .unwrap_err();

        let failures = err.failures().expect("aggregate");
        assert_eq!(failures.len(), 5);
        let indexes: Vec<u64> = failures.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn best_effort_returns_only_successes() {
        let config = cfg().error_mode(ErrorMode::BestEffort).build().unwrap();
        let out = select_parallel(
            0u32..10,
            |n, _cancel| async move {
                if n < 5 {
                    Err::<u32, BoxError>("dropped".into())
                } else {
                    Ok(n)
                }
            },
            config,
        )
        .await
        .unwrap();
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn stream_operator_yields_every_outcome() {
        let config = cfg()
            .error_mode(ErrorMode::CollectAndContinue)
            .build()
            .unwrap();
        let stream = select_parallel_stream(
            futures::stream::iter(0u32..20),
            |n, _cancel| async move { Ok::<_, BoxError>(n) },
            config,
        );
        let outcomes: Vec<_> = stream.collect().await;
        assert_eq!(outcomes.len(), 20);
        assert!(outcomes.iter().all(|o| o.is_success()));
    }

    #[tokio::test]
    async fn for_each_runs_every_action() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);

        let config = ExecutionConfig::builder().max_concurrency(4).build().unwrap();
        for_each_parallel(
            0u32..25,
            move |_n, _cancel| {
                let h = Arc::clone(&h);
                async move {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                }
            },
            config,
        )
        .await
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 25);
    }

    #[tokio::test]
    async fn batches_cover_the_source() {
        let config = ExecutionConfig::builder().max_concurrency(2).build().unwrap();
        let sizes = batch_parallel(
            0u32..10,
            3,
            |batch, _cancel| async move { Ok::<_, BoxError>(batch.len()) },
            config,
        )
        .await
        .unwrap();

        let mut sizes = sizes;
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 3, 3]);
    }

    #[tokio::test]
    async fn source_faults_terminate_the_run() {
        let config = cfg().build().unwrap();
        let source = futures::stream::iter(vec![
            Ok::<u32, BoxError>(1),
            Ok(2),
            Err("bad record".into()),
            Ok(3),
        ]);

        let err = try_select_parallel(
            source,
            |n, _cancel| async move { Ok::<_, BoxError>(n) },
            config,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Source(_)));
    }

    #[tokio::test]
    async fn external_cancel_stops_an_infinite_source() {
        let cancel = CancellationToken::new();
        let config = ExecutionConfig::builder()
            .max_concurrency(4)
            .cancel_token(cancel.clone())
            .build()
            .unwrap();

        let stream = select_parallel_stream(
            futures::stream::iter(0u64..),
            |n, _cancel| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, BoxError>(n)
            },
            config,
        );

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            cancel.cancel();
        });

        let outcomes: Vec<_> = tokio::time::timeout(Duration::from_secs(5), stream.collect())
            .await
            .expect("run terminates after cancel");
        assert!(!outcomes.is_empty());
    }

    #[tokio::test]
    async fn retries_are_visible_in_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        let config = ExecutionConfig::builder()
            .max_concurrency(1)
            .max_retries(3)
            .base_delay(Duration::from_millis(1))
            .build()
            .unwrap();

        let out = select_parallel(
            [7u32],
            move |n, _cancel| {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err::<u32, BoxError>("flaky".into())
                    } else {
                        Ok(n)
                    }
                }
            },
            config,
        )
        .await
        .unwrap();

        assert_eq!(out, vec![7]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn per_item_timeout_fails_slow_items() {
        let config = ExecutionConfig::builder()
            .max_concurrency(2)
            .per_item_timeout(Duration::from_millis(10))
            .error_mode(ErrorMode::CollectAndContinue)
            .build()
            .unwrap();

        let err = select_parallel(
            [1u32],
            |_n, _cancel| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BoxError>(0u32)
            },
            config,
        )
        .await
        .unwrap_err();

        let failures = err.failures().expect("aggregate");
        assert!(failures[0].1.is_timeout());
    }

    #[tokio::test]
    async fn drain_fires_once_per_run() {
        let drains = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&drains);

        let config = ExecutionConfig::builder()
            .max_concurrency(4)
            .on_drain(move || {
                d.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let out = select_parallel(
            0u32..20,
            |n, _cancel| async move { Ok::<_, BoxError>(n) },
            config,
        )
        .await
        .unwrap();

        assert_eq!(out.len(), 20);
        assert_eq!(drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_converts_failures() {
        let fallbacks = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fallbacks);

        let config = ExecutionConfig::<u32>::builder()
            .max_concurrency(2)
            .fallback(|_error| Some(99))
            .on_fallback(move |_index| {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .ordered_output(true)
            .build()
            .unwrap();

        let out = select_parallel(
            0u32..4,
            |n, _cancel| async move {
                if n == 2 {
                    Err::<u32, BoxError>("broken".into())
                } else {
                    Ok(n)
                }
            },
            config,
        )
        .await
        .unwrap();

        assert_eq!(out, vec![0, 1, 99, 3]);
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    }
}
