//! The pipeline: source stage, dispatcher/worker stage, result stage.
//!
//! One invocation wires four stages with bounded channels: a source task
//! assigns indexes and feeds the request channel; `max_concurrency`
//! workers drain it through the composed overlay stack (gated by the
//! adaptive controller when configured); outcomes flow to the result
//! channel, through a reorder stage when ordered output is requested.

use crate::config::{ErrorMode, ExecutionConfig};
use crate::events::PipelineEvent;
use crate::item::{Outcome, WorkItem};
use crate::observe::aggregator::MetricsSampler;
use crate::observe::progress::ProgressReporter;
use crate::observe::RunStats;
use crate::stack::ItemService;
use futures::{Stream, StreamExt};
use sluice_adaptive::{AdaptiveGate, AdmitPermit};
use sluice_core::counters::EventCounters;
use sluice_core::envelope;
use sluice_core::error::{BoxError, ItemError, PipelineError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};

/// A pipeline whose stages have been spawned; owns the read side of the
/// result channel and the periodic observers.
pub(crate) struct RunningPipeline<R> {
    pub(crate) outcomes: mpsc::Receiver<Outcome<R>>,
    pub(crate) root: CancellationToken,
    pub(crate) external: Option<CancellationToken>,
    pub(crate) run_error: Arc<Mutex<Option<PipelineError>>>,
    pub(crate) error_mode: ErrorMode,
    pub(crate) progress: Option<ProgressReporter>,
    pub(crate) metrics: Option<MetricsSampler>,
}

/// Spawns every stage of a pipeline run.
pub(crate) fn spawn<S, T, R>(
    source: S,
    service: ItemService<T, R>,
    config: Arc<ExecutionConfig<R>>,
    total: Option<u64>,
) -> RunningPipeline<R>
where
    S: Stream<Item = Result<T, BoxError>> + Send + 'static,
    T: Clone + Send + 'static,
    R: Send + 'static,
{
    let external = config.cancel_token.clone();
    let root = external
        .as_ref()
        .map(|token| token.child_token())
        .unwrap_or_default();

    let capacity = config.channel_capacity;
    let run_error = Arc::new(Mutex::new(None));
    let stats = Arc::new(RunStats::new());
    let source_done = Arc::new(AtomicBool::new(false));
    let drain_fired = Arc::new(AtomicBool::new(false));
    let gate = config.adaptive.as_ref().map(|a| AdaptiveGate::new(a.clone()));

    let (req_tx, req_rx) = mpsc::channel::<WorkItem<T>>(capacity);
    let (out_tx, out_rx) = mpsc::channel::<Outcome<R>>(capacity);

    tokio::spawn(source_task(
        source,
        req_tx,
        root.clone(),
        Arc::clone(&run_error),
        Arc::clone(&source_done),
    ));

    // Result stage: reorder when ordered output is requested.
    let worker_tx = if config.ordered_output {
        let (raw_tx, raw_rx) = mpsc::channel::<Outcome<R>>(capacity);
        tokio::spawn(reorder_task(raw_rx, out_tx));
        raw_tx
    } else {
        out_tx
    };

    let req_rx = Arc::new(tokio::sync::Mutex::new(req_rx));
    for _ in 0..config.max_concurrency {
        let worker = Worker {
            service: service.clone(),
            config: Arc::clone(&config),
            root: root.clone(),
            req_rx: Arc::clone(&req_rx),
            out_tx: worker_tx.clone(),
            gate: gate.clone(),
            stats: Arc::clone(&stats),
            source_done: Arc::clone(&source_done),
            drain_fired: Arc::clone(&drain_fired),
        };
        tokio::spawn(worker.run());
    }
    drop(worker_tx);

    let progress = config
        .progress
        .clone()
        .map(|settings| ProgressReporter::spawn(settings, Arc::clone(&stats), total));
    let metrics = config
        .metrics
        .clone()
        .map(MetricsSampler::spawn);

    RunningPipeline {
        outcomes: out_rx,
        root,
        external,
        run_error,
        error_mode: config.error_mode,
        progress,
        metrics,
    }
}

impl<R> RunningPipeline<R> {
    /// Drains the result channel into a materialized run result,
    /// honoring the error mode.
    pub(crate) async fn collect(mut self) -> Result<Vec<R>, PipelineError> {
        let mut successes: Vec<R> = Vec::new();
        let mut failures: Vec<(u64, ItemError)> = Vec::new();

        while let Some(outcome) = self.outcomes.recv().await {
            match outcome {
                Outcome::Success { value, .. } => successes.push(value),
                Outcome::Failure {
                    index,
                    error,
                    attempts,
                } => {
                    if self.error_mode == ErrorMode::FailFast && !error.is_cancelled() {
                        self.shutdown().await;
                        return Err(PipelineError::Item {
                            index,
                            attempts,
                            source: error,
                        });
                    }
                    failures.push((index, error));
                }
            }
        }

        self.outcomes.close();
        let run_error = self.run_error.lock().unwrap().take();
        let externally_cancelled = self
            .external
            .as_ref()
            .is_some_and(|token| token.is_cancelled());
        self.shutdown().await;

        if let Some(error) = run_error {
            return Err(error);
        }
        if externally_cancelled {
            return Err(PipelineError::Cancelled);
        }

        match self.error_mode {
            ErrorMode::CollectAndContinue if !failures.is_empty() => {
                failures.sort_by_key(|(index, _)| *index);
                Err(PipelineError::Aggregate { failures })
            }
            _ => Ok(successes),
        }
    }

    async fn shutdown(&mut self) {
        self.root.cancel();
        if let Some(progress) = self.progress.take() {
            progress.shutdown().await;
        }
        if let Some(metrics) = self.metrics.take() {
            metrics.shutdown().await;
        }
    }
}

async fn source_task<S, T>(
    source: S,
    req_tx: mpsc::Sender<WorkItem<T>>,
    root: CancellationToken,
    run_error: Arc<Mutex<Option<PipelineError>>>,
    source_done: Arc<AtomicBool>,
) where
    S: Stream<Item = Result<T, BoxError>> + Send + 'static,
    T: Send + 'static,
{
    futures::pin_mut!(source);
    let mut index: u64 = 0;

    loop {
        let next = tokio::select! {
            next = source.next() => next,
            _ = root.cancelled() => break,
        };

        match next {
            Some(Ok(payload)) => {
                let item = WorkItem::new(index, payload, root.child_token());
                index += 1;

                // A full channel provides backpressure against the source.
                tokio::select! {
                    sent = req_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    _ = root.cancelled() => break,
                }
            }
            Some(Err(error)) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %error, "source iteration failed; terminating run");

                *run_error.lock().unwrap() = Some(PipelineError::Source(error));
                root.cancel();
                break;
            }
            None => break,
        }
    }

    source_done.store(true, Ordering::SeqCst);
    // Dropping the sender closes the request channel; workers drain it.
}

/// Emits buffered outcomes in ascending index order. Indexes that never
/// produce an outcome (items dropped by cancellation) leave gaps, so the
/// remainder is flushed in order once the input side closes.
async fn reorder_task<R>(mut rx: mpsc::Receiver<Outcome<R>>, tx: mpsc::Sender<Outcome<R>>) {
    let mut next_expected: u64 = 0;
    let mut buffer: BTreeMap<u64, Outcome<R>> = BTreeMap::new();

    while let Some(outcome) = rx.recv().await {
        buffer.insert(outcome.index(), outcome);
        while let Some(ready) = buffer.remove(&next_expected) {
            if tx.send(ready).await.is_err() {
                return;
            }
            next_expected += 1;
        }
    }

    for (_, outcome) in buffer {
        if tx.send(outcome).await.is_err() {
            return;
        }
    }
}

struct Worker<T, R> {
    service: ItemService<T, R>,
    config: Arc<ExecutionConfig<R>>,
    root: CancellationToken,
    req_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem<T>>>>,
    out_tx: mpsc::Sender<Outcome<R>>,
    gate: Option<AdaptiveGate>,
    stats: Arc<RunStats>,
    source_done: Arc<AtomicBool>,
    drain_fired: Arc<AtomicBool>,
}

impl<T, R> Worker<T, R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
{
    async fn run(mut self) {
        loop {
            let item = {
                let mut rx = self.req_rx.lock().await;
                tokio::select! {
                    item = rx.recv() => item,
                    _ = self.root.cancelled() => None,
                }
            };

            let Some(item) = item else {
                self.maybe_fire_drain();
                break;
            };

            // Adaptive admission; the gate observes the effective limit
            // before each new admission.
            let permit = match &self.gate {
                Some(gate) => {
                    tokio::select! {
                        permit = gate.admit() => Some(permit),
                        // The item never entered the worker stage.
                        _ = self.root.cancelled() => break,
                    }
                }
                None => None,
            };

            if !self.process(item, permit).await {
                break;
            }
        }
    }

    async fn process(&mut self, item: WorkItem<T>, permit: Option<AdmitPermit>) -> bool {
        let index = item.index();

        EventCounters::record_item_started();
        self.stats.record_started();
        self.emit(PipelineEvent::ItemStarted {
            overlay_name: self.config.name.clone(),
            timestamp: Instant::now(),
            index,
        });

        // Awaited lifecycle callback: a panic fails the item.
        let start_error = self.config.on_start.as_ref().and_then(|callback| {
            let callback = Arc::clone(callback);
            envelope::awaited("on_start", move || callback(index)).err()
        });

        let started = Instant::now();
        let result = match start_error {
            Some(error) => Err(error),
            None => {
                EventCounters::enter_concurrency();
                let cancel = self.root.clone();
                let service = &mut self.service;
                let item_for_call = item.clone();
                let call = async move {
                    let ready = service.ready().await?;
                    ready.call(item_for_call).await
                };
                let result = tokio::select! {
                    result = call => result,
                    _ = cancel.cancelled() => Err(ItemError::Cancelled),
                };
                EventCounters::exit_concurrency();
                result
            }
        };
        let latency = started.elapsed();
        let attempts = item.attempts().max(1);

        if let Some(permit) = permit {
            permit.complete(latency, result.is_ok());
        }

        let result = self.apply_fallback(index, result);

        // A panicking on_complete is treated as the item failing.
        let result = match result {
            Ok(value) => {
                let complete_error = self.config.on_complete.as_ref().and_then(|callback| {
                    let callback = Arc::clone(callback);
                    envelope::awaited("on_complete", move || callback(index, attempts, latency))
                        .err()
                });
                match complete_error {
                    None => Ok(value),
                    Some(error) => Err(error),
                }
            }
            Err(error) => Err(error),
        };

        let outcome = match result {
            Ok(value) => {
                EventCounters::record_item_completed();
                self.stats.record_succeeded();
                self.emit(PipelineEvent::ItemSucceeded {
                    overlay_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    index,
                    attempts,
                    duration: latency,
                });
                Outcome::Success { index, value }
            }
            Err(error) => {
                EventCounters::record_failure();
                self.stats.record_failed();

                if let Some(callback) = &self.config.on_error {
                    let callback = Arc::clone(callback);
                    let kind_error = &error;
                    envelope::fire_and_forget("on_error", || callback(index, kind_error));
                }
                self.emit(PipelineEvent::ItemFailed {
                    overlay_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    index,
                    kind: error.kind(),
                    attempts,
                });

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    pipeline = %self.config.name,
                    index,
                    kind = error.kind(),
                    attempts,
                    "item failed terminally"
                );

                if self.config.error_mode == ErrorMode::FailFast && !error.is_cancelled() {
                    self.root.cancel();
                }

                Outcome::Failure {
                    index,
                    error,
                    attempts,
                }
            }
        };

        // Best-effort swallows failures; they are visible only through
        // counters and callbacks.
        if !outcome.is_success() && self.config.error_mode == ErrorMode::BestEffort {
            return true;
        }

        self.out_tx.send(outcome).await.is_ok()
    }

    fn apply_fallback(&self, index: u64, result: Result<R, ItemError>) -> Result<R, ItemError> {
        let error = match result {
            Err(error) if !error.is_cancelled() && self.config.fallback.is_some() => error,
            other => return other,
        };

        let fallback = self.config.fallback.as_ref().expect("checked above");
        let value = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| fallback(&error)));

        match value {
            Ok(Some(value)) => {
                self.emit(PipelineEvent::FallbackApplied {
                    overlay_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    index,
                });
                if let Some(callback) = &self.config.on_fallback {
                    let callback = Arc::clone(callback);
                    envelope::fire_and_forget("on_fallback", move || callback(index));
                }
                Ok(value)
            }
            Ok(None) => Err(error),
            Err(_panic) => {
                EventCounters::record_callback_failure();
                Err(error)
            }
        }
    }

    fn maybe_fire_drain(&self) {
        if self.root.is_cancelled() {
            return;
        }
        if self.source_done.load(Ordering::SeqCst)
            && !self.drain_fired.swap(true, Ordering::SeqCst)
        {
            EventCounters::record_drain();
            self.emit(PipelineEvent::Drained {
                overlay_name: self.config.name.clone(),
                timestamp: Instant::now(),
            });
            if let Some(callback) = &self.config.on_drain {
                let callback = Arc::clone(callback);
                envelope::fire_and_forget("on_drain", move || callback());
            }
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.config.event_listeners.emit(&event);
    }
}
