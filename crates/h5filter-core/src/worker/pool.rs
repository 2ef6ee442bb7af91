use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::config::EngineConfig;
use crate::error::FilterError;
use crate::queue::{EnqueueStatus, WorkItem, WorkQueue};
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::telemetry::{self, tags};
use crate::types::{Chunk, ChunkWrite, Result};

/// Fixed-size set of threads draining a shared [`WorkQueue`] of chunks.
pub struct WorkerPool {
    num_workers: usize,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize) -> Self {
        Self::with_telemetry(num_workers, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a pool sized by `config.thread_count`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.thread_count)
    }

    /// Creates a pool with a custom telemetry backend.
    pub fn with_telemetry(num_workers: usize, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        Self {
            num_workers: num_workers.max(1),
            telemetry,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Spawns the workers. Each dequeued chunk is passed to `apply` together
    /// with the id of the worker running it.
    pub fn spawn<F>(&self, apply: F) -> WorkerPoolHandle
    where
        F: Fn(usize, Chunk) -> Result<ChunkWrite> + Send + Sync + 'static,
    {
        let (results_tx, results_rx) = unbounded();
        let state = Arc::new(WorkerPoolState::new(
            Arc::clone(&self.telemetry),
            self.num_workers,
        ));
        let apply = Arc::new(apply);

        let mut worker_handles = Vec::with_capacity(self.num_workers);
        for worker_id in 0..self.num_workers {
            let worker_state = Arc::clone(&state);
            let worker_tx = results_tx.clone();
            let worker_apply = Arc::clone(&apply);

            let handle = thread::Builder::new()
                .name(format!("h5filter-worker-{worker_id}"))
                .spawn(move || run_worker_loop(worker_id, worker_state, worker_apply, worker_tx));
            match handle {
                Ok(handle) => worker_handles.push(handle),
                Err(error) => {
                    tracing::error!(target: tags::TARGET_WORKER, worker_id, %error, "failed to spawn worker");
                }
            }
        }

        drop(results_tx);

        WorkerPoolHandle {
            state,
            results_rx,
            worker_handles,
        }
    }
}

struct WorkerPoolState {
    queue: WorkQueue<Chunk>,
    telemetry: Arc<dyn WorkerTelemetry>,
    started_at: Instant,
    accepting: AtomicBool,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    worker_started_offsets_us: Vec<AtomicU64>,
    worker_stopped_offsets_us: Vec<AtomicU64>,
    worker_busy_us: Vec<AtomicU64>,
}

impl WorkerPoolState {
    fn new(telemetry: Arc<dyn WorkerTelemetry>, num_workers: usize) -> Self {
        Self {
            queue: WorkQueue::new(),
            telemetry,
            started_at: Instant::now(),
            accepting: AtomicBool::new(true),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            task_counts: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            worker_started_offsets_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            worker_stopped_offsets_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            worker_busy_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn elapsed_us(&self) -> u64 {
        telemetry::duration_us(self.started_at.elapsed())
    }
}

/// Per-worker runtime metrics captured by the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub submitted: usize,
    pub completed: usize,
    pub pending: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// A chunk that could not be filtered or stored.
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: usize,
    pub offset: Vec<u64>,
    pub error: FilterError,
}

/// Per-chunk outcomes of a pool run.
#[derive(Debug)]
pub struct WriteSummary {
    /// Successful writes sorted by chunk index.
    pub written: Vec<ChunkWrite>,
    /// Failures sorted by chunk index.
    pub failures: Vec<ChunkFailure>,
    pub runtime: PoolRuntimeSnapshot,
}

impl WriteSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.written.len() + self.failures.len()
    }

    pub fn raw_bytes(&self) -> usize {
        self.written.iter().map(|write| write.raw_bytes).sum()
    }

    pub fn stored_bytes(&self) -> usize {
        self.written.iter().map(|write| write.stored_bytes).sum()
    }

    /// Returns the writes, or the failure of the lowest-indexed chunk.
    pub fn into_result(self) -> Result<Vec<ChunkWrite>> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure
                .error
                .with_context(format!("chunk {} at {:?}", failure.index, failure.offset))),
            None => Ok(self.written),
        }
    }
}

struct ChunkOutcome {
    index: usize,
    offset: Vec<u64>,
    result: Result<ChunkWrite>,
}

/// Runtime handle for a spawned worker pool.
pub struct WorkerPoolHandle {
    state: Arc<WorkerPoolState>,
    results_rx: Receiver<ChunkOutcome>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Queues a chunk for the workers.
    pub fn submit_chunk(&self, chunk: Chunk) -> Result<()> {
        if !self.state.accepting.load(Ordering::Acquire) {
            return Err(FilterError::WorkerPool(
                "worker pool is shutting down; no new chunks accepted".to_string(),
            ));
        }

        self.state.submitted.fetch_add(1, Ordering::AcqRel);
        match self.state.queue.enqueue(WorkItem::Item(chunk)) {
            EnqueueStatus::Rejected(chunk) => {
                self.state.submitted.fetch_sub(1, Ordering::AcqRel);
                Err(FilterError::WorkerPool(format!(
                    "work queue closed before chunk {} was queued",
                    chunk.index
                )))
            }
            EnqueueStatus::Queued | EnqueueStatus::Closed => Ok(()),
        }
    }

    /// Stops accepting chunks and enqueues the end-of-stream marker. Workers
    /// exit once the queue is drained.
    pub fn shutdown(&self) {
        if self.state.accepting.swap(false, Ordering::AcqRel) {
            self.state.queue.enqueue(WorkItem::EndOfStream);
        }
    }

    pub fn submitted_count(&self) -> usize {
        self.state.submitted.load(Ordering::Acquire)
    }

    pub fn completed_count(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Chunks submitted but not yet finished.
    pub fn pending_count(&self) -> usize {
        self.submitted_count()
            .saturating_sub(self.completed_count())
    }

    /// Chunks processed by each worker.
    pub fn worker_task_counts(&self) -> Vec<usize> {
        self.state
            .task_counts
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .collect()
    }

    /// Returns runtime metrics for the pool and each worker.
    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let elapsed = self.state.started_at.elapsed();
        let elapsed_us = telemetry::duration_us(elapsed);
        let submitted = self.submitted_count();
        let completed = self.completed_count();

        let workers = (0..self.state.task_counts.len())
            .map(|worker_id| {
                let started_raw =
                    self.state.worker_started_offsets_us[worker_id].load(Ordering::Acquire);
                let stopped_raw =
                    self.state.worker_stopped_offsets_us[worker_id].load(Ordering::Acquire);
                let busy_raw = self.state.worker_busy_us[worker_id].load(Ordering::Acquire);

                // Offsets are stored +1 so that zero means "not yet".
                let stop_us = match stopped_raw {
                    0 => elapsed_us,
                    raw => raw - 1,
                };
                let uptime_us = match started_raw {
                    0 => 0,
                    raw => stop_us.saturating_sub(raw - 1),
                };
                let busy_us = busy_raw.min(uptime_us);
                let utilization = if uptime_us == 0 {
                    0.0
                } else {
                    busy_us as f64 / uptime_us as f64
                };

                WorkerRuntimeSnapshot {
                    worker_id,
                    tasks_completed: self.state.task_counts[worker_id].load(Ordering::Acquire),
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us - busy_us),
                    utilization,
                }
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed,
            submitted,
            completed,
            pending: submitted.saturating_sub(completed),
            workers,
        }
    }

    /// Closes the queue, waits for every worker and collects the outcomes.
    pub fn close(mut self) -> Result<WriteSummary> {
        self.shutdown();
        let join_result = self.join_workers();
        let runtime = self.runtime_snapshot();

        let mut written = Vec::with_capacity(self.submitted_count());
        let mut failures = Vec::new();
        for outcome in self.results_rx.try_iter() {
            match outcome.result {
                Ok(write) => written.push(write),
                Err(error) => failures.push(ChunkFailure {
                    index: outcome.index,
                    offset: outcome.offset,
                    error,
                }),
            }
        }
        join_result.map_err(FilterError::WorkerPool)?;

        let collected = written.len() + failures.len();
        if collected != runtime.submitted {
            return Err(FilterError::WorkerPool(format!(
                "{} of {} chunks were never processed",
                runtime.submitted - collected.min(runtime.submitted),
                runtime.submitted
            )));
        }

        written.sort_by_key(|write| write.index);
        failures.sort_by_key(|failure| failure.index);
        Ok(WriteSummary {
            written,
            failures,
            runtime,
        })
    }

    fn join_workers(&mut self) -> std::result::Result<(), String> {
        for handle in self.worker_handles.drain(..) {
            if let Err(payload) = handle.join() {
                let details = if let Some(message) = payload.downcast_ref::<&str>() {
                    (*message).to_string()
                } else if let Some(message) = payload.downcast_ref::<String>() {
                    message.clone()
                } else {
                    "unknown panic payload".to_string()
                };

                return Err(format!("worker thread panicked: {details}"));
            }
        }

        Ok(())
    }
}

impl Drop for WorkerPoolHandle {
    fn drop(&mut self) {
        self.shutdown();
        let _ = self.join_workers();
    }
}

fn run_worker_loop<F>(
    worker_id: usize,
    state: Arc<WorkerPoolState>,
    apply: Arc<F>,
    results_tx: Sender<ChunkOutcome>,
) where
    F: Fn(usize, Chunk) -> Result<ChunkWrite> + Send + Sync,
{
    state.worker_started_offsets_us[worker_id]
        .store(state.elapsed_us().saturating_add(1), Ordering::Release);

    while let WorkItem::Item(chunk) = state.queue.dequeue() {
        state.telemetry.on_queue_depth(worker_id, state.queue.len());
        state.telemetry.on_task_started(worker_id, chunk.index);
        let started_at = Instant::now();
        let index = chunk.index;
        let offset = chunk.offset.clone();

        let result = match catch_unwind(AssertUnwindSafe(|| apply(worker_id, chunk))) {
            Ok(result) => result,
            Err(_) => Err(FilterError::WorkerPool(format!(
                "worker task panicked while processing chunk {index}"
            ))),
        };

        let elapsed = started_at.elapsed();
        state.worker_busy_us[worker_id]
            .fetch_add(telemetry::duration_us(elapsed), Ordering::AcqRel);
        match &result {
            Ok(_) => state.telemetry.on_task_finished(worker_id, index, elapsed),
            Err(_) => state.telemetry.on_task_failed(worker_id, index, elapsed),
        }

        state.completed.fetch_add(1, Ordering::AcqRel);
        state.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);

        if results_tx
            .send(ChunkOutcome {
                index,
                offset,
                result,
            })
            .is_err()
        {
            break;
        }
    }

    state.worker_stopped_offsets_us[worker_id]
        .store(state.elapsed_us().saturating_add(1), Ordering::Release);
    state
        .telemetry
        .on_worker_exit(worker_id, state.task_counts[worker_id].load(Ordering::Acquire));
}
