use std::time::Duration;

use crate::telemetry::{self, tags};

/// Telemetry contract for pool workers.
///
/// The pool calls these hooks around each chunk so alternative backends can
/// observe worker activity without the pool depending on them.
pub trait WorkerTelemetry: Send + Sync {
    fn on_queue_depth(&self, worker_id: usize, depth: usize);
    fn on_task_started(&self, worker_id: usize, chunk_index: usize);
    fn on_task_finished(&self, worker_id: usize, chunk_index: usize, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, chunk_index: usize, elapsed: Duration);
    fn on_worker_exit(&self, worker_id: usize, tasks_completed: usize);
}

/// Default telemetry: metrics through [`telemetry`] plus `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_queue_depth(&self, _worker_id: usize, depth: usize) {
        telemetry::set_gauge(
            tags::METRIC_QUEUE_DEPTH,
            depth as u64,
            &[("subsystem", "worker"), ("op", "queue_depth")],
        );
    }

    fn on_task_started(&self, worker_id: usize, chunk_index: usize) {
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_START_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );
        telemetry::add_gauge(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );

        tracing::trace!(
            target: tags::TARGET_WORKER,
            op = "task_start",
            worker_id,
            chunk_index,
            "worker picked up chunk"
        );
    }

    fn on_task_finished(&self, worker_id: usize, chunk_index: usize, elapsed: Duration) {
        let elapsed_us = telemetry::duration_us(elapsed);

        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_FINISH_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", "ok")],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", "ok")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", "ok")],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish")],
        );

        tracing::debug!(
            target: tags::TARGET_WORKER,
            op = "task_finish",
            result = "ok",
            worker_id,
            chunk_index,
            elapsed_us,
            "chunk written"
        );
    }

    fn on_task_failed(&self, worker_id: usize, chunk_index: usize, elapsed: Duration) {
        let elapsed_us = telemetry::duration_us(elapsed);

        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_FAIL_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", "error")],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", "error")],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", "error")],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_failed")],
        );

        tracing::warn!(
            target: tags::TARGET_WORKER,
            op = "task_finish",
            result = "error",
            worker_id,
            chunk_index,
            elapsed_us,
            "chunk failed"
        );
    }

    fn on_worker_exit(&self, worker_id: usize, tasks_completed: usize) {
        telemetry::increment_counter(
            tags::METRIC_WORKER_EXIT_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "exit")],
        );

        tracing::debug!(
            target: tags::TARGET_WORKER,
            op = "exit",
            worker_id,
            tasks_completed,
            "worker observed end of stream"
        );
    }
}
