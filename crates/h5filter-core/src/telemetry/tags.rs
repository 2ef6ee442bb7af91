/// Tracing target for work queue events.
pub const TARGET_QUEUE: &str = "h5filter.queue";
/// Tracing target for filter pipeline execution.
pub const TARGET_PIPELINE: &str = "h5filter.pipeline";
/// Tracing target for filter (un)registration and lookup.
pub const TARGET_REGISTRY: &str = "h5filter.registry";
/// Tracing target for plugin discovery and loading.
pub const TARGET_PLUGIN: &str = "h5filter.plugin";
/// Tracing target for worker runtime.
pub const TARGET_WORKER: &str = "h5filter.worker";

pub const METRIC_QUEUE_ENQUEUE_COUNT: &str = "h5filter.queue.enqueue.count";
pub const METRIC_QUEUE_CLOSE_COUNT: &str = "h5filter.queue.close.count";
pub const METRIC_QUEUE_DEPTH: &str = "h5filter.queue.depth";

pub const METRIC_PIPELINE_WRITE_COUNT: &str = "h5filter.pipeline.write.count";
pub const METRIC_PIPELINE_READ_COUNT: &str = "h5filter.pipeline.read.count";
pub const METRIC_PIPELINE_WRITE_ERROR_COUNT: &str = "h5filter.pipeline.write.error.count";
pub const METRIC_PIPELINE_READ_ERROR_COUNT: &str = "h5filter.pipeline.read.error.count";
pub const METRIC_PIPELINE_SKIPPED_COUNT: &str = "h5filter.pipeline.skipped.count";
pub const METRIC_PIPELINE_WRITE_BYTES_IN: &str = "h5filter.pipeline.write.bytes_in";
pub const METRIC_PIPELINE_WRITE_BYTES_OUT: &str = "h5filter.pipeline.write.bytes_out";
pub const METRIC_PIPELINE_READ_BYTES_IN: &str = "h5filter.pipeline.read.bytes_in";
pub const METRIC_PIPELINE_READ_BYTES_OUT: &str = "h5filter.pipeline.read.bytes_out";
pub const METRIC_PIPELINE_WRITE_LATENCY_US: &str = "h5filter.pipeline.write.latency_us";
pub const METRIC_PIPELINE_READ_LATENCY_US: &str = "h5filter.pipeline.read.latency_us";

pub const METRIC_REGISTRY_REGISTER_COUNT: &str = "h5filter.registry.register.count";
pub const METRIC_REGISTRY_UNREGISTER_COUNT: &str = "h5filter.registry.unregister.count";
pub const METRIC_REGISTRY_SIZE: &str = "h5filter.registry.size";

pub const METRIC_PLUGIN_LOAD_COUNT: &str = "h5filter.plugin.load.count";
pub const METRIC_PLUGIN_LOAD_MISS_COUNT: &str = "h5filter.plugin.load.miss.count";
pub const METRIC_PLUGIN_LOAD_LATENCY_US: &str = "h5filter.plugin.load.latency_us";

pub const METRIC_WORKER_TASK_COUNT: &str = "h5filter.worker.task.count";
pub const METRIC_WORKER_TASK_START_COUNT: &str = "h5filter.worker.task.start.count";
pub const METRIC_WORKER_TASK_FINISH_COUNT: &str = "h5filter.worker.task.finish.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "h5filter.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "h5filter.worker.task.latency_us";
pub const METRIC_WORKER_ACTIVE_COUNT: &str = "h5filter.worker.active.count";
pub const METRIC_WORKER_EXIT_COUNT: &str = "h5filter.worker.exit.count";
