pub mod config;
pub mod error;
pub mod pipeline;
pub mod plugin;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod telemetry;
pub mod types;
pub mod worker;

pub use config::EngineConfig;
pub use error::{FilterError, ObjectKind};
pub use pipeline::{
    CallbackAction, ChunkBuffer, ClientData, CodecSource, DatasetCreation, Dataspace, Datatype,
    Direction, EdcMode, FilterPipeline, FilterStep, Layout, PipelineOptions, PipelineOutcome,
    TypeClass,
};
pub use plugin::{CodecTable, OpenMode, PluginLoader};
pub use queue::{EnqueueStatus, WorkItem, WorkQueue};
pub use registry::{FilterClass, FilterCodec, FilterConfig, FilterRegistry, FilterTarget};
pub use storage::{ChunkStore, FileChunkStore, MemoryChunkStore, StoredChunk};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{
    COMMON_CD_VALUES, Chunk, ChunkWrite, FILTER_ALL, FILTER_DEFLATE, FILTER_FLETCHER32,
    FILTER_LZ4, FILTER_MAX, FILTER_RESERVED, FILTER_SHUFFLE, FILTER_ZSTD, FilterFlags, FilterId,
    FilterMask, MAX_NFILTERS, Result,
};
pub use worker::{ParallelWriter, WorkerPool, WorkerPoolHandle, WriteSummary};
