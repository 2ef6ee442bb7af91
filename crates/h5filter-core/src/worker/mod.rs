mod pool;
mod writer;

pub use pool::{
    ChunkFailure, PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot,
    WriteSummary,
};
pub use writer::ParallelWriter;
