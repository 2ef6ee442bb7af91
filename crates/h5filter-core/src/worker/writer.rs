use std::sync::Arc;

use super::pool::{WorkerPool, WorkerPoolHandle, WriteSummary};
use crate::config::EngineConfig;
use crate::error::FilterError;
use crate::pipeline::{self, ChunkBuffer, FailureCallback, FilterPipeline, PipelineOptions};
use crate::plugin::{CodecTable, OpenMode};
use crate::registry::FilterRegistry;
use crate::storage::ChunkStore;
use crate::telemetry::tags;
use crate::types::{Chunk, ChunkWrite, FilterMask, Result};

#[derive(Clone)]
struct WriterInner {
    pipeline: FilterPipeline,
    codecs: CodecTable,
    store: Arc<dyn ChunkStore>,
    exclude: FilterMask,
    on_failure: Option<Arc<FailureCallback>>,
}

/// Filters the chunks of one dataset in parallel and hands them to a store.
///
/// Cheap to clone; clones share the pipeline, codec table and store.
#[derive(Clone)]
pub struct ParallelWriter {
    inner: Arc<WriterInner>,
}

impl ParallelWriter {
    /// Creates a writer from a codec table already resolved for `pipeline`.
    pub fn new(pipeline: FilterPipeline, codecs: CodecTable, store: Arc<dyn ChunkStore>) -> Result<Self> {
        if codecs.mode() != OpenMode::Write {
            return Err(FilterError::InvalidArgument("codec table was not resolved for writing"));
        }
        if codecs.len() != pipeline.len() {
            return Err(FilterError::InvalidArgument(
                "codec table does not match the pipeline",
            ));
        }

        Ok(Self {
            inner: Arc::new(WriterInner {
                pipeline,
                codecs,
                store,
                exclude: FilterMask::EMPTY,
                on_failure: None,
            }),
        })
    }

    /// Resolves the codec table for `pipeline` and creates a writer.
    pub fn prepare(
        pipeline: FilterPipeline,
        config: &EngineConfig,
        registry: &FilterRegistry,
        store: Arc<dyn ChunkStore>,
    ) -> Result<Self> {
        let codecs = CodecTable::resolve(&pipeline, OpenMode::Write, &config.plugin_dir, registry)?;
        Self::new(pipeline, codecs, store)
    }

    /// Installs a callback consulted when a mandatory step fails.
    pub fn with_failure_callback(self, callback: Arc<FailureCallback>) -> Self {
        let inner = Arc::unwrap_or_clone(self.inner);
        Self {
            inner: Arc::new(WriterInner {
                on_failure: Some(callback),
                ..inner
            }),
        }
    }

    /// Skips the steps in `exclude` on every chunk, typically the optional
    /// steps refused by [`gating::prepare`](crate::pipeline::gating::prepare).
    pub fn with_exclude(self, exclude: FilterMask) -> Self {
        let inner = Arc::unwrap_or_clone(self.inner);
        Self {
            inner: Arc::new(WriterInner { exclude, ..inner }),
        }
    }

    pub fn exclude(&self) -> FilterMask {
        self.inner.exclude
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.inner.pipeline
    }

    /// Filters one chunk and writes it to the store.
    pub fn apply_chunk(&self, chunk: Chunk) -> Result<ChunkWrite> {
        let raw_bytes = chunk.len();
        let mut buffer = ChunkBuffer::from_vec(chunk.data.to_vec());

        let mut options = PipelineOptions::write().with_exclude(self.inner.exclude);
        if let Some(callback) = &self.inner.on_failure {
            options = options.with_callback(callback.as_ref());
        }

        let outcome = pipeline::run(&self.inner.pipeline, &self.inner.codecs, &options, &mut buffer)
            .map_err(|error| error.with_context(format!("filtering chunk {}", chunk.index)))?;

        self.inner
            .store
            .write_chunk(&chunk.offset, outcome.filter_mask, buffer.as_bytes())
            .map_err(|error| error.with_context(format!("storing chunk {}", chunk.index)))?;

        Ok(ChunkWrite {
            index: chunk.index,
            offset: chunk.offset,
            raw_bytes,
            stored_bytes: outcome.nbytes,
            filter_mask: outcome.filter_mask,
        })
    }

    /// Spawns `pool` with this writer as the apply function.
    pub fn spawn(&self, pool: &WorkerPool) -> WorkerPoolHandle {
        let writer = self.clone();
        pool.spawn(move |_worker_id, chunk| writer.apply_chunk(chunk))
    }

    /// Writes every chunk with `config.thread_count` workers.
    pub fn write_chunks<I>(&self, chunks: I, config: &EngineConfig) -> Result<WriteSummary>
    where
        I: IntoIterator<Item = Chunk>,
    {
        let pool = WorkerPool::from_config(config);
        let handle = self.spawn(&pool);
        for chunk in chunks {
            handle.submit_chunk(chunk)?;
        }

        let summary = handle.close()?;
        tracing::info!(
            target: tags::TARGET_WORKER,
            op = "write_chunks",
            workers = pool.num_workers(),
            chunks = summary.chunk_count(),
            failures = summary.failures.len(),
            raw_bytes = summary.raw_bytes(),
            stored_bytes = summary.stored_bytes(),
            "parallel filtered write finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ParallelWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelWriter")
            .field("pipeline", &self.inner.pipeline)
            .field("codecs", &self.inner.codecs)
            .field("exclude", &self.inner.exclude)
            .finish_non_exhaustive()
    }
}
