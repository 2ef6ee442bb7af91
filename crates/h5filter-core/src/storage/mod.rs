//! Destinations for filtered chunk bytes.

mod file;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub use file::{ChunkRecord, FileChunkStore};

use crate::types::{FilterMask, Result};

/// Persists filtered chunks. Called concurrently from pool workers.
pub trait ChunkStore: Send + Sync {
    /// Stores `bytes` for the chunk at `offset` with the mask of steps that
    /// did not apply.
    fn write_chunk(&self, offset: &[u64], filter_mask: FilterMask, bytes: &[u8]) -> Result<()>;
}

/// A chunk as held by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub filter_mask: FilterMask,
    pub data: Vec<u8>,
}

/// Keeps chunks in memory, keyed by offset. Later writes replace earlier ones.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<BTreeMap<Vec<u64>, StoredChunk>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Vec<u64>, StoredChunk>> {
        self.chunks.lock().expect("chunk store mutex poisoned")
    }

    pub fn get(&self, offset: &[u64]) -> Option<StoredChunk> {
        self.lock().get(offset).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of stored chunk sizes.
    pub fn stored_bytes(&self) -> usize {
        self.lock().values().map(|chunk| chunk.data.len()).sum()
    }

    /// Copies out every chunk in offset order.
    pub fn chunks(&self) -> Vec<(Vec<u64>, StoredChunk)> {
        self.lock()
            .iter()
            .map(|(offset, chunk)| (offset.clone(), chunk.clone()))
            .collect()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn write_chunk(&self, offset: &[u64], filter_mask: FilterMask, bytes: &[u8]) -> Result<()> {
        self.lock().insert(
            offset.to_vec(),
            StoredChunk {
                filter_mask,
                data: bytes.to_vec(),
            },
        );
        Ok(())
    }
}
