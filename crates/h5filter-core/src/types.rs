use std::ops::{BitOr, BitOrAssign};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

pub type Result<T> = std::result::Result<T, FilterError>;

/// Numeric filter identifier as carried in pipelines and plugin descriptors.
pub type FilterId = i32;

/// Sentinel id accepted by [`crate::FilterPipeline::delete`] to clear every step.
pub const FILTER_ALL: FilterId = 0;
pub const FILTER_DEFLATE: FilterId = 1;
pub const FILTER_SHUFFLE: FilterId = 2;
pub const FILTER_FLETCHER32: FilterId = 3;
/// Registered id of the LZ4 plugin filter.
pub const FILTER_LZ4: FilterId = 32004;
/// Registered id of the Zstandard plugin filter.
pub const FILTER_ZSTD: FilterId = 32015;

/// Ids below this value are predefined and cannot be (un)registered by applications.
pub const FILTER_RESERVED: FilterId = 256;
pub const FILTER_MAX: FilterId = 65535;

/// Maximum number of steps in one pipeline.
pub const MAX_NFILTERS: usize = 32;
/// Client data arrays up to this many words are stored inline in a step.
pub const COMMON_CD_VALUES: usize = 4;

/// Returns true when `id` lies in the valid filter id range.
pub fn is_valid_filter_id(id: FilterId) -> bool {
    (0..=FILTER_MAX).contains(&id)
}

/// Per-step flags. The low byte holds definition flags stored with the
/// pipeline, the high byte holds flags passed only at invocation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterFlags(u32);

impl FilterFlags {
    pub const MANDATORY: Self = Self(0x0000);
    pub const OPTIONAL: Self = Self(0x0001);
    pub const DEFINITION_MASK: Self = Self(0x00ff);
    pub const REVERSE: Self = Self(0x0100);
    pub const SKIP_EDC: Self = Self(0x0200);
    pub const INVOCATION_MASK: Self = Self(0xff00);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_optional(self) -> bool {
        self.contains(Self::OPTIONAL)
    }

    /// Returns true when only definition bits are set.
    pub const fn is_definition(self) -> bool {
        self.0 & !Self::DEFINITION_MASK.0 == 0
    }
}

impl BitOr for FilterFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FilterFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One bit per pipeline step; a set bit means the step did not apply.
///
/// Stored next to each chunk so readers know which steps to undo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterMask(u32);

impl FilterMask {
    pub const EMPTY: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn set(&mut self, index: usize) {
        if index < u32::BITS as usize {
            self.0 |= 1 << index;
        }
    }

    pub fn is_set(&self, index: usize) -> bool {
        index < u32::BITS as usize && self.0 & (1 << index) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// A chunk of a dataset handed to the worker pool.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    /// Logical element coordinates of the chunk's first element.
    pub offset: Vec<u64>,
    pub data: Bytes,
}

impl Chunk {
    /// Creates a new chunk
    ///
    /// # Arguments
    /// * `index` - Position of this chunk in submission order
    /// * `offset` - Per-dimension element coordinates of the chunk origin
    /// * `data` - Unfiltered chunk bytes
    pub fn new(index: usize, offset: Vec<u64>, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            offset,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Result of filtering and storing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWrite {
    pub index: usize,
    pub offset: Vec<u64>,
    pub raw_bytes: usize,
    pub stored_bytes: usize,
    pub filter_mask: FilterMask,
}

impl ChunkWrite {
    /// Stored-to-raw size ratio.
    pub fn ratio(&self) -> f64 {
        if self.raw_bytes == 0 {
            1.0
        } else {
            self.stored_bytes as f64 / self.raw_bytes as f64
        }
    }
}
