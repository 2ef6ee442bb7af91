use serde::{Deserialize, Serialize};

use super::FilterPipeline;

/// Shape of a dataset or chunk as seen by filter gating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dataspace {
    /// No elements at all.
    Null,
    /// Exactly one element.
    Scalar,
    /// Rectangular array with the given extents.
    Simple(Vec<u64>),
}

impl Dataspace {
    pub fn element_count(&self) -> u64 {
        match self {
            Self::Null => 0,
            Self::Scalar => 1,
            Self::Simple(dims) => dims.iter().product(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeClass {
    Integer,
    Float,
    FixedString,
    VariableString,
    /// Variable-length sequence of a base type.
    Sequence,
    Opaque,
    Compound,
}

/// Element type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    pub class: TypeClass,
    /// Size of one element in bytes.
    pub size: usize,
}

impl Datatype {
    pub const fn new(class: TypeClass, size: usize) -> Self {
        Self { class, size }
    }

    pub const fn int32() -> Self {
        Self::new(TypeClass::Integer, 4)
    }

    pub const fn float64() -> Self {
        Self::new(TypeClass::Float, 8)
    }

    /// Variable-length types store heap references, not element bytes.
    pub const fn is_variable_length(&self) -> bool {
        matches!(self.class, TypeClass::Sequence | TypeClass::VariableString)
    }
}

/// Storage layout of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Contiguous,
    Compact,
    Chunked(Vec<u64>),
}

/// Dataset creation properties that matter to filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetCreation {
    is_default: bool,
    layout: Layout,
    pipeline: FilterPipeline,
}

impl Default for DatasetCreation {
    fn default() -> Self {
        Self {
            is_default: true,
            layout: Layout::Contiguous,
            pipeline: FilterPipeline::new(),
        }
    }
}

impl DatasetCreation {
    /// Creates a non-default, chunked creation list with an empty pipeline.
    pub fn chunked(chunk_dims: Vec<u64>) -> Self {
        Self {
            is_default: false,
            layout: Layout::Chunked(chunk_dims),
            pipeline: FilterPipeline::new(),
        }
    }

    /// Creates a non-default list with the given layout.
    pub fn with_layout(layout: Layout) -> Self {
        Self {
            is_default: false,
            layout,
            pipeline: FilterPipeline::new(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: FilterPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// True for the library default list, which never carries filters.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn chunk_dims(&self) -> Option<&[u64]> {
        match &self.layout {
            Layout::Chunked(dims) => Some(dims),
            _ => None,
        }
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut FilterPipeline {
        &mut self.pipeline
    }
}
