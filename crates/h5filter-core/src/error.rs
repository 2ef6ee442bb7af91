use std::path::PathBuf;

use thiserror::Error;

use crate::types::FilterId;

/// Kind of open object that still references a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Dataset,
    Group,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dataset => f.write_str("dataset"),
            Self::Group => f.write_str("group"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter identification number {0}")]
    InvalidFilterId(FilterId),
    #[error("unable to modify predefined filter {0}")]
    PredefinedFilter(FilterId),
    #[error("invalid filter flags {0:#06x}")]
    InvalidFlags(u32),
    #[error("too many filters in pipeline")]
    TooManyFilters,
    #[error("filter {0} is not registered")]
    FilterNotRegistered(FilterId),
    #[error("filter {0} is not in pipeline")]
    FilterNotInPipeline(FilterId),
    #[error("unknown filter {0}")]
    UnknownFilter(FilterId),
    #[error("failed to load plugin library {path}: {source}")]
    PluginLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("failed to resolve symbol {symbol} in {path}: {source}")]
    PluginSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
    #[error("invalid plugin {path}: {reason}")]
    InvalidPlugin { path: PathBuf, reason: &'static str },
    #[error("filter {id}: {reason}")]
    WriteFailed { id: FilterId, reason: String },
    #[error("filter {id}: {reason}")]
    ReadFailed { id: FilterId, reason: String },
    #[error("filter {0} present but encoding is disabled")]
    NoEncoder(FilterId),
    #[error("filter {0} present but decoding is disabled")]
    NoDecoder(FilterId),
    #[error("filter {id}: {reason}")]
    CanApply { id: FilterId, reason: String },
    #[error("filter {id}: error during user callback: {reason}")]
    SetLocal { id: FilterId, reason: String },
    #[error("data space or type is not suitable for filters")]
    NotSuitable,
    #[error("can't unregister filter {id} because a {kind} is still using it")]
    FilterInUse { id: FilterId, kind: ObjectKind },
    #[error("collective operation failed: {0}")]
    Collective(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("worker pool error: {0}")]
    WorkerPool(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FilterError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FilterError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &FilterError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}
