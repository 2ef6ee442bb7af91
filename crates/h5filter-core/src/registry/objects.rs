//! Views of the host library's open objects, used when unregistering filters.

use std::sync::Arc;

pub use crate::error::ObjectKind;
use crate::pipeline::FilterPipeline;
use crate::types::Result;

/// Visitor verdict for object iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// Access mode a file was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileIntent {
    ReadOnly,
    ReadWrite,
}

/// Process group able to synchronise collectively opened files.
pub trait Communicator: Send + Sync {
    fn barrier(&self) -> Result<()>;
}

/// An open file as seen by the registry.
pub trait OpenFile {
    fn intent(&self) -> Result<FileIntent>;

    /// Flushes every object of the file, including cached chunks that still
    /// need the filter being unregistered.
    fn flush_global(&self) -> Result<()>;

    /// True when the file was opened collectively by a process group.
    fn is_collective(&self) -> bool {
        false
    }

    /// The file's communicator; `None` for a null communicator.
    fn communicator(&self) -> Result<Option<Arc<dyn Communicator>>> {
        Ok(None)
    }
}

/// Iteration over the host library's open objects.
pub trait OpenObjects {
    /// Visits the creation pipelines of open datasets or groups.
    fn visit_pipelines(
        &self,
        kind: ObjectKind,
        visitor: &mut dyn FnMut(&FilterPipeline) -> Result<Visit>,
    ) -> Result<()>;

    /// Visits every open file.
    fn visit_files(&self, visitor: &mut dyn FnMut(&dyn OpenFile) -> Result<Visit>) -> Result<()>;
}

/// Host with nothing open.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpenObjects;

impl OpenObjects for NoOpenObjects {
    fn visit_pipelines(
        &self,
        _kind: ObjectKind,
        _visitor: &mut dyn FnMut(&FilterPipeline) -> Result<Visit>,
    ) -> Result<()> {
        Ok(())
    }

    fn visit_files(&self, _visitor: &mut dyn FnMut(&dyn OpenFile) -> Result<Visit>) -> Result<()> {
        Ok(())
    }
}
