//! Filter pipelines: the ordered step list, its execution engine and the
//! checks run before a pipeline is attached to a dataset.

pub mod engine;
pub mod gating;
pub mod step;
pub mod types;

pub use engine::{
    CallbackAction, ChunkBuffer, CodecSource, Direction, EdcMode, FailureCallback,
    PipelineOptions, PipelineOutcome, decode_chunk, encode_chunk, run,
};
pub use step::{ClientData, FilterStep};
pub use types::{DatasetCreation, Dataspace, Datatype, Layout, TypeClass};

use crate::error::FilterError;
use crate::types::{FILTER_ALL, FilterFlags, FilterId, MAX_NFILTERS, Result, is_valid_filter_id};

/// Ordered list of filter steps applied to every chunk of a dataset.
///
/// Steps run in insertion order on write and in reverse on read. Duplicate
/// ids are allowed; lookups by id address the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPipeline {
    steps: Vec<FilterStep>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Allocated step slots.
    pub fn capacity(&self) -> usize {
        self.steps.capacity()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterStep> {
        self.steps.iter()
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [FilterStep] {
        &mut self.steps
    }

    pub fn get(&self, index: usize) -> Option<&FilterStep> {
        self.steps.get(index)
    }

    /// Appends a step.
    ///
    /// # Arguments
    /// * `id` - Filter to run
    /// * `flags` - Definition flags; invocation bits are rejected
    /// * `client_data` - Filter parameters
    pub fn append(&mut self, id: FilterId, flags: FilterFlags, client_data: &[u32]) -> Result<()> {
        self.push(FilterStep::new(id, flags, client_data))
    }

    /// Appends a fully built step, e.g. one carrying a name.
    pub fn push(&mut self, step: FilterStep) -> Result<()> {
        if !is_valid_filter_id(step.id()) {
            return Err(FilterError::InvalidFilterId(step.id()));
        }
        if !step.flags().is_definition() {
            return Err(FilterError::InvalidFlags(step.flags().bits()));
        }
        if self.steps.len() >= MAX_NFILTERS {
            return Err(FilterError::TooManyFilters);
        }

        if self.steps.len() == self.steps.capacity() {
            let target = MAX_NFILTERS.max(2 * self.steps.capacity());
            self.steps.reserve_exact(target - self.steps.len());
        }
        self.steps.push(step);
        Ok(())
    }

    /// Replaces flags and client data of the first step with `id`.
    pub fn modify(&mut self, id: FilterId, flags: FilterFlags, client_data: &[u32]) -> Result<()> {
        if !flags.is_definition() {
            return Err(FilterError::InvalidFlags(flags.bits()));
        }

        let step = self
            .steps
            .iter_mut()
            .find(|step| step.id() == id)
            .ok_or(FilterError::FilterNotInPipeline(id))?;
        step.set_flags(flags);
        step.set_client_data(client_data);
        Ok(())
    }

    /// Removes the first step with `id`, or every step for [`FILTER_ALL`].
    ///
    /// Deleting from an empty pipeline is a no-op.
    pub fn delete(&mut self, id: FilterId) -> Result<()> {
        if self.steps.is_empty() {
            return Ok(());
        }
        if id == FILTER_ALL {
            self.steps.clear();
            return Ok(());
        }

        let index = self
            .find_index(id)
            .ok_or(FilterError::FilterNotInPipeline(id))?;
        self.steps.remove(index);
        Ok(())
    }

    pub fn contains(&self, id: FilterId) -> bool {
        self.find_index(id).is_some()
    }

    /// Borrows the first step with `id`.
    pub fn filter_info(&self, id: FilterId) -> Result<&FilterStep> {
        self.steps
            .iter()
            .find(|step| step.id() == id)
            .ok_or(FilterError::FilterNotInPipeline(id))
    }

    pub fn find_index(&self, id: FilterId) -> Option<usize> {
        self.steps.iter().position(|step| step.id() == id)
    }
}

impl<'a> IntoIterator for &'a FilterPipeline {
    type Item = &'a FilterStep;
    type IntoIter = std::slice::Iter<'a, FilterStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
