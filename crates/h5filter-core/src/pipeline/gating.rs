//! Checks run when a pipeline is attached to a dataset, before any chunk is
//! filtered.

use super::{DatasetCreation, Dataspace, Datatype, FilterPipeline, Layout};
use crate::error::FilterError;
use crate::registry::{FilterRegistry, FilterTarget};
use crate::telemetry::tags;
use crate::types::{FilterMask, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prelude {
    CanApply,
    SetLocal,
}

/// Asks each step's filter whether it can handle `datatype` in chunks of the
/// dataset's chunk shape.
///
/// Default creation lists, unchunked layouts and empty pipelines pass
/// without any check.
///
/// Returns the steps that are optional and refused; writes must exclude them
/// with [`PipelineOptions::with_exclude`](super::PipelineOptions::with_exclude).
pub fn can_apply(
    dcpl: &DatasetCreation,
    datatype: &Datatype,
    registry: &FilterRegistry,
) -> Result<FilterMask> {
    let Some(chunk_space) = chunk_space(dcpl) else {
        return Ok(FilterMask::EMPTY);
    };

    let mut pipeline = dcpl.pipeline().clone();
    prelude(
        &mut pipeline,
        &FilterTarget::new(datatype, &chunk_space),
        registry,
        Prelude::CanApply,
    )
}

/// Lets each step's filter tune its client data for `datatype`.
pub fn set_local(dcpl: &mut DatasetCreation, datatype: &Datatype, registry: &FilterRegistry) -> Result<()> {
    let Some(chunk_space) = chunk_space(dcpl) else {
        return Ok(());
    };

    prelude(
        dcpl.pipeline_mut(),
        &FilterTarget::new(datatype, &chunk_space),
        registry,
        Prelude::SetLocal,
    )
    .map(|_| ())
}

/// Runs [`can_apply`] then [`set_local`], returning the refused optional steps.
pub fn prepare(
    dcpl: &mut DatasetCreation,
    datatype: &Datatype,
    registry: &FilterRegistry,
) -> Result<FilterMask> {
    let refused = can_apply(dcpl, datatype, registry)?;
    set_local(dcpl, datatype, registry)?;
    Ok(refused)
}

/// [`can_apply`] for opaque byte streams with no type or shape.
pub fn can_apply_direct(pipeline: &FilterPipeline, registry: &FilterRegistry) -> Result<FilterMask> {
    let mut pipeline = pipeline.clone();
    prelude(&mut pipeline, &FilterTarget::opaque(), registry, Prelude::CanApply)
}

/// [`set_local`] for opaque byte streams with no type or shape.
pub fn set_local_direct(pipeline: &mut FilterPipeline, registry: &FilterRegistry) -> Result<()> {
    prelude(pipeline, &FilterTarget::opaque(), registry, Prelude::SetLocal).map(|_| ())
}

/// Decides whether filtering is skipped altogether.
///
/// Null and scalar spaces and variable-length types cannot be filtered: the
/// answer is `true` when every step is optional and an error otherwise.
pub fn ignore_filters(dcpl: &DatasetCreation, datatype: &Datatype, space: &Dataspace) -> Result<bool> {
    let pipeline = dcpl.pipeline();
    if pipeline.is_empty() {
        return Ok(false);
    }

    let unsuitable =
        matches!(space, Dataspace::Null | Dataspace::Scalar) || datatype.is_variable_length();
    if !unsuitable {
        return Ok(false);
    }

    if pipeline.iter().all(|step| step.is_optional()) {
        tracing::debug!(
            target: tags::TARGET_PIPELINE,
            steps = pipeline.len(),
            "ignoring optional filters for unsuitable space or type"
        );
        Ok(true)
    } else {
        Err(FilterError::NotSuitable)
    }
}

fn chunk_space(dcpl: &DatasetCreation) -> Option<Dataspace> {
    if dcpl.is_default() || dcpl.pipeline().is_empty() {
        return None;
    }

    match dcpl.layout() {
        Layout::Chunked(dims) => Some(Dataspace::Simple(dims.clone())),
        Layout::Contiguous | Layout::Compact => None,
    }
}

fn prelude(
    pipeline: &mut FilterPipeline,
    target: &FilterTarget<'_>,
    registry: &FilterRegistry,
    kind: Prelude,
) -> Result<FilterMask> {
    let mut refused = FilterMask::EMPTY;
    for (index, step) in pipeline.steps_mut().iter_mut().enumerate() {
        let id = step.id();
        let Some(class) = registry.find(id, step.is_optional())? else {
            continue;
        };

        match kind {
            Prelude::CanApply => {
                if !class.encoder_present() {
                    return Err(FilterError::NoEncoder(id));
                }
                match class.codec().can_apply(target) {
                    Ok(true) => {}
                    Ok(false) if step.is_optional() => {
                        refused.set(index);
                        tracing::debug!(
                            target: tags::TARGET_PIPELINE,
                            id,
                            index,
                            "optional filter cannot apply; it will be skipped"
                        );
                    }
                    Ok(false) => {
                        return Err(FilterError::CanApply {
                            id,
                            reason: "filter parameters not appropriate".to_string(),
                        });
                    }
                    Err(reason) => {
                        return Err(FilterError::CanApply {
                            id,
                            reason: format!("error during user callback: {reason}"),
                        });
                    }
                }
            }
            Prelude::SetLocal => {
                class
                    .codec()
                    .set_local(step, target)
                    .map_err(|reason| FilterError::SetLocal { id, reason })?;
            }
        }
    }

    Ok(refused)
}
