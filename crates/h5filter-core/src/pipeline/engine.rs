use std::time::Instant;

use super::{FilterPipeline, FilterStep};
use crate::error::FilterError;
use crate::registry::FilterClass;
use crate::telemetry::{self, tags};
use crate::types::{FilterFlags, FilterId, FilterMask, Result};

/// Where the engine gets the codec for each step.
pub trait CodecSource {
    /// Codec for the step at `index`, if already known.
    fn codec(&self, index: usize, step: &FilterStep) -> Option<FilterClass>;

    /// Attempts to make a missing codec available. Only consulted on read.
    fn load(&self, _step: &FilterStep) -> Result<Option<FilterClass>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encode: steps in definition order.
    Write,
    /// Decode: steps in reverse order with [`FilterFlags::REVERSE`].
    Read,
}

/// Error-detection setting for reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdcMode {
    #[default]
    Enabled,
    /// Adds [`FilterFlags::SKIP_EDC`] so checksum filters skip verification.
    Disabled,
}

/// Decision returned by a [`FailureCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Fail,
    /// Treat the step as not applied and carry on with the untouched buffer.
    Continue,
}

/// Called when a mandatory step (or any step on read) returns 0.
pub type FailureCallback = dyn Fn(FilterId, &[u8]) -> CallbackAction + Send + Sync;

/// Per-call engine settings.
#[derive(Clone, Copy)]
pub struct PipelineOptions<'a> {
    pub direction: Direction,
    /// Steps whose bit is set are skipped and stay marked in the output mask.
    pub exclude: FilterMask,
    pub edc: EdcMode,
    pub on_failure: Option<&'a FailureCallback>,
}

impl<'a> PipelineOptions<'a> {
    pub fn write() -> Self {
        Self {
            direction: Direction::Write,
            exclude: FilterMask::EMPTY,
            edc: EdcMode::Enabled,
            on_failure: None,
        }
    }

    pub fn read() -> Self {
        Self {
            direction: Direction::Read,
            ..Self::write()
        }
    }

    pub fn with_exclude(mut self, exclude: FilterMask) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_edc(mut self, edc: EdcMode) -> Self {
        self.edc = edc;
        self
    }

    pub fn with_callback(mut self, callback: &'a FailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }
}

impl std::fmt::Debug for PipelineOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("direction", &self.direction)
            .field("exclude", &self.exclude)
            .field("edc", &self.edc)
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// Growable byte buffer with a count of valid bytes.
///
/// `data.len()` is the allocated size; only the first `nbytes` bytes are
/// meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkBuffer {
    data: Vec<u8>,
    nbytes: usize,
}

impl ChunkBuffer {
    /// Wraps `data` with every byte valid.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let nbytes = data.len();
        Self { data, nbytes }
    }

    /// Wraps `data` with only the first `nbytes` valid.
    pub fn with_valid(data: Vec<u8>, nbytes: usize) -> Self {
        let nbytes = nbytes.min(data.len());
        Self { data, nbytes }
    }

    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    pub fn buf_size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.nbytes]
    }

    /// Returns the valid bytes, dropping any slack.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.nbytes);
        self.data
    }
}

/// Result of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub nbytes: usize,
    /// Input exclusions plus every step that did not apply.
    pub filter_mask: FilterMask,
}

/// Runs `pipeline` over `buffer` in the direction given by `options`.
///
/// On success the buffer holds the transformed bytes. A mandatory failure
/// returns an error and leaves the buffer as the failing codec left it.
pub fn run(
    pipeline: &FilterPipeline,
    source: &dyn CodecSource,
    options: &PipelineOptions<'_>,
    buffer: &mut ChunkBuffer,
) -> Result<PipelineOutcome> {
    let mut mask = options.exclude;
    if pipeline.is_empty() {
        return Ok(PipelineOutcome {
            nbytes: buffer.nbytes,
            filter_mask: mask,
        });
    }
    if buffer.nbytes == 0 || buffer.data.is_empty() {
        return Err(FilterError::InvalidArgument("empty chunk buffer"));
    }

    let started_at = Instant::now();
    let bytes_in = buffer.nbytes;
    let result = match options.direction {
        Direction::Write => run_write(pipeline, source, options, buffer, &mut mask),
        Direction::Read => run_read(pipeline, source, options, buffer, &mut mask),
    };
    record_run(options.direction, bytes_in, buffer.nbytes, started_at, result.is_ok());

    result.map(|()| PipelineOutcome {
        nbytes: buffer.nbytes,
        filter_mask: mask,
    })
}

fn run_write(
    pipeline: &FilterPipeline,
    source: &dyn CodecSource,
    options: &PipelineOptions<'_>,
    buffer: &mut ChunkBuffer,
    mask: &mut FilterMask,
) -> Result<()> {
    for (index, step) in pipeline.iter().enumerate() {
        if mask.is_set(index) {
            continue;
        }

        let Some(class) = source.codec(index, step) else {
            if step.is_optional() {
                skip(mask, index, step, "filter not available");
                continue;
            }
            return Err(FilterError::WriteFailed {
                id: step.id(),
                reason: "required filter is not registered".to_string(),
            });
        };

        let produced = invoke(&class, step, step.flags(), buffer);
        if produced != 0 {
            buffer.nbytes = produced;
            continue;
        }

        if step.is_optional() {
            skip(mask, index, step, "optional filter failed");
            continue;
        }

        match options.on_failure.map(|callback| callback(step.id(), buffer.as_bytes())) {
            Some(CallbackAction::Continue) => {
                buffer.nbytes = buffer.data.len();
                skip(mask, index, step, "failure callback continued");
            }
            _ => {
                return Err(FilterError::WriteFailed {
                    id: step.id(),
                    reason: "filter returned failure".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn run_read(
    pipeline: &FilterPipeline,
    source: &dyn CodecSource,
    options: &PipelineOptions<'_>,
    buffer: &mut ChunkBuffer,
    mask: &mut FilterMask,
) -> Result<()> {
    let mut invocation = FilterFlags::REVERSE;
    if options.edc == EdcMode::Disabled {
        invocation |= FilterFlags::SKIP_EDC;
    }

    for (index, step) in pipeline.iter().enumerate().rev() {
        if mask.is_set(index) {
            continue;
        }

        let class = match source.codec(index, step) {
            Some(class) => class,
            None => source.load(step)?.ok_or_else(|| FilterError::ReadFailed {
                id: step.id(),
                reason: match step.name() {
                    Some(name) => format!("required filter '{name}' is not registered"),
                    None => "required filter '(name unavailable)' is not registered".to_string(),
                },
            })?,
        };

        let produced = invoke(&class, step, step.flags() | invocation, buffer);
        if produced != 0 {
            buffer.nbytes = produced;
            continue;
        }

        let buf_size = buffer.data.len();
        match options.on_failure.map(|callback| callback(step.id(), &buffer.data[..buf_size])) {
            Some(CallbackAction::Continue) => {
                buffer.nbytes = buf_size;
                skip(mask, index, step, "failure callback continued");
            }
            _ => {
                return Err(FilterError::ReadFailed {
                    id: step.id(),
                    reason: "filter returned failure during read".to_string(),
                });
            }
        }
    }

    Ok(())
}

fn invoke(class: &FilterClass, step: &FilterStep, flags: FilterFlags, buffer: &mut ChunkBuffer) -> usize {
    let produced = class
        .codec()
        .filter(flags, step.client_data(), buffer.nbytes, &mut buffer.data);

    tracing::trace!(
        target: tags::TARGET_PIPELINE,
        id = step.id(),
        name = class.name(),
        flags = flags.bits(),
        bytes_in = buffer.nbytes,
        bytes_out = produced,
        "filter step"
    );
    produced
}

fn skip(mask: &mut FilterMask, index: usize, step: &FilterStep, reason: &'static str) {
    mask.set(index);
    telemetry::increment_counter(
        tags::METRIC_PIPELINE_SKIPPED_COUNT,
        1,
        &[("subsystem", "pipeline"), ("op", "skip")],
    );
    tracing::debug!(
        target: tags::TARGET_PIPELINE,
        id = step.id(),
        index,
        reason,
        "filter step not applied"
    );
}

fn record_run(direction: Direction, bytes_in: usize, bytes_out: usize, started_at: Instant, ok: bool) {
    let elapsed_us = telemetry::duration_us(started_at.elapsed());
    let (count, errors, input, output, latency, op) = match direction {
        Direction::Write => (
            tags::METRIC_PIPELINE_WRITE_COUNT,
            tags::METRIC_PIPELINE_WRITE_ERROR_COUNT,
            tags::METRIC_PIPELINE_WRITE_BYTES_IN,
            tags::METRIC_PIPELINE_WRITE_BYTES_OUT,
            tags::METRIC_PIPELINE_WRITE_LATENCY_US,
            "write",
        ),
        Direction::Read => (
            tags::METRIC_PIPELINE_READ_COUNT,
            tags::METRIC_PIPELINE_READ_ERROR_COUNT,
            tags::METRIC_PIPELINE_READ_BYTES_IN,
            tags::METRIC_PIPELINE_READ_BYTES_OUT,
            tags::METRIC_PIPELINE_READ_LATENCY_US,
            "read",
        ),
    };
    let labels = [("subsystem", "pipeline"), ("op", op)];

    telemetry::increment_counter(count, 1, &labels);
    telemetry::record_histogram(latency, elapsed_us, &labels);
    if ok {
        telemetry::increment_counter(input, bytes_in as u64, &labels);
        telemetry::increment_counter(output, bytes_out as u64, &labels);
    } else {
        telemetry::increment_counter(errors, 1, &labels);
    }
}

/// Filters `data` forward and returns the stored bytes and mask.
pub fn encode_chunk(
    pipeline: &FilterPipeline,
    source: &dyn CodecSource,
    data: &[u8],
) -> Result<(Vec<u8>, FilterMask)> {
    let mut buffer = ChunkBuffer::from_vec(data.to_vec());
    let outcome = run(pipeline, source, &PipelineOptions::write(), &mut buffer)?;
    Ok((buffer.into_vec(), outcome.filter_mask))
}

/// Undoes the steps recorded as applied in `filter_mask`.
pub fn decode_chunk(
    pipeline: &FilterPipeline,
    source: &dyn CodecSource,
    stored: &[u8],
    filter_mask: FilterMask,
) -> Result<Vec<u8>> {
    let mut buffer = ChunkBuffer::from_vec(stored.to_vec());
    run(
        pipeline,
        source,
        &PipelineOptions::read().with_exclude(filter_mask),
        &mut buffer,
    )?;
    Ok(buffer.into_vec())
}
