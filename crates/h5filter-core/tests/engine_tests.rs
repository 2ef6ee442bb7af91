use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use h5filter_core::pipeline::{self, FailureCallback};
use h5filter_core::{
    CallbackAction, ChunkBuffer, CodecSource, EdcMode, FILTER_FLETCHER32, FilterClass,
    FilterError, FilterFlags, FilterMask, FilterPipeline, FilterRegistry, FilterStep,
    PipelineOptions, Result,
};

type Trace = Arc<Mutex<Vec<(i32, u32)>>>;

/// Appends one marker byte and records the call.
fn tracing_class(id: i32, trace: &Trace) -> FilterClass {
    let trace = Arc::clone(trace);
    FilterClass::from_fn(id, "trace", move |flags, _cd, nbytes, buf| {
        trace
            .lock()
            .expect("trace mutex poisoned")
            .push((id, flags.bits()));
        if flags.contains(FilterFlags::REVERSE) {
            nbytes - 1
        } else {
            buf.truncate(nbytes);
            buf.push(id as u8);
            nbytes + 1
        }
    })
}

fn failing_class(id: i32) -> FilterClass {
    FilterClass::from_fn(id, "fails", |_flags, _cd, _nbytes, _buf| 0)
}

fn registry_with(classes: Vec<FilterClass>) -> Result<FilterRegistry> {
    let registry = FilterRegistry::new();
    for class in classes {
        registry.register(class)?;
    }
    Ok(registry)
}

#[test]
fn write_runs_forward_and_read_runs_backward() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let trace: Trace = Arc::default();
    let registry = registry_with(vec![
        tracing_class(300, &trace),
        tracing_class(301, &trace),
        tracing_class(302, &trace),
    ])?;
    let mut pipeline = FilterPipeline::new();
    for id in [300, 301, 302] {
        pipeline.append(id, FilterFlags::MANDATORY, &[])?;
    }

    let mut buffer = ChunkBuffer::from_vec(vec![0xAA; 8]);
    let written = pipeline::run(&pipeline, &registry, &PipelineOptions::write(), &mut buffer)?;
    assert_eq!(written.nbytes, 11);
    assert!(written.filter_mask.is_empty());
    assert_eq!(&buffer.as_bytes()[8..], &[44, 45, 46]);

    let read = pipeline::run(&pipeline, &registry, &PipelineOptions::read(), &mut buffer)?;
    assert_eq!(read.nbytes, 8);

    let calls = trace.lock().expect("trace mutex poisoned").clone();
    let order: Vec<_> = calls.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![300, 301, 302, 302, 301, 300]);
    assert!(calls[..3].iter().all(|(_, flags)| flags & 0x0100 == 0));
    assert!(calls[3..].iter().all(|(_, flags)| flags & 0x0100 != 0));
    Ok(())
}

#[test]
fn optional_failure_marks_step_and_continues() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let trace: Trace = Arc::default();
    let registry = registry_with(vec![failing_class(300), tracing_class(301, &trace)])?;
    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::OPTIONAL, &[])?;
    pipeline.append(301, FilterFlags::MANDATORY, &[])?;

    let mut buffer = ChunkBuffer::from_vec(vec![1, 2, 3, 4]);
    let outcome = pipeline::run(&pipeline, &registry, &PipelineOptions::write(), &mut buffer)?;

    assert!(outcome.filter_mask.is_set(0));
    assert!(!outcome.filter_mask.is_set(1));
    assert_eq!(buffer.as_bytes(), &[1, 2, 3, 4, 45]);
    assert_eq!(trace.lock().expect("trace mutex poisoned").len(), 1);
    Ok(())
}

#[test]
fn mandatory_failure_without_callback_leaves_buffer_size() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = registry_with(vec![failing_class(300)])?;
    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::MANDATORY, &[])?;

    let mut buffer = ChunkBuffer::from_vec(vec![9; 16]);
    let error = pipeline::run(&pipeline, &registry, &PipelineOptions::write(), &mut buffer)
        .expect_err("mandatory filter failed");

    assert!(matches!(error, FilterError::WriteFailed { id: 300, .. }));
    assert_eq!(buffer.nbytes(), 16);
    assert_eq!(buffer.as_bytes(), &[9; 16]);
    Ok(())
}

#[test]
fn callback_can_rescue_mandatory_failure() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = registry_with(vec![failing_class(300)])?;
    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::MANDATORY, &[])?;

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let callback: Box<FailureCallback> = Box::new(move |id: i32, bytes: &[u8]| {
        assert_eq!(id, 300);
        assert_eq!(bytes.len(), 12);
        seen.fetch_add(1, Ordering::AcqRel);
        CallbackAction::Continue
    });

    let mut buffer = ChunkBuffer::with_valid(vec![5; 16], 12);
    let options = PipelineOptions::write().with_callback(callback.as_ref());
    let outcome = pipeline::run(&pipeline, &registry, &options, &mut buffer)?;

    assert_eq!(calls.load(Ordering::Acquire), 1);
    assert!(outcome.filter_mask.is_set(0));
    assert_eq!(outcome.nbytes, 16);

    let refuse: Box<FailureCallback> = Box::new(|_: i32, _: &[u8]| CallbackAction::Fail);
    let mut buffer = ChunkBuffer::from_vec(vec![5; 16]);
    let options = PipelineOptions::write().with_callback(refuse.as_ref());
    assert!(pipeline::run(&pipeline, &registry, &options, &mut buffer).is_err());
    Ok(())
}

#[test]
fn missing_codec_fails_mandatory_and_skips_optional() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();

    let mut optional = FilterPipeline::new();
    optional.append(999, FilterFlags::OPTIONAL, &[])?;
    let mut buffer = ChunkBuffer::from_vec(vec![1, 2, 3]);
    let outcome = pipeline::run(&optional, &registry, &PipelineOptions::write(), &mut buffer)?;
    assert!(outcome.filter_mask.is_set(0));
    assert_eq!(buffer.as_bytes(), &[1, 2, 3]);

    let mut mandatory = FilterPipeline::new();
    mandatory.append(999, FilterFlags::MANDATORY, &[])?;
    let error = pipeline::run(&mandatory, &registry, &PipelineOptions::write(), &mut buffer)
        .expect_err("no codec for a mandatory filter");
    assert!(error.to_string().contains("required filter is not registered"));
    Ok(())
}

#[test]
fn read_reports_missing_filter_by_name() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();
    let mut pipeline = FilterPipeline::new();
    pipeline.push(FilterStep::new(999, FilterFlags::OPTIONAL, &[]).with_name("mystery"))?;

    let mut buffer = ChunkBuffer::from_vec(vec![1, 2, 3]);
    let error = pipeline::run(&pipeline, &registry, &PipelineOptions::read(), &mut buffer)
        .expect_err("read needs every filter, optional or not");
    assert!(error.to_string().contains("required filter 'mystery' is not registered"));
    Ok(())
}

struct LazySource {
    class: FilterClass,
    loads: AtomicUsize,
}

impl CodecSource for LazySource {
    fn codec(&self, _index: usize, _step: &FilterStep) -> Option<FilterClass> {
        None
    }

    fn load(&self, _step: &FilterStep) -> Result<Option<FilterClass>> {
        self.loads.fetch_add(1, Ordering::AcqRel);
        Ok(Some(self.class.clone()))
    }
}

#[test]
fn read_loads_missing_codecs_on_demand() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let trace: Trace = Arc::default();
    let source = LazySource {
        class: tracing_class(300, &trace),
        loads: AtomicUsize::new(0),
    };
    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::MANDATORY, &[])?;

    let mut buffer = ChunkBuffer::from_vec(vec![1, 2, 3, 44]);
    let outcome = pipeline::run(&pipeline, &source, &PipelineOptions::read(), &mut buffer)?;
    assert_eq!(outcome.nbytes, 3);
    assert_eq!(source.loads.load(Ordering::Acquire), 1);
    Ok(())
}

#[test]
fn excluded_steps_are_skipped_on_read() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let trace: Trace = Arc::default();
    let registry = registry_with(vec![tracing_class(300, &trace), tracing_class(301, &trace)])?;
    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::MANDATORY, &[])?;
    pipeline.append(301, FilterFlags::MANDATORY, &[])?;

    let mut buffer = ChunkBuffer::from_vec(vec![1, 2, 44]);
    let options = PipelineOptions::read().with_exclude(FilterMask::from_bits(0b10));
    let outcome = pipeline::run(&pipeline, &registry, &options, &mut buffer)?;

    assert_eq!(outcome.nbytes, 2);
    assert_eq!(outcome.filter_mask, FilterMask::from_bits(0b10));
    let order: Vec<_> = trace
        .lock()
        .expect("trace mutex poisoned")
        .iter()
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(order, vec![300]);
    Ok(())
}

#[test]
fn disabling_edc_skips_checksum_verification() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::with_builtins();
    let mut pipeline = FilterPipeline::new();
    pipeline.append(FILTER_FLETCHER32, FilterFlags::MANDATORY, &[])?;

    let (mut stored, mask) = pipeline::encode_chunk(&pipeline, &registry, b"checksummed payload")?;
    stored[0] ^= 0xFF;

    assert!(pipeline::decode_chunk(&pipeline, &registry, &stored, mask).is_err());

    let mut buffer = ChunkBuffer::from_vec(stored);
    let options = PipelineOptions::read().with_edc(EdcMode::Disabled);
    let outcome = pipeline::run(&pipeline, &registry, &options, &mut buffer)?;
    assert_eq!(outcome.nbytes, b"checksummed payload".len());
    Ok(())
}

#[test]
fn empty_pipeline_is_identity() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();
    let mut buffer = ChunkBuffer::from_vec(vec![3, 1, 4]);
    let outcome = pipeline::run(
        &FilterPipeline::new(),
        &registry,
        &PipelineOptions::write(),
        &mut buffer,
    )?;
    assert_eq!(outcome.nbytes, 3);
    assert!(outcome.filter_mask.is_empty());
    Ok(())
}
