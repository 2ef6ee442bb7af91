use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use h5filter_core::pipeline::gating;
use h5filter_core::{
    DatasetCreation, Dataspace, Datatype, FILTER_SHUFFLE, FilterClass, FilterCodec, FilterError,
    FilterFlags, FilterMask, FilterPipeline, FilterRegistry, FilterStep, FilterTarget, Layout,
    TypeClass,
};

/// Codec whose `can_apply` answer is fixed and which records `set_local` calls.
struct Picky {
    applies: bool,
    set_local_calls: Arc<AtomicUsize>,
}

impl FilterCodec for Picky {
    fn filter(&self, _flags: FilterFlags, _cd: &[u32], _nbytes: usize, _buf: &mut Vec<u8>) -> usize {
        0
    }

    fn can_apply(&self, target: &FilterTarget<'_>) -> Result<bool, String> {
        match target.dataspace {
            Some(Dataspace::Simple(dims)) if dims == &[16, 16] => Ok(self.applies),
            Some(other) => Err(format!("unexpected chunk space {other:?}")),
            None => Ok(self.applies),
        }
    }

    fn set_local(&self, step: &mut FilterStep, target: &FilterTarget<'_>) -> Result<(), String> {
        self.set_local_calls.fetch_add(1, Ordering::AcqRel);
        let size = target.datatype.map_or(0, |datatype| datatype.size as u32);
        step.set_client_data(&[size, 42]);
        Ok(())
    }
}

fn picky(id: i32, applies: bool) -> (FilterClass, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let class = FilterClass::new(
        id,
        "picky",
        Picky {
            applies,
            set_local_calls: Arc::clone(&calls),
        },
    );
    (class, calls)
}

fn chunked_with(steps: &[(i32, FilterFlags)]) -> Result<DatasetCreation, FilterError> {
    let mut pipeline = FilterPipeline::new();
    for (id, flags) in steps {
        pipeline.append(*id, *flags, &[])?;
    }
    Ok(DatasetCreation::chunked(vec![16, 16]).with_pipeline(pipeline))
}

#[test]
fn optional_filter_that_cannot_apply_is_tolerated() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();
    let (class, _) = picky(300, false);
    registry.register(class)?;

    let dcpl = chunked_with(&[
        (FILTER_SHUFFLE, FilterFlags::MANDATORY),
        (300, FilterFlags::OPTIONAL),
    ])?;
    let builtins = FilterRegistry::with_builtins();
    let (class, _) = picky(300, false);
    builtins.register(class)?;
    let refused = gating::can_apply(&dcpl, &Datatype::int32(), &builtins)?;
    assert_eq!(refused, FilterMask::from_bits(0b10));

    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::OPTIONAL, &[])?;
    assert!(gating::can_apply_direct(&pipeline, &registry)?.is_set(0));

    let dcpl = chunked_with(&[(300, FilterFlags::MANDATORY)])?;
    let error = gating::can_apply(&dcpl, &Datatype::int32(), &registry)
        .expect_err("mandatory filter refused the type");
    assert!(matches!(error, FilterError::CanApply { id: 300, .. }));
    assert!(error.to_string().contains("filter parameters not appropriate"));
    Ok(())
}

#[test]
fn can_apply_requires_an_encoder() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();
    let (class, _) = picky(300, true);
    registry.register(class.with_encoder(false))?;

    let dcpl = chunked_with(&[(300, FilterFlags::MANDATORY)])?;
    let error = gating::can_apply(&dcpl, &Datatype::int32(), &registry)
        .expect_err("decode-only filter");
    assert!(matches!(error, FilterError::NoEncoder(300)));
    Ok(())
}

#[test]
fn missing_filters_are_speculative_only_when_optional() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();

    let dcpl = chunked_with(&[(777, FilterFlags::OPTIONAL)])?;
    assert!(gating::can_apply(&dcpl, &Datatype::int32(), &registry)?.is_empty());

    let dcpl = chunked_with(&[(777, FilterFlags::MANDATORY)])?;
    let error = gating::can_apply(&dcpl, &Datatype::int32(), &registry)
        .expect_err("mandatory filter is unknown");
    assert!(matches!(error, FilterError::FilterNotRegistered(777)));
    Ok(())
}

#[test]
fn gating_is_skipped_for_default_or_unchunked_lists() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();
    let (class, calls) = picky(300, false);
    registry.register(class)?;

    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::MANDATORY, &[])?;
    let mut contiguous = DatasetCreation::with_layout(Layout::Contiguous).with_pipeline(pipeline);
    gating::can_apply(&contiguous, &Datatype::int32(), &registry)?;
    gating::set_local(&mut contiguous, &Datatype::int32(), &registry)?;

    let mut default = DatasetCreation::default();
    gating::set_local(&mut default, &Datatype::int32(), &registry)?;

    assert_eq!(calls.load(Ordering::Acquire), 0);
    Ok(())
}

#[test]
fn set_local_updates_client_data() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::with_builtins();
    let (class, calls) = picky(300, true);
    registry.register(class)?;

    let mut dcpl = chunked_with(&[(FILTER_SHUFFLE, FilterFlags::MANDATORY), (300, FilterFlags::OPTIONAL)])?;
    gating::prepare(&mut dcpl, &Datatype::float64(), &registry)?;

    assert_eq!(dcpl.pipeline().filter_info(FILTER_SHUFFLE)?.client_data(), &[8]);
    assert_eq!(dcpl.pipeline().filter_info(300)?.client_data(), &[8, 42]);
    assert_eq!(calls.load(Ordering::Acquire), 1);
    Ok(())
}

#[test]
fn direct_variants_pass_no_type_information() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::new();
    let (class, _) = picky(300, true);
    registry.register(class)?;

    let mut pipeline = FilterPipeline::new();
    pipeline.append(300, FilterFlags::MANDATORY, &[])?;
    gating::can_apply_direct(&pipeline, &registry)?;
    gating::set_local_direct(&mut pipeline, &registry)?;
    assert_eq!(pipeline.filter_info(300)?.client_data(), &[0, 42]);
    Ok(())
}

#[test]
fn shuffle_set_local_needs_a_datatype() -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::with_builtins();
    let mut pipeline = FilterPipeline::new();
    pipeline.append(FILTER_SHUFFLE, FilterFlags::MANDATORY, &[])?;

    let error = gating::set_local_direct(&mut pipeline, &registry)
        .expect_err("opaque streams have no element size");
    assert!(matches!(error, FilterError::SetLocal { id: FILTER_SHUFFLE, .. }));
    Ok(())
}

#[test]
fn ignore_filters_for_unsuitable_spaces_and_types() -> Result<(), Box<dyn std::error::Error>> {
    let simple = Dataspace::Simple(vec![64]);
    let vlen = Datatype::new(TypeClass::Sequence, 16);
    let vstring = Datatype::new(TypeClass::VariableString, 16);

    let optional = chunked_with(&[(300, FilterFlags::OPTIONAL)])?;
    assert!(gating::ignore_filters(&optional, &Datatype::int32(), &Dataspace::Null)?);
    assert!(gating::ignore_filters(&optional, &Datatype::int32(), &Dataspace::Scalar)?);
    assert!(gating::ignore_filters(&optional, &vlen, &simple)?);
    assert!(!gating::ignore_filters(&optional, &Datatype::int32(), &simple)?);

    let mandatory = chunked_with(&[(300, FilterFlags::OPTIONAL), (301, FilterFlags::MANDATORY)])?;
    let error = gating::ignore_filters(&mandatory, &vstring, &simple)
        .expect_err("mandatory filter on variable-length strings");
    assert!(matches!(error, FilterError::NotSuitable));

    let empty = DatasetCreation::chunked(vec![16]);
    assert!(!gating::ignore_filters(&empty, &vlen, &Dataspace::Null)?);
    Ok(())
}
