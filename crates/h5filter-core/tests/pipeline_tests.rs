use h5filter_core::{
    FILTER_ALL, FILTER_DEFLATE, FILTER_SHUFFLE, FilterError, FilterFlags, FilterPipeline,
    FilterStep, MAX_NFILTERS,
};

#[test]
fn append_keeps_definition_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = FilterPipeline::new();
    pipeline.append(FILTER_SHUFFLE, FilterFlags::MANDATORY, &[4])?;
    pipeline.append(FILTER_DEFLATE, FilterFlags::OPTIONAL, &[6])?;

    let ids: Vec<_> = pipeline.iter().map(FilterStep::id).collect();
    assert_eq!(ids, vec![FILTER_SHUFFLE, FILTER_DEFLATE]);
    assert!(pipeline.capacity() >= MAX_NFILTERS);
    assert!(pipeline.filter_info(FILTER_DEFLATE)?.is_optional());
    Ok(())
}

#[test]
fn append_fails_once_pipeline_is_full() -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = FilterPipeline::new();
    for _ in 0..MAX_NFILTERS {
        pipeline.append(300, FilterFlags::OPTIONAL, &[])?;
    }

    let error = pipeline
        .append(301, FilterFlags::OPTIONAL, &[])
        .expect_err("33rd filter must be rejected");
    assert!(matches!(error, FilterError::TooManyFilters));
    assert_eq!(pipeline.len(), MAX_NFILTERS);
    Ok(())
}

#[test]
fn append_rejects_invocation_flags() {
    let mut pipeline = FilterPipeline::new();
    let error = pipeline
        .append(FILTER_DEFLATE, FilterFlags::REVERSE, &[])
        .expect_err("invocation flags are not definition flags");
    assert!(matches!(error, FilterError::InvalidFlags(0x0100)));
    assert!(pipeline.is_empty());
}

#[test]
fn client_data_placement_follows_length() -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = FilterPipeline::new();
    pipeline.append(FILTER_DEFLATE, FilterFlags::MANDATORY, &[1, 2, 3, 4])?;
    pipeline.append(400, FilterFlags::MANDATORY, &[1, 2, 3, 4, 5, 6])?;

    let short = pipeline.filter_info(FILTER_DEFLATE)?;
    assert!(short.client_data_storage().is_inline());
    assert_eq!(short.client_data(), &[1, 2, 3, 4]);

    let long = pipeline.filter_info(400)?;
    assert!(!long.client_data_storage().is_inline());
    assert_eq!(long.client_data(), &[1, 2, 3, 4, 5, 6]);

    pipeline.delete(FILTER_DEFLATE)?;
    let long = pipeline.filter_info(400)?;
    assert_eq!(long.client_data(), &[1, 2, 3, 4, 5, 6]);
    Ok(())
}

#[test]
fn modify_replaces_first_matching_step() -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = FilterPipeline::new();
    pipeline.append(FILTER_DEFLATE, FilterFlags::MANDATORY, &[1])?;
    pipeline.append(FILTER_DEFLATE, FilterFlags::MANDATORY, &[2])?;

    pipeline.modify(FILTER_DEFLATE, FilterFlags::OPTIONAL, &[9, 9])?;
    assert_eq!(pipeline.steps()[0].client_data(), &[9, 9]);
    assert!(pipeline.steps()[0].is_optional());
    assert_eq!(pipeline.steps()[1].client_data(), &[2]);

    let error = pipeline
        .modify(FILTER_SHUFFLE, FilterFlags::MANDATORY, &[])
        .expect_err("shuffle is not in the pipeline");
    assert!(matches!(error, FilterError::FilterNotInPipeline(FILTER_SHUFFLE)));
    Ok(())
}

#[test]
fn delete_handles_single_all_and_missing() -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = FilterPipeline::new();
    pipeline.delete(FILTER_DEFLATE)?;

    pipeline.append(FILTER_SHUFFLE, FilterFlags::MANDATORY, &[4])?;
    pipeline.append(FILTER_DEFLATE, FilterFlags::MANDATORY, &[6])?;
    pipeline.delete(FILTER_SHUFFLE)?;
    assert_eq!(pipeline.len(), 1);
    assert!(!pipeline.contains(FILTER_SHUFFLE));

    let error = pipeline
        .delete(FILTER_SHUFFLE)
        .expect_err("shuffle already removed");
    assert!(matches!(error, FilterError::FilterNotInPipeline(FILTER_SHUFFLE)));

    pipeline.append(500, FilterFlags::OPTIONAL, &[])?;
    pipeline.delete(FILTER_ALL)?;
    assert!(pipeline.is_empty());
    Ok(())
}

#[test]
fn named_steps_are_preserved() -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = FilterPipeline::new();
    pipeline.push(FilterStep::new(32004, FilterFlags::MANDATORY, &[8192]).with_name("lz4"))?;
    assert_eq!(pipeline.filter_info(32004)?.name(), Some("lz4"));
    Ok(())
}
