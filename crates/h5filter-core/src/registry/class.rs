use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::pipeline::{Dataspace, Datatype, FilterStep};
use crate::types::{FilterFlags, FilterId};

/// Type and space information handed to the pre-write hooks.
///
/// Both are `None` for opaque byte streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterTarget<'a> {
    pub datatype: Option<&'a Datatype>,
    pub dataspace: Option<&'a Dataspace>,
}

impl<'a> FilterTarget<'a> {
    pub fn new(datatype: &'a Datatype, dataspace: &'a Dataspace) -> Self {
        Self {
            datatype: Some(datatype),
            dataspace: Some(dataspace),
        }
    }

    /// Target with no type or shape information.
    pub fn opaque() -> Self {
        Self::default()
    }
}

/// Reversible transform over a chunk buffer.
pub trait FilterCodec: Send + Sync {
    /// Runs the transform.
    ///
    /// `buf.len()` is the allocated buffer size and the first `nbytes` bytes
    /// are valid input. The codec may replace or resize `buf`. Returns the
    /// number of valid output bytes, or 0 on failure.
    fn filter(&self, flags: FilterFlags, client_data: &[u32], nbytes: usize, buf: &mut Vec<u8>)
    -> usize;

    /// Decides whether the filter fits this type and shape. `Err` carries the
    /// reason the check itself could not run.
    fn can_apply(&self, _target: &FilterTarget<'_>) -> std::result::Result<bool, String> {
        Ok(true)
    }

    /// Adjusts the step's client data for a particular dataset.
    fn set_local(
        &self,
        _step: &mut FilterStep,
        _target: &FilterTarget<'_>,
    ) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Adapter turning a closure into a [`FilterCodec`].
pub struct FnCodec<F>(pub F);

impl<F> FilterCodec for FnCodec<F>
where
    F: Fn(FilterFlags, &[u32], usize, &mut Vec<u8>) -> usize + Send + Sync,
{
    fn filter(
        &self,
        flags: FilterFlags,
        client_data: &[u32],
        nbytes: usize,
        buf: &mut Vec<u8>,
    ) -> usize {
        (self.0)(flags, client_data, nbytes, buf)
    }
}

/// Encoder/decoder availability reported for a registered filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig(u32);

impl FilterConfig {
    pub const ENCODE_ENABLED: u32 = 0x0001;
    pub const DECODE_ENABLED: u32 = 0x0002;

    pub fn new(encoder_present: bool, decoder_present: bool) -> Self {
        let mut bits = 0;
        if encoder_present {
            bits |= Self::ENCODE_ENABLED;
        }
        if decoder_present {
            bits |= Self::DECODE_ENABLED;
        }
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn encode_enabled(self) -> bool {
        self.0 & Self::ENCODE_ENABLED != 0
    }

    pub fn decode_enabled(self) -> bool {
        self.0 & Self::DECODE_ENABLED != 0
    }
}

/// A filter known to the registry or a codec table.
#[derive(Clone)]
pub struct FilterClass {
    id: FilterId,
    name: Cow<'static, str>,
    encoder_present: bool,
    decoder_present: bool,
    codec: Arc<dyn FilterCodec>,
}

impl FilterClass {
    /// Creates a class able to both encode and decode.
    pub fn new(
        id: FilterId,
        name: impl Into<Cow<'static, str>>,
        codec: impl FilterCodec + 'static,
    ) -> Self {
        Self::from_arc(id, name, Arc::new(codec))
    }

    pub fn from_arc(
        id: FilterId,
        name: impl Into<Cow<'static, str>>,
        codec: Arc<dyn FilterCodec>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            encoder_present: true,
            decoder_present: true,
            codec,
        }
    }

    /// Shorthand for a closure-backed class.
    pub fn from_fn<F>(id: FilterId, name: impl Into<Cow<'static, str>>, filter: F) -> Self
    where
        F: Fn(FilterFlags, &[u32], usize, &mut Vec<u8>) -> usize + Send + Sync + 'static,
    {
        Self::new(id, name, FnCodec(filter))
    }

    pub fn with_encoder(mut self, present: bool) -> Self {
        self.encoder_present = present;
        self
    }

    pub fn with_decoder(mut self, present: bool) -> Self {
        self.decoder_present = present;
        self
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoder_present(&self) -> bool {
        self.encoder_present
    }

    pub fn decoder_present(&self) -> bool {
        self.decoder_present
    }

    pub fn config(&self) -> FilterConfig {
        FilterConfig::new(self.encoder_present, self.decoder_present)
    }

    pub fn codec(&self) -> &dyn FilterCodec {
        self.codec.as_ref()
    }

    /// True when both classes share the same codec instance.
    pub fn same_codec(&self, other: &FilterClass) -> bool {
        Arc::ptr_eq(&self.codec, &other.codec)
    }
}

impl fmt::Debug for FilterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("encoder_present", &self.encoder_present)
            .field("decoder_present", &self.decoder_present)
            .finish_non_exhaustive()
    }
}
