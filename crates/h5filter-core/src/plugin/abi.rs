//! C descriptor layout exported by filter plugins and the codec wrapping it.

use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use libloading::Library;

use crate::error::FilterError;
use crate::registry::{FilterClass, FilterCodec};
use crate::telemetry::tags;
use crate::types::{FilterFlags, Result, is_valid_filter_id};

/// Descriptor version this loader understands.
pub const FILTER_CLASS_VERSION: c_int = 1;
/// Plugin type code reported by filter plugins.
pub const PLUGIN_TYPE_FILTER: c_int = 0;

pub const PLUGIN_TYPE_SYMBOL: &[u8] = b"H5PLget_plugin_type\0";
pub const PLUGIN_INFO_SYMBOL: &[u8] = b"H5PLget_plugin_info\0";

/// Identifier handle passed to the descriptor's hooks.
pub type RawHandle = i64;

pub type RawCanApplyFn =
    unsafe extern "C" fn(dcpl: RawHandle, datatype: RawHandle, space: RawHandle) -> c_int;
pub type RawSetLocalFn =
    unsafe extern "C" fn(dcpl: RawHandle, datatype: RawHandle, space: RawHandle) -> c_int;
pub type RawFilterFn = unsafe extern "C" fn(
    flags: c_uint,
    cd_nelmts: usize,
    cd_values: *const c_uint,
    nbytes: usize,
    buf_size: *mut usize,
    buf: *mut *mut c_void,
) -> usize;

pub type PluginTypeFn = unsafe extern "C" fn() -> c_int;
pub type PluginInfoFn = unsafe extern "C" fn() -> *const c_void;

/// Filter class descriptor as laid out by plugins.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawFilterClass {
    pub version: c_int,
    pub id: c_int,
    pub encoder_present: c_uint,
    pub decoder_present: c_uint,
    pub name: *const c_char,
    pub can_apply: Option<RawCanApplyFn>,
    pub set_local: Option<RawSetLocalFn>,
    pub filter: Option<RawFilterFn>,
}

/// Codec backed by a function exported from a loaded shared library.
///
/// Holds the library so the function stays mapped for the codec's lifetime.
pub struct DynamicCodec {
    filter: RawFilterFn,
    _library: Arc<Library>,
}

impl DynamicCodec {
    /// # Safety
    /// `filter` must be a function exported by `library` following the
    /// filter calling convention.
    pub unsafe fn new(filter: RawFilterFn, library: Arc<Library>) -> Self {
        Self {
            filter,
            _library: library,
        }
    }
}

impl FilterCodec for DynamicCodec {
    fn filter(
        &self,
        flags: FilterFlags,
        client_data: &[u32],
        nbytes: usize,
        buf: &mut Vec<u8>,
    ) -> usize {
        // Plugins may free or realloc the buffer, so it must come from the C allocator.
        let mut buf_size = buf.len().max(1);
        let raw = unsafe { libc::malloc(buf_size) };
        if raw.is_null() {
            return 0;
        }
        unsafe { ptr::copy_nonoverlapping(buf.as_ptr(), raw.cast::<u8>(), buf.len()) };

        let mut raw = raw;
        let produced = unsafe {
            (self.filter)(
                flags.bits(),
                client_data.len(),
                client_data.as_ptr().cast::<c_uint>(),
                nbytes,
                &mut buf_size,
                &mut raw,
            )
        };

        let accepted = produced != 0 && produced <= buf_size && !raw.is_null();
        if accepted {
            let output = unsafe { std::slice::from_raw_parts(raw.cast::<u8>(), buf_size) };
            buf.clear();
            buf.extend_from_slice(output);
        } else if produced != 0 {
            tracing::warn!(
                target: tags::TARGET_PLUGIN,
                produced,
                buf_size,
                "plugin filter reported more bytes than its buffer holds"
            );
        }
        if !raw.is_null() {
            unsafe { libc::free(raw) };
        }

        if accepted { produced } else { 0 }
    }
}

/// Validates a plugin descriptor and wraps it in a [`FilterClass`].
///
/// The descriptor's C `can_apply` and `set_local` hooks are not called.
///
/// # Safety
/// `raw` must be null or point to a descriptor exported by `library`.
pub unsafe fn class_from_raw(
    raw: *const RawFilterClass,
    library: Arc<Library>,
    origin: &Path,
) -> Result<FilterClass> {
    let invalid = |reason| FilterError::InvalidPlugin {
        path: origin.to_path_buf(),
        reason,
    };

    let descriptor = unsafe { raw.as_ref() }.ok_or_else(|| invalid("null filter descriptor"))?;
    if descriptor.version != FILTER_CLASS_VERSION {
        return Err(invalid("unsupported filter descriptor version"));
    }
    if !is_valid_filter_id(descriptor.id) {
        return Err(invalid("filter id out of range"));
    }
    let filter = descriptor
        .filter
        .ok_or_else(|| invalid("descriptor has no filter function"))?;

    let name = if descriptor.name.is_null() {
        format!("filter {}", descriptor.id)
    } else {
        unsafe { CStr::from_ptr(descriptor.name) }
            .to_string_lossy()
            .into_owned()
    };

    let codec = unsafe { DynamicCodec::new(filter, library) };
    Ok(FilterClass::new(descriptor.id, name, codec)
        .with_encoder(descriptor.encoder_present != 0)
        .with_decoder(descriptor.decoder_present != 0))
}
