use std::path::Path;
use std::sync::Arc;

use libloading::Library;

use super::abi::{RawFilterClass, class_from_raw};
use super::loader::{open_library, symbol_error};
use crate::error::FilterError;
use crate::pipeline::{CodecSource, FilterPipeline, FilterStep};
use crate::registry::{FilterClass, FilterRegistry, builtin};
use crate::telemetry::tags;
use crate::types::{FILTER_LZ4, FILTER_ZSTD, FilterId, Result};

/// Whether resolved codecs will encode (write) or decode (read).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Shared library and exported descriptor symbol of a well-known plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPlugin {
    pub id: FilterId,
    pub library: &'static str,
    pub symbol: &'static str,
}

const KNOWN_PLUGINS: [KnownPlugin; 2] = [
    KnownPlugin {
        id: FILTER_LZ4,
        library: "libh5lz4.so.0",
        symbol: "H5Z_LZ4",
    },
    KnownPlugin {
        id: FILTER_ZSTD,
        library: "libh5zstd.so.0",
        symbol: "H5Z_ZSTD",
    },
];

/// Library file name and descriptor symbol for a well-known plugin id.
pub fn known_plugin(id: FilterId) -> Option<KnownPlugin> {
    KNOWN_PLUGINS.iter().copied().find(|plugin| plugin.id == id)
}

/// Codecs resolved once per dataset, one per pipeline step, in step order.
///
/// Workers read this table instead of the registry.
#[derive(Debug, Clone)]
pub struct CodecTable {
    mode: OpenMode,
    entries: Vec<FilterClass>,
}

impl CodecTable {
    /// Resolves every step of `pipeline`.
    ///
    /// Well-known plugins are opened from `plugin_dir`; built-ins and classes
    /// registered in `registry` are used directly. Any failure fails the whole
    /// table.
    pub fn resolve(
        pipeline: &FilterPipeline,
        mode: OpenMode,
        plugin_dir: &Path,
        registry: &FilterRegistry,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(pipeline.len());
        for (index, step) in pipeline.iter().enumerate() {
            let class = resolve_step(step, plugin_dir, registry)
                .map_err(|error| error.with_context(format!("resolving filter step {index}")))?;

            match mode {
                OpenMode::Write if !class.encoder_present() => {
                    return Err(FilterError::NoEncoder(class.id()));
                }
                OpenMode::Read if !class.decoder_present() => {
                    return Err(FilterError::NoDecoder(class.id()));
                }
                _ => {}
            }
            entries.push(class);
        }

        tracing::debug!(
            target: tags::TARGET_PLUGIN,
            op = "resolve",
            mode = ?mode,
            steps = entries.len(),
            "codec table resolved"
        );
        Ok(Self { mode, entries })
    }

    /// Builds a table from already resolved classes.
    pub fn from_classes(mode: OpenMode, entries: Vec<FilterClass>) -> Self {
        Self { mode, entries }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FilterClass> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterClass> {
        self.entries.iter()
    }
}

impl CodecSource for CodecTable {
    fn codec(&self, index: usize, step: &FilterStep) -> Option<FilterClass> {
        self.entries
            .get(index)
            .filter(|class| class.id() == step.id())
            .cloned()
    }
}

fn resolve_step(step: &FilterStep, plugin_dir: &Path, registry: &FilterRegistry) -> Result<FilterClass> {
    let id = step.id();
    if let Some(plugin) = known_plugin(id) {
        return load_known_plugin(plugin, plugin_dir);
    }
    if let Some(class) = builtin::lookup(id) {
        return Ok(class);
    }

    registry.get(id).ok_or(FilterError::UnknownFilter(id))
}

fn load_known_plugin(plugin: KnownPlugin, plugin_dir: &Path) -> Result<FilterClass> {
    let path = plugin_dir.join(plugin.library);
    let library = Arc::new(open_library(&path)?);

    let mut symbol = plugin.symbol.as_bytes().to_vec();
    symbol.push(0);
    let descriptor = unsafe {
        library
            .get::<*const RawFilterClass>(&symbol)
            .map(|descriptor| *descriptor)
            .map_err(|source| symbol_error(&path, &symbol, source))?
    };

    let class = unsafe { known_plugin_class(plugin, descriptor, library, &path)? };
    tracing::debug!(
        target: tags::TARGET_PLUGIN,
        op = "open",
        id = plugin.id,
        path = %path.display(),
        "plugin codec opened"
    );
    Ok(class)
}

/// Wraps the descriptor exported for `plugin`, rejecting one that describes
/// another filter.
///
/// # Safety
/// Same contract as [`class_from_raw`].
unsafe fn known_plugin_class(
    plugin: KnownPlugin,
    descriptor: *const RawFilterClass,
    library: Arc<Library>,
    path: &Path,
) -> Result<FilterClass> {
    let class = unsafe { class_from_raw(descriptor, library, path)? };
    if class.id() != plugin.id {
        return Err(FilterError::InvalidPlugin {
            path: path.to_path_buf(),
            reason: "descriptor id does not match the requested filter",
        });
    }
    Ok(class)
}
