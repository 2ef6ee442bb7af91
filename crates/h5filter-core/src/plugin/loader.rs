use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use super::abi::{
    PLUGIN_INFO_SYMBOL, PLUGIN_TYPE_FILTER, PLUGIN_TYPE_SYMBOL, PluginInfoFn, PluginTypeFn,
    RawFilterClass, class_from_raw,
};
use crate::config::EngineConfig;
use crate::error::FilterError;
use crate::registry::FilterClass;
use crate::telemetry::tags;
use crate::types::{FilterId, Result};

/// Plugin categories a search path can be asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    Filter,
}

/// Source of directories to search for plugins.
pub trait PluginPath: Send + Sync {
    fn search_path(&self, kind: PluginKind) -> Vec<PathBuf>;
}

/// Fixed list of directories.
#[derive(Debug, Clone, Default)]
pub struct StaticPluginPath {
    dirs: Vec<PathBuf>,
}

impl StaticPluginPath {
    pub fn new(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }
}

impl PluginPath for StaticPluginPath {
    fn search_path(&self, _kind: PluginKind) -> Vec<PathBuf> {
        self.dirs.clone()
    }
}

/// Loads filter classes from shared libraries on a search path.
pub struct PluginLoader {
    path: Box<dyn PluginPath>,
}

impl PluginLoader {
    pub fn new(path: impl PluginPath + 'static) -> Self {
        Self {
            path: Box::new(path),
        }
    }

    /// Searches the directories listed in `config.plugin_dir`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(StaticPluginPath::new(config.plugin_search_dirs()))
    }

    /// Finds and loads the plugin providing filter `id`.
    ///
    /// Libraries that fail to open, are not filter plugins, or describe a
    /// different filter are skipped. Returns `Ok(None)` when nothing matches.
    pub fn load(&self, id: FilterId) -> Result<Option<FilterClass>> {
        for dir in self.path.search_path(PluginKind::Filter) {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::trace!(
                        target: tags::TARGET_PLUGIN,
                        dir = %dir.display(),
                        %error,
                        "skipping unreadable plugin directory"
                    );
                    continue;
                }
            };

            let mut candidates: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| is_shared_library(path))
                .collect();
            candidates.sort();

            for candidate in candidates {
                match probe_library(&candidate, id) {
                    Ok(Some(class)) => {
                        tracing::info!(
                            target: tags::TARGET_PLUGIN,
                            op = "load",
                            id,
                            name = class.name(),
                            path = %candidate.display(),
                            "filter plugin loaded"
                        );
                        return Ok(Some(class));
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::debug!(
                            target: tags::TARGET_PLUGIN,
                            path = %candidate.display(),
                            %error,
                            "skipping plugin"
                        );
                    }
                }
            }
        }

        Ok(None)
    }
}

fn probe_library(path: &Path, id: FilterId) -> Result<Option<FilterClass>> {
    let library = Arc::new(open_library(path)?);

    let plugin_type = unsafe {
        let get_type = library
            .get::<PluginTypeFn>(PLUGIN_TYPE_SYMBOL)
            .map_err(|source| symbol_error(path, PLUGIN_TYPE_SYMBOL, source))?;
        get_type()
    };
    if plugin_type != PLUGIN_TYPE_FILTER {
        return Ok(None);
    }

    let descriptor = unsafe {
        let get_info = library
            .get::<PluginInfoFn>(PLUGIN_INFO_SYMBOL)
            .map_err(|source| symbol_error(path, PLUGIN_INFO_SYMBOL, source))?;
        get_info().cast::<RawFilterClass>()
    };

    let class = unsafe { class_from_raw(descriptor, Arc::clone(&library), path)? };
    Ok((class.id() == id).then_some(class))
}

pub(crate) fn open_library(path: &Path) -> Result<Library> {
    unsafe { Library::new(path) }.map_err(|source| FilterError::PluginLoad {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn symbol_error(path: &Path, symbol: &[u8], source: libloading::Error) -> FilterError {
    let symbol = symbol.strip_suffix(b"\0").unwrap_or(symbol);
    FilterError::PluginSymbol {
        path: path.to_path_buf(),
        symbol: String::from_utf8_lossy(symbol).into_owned(),
        source,
    }
}

/// Matches `.so`, versioned `.so.N`, `.dylib` and `.dll` files.
pub fn is_shared_library(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };

    name.ends_with(".so")
        || name.contains(".so.")
        || name.ends_with(".dylib")
        || name.ends_with(".dll")
}
