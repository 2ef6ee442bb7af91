use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const THREAD_COUNT_ENV: &str = "H5_NTHREADS";
pub const PLUGIN_PATH_ENV: &str = "HDF5_PLUGIN_PATH";
pub const DEFAULT_PLUGIN_DIR: &str = "/usr/local/hdf5/lib/plugin";

/// Engine settings resolved once from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of pool workers, never zero.
    pub thread_count: usize,
    /// Directory (or platform path list) searched for filter plugins.
    pub plugin_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_count: 1,
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
        }
    }
}

impl EngineConfig {
    /// Reads `H5_NTHREADS` and `HDF5_PLUGIN_PATH` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    ///
    /// A thread count with any non-digit character falls back to one worker
    /// with a warning; unset, empty and zero counts also yield one worker.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let thread_count = match lookup(THREAD_COUNT_ENV) {
            Some(raw) => match parse_thread_count(&raw) {
                Some(count) => count,
                None => {
                    tracing::warn!(
                        target: "h5filter.config",
                        value = %raw,
                        "{THREAD_COUNT_ENV} not valid; using 1 thread"
                    );
                    1
                }
            },
            None => 1,
        };

        let plugin_dir = lookup(PLUGIN_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGIN_DIR));

        Self {
            thread_count,
            plugin_dir,
        }
    }

    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count.max(1);
        self
    }

    pub fn with_plugin_dir(mut self, plugin_dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = plugin_dir.into();
        self
    }

    /// Splits `plugin_dir` into its platform path-list components.
    pub fn plugin_search_dirs(&self) -> Vec<PathBuf> {
        std::env::split_paths(&self.plugin_dir)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect()
    }
}

/// Parses a decimal thread count.
///
/// Returns `None` when any character is not an ASCII digit or the value
/// overflows. Empty input and zero both yield one thread.
pub fn parse_thread_count(raw: &str) -> Option<usize> {
    if !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    if raw.is_empty() {
        return Some(1);
    }

    raw.parse::<usize>().ok().map(|count| count.max(1))
}
