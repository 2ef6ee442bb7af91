//! Process-wide table of filter classes keyed by filter id.

pub mod builtin;
pub mod class;
pub mod objects;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

pub use class::{FilterClass, FilterCodec, FilterConfig, FilterTarget, FnCodec};
pub use objects::{Communicator, FileIntent, NoOpenObjects, ObjectKind, OpenFile, OpenObjects, Visit};

use crate::config::EngineConfig;
use crate::error::FilterError;
use crate::pipeline::{CodecSource, FilterPipeline, FilterStep};
use crate::plugin::PluginLoader;
use crate::telemetry::{self, tags};
use crate::types::{FILTER_RESERVED, FilterId, MAX_NFILTERS, Result, is_valid_filter_id};

struct FilterTable {
    classes: Vec<FilterClass>,
    allocated: usize,
}

impl FilterTable {
    fn position(&self, id: FilterId) -> Option<usize> {
        self.classes.iter().position(|class| class.id() == id)
    }
}

/// Registered filter classes plus the plugin fallback used on lookup misses.
///
/// Ids are unique. Indices are never handed out; every call searches by id.
pub struct FilterRegistry {
    table: RwLock<FilterTable>,
    loader: Option<PluginLoader>,
    collective_sanity_check: AtomicBool,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterRegistry {
    /// Creates an empty registry without plugin fallback.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(FilterTable {
                classes: Vec::new(),
                allocated: 0,
            }),
            loader: None,
            collective_sanity_check: AtomicBool::new(false),
        }
    }

    /// Creates a registry holding the deflate, shuffle and fletcher32 filters.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for class in builtin::classes() {
            registry.insert(class);
        }
        registry
    }

    /// Enables dynamic loading of unregistered filters.
    pub fn with_loader(mut self, loader: PluginLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// The process-wide registry: built-ins plus plugins found through
    /// `HDF5_PLUGIN_PATH`.
    pub fn global() -> &'static FilterRegistry {
        static GLOBAL: OnceLock<FilterRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = EngineConfig::from_env();
            Self::with_builtins().with_loader(PluginLoader::from_config(&config))
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, FilterTable> {
        self.table.read().expect("filter registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, FilterTable> {
        self.table.write().expect("filter registry lock poisoned")
    }

    /// Registers an application filter, replacing any class with the same id.
    pub fn register(&self, class: FilterClass) -> Result<()> {
        let id = class.id();
        if !is_valid_filter_id(id) {
            return Err(FilterError::InvalidFilterId(id));
        }
        if id < FILTER_RESERVED {
            return Err(FilterError::PredefinedFilter(id));
        }

        self.register_internal(class)
    }

    /// Registers without the predefined-id check. Used for built-ins and
    /// classes loaded from plugins.
    pub(crate) fn register_internal(&self, class: FilterClass) -> Result<()> {
        let id = class.id();
        if !is_valid_filter_id(id) {
            return Err(FilterError::InvalidFilterId(id));
        }

        let replaced = self.insert(class);
        telemetry::increment_counter(
            tags::METRIC_REGISTRY_REGISTER_COUNT,
            1,
            &[("subsystem", "registry"), ("op", "register")],
        );
        tracing::debug!(target: tags::TARGET_REGISTRY, op = "register", id, replaced, "filter registered");
        Ok(())
    }

    fn insert(&self, class: FilterClass) -> bool {
        let mut table = self.write();
        let replaced = match table.position(class.id()) {
            Some(index) => {
                table.classes[index] = class;
                true
            }
            None => {
                if table.classes.len() >= table.allocated {
                    let allocated = MAX_NFILTERS.max(2 * table.allocated);
                    let additional = allocated - table.classes.len();
                    table.classes.reserve_exact(additional);
                    table.allocated = allocated;
                }
                table.classes.push(class);
                false
            }
        };

        telemetry::set_gauge(
            tags::METRIC_REGISTRY_SIZE,
            table.classes.len() as u64,
            &[("subsystem", "registry"), ("op", "size")],
        );
        replaced
    }

    /// Removes an application filter.
    ///
    /// Fails while any open dataset or group still lists the filter. Writable
    /// files are flushed first so no cached chunk is left needing it; for
    /// collectively opened files one barrier is issued before the first flush
    /// when the collective sanity check is enabled.
    pub fn unregister(&self, id: FilterId, objects: &dyn OpenObjects) -> Result<()> {
        if !is_valid_filter_id(id) {
            return Err(FilterError::InvalidFilterId(id));
        }
        if id < FILTER_RESERVED {
            return Err(FilterError::PredefinedFilter(id));
        }
        if self.read().position(id).is_none() {
            return Err(FilterError::FilterNotRegistered(id));
        }

        for kind in [ObjectKind::Dataset, ObjectKind::Group] {
            let mut in_use = false;
            objects.visit_pipelines(kind, &mut |pipeline| {
                if pipeline.contains(id) {
                    in_use = true;
                    Ok(Visit::Stop)
                } else {
                    Ok(Visit::Continue)
                }
            })?;
            if in_use {
                return Err(FilterError::FilterInUse { id, kind });
            }
        }

        let sanity_check = self.collective_sanity_check();
        let mut barrier_issued = false;
        objects.visit_files(&mut |file| {
            if file.intent()? != FileIntent::ReadWrite {
                return Ok(Visit::Continue);
            }

            if file.is_collective() && sanity_check && !barrier_issued {
                let communicator = file
                    .communicator()
                    .map_err(|error| error.with_context("can't get communicator"))?;
                if let Some(communicator) = communicator {
                    communicator
                        .barrier()
                        .map_err(|error| error.with_context("collective barrier failed"))?;
                }
                barrier_issued = true;
            }

            file.flush_global()
                .map_err(|error| error.with_context("unable to flush file hierarchy"))?;
            Ok(Visit::Continue)
        })?;

        let mut table = self.write();
        let index = table
            .position(id)
            .ok_or(FilterError::FilterNotRegistered(id))?;
        table.classes.remove(index);
        let remaining = table.classes.len();
        drop(table);

        telemetry::increment_counter(
            tags::METRIC_REGISTRY_UNREGISTER_COUNT,
            1,
            &[("subsystem", "registry"), ("op", "unregister")],
        );
        telemetry::set_gauge(
            tags::METRIC_REGISTRY_SIZE,
            remaining as u64,
            &[("subsystem", "registry"), ("op", "size")],
        );
        tracing::debug!(target: tags::TARGET_REGISTRY, op = "unregister", id, barrier_issued, "filter unregistered");
        Ok(())
    }

    /// Looks up a class by id.
    ///
    /// A miss is `Ok(None)` when `speculative`, otherwise `FilterNotRegistered`.
    pub fn find(&self, id: FilterId, speculative: bool) -> Result<Option<FilterClass>> {
        match self.get(id) {
            Some(class) => Ok(Some(class)),
            None if speculative => Ok(None),
            None => Err(FilterError::FilterNotRegistered(id)),
        }
    }

    pub fn get(&self, id: FilterId) -> Option<FilterClass> {
        let table = self.read();
        table.position(id).map(|index| table.classes[index].clone())
    }

    pub fn is_registered(&self, id: FilterId) -> bool {
        self.read().position(id).is_some()
    }

    /// True when the filter is registered or a plugin providing it could be
    /// loaded (and registered as a side effect).
    pub fn is_available(&self, id: FilterId) -> Result<bool> {
        if !is_valid_filter_id(id) {
            return Err(FilterError::InvalidFilterId(id));
        }
        if self.is_registered(id) {
            return Ok(true);
        }

        Ok(self.load_plugin(id)?.is_some())
    }

    /// True when every step of `pipeline` is registered. Never loads plugins.
    pub fn all_available(&self, pipeline: &FilterPipeline) -> bool {
        let table = self.read();
        pipeline
            .iter()
            .all(|step| table.position(step.id()).is_some())
    }

    pub fn filter_config(&self, id: FilterId) -> Result<FilterConfig> {
        self.find(id, false)?
            .map(|class| class.config())
            .ok_or(FilterError::FilterNotRegistered(id))
    }

    pub fn len(&self) -> usize {
        self.read().classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated table slots; grows to `max(MAX_NFILTERS, 2 * capacity)`.
    pub fn capacity(&self) -> usize {
        self.read().allocated
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<FilterId> {
        self.read().classes.iter().map(FilterClass::id).collect()
    }

    /// Snapshot of every registered class.
    pub fn classes(&self) -> Vec<FilterClass> {
        self.read().classes.clone()
    }

    pub fn set_collective_sanity_check(&self, enabled: bool) {
        self.collective_sanity_check.store(enabled, Ordering::Release);
    }

    pub fn collective_sanity_check(&self) -> bool {
        self.collective_sanity_check.load(Ordering::Acquire)
    }

    fn load_plugin(&self, id: FilterId) -> Result<Option<FilterClass>> {
        let Some(loader) = &self.loader else {
            return Ok(None);
        };

        let started_at = Instant::now();
        let loaded = loader.load(id)?;
        telemetry::record_histogram(
            tags::METRIC_PLUGIN_LOAD_LATENCY_US,
            telemetry::duration_us(started_at.elapsed()),
            &[("subsystem", "plugin"), ("op", "load")],
        );

        match loaded {
            Some(class) => {
                telemetry::increment_counter(
                    tags::METRIC_PLUGIN_LOAD_COUNT,
                    1,
                    &[("subsystem", "plugin"), ("op", "load"), ("result", "hit")],
                );
                self.register_internal(class.clone())?;
                Ok(Some(class))
            }
            None => {
                telemetry::increment_counter(
                    tags::METRIC_PLUGIN_LOAD_MISS_COUNT,
                    1,
                    &[("subsystem", "plugin"), ("op", "load"), ("result", "miss")],
                );
                Ok(None)
            }
        }
    }
}

impl CodecSource for FilterRegistry {
    fn codec(&self, _index: usize, step: &FilterStep) -> Option<FilterClass> {
        self.get(step.id())
    }

    fn load(&self, step: &FilterStep) -> Result<Option<FilterClass>> {
        self.load_plugin(step.id())
    }
}
