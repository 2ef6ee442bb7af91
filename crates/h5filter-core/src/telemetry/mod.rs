//! Process-wide metrics for queue, pipeline, registry and worker activity.
//!
//! Metric names live in [`tags`]. With the `telemetry` feature disabled every
//! recording call compiles to nothing and [`snapshot`] is empty.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod tags;
pub mod worker;

/// Histogram summary captured in telemetry snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// In-memory view of collected telemetry metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn gauge(&self, name: &str) -> Option<u64> {
        self.gauges.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Converts a duration to whole microseconds, saturating at `u64::MAX`.
#[inline]
pub fn duration_us(elapsed: Duration) -> u64 {
    elapsed.as_micros().min(u64::MAX as u128) as u64
}

/// Increments a named counter by `value`.
///
/// Labels are accepted for call-site readability; the store keys by name only.
#[inline]
pub fn increment_counter(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    store::update(|store| {
        let entry = store.counters.entry(name).or_insert(0);
        *entry = entry.saturating_add(value);
    });

    let _ = (name, value);
}

/// Records a histogram sample.
#[inline]
pub fn record_histogram(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    store::update(|store| store.histograms.entry(name).or_default().record(value));

    let _ = (name, value);
}

/// Sets a gauge to an absolute value.
#[inline]
pub fn set_gauge(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    store::update(|store| {
        store.gauges.insert(name, value);
    });

    let _ = (name, value);
}

/// Adds `delta` to a gauge.
#[inline]
pub fn add_gauge(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    store::update(|store| {
        let entry = store.gauges.entry(name).or_insert(0);
        *entry = entry.saturating_add(delta);
    });

    let _ = (name, delta);
}

/// Subtracts `delta` from a gauge with floor at zero.
#[inline]
pub fn sub_gauge_saturating(name: &'static str, delta: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    store::update(|store| {
        let entry = store.gauges.entry(name).or_insert(0);
        *entry = entry.saturating_sub(delta);
    });

    let _ = (name, delta);
}

/// Returns a point-in-time snapshot of all collected telemetry.
pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        return store::snapshot();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

/// Clears in-memory telemetry state.
pub fn reset() {
    #[cfg(feature = "telemetry")]
    store::update(|metrics| *metrics = store::Store::default());
}

#[cfg(feature = "telemetry")]
mod store {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    use super::{HistogramSnapshot, TelemetrySnapshot};

    #[derive(Debug, Clone, Copy, Default)]
    pub(super) struct Histogram {
        count: u64,
        total: u64,
        min: u64,
        max: u64,
    }

    impl Histogram {
        pub(super) fn record(&mut self, value: u64) {
            self.min = if self.count == 0 { value } else { self.min.min(value) };
            self.max = self.max.max(value);
            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }

        fn summary(&self) -> HistogramSnapshot {
            HistogramSnapshot {
                count: self.count,
                total: self.total,
                min: self.min,
                max: self.max,
                mean: if self.count == 0 {
                    0.0
                } else {
                    self.total as f64 / self.count as f64
                },
            }
        }
    }

    #[derive(Default)]
    pub(super) struct Store {
        pub(super) counters: BTreeMap<&'static str, u64>,
        pub(super) gauges: BTreeMap<&'static str, u64>,
        pub(super) histograms: BTreeMap<&'static str, Histogram>,
    }

    fn lock() -> MutexGuard<'static, Store> {
        static STORE: OnceLock<Mutex<Store>> = OnceLock::new();
        let mutex = STORE.get_or_init(|| Mutex::new(Store::default()));
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(super) fn update(apply: impl FnOnce(&mut Store)) {
        apply(&mut lock());
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        let store = lock();
        TelemetrySnapshot {
            counters: store
                .counters
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            gauges: store
                .gauges
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            histograms: store
                .histograms
                .iter()
                .map(|(name, value)| ((*name).to_owned(), value.summary()))
                .collect(),
        }
    }
}
