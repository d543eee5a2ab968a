//! Process-wide timing registry
//!
//! Probes report `(label, duration)` samples here. The registry keeps a
//! running [`AggregateStat`] per label behind a single mutex, so any number of
//! threads can record into it concurrently without lost updates.
//!
//! The global instance is created lazily on first use and lives for the rest
//! of the process. Tests and embedders that need isolation construct their own
//! [`Registry`] and pass it to [`crate::Timer::start_in`].

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;

/// Environment variable that disables the global registry when non-empty
pub const DISABLE_ENV: &str = "WCPROF_DISABLE";

/// Running statistics for a single label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateStat {
    /// Number of samples recorded
    pub count: u64,
    /// Sum of all sample durations
    pub sum: Duration,
    /// Shortest sample (`Duration::MAX` until the first sample arrives)
    pub min: Duration,
    /// Longest sample
    pub max: Duration,
    /// `sum / count`, zero while `count` is zero
    pub average: Duration,
}

impl Default for AggregateStat {
    fn default() -> Self {
        Self {
            count: 0,
            sum: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            average: Duration::ZERO,
        }
    }
}

impl AggregateStat {
    /// Fold one sample into the running totals
    pub fn update(&mut self, duration: Duration) {
        self.count += 1;
        self.sum = self.sum.saturating_add(duration);
        if duration < self.min {
            self.min = duration;
        }
        if duration > self.max {
            self.max = duration;
        }
        self.average = average(self.sum, self.count);
    }
}

fn average(sum: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = sum.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Immutable point-in-time copy of a registry, ordered by label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    stats: BTreeMap<String, AggregateStat>,
}

impl Snapshot {
    /// Look up the statistics for one label
    pub fn get(&self, label: &str) -> Option<&AggregateStat> {
        self.stats.get(label)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Iterate over `(label, stat)` pairs in label order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AggregateStat)> {
        self.stats.iter().map(|(label, stat)| (label.as_str(), stat))
    }
}

impl FromIterator<(String, AggregateStat)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, AggregateStat)>>(iter: I) -> Self {
        Self {
            stats: iter.into_iter().collect(),
        }
    }
}

/// Concurrency-safe label -> [`AggregateStat`] store
#[derive(Debug)]
pub struct Registry {
    enabled: bool,
    stats: Mutex<HashMap<String, AggregateStat>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty, enabled registry
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// Create a registry that ignores every sample
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fold a sample into the statistics for `label`
    ///
    /// A disabled registry returns before the lock is taken. Only the first
    /// sample of a label allocates.
    pub fn record(&self, label: &str, duration: Duration) {
        if !self.enabled {
            return;
        }

        let mut stats = self.stats.lock();
        match stats.get_mut(label) {
            Some(stat) => stat.update(duration),
            None => {
                let mut stat = AggregateStat::default();
                stat.update(duration);
                stats.insert(label.to_owned(), stat);
            }
        }
    }

    /// Copy the current statistics under the lock
    pub fn snapshot(&self) -> Snapshot {
        let stats = self.stats.lock();
        stats
            .iter()
            .map(|(label, stat)| (label.clone(), *stat))
            .collect()
    }

    /// Current statistics for one label
    pub fn get(&self, label: &str) -> Option<AggregateStat> {
        self.stats.lock().get(label).copied()
    }

    /// Number of distinct labels recorded so far
    pub fn len(&self) -> usize {
        self.stats.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.lock().is_empty()
    }

    /// Drop all recorded statistics
    pub fn clear(&self) {
        self.stats.lock().clear();
    }
}

/// The process-wide registry used by [`crate::Timer::start`]
///
/// Created on first call with the switch from [`DISABLE_ENV`] and never torn
/// down.
pub fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(|| {
        let enabled = enabled_from_env(std::env::var_os(DISABLE_ENV));
        if !enabled {
            tracing::debug!("{} is set, timing probes are disabled", DISABLE_ENV);
        }
        Registry::with_enabled(enabled)
    })
}

/// Resolve the enable switch from the value of [`DISABLE_ENV`]
///
/// Unset or empty means enabled; anything else disables profiling.
pub fn enabled_from_env(value: Option<OsString>) -> bool {
    value.map_or(true, |v| v.is_empty())
}

/// Record a sample into the global registry
pub fn record(label: &str, duration: Duration) {
    global().record(label, duration);
}

/// Snapshot the global registry
pub fn snapshot() -> Snapshot {
    global().snapshot()
}
