//! Derivation of per-second rates from cumulative counters.
//!
//! Disk and network byte counts arrive as monotonically increasing totals;
//! the per-second throughput is the counter delta divided by the actual
//! elapsed wall-clock time between observations.

use std::collections::{HashMap, HashSet};

/// Smallest elapsed time accepted for division. The sampler loop already
/// clamps its measured interval, so this only guards direct callers.
const MIN_ELAPSED_SECS: f64 = 0.001;

/// One derived rate observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    /// Bytes per second since the previous observation.
    pub bps: f64,
    /// Set when the counter went backwards (device reset, re-enumeration, or
    /// wrap). The rate is clamped to zero rather than reported negative.
    pub counter_reset: bool,
}

/// Tracks the last observed value of each cumulative counter.
///
/// This is the loop's ephemeral previous-sample state: in-memory only, owned
/// by the sampler, empty again after every process restart. First rates after
/// a restart are therefore undefined and withheld.
#[derive(Debug, Default)]
pub struct CounterRates {
    baselines: HashMap<String, u64>,
}

impl CounterRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` for `key` and derive the rate since the previous
    /// observation.
    ///
    /// Returns `None` on the first observation of a key: that tick only
    /// establishes the baseline. A negative delta clamps to zero and sets
    /// [`Rate::counter_reset`].
    pub fn observe(&mut self, key: &str, current: u64, elapsed_s: f64) -> Option<Rate> {
        let previous = self.baselines.insert(key.to_string(), current)?;
        let elapsed = elapsed_s.max(MIN_ELAPSED_SECS);

        if current < previous {
            return Some(Rate { bps: 0.0, counter_reset: true });
        }
        Some(Rate { bps: (current - previous) as f64 / elapsed, counter_reset: false })
    }

    /// Drop baselines for keys absent from the current tick.
    ///
    /// A device that later re-appears is treated as a first observation, so
    /// it can never pair with a baseline from a previous incarnation.
    pub fn prune_stale(&mut self, live: &HashSet<String>) {
        self.baselines.retain(|key, _| live.contains(key));
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}
