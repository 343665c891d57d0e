//! Per-phase wall-clock measurements of the main loop.

use std::collections::BTreeMap;
use std::time::Duration;

use timeseries::{MarkMode, Ts};
use types::Timepoint;

/// The phases measured on every iteration block.
const PHASE_KEYS: [&str; 3] = ["info_view", "iter_block", "subscriber_update"];

/// Map of phase name to a series of millisecond samples, one per block.
pub struct PerfMap {
    phases: BTreeMap<String, Ts<u64>>,
}

impl PerfMap {
    pub fn new() -> Self {
        let mut phases = BTreeMap::new();
        for key in PHASE_KEYS {
            phases.insert(key.to_string(), Ts::new(Timepoint::ZERO, MarkMode::Missing));
        }
        Self { phases }
    }

    /// Append one sample for a phase.
    pub fn record(&mut self, phase: &str, elapsed: Duration) {
        self.phases
            .entry(phase.to_string())
            .or_insert_with(|| Ts::new(Timepoint::ZERO, MarkMode::Missing))
            .append(elapsed.as_millis() as u64);
    }

    /// Snapshot every phase's samples keyed by sample index.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<Timepoint, u64>> {
        self.phases
            .iter()
            .map(|(key, ts)| (key.clone(), ts.to_map(None)))
            .collect()
    }

    /// Drop all samples, keeping the phase keys seeded.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for PerfMap {
    fn default() -> Self {
        Self::new()
    }
}
