//! Classifier Statistics
//!
//! Lock-free counters for every outcome of the packet pipeline.

use opp_common::AtomicCounter;
use serde::Serialize;

/// Per-classifier counters (cache-line aligned)
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct ClassifierStats {
    pub packets: AtomicCounter,
    pub forwarded: AtomicCounter,
    pub dropped: AtomicCounter,
    pub end_of_parsing: AtomicCounter,
    pub condition_errors: AtomicCounter,
    pub transitions_missing: AtomicCounter,
    pub updates_unknown: AtomicCounter,
    pub actions_unknown: AtomicCounter,
    pub updates_skipped: AtomicCounter,
    pub flow_hits: AtomicCounter,
    pub flow_misses: AtomicCounter,
    pub store_full: AtomicCounter,
}

impl ClassifierStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets: self.packets.get(),
            forwarded: self.forwarded.get(),
            dropped: self.dropped.get(),
            end_of_parsing: self.end_of_parsing.get(),
            condition_errors: self.condition_errors.get(),
            transitions_missing: self.transitions_missing.get(),
            updates_unknown: self.updates_unknown.get(),
            actions_unknown: self.actions_unknown.get(),
            updates_skipped: self.updates_skipped.get(),
            flow_hits: self.flow_hits.get(),
            flow_misses: self.flow_misses.get(),
            store_full: self.store_full.get(),
        }
    }
}

/// Stats snapshot (non-atomic)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub packets: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub end_of_parsing: u64,
    pub condition_errors: u64,
    pub transitions_missing: u64,
    pub updates_unknown: u64,
    pub actions_unknown: u64,
    pub updates_skipped: u64,
    pub flow_hits: u64,
    pub flow_misses: u64,
    pub store_full: u64,
}

impl StatsSnapshot {
    /// Packets that ended in one of the abort outcomes
    pub fn aborted(&self) -> u64 {
        self.condition_errors
            + self.transitions_missing
            + self.updates_unknown
            + self.actions_unknown
            + self.updates_skipped
    }

    /// Share of classified packets that were forwarded
    pub fn forward_ratio(&self) -> f64 {
        let decided = self.forwarded + self.dropped;
        if decided == 0 {
            return 0.0;
        }
        self.forwarded as f64 / decided as f64
    }
}
