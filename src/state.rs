//! Shared state between the analysis path and the effect engine

use crate::audio::AnalysisResult;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single "latest analysis" slot.
///
/// Writers swap in a whole new `Arc`, so readers always see either the
/// previous complete result or the new one. There is no backlog: readers
/// that fall behind simply get the freshest value.
#[derive(Clone, Default)]
pub struct LatestAnalysis {
    slot: Arc<RwLock<Arc<AnalysisResult>>>,
    updates: Arc<AtomicU64>,
}

impl LatestAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current result
    pub fn publish(&self, result: AnalysisResult) {
        let result = Arc::new(result);
        *self.slot.write() = result;
        self.updates.fetch_add(1, Ordering::Release);
    }

    /// Get the latest analysis result
    pub fn latest(&self) -> Arc<AnalysisResult> {
        self.slot.read().clone()
    }

    /// Number of results published so far
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slot_holds_default_result() {
        let slot = LatestAnalysis::new();

        assert_eq!(slot.updates(), 0);
        assert_eq!(slot.latest().bpm, 120.0);
    }

    #[test]
    fn latest_wins_and_old_snapshots_stay_intact() {
        let slot = LatestAnalysis::new();
        slot.publish(AnalysisResult {
            volume: 0.1,
            ..Default::default()
        });
        let held = slot.latest();

        slot.publish(AnalysisResult {
            volume: 0.2,
            ..Default::default()
        });
        slot.publish(AnalysisResult {
            volume: 0.3,
            ..Default::default()
        });

        assert_eq!(held.volume, 0.1);
        assert_eq!(slot.latest().volume, 0.3);
        assert_eq!(slot.updates(), 3);
    }

    #[test]
    fn clones_share_the_slot() {
        let writer = LatestAnalysis::new();
        let reader = writer.clone();

        writer.publish(AnalysisResult {
            bpm: 98.0,
            ..Default::default()
        });

        assert_eq!(reader.latest().bpm, 98.0);
    }
}
