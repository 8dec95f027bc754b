//! Frame reports

use crate::batch::{DrawStats, GroupingStats};
use crate::flow::CollectionFailure;
use crate::geometry::TransientStats;
use crate::state::DifferStats;

/// What one stage did this frame
#[derive(Clone, Debug, Default)]
pub struct StageReport {
    pub stage: String,
    /// Entries in the container at the start of the frame
    pub instances: usize,
    pub ticked: usize,
    pub discarded: usize,
    /// Entries whose tree position changed
    pub reinserted: usize,
    pub visible: usize,
    pub collected: usize,
    /// Instances without a strategy, or declined by theirs
    pub skipped: usize,
    pub batches: usize,
    /// State commands emitted by the differ
    pub state_changes: usize,
    pub dropped_batches: u32,
    pub grouping: GroupingStats,
    pub draw: DrawStats,
    /// Instances excluded this frame by a tick, collection or geometry failure
    pub failures: Vec<CollectionFailure>,
}

/// What a whole frame did
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub frame: u64,
    /// Stage reports in execution order
    pub stages: Vec<StageReport>,
    pub transient: TransientStats,
    pub differ: DifferStats,
}

impl FrameReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CollectionFailure> {
        self.stages.iter().flat_map(|s| s.failures.iter())
    }

    pub fn dropped_batches(&self) -> u32 {
        self.stages.iter().map(|s| s.dropped_batches).sum()
    }

    /// Draw statistics summed over every stage
    pub fn draw_stats(&self) -> DrawStats {
        let mut total = DrawStats::default();
        for stage in &self.stages {
            total.merge(&stage.draw);
        }
        total
    }
}
