//! Auto-merge director (C9, spec §4.8): caps the number of small
//! intermediate output chunks alive at any moment by gating whether a
//! task's auto-merge jobs should run.
//!
//! Grounded on `orbit_core_semantic::prioritizer`'s small policy-object
//! style: a trait plus a handful of concrete strategies, picked by a mode
//! enum rather than deep inheritance.

use serde::{Deserialize, Serialize};

/// Auto-merge policy mode (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoMergeMode {
    /// Auto-merge never runs.
    Disabled,
    /// Auto-merge always runs, regardless of estimated output size.
    Relaxed,
    /// Auto-merge runs only while the small-chunk count is below
    /// `ceil(2.5 * sqrt(estimated_output_chunk_count))`.
    Economy,
    /// Cap is taken verbatim from `OperationSpec` rather than derived.
    Manual,
}

/// Decision object tracking the estimated count of small output chunks
/// and deciding whether a task's auto-merge jobs should run or be
/// withheld.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMergeDirector {
    mode: AutoMergeMode,
    estimated_output_chunk_count: u64,
    manual_max_intermediate_chunk_count: u64,
    /// Small chunks currently alive (produced, not yet merged away).
    live_small_chunk_count: u64,
}

impl AutoMergeDirector {
    pub fn new(mode: AutoMergeMode, estimated_output_chunk_count: u64) -> Self {
        Self {
            mode,
            estimated_output_chunk_count,
            manual_max_intermediate_chunk_count: 0,
            live_small_chunk_count: 0,
        }
    }

    /// `Manual` mode's cap comes straight from `OperationSpec`, not a
    /// derived formula.
    pub fn with_manual_cap(mut self, cap: u64) -> Self {
        self.manual_max_intermediate_chunk_count = cap;
        self
    }

    /// Ceiling on intermediate small chunks alive at once under the
    /// current mode. `Relaxed` and `Disabled` have no meaningful ceiling
    /// (the former never withholds, the latter never merges so there's
    /// nothing to cap) and return `u64::MAX`.
    pub fn max_intermediate_chunk_count(&self) -> u64 {
        match self.mode {
            AutoMergeMode::Disabled | AutoMergeMode::Relaxed => u64::MAX,
            AutoMergeMode::Economy => economy_cap(self.estimated_output_chunk_count),
            AutoMergeMode::Manual => self.manual_max_intermediate_chunk_count,
        }
    }

    /// Record that a task emitted one more small chunk destined for
    /// auto-merge.
    pub fn on_small_chunk_produced(&mut self) {
        self.live_small_chunk_count += 1;
    }

    /// Record that `count` small chunks were merged away (their auto-merge
    /// job completed).
    pub fn on_chunks_merged(&mut self, count: u64) {
        self.live_small_chunk_count = self.live_small_chunk_count.saturating_sub(count);
    }

    /// Whether a task wanting to emit to auto-merge should be allowed to
    /// run its merge jobs right now (spec §4.8: "asks the director whether
    /// merge jobs should run or be withheld").
    pub fn should_run_merge_jobs(&self) -> bool {
        match self.mode {
            AutoMergeMode::Disabled => false,
            AutoMergeMode::Relaxed => true,
            AutoMergeMode::Economy | AutoMergeMode::Manual => {
                self.live_small_chunk_count >= self.max_intermediate_chunk_count()
            }
        }
    }

    pub fn live_small_chunk_count(&self) -> u64 {
        self.live_small_chunk_count
    }

    pub fn mode(&self) -> AutoMergeMode {
        self.mode
    }
}

/// `ceil(2.5 * sqrt(n))`, the Economy-mode cap (spec §4.8, §8 scenario 5).
fn economy_cap(estimated_output_chunk_count: u64) -> u64 {
    let cap = 2.5 * (estimated_output_chunk_count as f64).sqrt();
    cap.ceil() as u64
}
