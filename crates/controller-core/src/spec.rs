//! `OperationSpec`: the config schema surface spec §6 says the core
//! touches directly (timeouts, job counts, limits, auto-merge mode,
//! unavailable-chunk policy, fail-on-job-restart, testing delays).
//! Everything else in a full operation spec (paths, ACLs, pool trees)
//! is the root crate's concern, not this one's.

use std::time::Duration;

use controller_automerge::AutoMergeMode;
use serde::{Deserialize, Serialize};

/// Policy for an input chunk discovered missing (spec §7's
/// `ChunkUnavailable`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnavailableChunkPolicy {
    /// Fail the operation as soon as one chunk is found unavailable.
    Fail,
    /// Drop the stripe containing the chunk and keep going.
    Skip,
    /// Suspend the stripe and wait for the scraper to find it again.
    Wait,
}

impl Default for UnavailableChunkPolicy {
    fn default() -> Self {
        Self::Wait
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Hard deadline for `Prepare` (spec §5 timeouts).
    pub prepare_timeout: Duration,
    /// After `Failing` is entered, force-fail every joblet once this
    /// elapses without a clean stop (spec §5: `ControllerFailTimeout`).
    pub controller_fail_timeout: Duration,
    /// Per-scheduling-iteration bound the scheduling loop's caller
    /// enforces around `schedule_offer`.
    pub scheduling_iteration_timeout: Duration,
    /// Per-RPC timeout the `Master`/`Scheduler` clients enforce.
    pub rpc_timeout: Duration,
    pub max_failed_job_count: u32,
    pub unavailable_chunk_policy: UnavailableChunkPolicy,
    /// Reject revival outright rather than restart any job (spec §4.9,
    /// §7's `OperationFailedOnJobRestart`).
    pub fail_on_job_restart: bool,
    pub auto_merge_mode: AutoMergeMode,
    /// Only consulted when `auto_merge_mode` is `Manual`.
    pub auto_merge_manual_cap: u64,
    pub estimated_output_chunk_count: u64,
    /// Quantile used for both memory digests (spec §4.10).
    pub memory_reserve_quantile: f64,
    /// Artificial delay knobs for deterministic tests (spec §6's
    /// "testing delays"); zero in production.
    pub testing_delay_before_schedule: Duration,
    pub testing_delay_before_commit: Duration,
}

impl Default for OperationSpec {
    fn default() -> Self {
        Self {
            prepare_timeout: Duration::from_secs(300),
            controller_fail_timeout: Duration::from_secs(120),
            scheduling_iteration_timeout: Duration::from_millis(100),
            rpc_timeout: Duration::from_secs(30),
            max_failed_job_count: 10,
            unavailable_chunk_policy: UnavailableChunkPolicy::default(),
            fail_on_job_restart: false,
            auto_merge_mode: AutoMergeMode::Relaxed,
            auto_merge_manual_cap: 0,
            estimated_output_chunk_count: 0,
            memory_reserve_quantile: 0.95,
            testing_delay_before_schedule: Duration::ZERO,
            testing_delay_before_commit: Duration::ZERO,
        }
    }
}
