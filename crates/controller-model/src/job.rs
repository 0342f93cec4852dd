//! Job spec, start descriptor, and terminal summary types (spec §4.2, §6).

use crate::chunk::DataSlice;
use crate::ids::{JobId, NodeId, OutputTableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource requirements/limits attached to a job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: f64,
    pub memory_bytes: u64,
    pub network: f64,
    pub user_slots: u32,
}

impl ResourceLimits {
    /// True if `self` dominates (is >= in every dimension than) `other`.
    pub fn dominates(&self, other: &ResourceLimits) -> bool {
        self.cpu >= other.cpu
            && self.memory_bytes >= other.memory_bytes
            && self.network >= other.network
            && self.user_slots >= other.user_slots
    }
}

/// Per-task job template fields copied into every job spec built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserJobSpec {
    pub command: String,
    pub environment: HashMap<String, String>,
    pub file_paths: Vec<String>,
    pub tmpfs_size: Option<u64>,
    pub memory_reserve_factor: f64,
}

/// A fully built job specification ready to hand to an accepted offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_id: JobId,
    pub input_format: String,
    pub output_format: String,
    pub user_job_spec: Option<UserJobSpec>,
    pub stripe_slice_count: usize,
    /// Freshly extracted chunk list ids, one per outgoing edge.
    pub output_chunk_list_ids: Vec<u64>,
    pub memory_limit_bytes: u64,
    pub interruptible: bool,
}

/// Returned to the scheduler after a successful `ScheduleJob` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartDescriptor {
    pub job_id: JobId,
    pub resources: ResourceLimits,
    pub interruptible: bool,
}

/// Reasons a scheduling attempt within one task group iteration can fail
/// (spec §4.4, §7); these are aggregated counters, never raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleFailReason {
    NotEnoughResources,
    NotEnoughChunkLists,
    NoCandidateTasks,
    TaskDelayed,
    OperationNotRunning,
    JobSpecThrottling,
}

/// Why a job was interrupted cooperatively (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptReason {
    None,
    Preemption,
    UserRequest,
    JobSplit,
}

/// Why a job was aborted (spec §4.2's "On abort"); only a subset trigger
/// side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    ResourceOverdraft,
    FailedChunks,
    UserRequest,
    AccountLimitExceeded,
    Other,
}

impl AbortReason {
    pub fn has_side_effect(self) -> bool {
        matches!(
            self,
            AbortReason::ResourceOverdraft
                | AbortReason::FailedChunks
                | AbortReason::UserRequest
                | AbortReason::AccountLimitExceeded
        )
    }
}

/// Descriptor of a data slice reported unread/read back from an
/// interrupted job (spec §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceDescriptor {
    pub slice: DataSlice,
    pub rows_read: u64,
}

/// Terminal report for one job, covering success, failure, and abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub node: NodeId,
    pub output_chunk_specs: HashMap<OutputTableId, Vec<u64>>,
    pub interrupt_reason: InterruptReason,
    pub unread_slices: Vec<SliceDescriptor>,
    pub read_slices: Vec<SliceDescriptor>,
    pub observed_job_proxy_memory: u64,
    pub observed_user_job_memory: u64,
    pub stderr_size: Option<u64>,
    pub failed_chunk_ids: Vec<u64>,
    /// `fatal` attribute on the job error; immediately fails the operation
    /// when set (spec §4.2 "On failure").
    pub fatal_error: bool,
    pub error_message: Option<String>,
}
