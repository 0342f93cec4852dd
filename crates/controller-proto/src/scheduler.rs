//! Scheduler collaborator (spec §6): the cluster scheduler that matches
//! per-node offers to this operation's controller. `schedule_job` must be
//! synchronous from the scheduler's point of view and bounded in
//! latency (spec §5 timeouts) — callers are expected to enforce that
//! bound themselves (e.g. `tokio::time::timeout`) since the trait can't.

use async_trait::async_trait;
use controller_model::{JobId, JobSummary, ResourceLimits, ScheduleFailReason, StartDescriptor};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

/// One offer from the scheduler: the resources on the node making the
/// offer and the tentative tree id it's scheduling within.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleContext {
    pub limits: ResourceLimits,
    pub tree_id: String,
}

/// Result of one `ScheduleJob` call: either a descriptor for the job that
/// was started, or an empty result with the reasons nothing was
/// scheduled (spec §4.4, never raised as an error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleOutcome {
    pub start: Option<StartDescriptor>,
    pub fail_reasons: HashMap<ScheduleFailReason, u32>,
    pub duration: Duration,
}

impl ScheduleOutcome {
    pub fn started(start: StartDescriptor, duration: Duration) -> Self {
        Self {
            start: Some(start),
            fail_reasons: HashMap::new(),
            duration,
        }
    }

    pub fn not_scheduled(reason: ScheduleFailReason, duration: Duration) -> Self {
        let mut fail_reasons = HashMap::new();
        fail_reasons.insert(reason, 1);
        Self {
            start: None,
            fail_reasons,
            duration,
        }
    }
}

/// Minimal node descriptor as reported by `OnNodeDescriptorsUpdate`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub node: controller_model::NodeId,
    pub tags: Vec<String>,
}

/// Collaborator interface to the cluster scheduler (spec §6).
///
/// Implemented in-process by the scheduler in production; [`crate::testing`]
/// provides an in-memory double for tests.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Offer resources to this operation; must return promptly (spec §5).
    async fn schedule_job(&self, context: ScheduleContext) -> Result<ScheduleOutcome>;

    async fn on_job_started(&self, job_id: JobId, start_time: chrono::DateTime<chrono::Utc>);
    async fn on_job_running(&self, summary: JobSummary);
    async fn on_job_completed(&self, summary: JobSummary);
    async fn on_job_failed(&self, summary: JobSummary);
    async fn on_job_aborted(&self, summary: JobSummary, by_scheduler: bool);

    async fn on_operation_banned_in_tentative_tree(&self, tree_id: String);
    async fn on_node_descriptors_update(&self, nodes: Vec<NodeDescriptor>);
    async fn get_exec_node_count(&self) -> usize;

    /// Releases completed job records the scheduler no longer needs to
    /// retain once a snapshot covering them has been taken (spec §4.7).
    async fn release_jobs(&self, job_ids: Vec<JobId>) -> Result<()>;
}
