//! Joblet registry (C5, spec §3.1, §3.2): the controller-side record of
//! an in-flight job, and the short-lived `CompletedJob` record kept
//! around for destinations that need recovery info.

use std::collections::HashMap;

use controller_model::{
    ChunkId, ChunkStripeList, InputCookie, JobId, JobSpec, NodeId, OutputCookie, ResourceLimits,
};

/// A running job's record (spec §3.1's Joblet glossary entry). Destroyed
/// on terminal summary; its memory/metric samples flush into the owning
/// task's counters and digests at that point, not before.
#[derive(Debug, Clone, PartialEq)]
pub struct Joblet {
    pub job_id: JobId,
    pub node: NodeId,
    pub input_cookies: Vec<InputCookie>,
    pub output_cookie: OutputCookie,
    pub stripe_list: ChunkStripeList,
    pub spec: JobSpec,
    pub resources: ResourceLimits,
    pub user_job_memory_reserve_factor: f64,
    pub interruptible: bool,
    /// Set when this joblet is a re-run of a split-off remainder (spec
    /// §4.3); lets the task avoid double-counting the original job.
    pub speculative_sibling: Option<JobId>,
}

/// Keyed store of in-flight joblets. A thin `HashMap` wrapper rather than
/// a bare map on `Task` so lookups have a named failure mode.
#[derive(Debug, Default)]
pub struct JobletRegistry {
    joblets: HashMap<JobId, Joblet>,
}

impl JobletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, joblet: Joblet) {
        self.joblets.insert(joblet.job_id, joblet);
    }

    pub fn remove(&mut self, job_id: JobId) -> Option<Joblet> {
        self.joblets.remove(&job_id)
    }

    pub fn get(&self, job_id: JobId) -> Option<&Joblet> {
        self.joblets.get(&job_id)
    }

    pub fn len(&self) -> usize {
        self.joblets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joblets.is_empty()
    }
}

/// Recorded when a completed job's destination requires recovery info
/// (spec §4.2's "On completion"): enough to re-derive the original input
/// stripe if this job's *output* is later reported lost, since the pool
/// itself discards extraction bookkeeping once `completed()` finalizes
/// the cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub job_id: JobId,
    pub output_cookie: OutputCookie,
    pub input_cookies: Vec<InputCookie>,
    pub stripe_list: ChunkStripeList,
    pub output_chunks: Vec<ChunkId>,
    /// Set once a prior `OnJobLost` has already re-queued this job's
    /// work; a second loss of the same record is a bug, mirroring
    /// `PoolCore::lost`'s `already_lost` guard.
    pub already_lost: bool,
}

#[derive(Debug, Default)]
pub struct CompletedJobRegistry {
    entries: HashMap<JobId, CompletedJob>,
}

impl CompletedJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CompletedJob) {
        self.entries.insert(entry.job_id, entry);
    }

    pub fn get(&self, job_id: JobId) -> Option<&CompletedJob> {
        self.entries.get(&job_id)
    }

    pub fn get_mut(&mut self, job_id: JobId) -> Option<&mut CompletedJob> {
        self.entries.get_mut(&job_id)
    }

    pub fn remove(&mut self, job_id: JobId) -> Option<CompletedJob> {
        self.entries.remove(&job_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::ChunkStripeList;

    fn empty_stripe_list() -> ChunkStripeList {
        ChunkStripeList::from_stripes(vec![])
    }

    fn test_job_spec() -> JobSpec {
        JobSpec {
            job_id: JobId(1),
            input_format: "yson".into(),
            output_format: "yson".into(),
            user_job_spec: None,
            stripe_slice_count: 0,
            output_chunk_list_ids: vec![],
            memory_limit_bytes: 0,
            interruptible: false,
        }
    }

    #[test]
    fn registry_round_trips_a_joblet() {
        let mut registry = JobletRegistry::new();
        let joblet = Joblet {
            job_id: JobId(1),
            node: NodeId("n1".into()),
            input_cookies: vec![InputCookie(1)],
            output_cookie: OutputCookie(1),
            stripe_list: empty_stripe_list(),
            spec: test_job_spec(),
            resources: ResourceLimits {
                cpu: 1.0,
                memory_bytes: 1024,
                network: 0.0,
                user_slots: 1,
            },
            user_job_memory_reserve_factor: 1.2,
            interruptible: false,
            speculative_sibling: None,
        };
        registry.insert(joblet.clone());
        assert_eq!(registry.get(JobId(1)), Some(&joblet));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove(JobId(1)), Some(joblet));
        assert!(registry.is_empty());
    }

    #[test]
    fn completed_job_registry_tracks_already_lost() {
        let mut registry = CompletedJobRegistry::new();
        registry.insert(CompletedJob {
            job_id: JobId(1),
            output_cookie: OutputCookie(1),
            input_cookies: vec![InputCookie(1)],
            stripe_list: empty_stripe_list(),
            output_chunks: vec![ChunkId(9)],
            already_lost: false,
        });
        registry.get_mut(JobId(1)).unwrap().already_lost = true;
        assert!(registry.get(JobId(1)).unwrap().already_lost);
    }
}
