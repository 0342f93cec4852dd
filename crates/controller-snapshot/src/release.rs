//! Release coordinator (spec §4.7): the four monotonic queues plus the
//! RPCs that drain each one's pre-snapshot prefix once the snapshot that
//! covers it is durable.

use std::sync::Arc;

use controller_model::JobId;
use controller_proto::{Master, Scheduler};
use tracing::warn;

use crate::error::SnapshotError;
use crate::queue::{Checkpoint, ReleaseQueue};

/// One queued request to archive a job spec, released the same way the
/// other three queues are (spec §4.7). The archive destination is up to
/// the caller; this crate only tracks the request until it's safe to
/// hand off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpecArchiveRequest {
    pub job_id: JobId,
    pub spec_blob: Vec<u8>,
}

/// Sink for released job-spec archive requests.
pub trait JobSpecArchiver: Send + Sync {
    fn archive(&self, request: JobSpecArchiveRequest);
}

pub struct NoopArchiver;

impl JobSpecArchiver for NoopArchiver {
    fn archive(&self, _request: JobSpecArchiveRequest) {}
}

/// A cookie per queue, taken right before a snapshot write starts;
/// passed back to [`ReleaseCoordinator::release`] once that snapshot is
/// durable.
pub struct SnapshotCheckpoints {
    pub completed_job_ids: Checkpoint,
    pub intermediate_stripe_lists: Checkpoint,
    pub chunk_trees: Checkpoint,
    pub job_spec_archive_requests: Checkpoint,
}

/// The four monotonic queues named in spec §4.7, plus the scheduler and
/// Master handles their release RPCs go to.
pub struct ReleaseCoordinator<S, M> {
    scheduler: Arc<S>,
    master: Arc<M>,
    pub completed_job_ids: ReleaseQueue<JobId>,
    pub intermediate_stripe_lists: ReleaseQueue<u64>,
    pub chunk_trees: ReleaseQueue<u64>,
    pub job_spec_archive_requests: ReleaseQueue<JobSpecArchiveRequest>,
}

impl<S: Scheduler, M: Master> ReleaseCoordinator<S, M> {
    pub fn new(scheduler: Arc<S>, master: Arc<M>) -> Self {
        Self {
            scheduler,
            master,
            completed_job_ids: ReleaseQueue::new(),
            intermediate_stripe_lists: ReleaseQueue::new(),
            chunk_trees: ReleaseQueue::new(),
            job_spec_archive_requests: ReleaseQueue::new(),
        }
    }

    /// A cookie covering every queue's current contents, taken right
    /// before a snapshot write starts (spec §4.7's per-queue
    /// `Checkpoint()`).
    pub fn checkpoint(&self) -> SnapshotCheckpoints {
        SnapshotCheckpoints {
            completed_job_ids: self.completed_job_ids.checkpoint(),
            intermediate_stripe_lists: self.intermediate_stripe_lists.checkpoint(),
            chunk_trees: self.chunk_trees.checkpoint(),
            job_spec_archive_requests: self.job_spec_archive_requests.checkpoint(),
        }
    }

    /// Called once a snapshot covering `checkpoints` is durable; drains
    /// and releases the pre-snapshot prefix of every queue. One queue's
    /// RPC failing doesn't stop the others — every failure is collected
    /// and returned so the caller can decide whether to retry.
    pub async fn release(
        &mut self,
        checkpoints: SnapshotCheckpoints,
        archiver: &dyn JobSpecArchiver,
    ) -> Vec<SnapshotError> {
        let mut errors = Vec::new();

        let job_ids = self
            .completed_job_ids
            .release_through(checkpoints.completed_job_ids);
        if !job_ids.is_empty() {
            if let Err(err) = self.scheduler.release_jobs(job_ids).await {
                warn!(error = %err, "failed to release completed job ids to scheduler");
                errors.push(SnapshotError::from(err));
            }
        }

        for stripe_list in self
            .intermediate_stripe_lists
            .release_through(checkpoints.intermediate_stripe_lists)
        {
            if let Err(err) = self.master.unstage_chunk_list(stripe_list).await {
                warn!(error = %err, stripe_list, "failed to unstage intermediate stripe list");
                errors.push(SnapshotError::from(err));
            }
        }

        for chunk_tree in self.chunk_trees.release_through(checkpoints.chunk_trees) {
            if let Err(err) = self.master.unstage_chunk_tree(chunk_tree).await {
                warn!(error = %err, chunk_tree, "failed to unstage chunk tree");
                errors.push(SnapshotError::from(err));
            }
        }

        for request in self
            .job_spec_archive_requests
            .release_through(checkpoints.job_spec_archive_requests)
        {
            archiver.archive(request);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_proto::testing::{FakeMaster, FakeScheduler};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingArchiver {
        requests: Mutex<Vec<JobSpecArchiveRequest>>,
    }

    impl JobSpecArchiver for RecordingArchiver {
        fn archive(&self, request: JobSpecArchiveRequest) {
            self.requests.lock().unwrap().push(request);
        }
    }

    #[tokio::test]
    async fn release_drains_pre_checkpoint_prefix_of_every_queue() {
        let scheduler = Arc::new(FakeScheduler::new());
        let master = Arc::new(FakeMaster::new());
        let mut coordinator = ReleaseCoordinator::new(scheduler.clone(), master.clone());

        coordinator.completed_job_ids.push(JobId(1));
        coordinator.intermediate_stripe_lists.push(100);
        coordinator.chunk_trees.push(200);
        coordinator.job_spec_archive_requests.push(JobSpecArchiveRequest {
            job_id: JobId(1),
            spec_blob: vec![9],
        });
        let checkpoints = coordinator.checkpoint();

        coordinator.completed_job_ids.push(JobId(2));

        let archiver = RecordingArchiver::default();
        let errors = coordinator.release(checkpoints, &archiver).await;

        assert!(errors.is_empty());
        assert_eq!(scheduler.released_jobs(), vec![JobId(1)]);
        assert_eq!(master.unstaged_chunk_lists(), vec![100]);
        assert_eq!(master.unstaged_chunk_trees(), vec![200]);
        assert_eq!(archiver.requests.lock().unwrap().len(), 1);
        assert_eq!(coordinator.completed_job_ids.len(), 1);
    }
}
