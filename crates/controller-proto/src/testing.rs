//! In-memory test doubles for [`crate::scheduler::Scheduler`] and
//! [`crate::master::Master`], used by `controller-task`/`controller-txn`/
//! `controller-core` unit and integration tests instead of a real cluster.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use controller_model::{CellTag, ChunkId, JobId, JobSummary, Replica, TransactionId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProtoError, Result};
use crate::master::{ChunkLocateResult, CypressNode, LockMode, Master, TableStatistics, UploadParams};
use crate::scheduler::{NodeDescriptor, ScheduleContext, ScheduleOutcome, Scheduler};

/// Records every call made to it; `schedule_job` replies with whatever
/// outcome was queued via [`FakeScheduler::push_outcome`], defaulting to
/// `NoCandidateTasks` if the queue is empty.
#[derive(Default)]
pub struct FakeScheduler {
    state: Mutex<FakeSchedulerState>,
}

#[derive(Default)]
struct FakeSchedulerState {
    queued_outcomes: std::collections::VecDeque<ScheduleOutcome>,
    started: Vec<(JobId, DateTime<Utc>)>,
    running: Vec<JobSummary>,
    completed: Vec<JobSummary>,
    failed: Vec<JobSummary>,
    aborted: Vec<(JobSummary, bool)>,
    banned_trees: Vec<String>,
    exec_node_count: usize,
    released_jobs: Vec<JobId>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeSchedulerState {
                exec_node_count: 1,
                ..Default::default()
            }),
        }
    }

    pub fn push_outcome(&self, outcome: ScheduleOutcome) {
        self.state.lock().unwrap().queued_outcomes.push_back(outcome);
    }

    pub fn set_exec_node_count(&self, count: usize) {
        self.state.lock().unwrap().exec_node_count = count;
    }

    pub fn completed_jobs(&self) -> Vec<JobSummary> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn failed_jobs(&self) -> Vec<JobSummary> {
        self.state.lock().unwrap().failed.clone()
    }

    pub fn released_jobs(&self) -> Vec<JobId> {
        self.state.lock().unwrap().released_jobs.clone()
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn schedule_job(&self, _context: ScheduleContext) -> Result<ScheduleOutcome> {
        let mut state = self.state.lock().unwrap();
        Ok(state.queued_outcomes.pop_front().unwrap_or_else(|| {
            ScheduleOutcome::not_scheduled(
                controller_model::ScheduleFailReason::NoCandidateTasks,
                Duration::from_millis(0),
            )
        }))
    }

    async fn on_job_started(&self, job_id: JobId, start_time: DateTime<Utc>) {
        self.state.lock().unwrap().started.push((job_id, start_time));
    }

    async fn on_job_running(&self, summary: JobSummary) {
        self.state.lock().unwrap().running.push(summary);
    }

    async fn on_job_completed(&self, summary: JobSummary) {
        self.state.lock().unwrap().completed.push(summary);
    }

    async fn on_job_failed(&self, summary: JobSummary) {
        self.state.lock().unwrap().failed.push(summary);
    }

    async fn on_job_aborted(&self, summary: JobSummary, by_scheduler: bool) {
        self.state.lock().unwrap().aborted.push((summary, by_scheduler));
    }

    async fn on_operation_banned_in_tentative_tree(&self, tree_id: String) {
        self.state.lock().unwrap().banned_trees.push(tree_id);
    }

    async fn on_node_descriptors_update(&self, _nodes: Vec<NodeDescriptor>) {}

    async fn get_exec_node_count(&self) -> usize {
        self.state.lock().unwrap().exec_node_count
    }

    async fn release_jobs(&self, job_ids: Vec<JobId>) -> Result<()> {
        self.state.lock().unwrap().released_jobs.extend(job_ids);
        Ok(())
    }
}

/// In-memory Cypress tree, transaction table, and chunk replica map.
#[derive(Default)]
pub struct FakeMaster {
    state: Mutex<FakeMasterState>,
}

#[derive(Default)]
struct FakeMasterState {
    nodes: HashMap<String, CypressNode>,
    next_txn: u64,
    live_transactions: HashMap<TransactionId, Option<TransactionId>>,
    committed_transactions: std::collections::HashSet<TransactionId>,
    aborted_transactions: std::collections::HashSet<TransactionId>,
    next_chunk_tree: u64,
    attached: HashMap<u64, Vec<u64>>,
    replicas: HashMap<ChunkId, Vec<Replica>>,
    unavailable: std::collections::HashSet<ChunkId>,
    unstaged_chunk_lists: Vec<u64>,
    unstaged_chunk_trees: Vec<u64>,
}

impl FakeMaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_chunk(&self, chunk: ChunkId, replicas: Vec<Replica>) {
        self.state.lock().unwrap().replicas.insert(chunk, replicas);
    }

    pub fn mark_unavailable(&self, chunk: ChunkId) {
        let mut state = self.state.lock().unwrap();
        state.replicas.remove(&chunk);
        state.unavailable.insert(chunk);
    }

    pub fn mark_available(&self, chunk: ChunkId, replicas: Vec<Replica>) {
        let mut state = self.state.lock().unwrap();
        state.unavailable.remove(&chunk);
        state.replicas.insert(chunk, replicas);
    }

    /// `true` only once `commit_transaction` has actually run on this
    /// id — distinct from [`FakeMaster::is_aborted`] so tests can verify
    /// which direction a transaction actually resolved, not just that it
    /// terminated (spec §8.4 commit atomicity).
    pub fn is_committed(&self, txn: TransactionId) -> bool {
        self.state.lock().unwrap().committed_transactions.contains(&txn)
    }

    pub fn is_aborted(&self, txn: TransactionId) -> bool {
        self.state.lock().unwrap().aborted_transactions.contains(&txn)
    }

    pub fn attached_children(&self, parent: u64) -> Vec<u64> {
        self.state
            .lock()
            .unwrap()
            .attached
            .get(&parent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn unstaged_chunk_lists(&self) -> Vec<u64> {
        self.state.lock().unwrap().unstaged_chunk_lists.clone()
    }

    pub fn unstaged_chunk_trees(&self) -> Vec<u64> {
        self.state.lock().unwrap().unstaged_chunk_trees.clone()
    }
}

#[async_trait]
impl Master for FakeMaster {
    async fn get_node(&self, path: &str) -> Result<CypressNode> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| ProtoError::NodeNotFound(path.to_string()))
    }

    async fn set_node(&self, path: &str, attributes: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.entry(path.to_string()).or_default();
        if let serde_json::Value::Object(map) = attributes {
            node.attributes.extend(map);
        }
        Ok(())
    }

    async fn create_node(&self, path: &str, _node_type: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .entry(path.to_string())
            .or_default();
        Ok(())
    }

    async fn remove_node(&self, path: &str) -> Result<()> {
        self.state.lock().unwrap().nodes.remove(path);
        Ok(())
    }

    async fn lock_node(&self, _path: &str, _txn: TransactionId, _mode: LockMode) -> Result<()> {
        Ok(())
    }

    async fn copy_node(&self, src: &str, dst: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let node = state.nodes.get(src).cloned().unwrap_or_default();
        state.nodes.insert(dst.to_string(), node);
        Ok(())
    }

    async fn attach_chunk_trees(&self, parent: u64, children: Vec<u64>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .attached
            .entry(parent)
            .or_default()
            .extend(children);
        Ok(())
    }

    async fn get_upload_params(&self, _table_path: &str) -> Result<UploadParams> {
        Ok(UploadParams {
            cell_tag: CellTag("cell-1".to_string()),
            max_children_per_attach_request: 10_000,
        })
    }

    async fn begin_upload(&self, _table_path: &str, scope_txn: TransactionId) -> Result<TransactionId> {
        let mut state = self.state.lock().unwrap();
        let id = TransactionId(10_000_000 + state.next_txn);
        state.next_txn += 1;
        state.live_transactions.insert(id, Some(scope_txn));
        Ok(id)
    }

    async fn end_upload(
        &self,
        _table_path: &str,
        upload_txn: TransactionId,
        _stats: TableStatistics,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .live_transactions
            .remove(&upload_txn)
            .map(|_| ())
            .ok_or(ProtoError::TransactionNotFound(upload_txn.get()))
    }

    async fn teleport_chunk(&self, _chunk: ChunkId, _destination_cell: CellTag) -> Result<()> {
        Ok(())
    }

    async fn locate_chunks(&self, chunks: Vec<ChunkId>) -> Result<Vec<ChunkLocateResult>> {
        let state = self.state.lock().unwrap();
        Ok(chunks
            .into_iter()
            .map(|chunk| {
                if let Some(replicas) = state.replicas.get(&chunk) {
                    ChunkLocateResult::Available {
                        chunk,
                        replicas: replicas.clone(),
                    }
                } else if state.unavailable.contains(&chunk) {
                    ChunkLocateResult::Unavailable { chunk }
                } else {
                    ChunkLocateResult::Missing { chunk }
                }
            })
            .collect())
    }

    async fn unstage_chunk_list(&self, chunk_list_id: u64) -> Result<()> {
        self.state.lock().unwrap().unstaged_chunk_lists.push(chunk_list_id);
        Ok(())
    }

    async fn unstage_chunk_tree(&self, chunk_tree_id: u64) -> Result<()> {
        self.state.lock().unwrap().unstaged_chunk_trees.push(chunk_tree_id);
        Ok(())
    }

    async fn start_transaction(
        &self,
        parent: Option<TransactionId>,
        _timeout: Duration,
    ) -> Result<TransactionId> {
        let mut state = self.state.lock().unwrap();
        let id = TransactionId(state.next_txn);
        state.next_txn += 1;
        state.live_transactions.insert(id, parent);
        Ok(id)
    }

    async fn abort_transaction(&self, id: TransactionId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .live_transactions
            .remove(&id)
            .ok_or(ProtoError::TransactionNotFound(id.get()))?;
        state.aborted_transactions.insert(id);
        Ok(())
    }

    async fn commit_transaction(&self, id: TransactionId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .live_transactions
            .remove(&id)
            .ok_or(ProtoError::TransactionNotFound(id.get()))?;
        state.committed_transactions.insert(id);
        Ok(())
    }
}
