//! `OperationController`: the top-level orchestrator (C11, spec §4.9)
//! that owns an operation's task arena, drives the scheduling loop,
//! routes terminal job reports, and walks `OperationState` from
//! `Preparing` through `Finished`. Everything else in this workspace is
//! a collaborator this type wires together; nothing upstream of it
//! calls any other controller-* crate directly.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use controller_automerge::AutoMergeDirector;
use controller_model::{
    AbortReason, ChunkId, JobId, JobSummary, NodeId, OperationId, OutputTable, OutputTableId,
    Replica, ResourceLimits, TaskGroupId, TaskId, TransactionId, TransactionRole, TransactionTree,
};
use controller_progress::{
    run_analyzers, Alert, AlertKind, InputWeightHistograms, OperationSnapshot as ProgressSnapshot,
    ProgressCounter,
};
use controller_proto::{Master, Scheduler};
use controller_scraper::{ChunkScraper, ScraperKind, ScraperObserver, ScraperPolicy};
use controller_snapshot::{
    JobSpecArchiver, OperationSnapshot as PersistedSnapshot, ReleaseCoordinator,
};
use controller_task::{
    schedule_offer, AbortOutcome, FailOutcome, ScheduleOutcome as TaskScheduleOutcome, Task,
    TaskGroup,
};
use controller_txn::{CommitPipeline, NoopCommitHook, TableCommitInputs};

use crate::arena::{ChunkListBroker, TaskArena};
use crate::error::{CoreError, Result};
use crate::spec::{OperationSpec, UnavailableChunkPolicy};
use crate::state::{op_span, FinalStatus, OperationState};

/// Collects the scraper's callbacks so the controller can apply them on
/// its own turn, rather than mutating operation state from inside an
/// async callback invoked off the scraper's sweep loop.
#[derive(Default)]
struct ScraperBridge {
    available: Mutex<Vec<(ChunkId, Vec<Replica>)>>,
    unavailable: Mutex<Vec<ChunkId>>,
    input_missing: Mutex<Vec<ChunkId>>,
}

impl ScraperBridge {
    fn take_available(&self) -> Vec<(ChunkId, Vec<Replica>)> {
        std::mem::take(&mut *self.available.lock().unwrap())
    }

    fn take_unavailable(&self) -> Vec<ChunkId> {
        std::mem::take(&mut *self.unavailable.lock().unwrap())
    }

    fn take_input_missing(&self) -> Vec<ChunkId> {
        std::mem::take(&mut *self.input_missing.lock().unwrap())
    }
}

#[async_trait]
impl ScraperObserver for ScraperBridge {
    async fn on_available(&self, chunk: ChunkId, replicas: Vec<Replica>) {
        self.available.lock().unwrap().push((chunk, replicas));
    }

    async fn on_unavailable(&self, chunk: ChunkId) {
        self.unavailable.lock().unwrap().push(chunk);
    }

    async fn on_input_chunk_missing(&self, chunk: ChunkId) {
        self.input_missing.lock().unwrap().push(chunk);
    }
}

/// The per-operation brain: one instance per running operation, owning
/// every collaborator crate's state for that operation (spec §1, §4.9).
pub struct OperationController<M, S> {
    pub operation_id: OperationId,
    spec: OperationSpec,
    state: OperationState,
    master: Arc<M>,
    scheduler: Arc<S>,
    arena: TaskArena,
    groups: Vec<TaskGroup>,
    chunk_lists: ChunkListBroker,
    list_id_minter: controller_model::HandleAllocator,
    auto_merge: AutoMergeDirector,
    input_scraper: Arc<ChunkScraper<M>>,
    intermediate_scraper: Arc<ChunkScraper<M>>,
    scraper_bridge: Arc<ScraperBridge>,
    release: ReleaseCoordinator<S, M>,
    commit_pipeline: CommitPipeline<M>,
    transaction_tree: TransactionTree,
    output_tables: Vec<OutputTable>,
    counters: ProgressCounter,
    weights: InputWeightHistograms,
    unavailable_chunks: HashSet<ChunkId>,
    lost_intermediate_chunk_count: u64,
    schedule_stats: controller_task::ScheduleJobStatistics,
    active_alerts: HashMap<AlertKind, Alert>,
    failure_reason: Option<String>,
}

impl<M, S> OperationController<M, S>
where
    M: Master + Send + Sync + 'static,
    S: Scheduler + Send + Sync + 'static,
{
    pub fn new(
        operation_id: OperationId,
        spec: OperationSpec,
        master: Arc<M>,
        scheduler: Arc<S>,
        user_transaction: TransactionId,
        output_tables: Vec<OutputTable>,
    ) -> Self {
        let auto_merge =
            AutoMergeDirector::new(spec.auto_merge_mode, spec.estimated_output_chunk_count)
                .with_manual_cap(spec.auto_merge_manual_cap);
        let commit_pipeline = CommitPipeline::new(master.clone(), spec.rpc_timeout);
        let release = ReleaseCoordinator::new(scheduler.clone(), master.clone());
        let scraper_policy = ScraperPolicy::default();
        let input_scraper =
            ChunkScraper::new(ScraperKind::Input, master.clone(), scraper_policy.clone());
        let intermediate_scraper =
            ChunkScraper::new(ScraperKind::Intermediate, master.clone(), scraper_policy);

        Self {
            operation_id,
            state: OperationState::Preparing,
            master,
            scheduler,
            arena: TaskArena::new(),
            groups: Vec::new(),
            chunk_lists: ChunkListBroker::new(100, 10),
            list_id_minter: controller_model::HandleAllocator::new(),
            auto_merge,
            input_scraper,
            intermediate_scraper,
            scraper_bridge: Arc::new(ScraperBridge::default()),
            release,
            commit_pipeline,
            transaction_tree: TransactionTree::new(user_transaction),
            output_tables,
            counters: ProgressCounter::new(),
            weights: InputWeightHistograms::new(),
            unavailable_chunks: HashSet::new(),
            lost_intermediate_chunk_count: 0,
            schedule_stats: controller_task::ScheduleJobStatistics::new(Duration::from_secs(30)),
            active_alerts: HashMap::new(),
            failure_reason: None,
            spec,
        }
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }

    pub fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    pub fn output_tables(&self) -> &[OutputTable] {
        &self.output_tables
    }

    pub fn auto_merge(&self) -> &AutoMergeDirector {
        &self.auto_merge
    }

    pub fn auto_merge_mut(&mut self) -> &mut AutoMergeDirector {
        &mut self.auto_merge
    }

    // ---- Task/group registration ----

    pub fn register_task_group(&mut self, group: TaskGroup) {
        self.groups.push(group);
        self.groups.sort_by_key(|g| g.priority);
    }

    pub fn register_task(&mut self, task: Task, group_id: TaskGroupId) {
        let task_id = task.id;
        self.arena.insert_task(task);
        if let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) {
            group.add_candidate(task_id);
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.arena.get(id)
    }

    // ---- Prepare (spec §4.9) ----

    /// Opens the Input and Output transactions under the ambient User
    /// transaction and moves the operation to `Running`. No-op (other
    /// than the state transition already being a no-op) if called twice.
    pub async fn prepare(&mut self) -> Result<()> {
        let _span = op_span(&self.operation_id).entered();
        if !matches!(self.state, OperationState::Preparing) {
            return Err(CoreError::NotRunning {
                current: self.state.name(),
            });
        }

        let user = self.transaction_tree.user;
        let input = self
            .master
            .start_transaction(Some(user), self.spec.rpc_timeout)
            .await?;
        self.transaction_tree.set(TransactionRole::Input, input);

        let output = self
            .master
            .start_transaction(Some(user), self.spec.rpc_timeout)
            .await?;
        self.transaction_tree.set(TransactionRole::Output, output);

        self.state.advance(OperationState::Running);
        Ok(())
    }

    /// Restores transaction/output-table state from a durable snapshot
    /// (spec §4.9 revival). Rejects the revival outright when
    /// `fail_on_job_restart` is set, since any in-flight job recorded in
    /// the opaque task-tree payload would have to be restarted.
    pub fn revive(&mut self, snapshot: PersistedSnapshot) -> Result<()> {
        if self.spec.fail_on_job_restart {
            return Err(CoreError::FailOnJobRestart);
        }
        self.transaction_tree = snapshot.transaction_tree;
        self.output_tables = snapshot.output_tables;
        let _: Vec<(u64, ProgressCounter)> = bincode::deserialize(&snapshot.task_tree_payload)
            .map_err(|e| CoreError::SnapshotPayloadCorrupt(e.to_string()))?;
        self.state = OperationState::Running;
        Ok(())
    }

    // ---- Scheduling loop (spec §4.4) ----

    /// One offer from `node`; routes through every task group in
    /// priority order via `schedule_offer`, minting fresh chunk-list ids
    /// for whichever task ends up scheduled.
    pub fn offer(&mut self, node: &NodeId, limits: &ResourceLimits, now: Instant) -> TaskScheduleOutcome {
        if !self.state.is_running() {
            let mut outcome = TaskScheduleOutcome::default();
            outcome
                .fail_reasons
                .insert(controller_model::ScheduleFailReason::OperationNotRunning, 1);
            return outcome;
        }

        let groups = &mut self.groups;
        let arena = &mut self.arena;
        let chunk_lists = &mut self.chunk_lists;
        let minter = &mut self.list_id_minter;

        let outcome = schedule_offer(groups, arena, chunk_lists, node, limits, now, &mut |k| {
            (0..k).map(|_| minter.alloc()).collect()
        });

        if let (Some(start), Some(task_id)) = (&outcome.start, outcome.scheduled_task) {
            self.arena.own_job(start.job_id, task_id);
            self.schedule_stats.record_job_id(start.job_id);
        }
        self.schedule_stats.record(&outcome);
        self.schedule_stats.maybe_log(now, &self.operation_id.0);
        outcome
    }

    fn table_mut(&mut self, id: OutputTableId) -> Result<&mut OutputTable> {
        self.output_tables
            .get_mut(id.get() as usize)
            .ok_or(CoreError::AssertionFailure(format!(
                "no output table registered for {id}"
            )))
    }

    // ---- Terminal job reports (spec §4.2) ----

    pub fn on_job_completed(&mut self, job_id: JobId, summary: &JobSummary) -> Result<()> {
        let task_id = self
            .arena
            .owner_of(job_id)
            .ok_or(CoreError::UnknownJob(job_id))?;
        let mut task = self
            .arena
            .take(task_id)
            .ok_or(CoreError::UnknownTask(task_id))?;

        let routed = {
            let mut pools = self.arena.pool_view();
            task.on_job_completed(job_id, summary, &mut pools)
        };
        self.arena.insert_task(task);
        let routing = routed?;

        self.counters.inc_completed(1);
        for missing in &routing.missing_pools {
            return Err(CoreError::AssertionFailure(format!(
                "task {task_id} routed output to missing pool {missing}"
            )));
        }
        for sink in routing.sink_routes {
            self.table_mut(sink.table)?.record_chunk_tree(sink.entry);
        }

        Ok(())
    }

    pub fn on_job_failed(&mut self, job_id: JobId, summary: &JobSummary) -> Result<()> {
        let task_id = self
            .arena
            .owner_of(job_id)
            .ok_or(CoreError::UnknownJob(job_id))?;
        let task = self
            .arena
            .get_mut(task_id)
            .ok_or(CoreError::UnknownTask(task_id))?;

        let outcome = task.on_job_failed(job_id, summary)?;
        self.arena.forget_job(job_id);
        self.counters.inc_failed(1);

        match outcome {
            FailOutcome::Counted => {}
            FailOutcome::Fatal => {
                self.enter_failing(format!("job {job_id} on task {task_id} reported a fatal error"));
            }
            FailOutcome::LimitExceeded => {
                self.enter_failing(format!("task {task_id} exceeded its failed-job limit"));
            }
        }
        Ok(())
    }

    pub fn on_job_aborted(
        &mut self,
        job_id: JobId,
        summary: &JobSummary,
        reason: AbortReason,
    ) -> Result<()> {
        let task_id = self
            .arena
            .owner_of(job_id)
            .ok_or(CoreError::UnknownJob(job_id))?;
        let task = self
            .arena
            .get_mut(task_id)
            .ok_or(CoreError::UnknownTask(task_id))?;

        let outcome = task.on_job_aborted(job_id, summary, reason)?;
        self.arena.forget_job(job_id);
        self.counters.inc_aborted(1);

        match outcome {
            AbortOutcome::Counted | AbortOutcome::MemoryDigestBumped => {}
            AbortOutcome::FailedChunks => {
                for &raw in &summary.failed_chunk_ids {
                    self.mark_chunk_unavailable(ChunkId(raw));
                }
            }
            AbortOutcome::SuspendOperation => {
                self.enter_failing(format!(
                    "job {job_id} on task {task_id} aborted with an account limit exceeded"
                ));
            }
        }
        Ok(())
    }

    /// A previously-completed job's output was reported lost; routes
    /// back into the owning task and re-queues its unavailable chunks
    /// with the intermediate scraper (spec §4.2 "On lost job").
    pub fn on_job_lost(&mut self, job_id: JobId) -> Result<()> {
        let task_id = self
            .arena
            .owner_of(job_id)
            .ok_or(CoreError::UnknownJob(job_id))?;
        let task = self
            .arena
            .get_mut(task_id)
            .ok_or(CoreError::UnknownTask(task_id))?;

        let unavailable_chunks = task.on_job_lost(job_id)?;
        self.arena.forget_job(job_id);
        for chunk in unavailable_chunks {
            self.lost_intermediate_chunk_count += 1;
            self.intermediate_scraper.add(chunk);
        }
        Ok(())
    }

    fn mark_chunk_unavailable(&mut self, chunk: ChunkId) {
        self.unavailable_chunks.insert(chunk);
        self.input_scraper.add(chunk);
    }

    // ---- Scraper integration (spec §4.5) ----

    /// Runs one sweep of both scrapers and applies whatever they found.
    /// Returns any alerts the `Wait`/`Skip` unavailable-chunk policies
    /// raised this tick (a `Fail` policy instead transitions straight to
    /// `Failing` and returns no alert).
    pub async fn poll_scrapers(&mut self) -> Vec<Alert> {
        self.input_scraper
            .clone()
            .sweep_once(self.scraper_bridge.as_ref())
            .await;
        self.intermediate_scraper
            .clone()
            .sweep_once(self.scraper_bridge.as_ref())
            .await;
        self.drain_scraper_bridge()
    }

    fn drain_scraper_bridge(&mut self) -> Vec<Alert> {
        for (chunk, _replicas) in self.scraper_bridge.take_available() {
            self.unavailable_chunks.remove(&chunk);
        }

        let mut alerts = Vec::new();

        // Found, but short of replicas for its erasure policy (spec §4.5
        // `OnUnavailable`); keep it tracked so the unavailable-chunk
        // count `run_progress_analyzers` reports stays accurate until a
        // later sweep reports the same chunk `on_available`. Only raise
        // the alert the first time a chunk is seen this way, since the
        // scraper keeps re-reporting it every sweep until it clears.
        for chunk in self.scraper_bridge.take_unavailable() {
            if self.unavailable_chunks.insert(chunk) {
                let alert = Alert::raise(
                    AlertKind::UnavailableChunksPresent,
                    format!("chunk {chunk} has insufficient replicas"),
                    serde_json::json!({"chunk": chunk.get()}),
                );
                self.active_alerts.insert(alert.kind, alert.clone());
                alerts.push(alert);
            }
        }

        for chunk in self.scraper_bridge.take_input_missing() {
            match self.spec.unavailable_chunk_policy {
                UnavailableChunkPolicy::Fail => {
                    self.enter_failing(format!("input chunk {chunk} is permanently missing"));
                }
                UnavailableChunkPolicy::Skip | UnavailableChunkPolicy::Wait => {
                    let alert = Alert::raise(
                        AlertKind::UnavailableChunksPresent,
                        format!("input chunk {chunk} missing"),
                        serde_json::json!({"chunk": chunk.get()}),
                    );
                    self.active_alerts.insert(alert.kind, alert.clone());
                    alerts.push(alert);
                }
            }
        }
        alerts
    }

    // ---- Progress analyzers (spec §4.10) ----

    pub fn run_progress_analyzers(&mut self) -> Vec<Alert> {
        let snapshot = ProgressSnapshot {
            counters: self.counters,
            weights: self.weights.clone(),
            unavailable_chunk_count: self.unavailable_chunks.len() as u64,
            lost_intermediate_chunk_count: self.lost_intermediate_chunk_count,
            ..Default::default()
        };
        let alerts = run_analyzers(&snapshot);
        for alert in &alerts {
            self.active_alerts.insert(alert.kind, alert.clone());
        }
        alerts
    }

    // ---- Completion / failure / abort (spec §4.6, §4.9) ----

    /// Runs the commit pipeline once every task has finished, moving the
    /// operation to `Finished(Completed)` on success.
    pub async fn complete(&mut self, commit_inputs: Vec<TableCommitInputs>) -> Result<()> {
        if !self.state.is_running() {
            return Err(CoreError::NotRunning {
                current: self.state.name(),
            });
        }
        if !self.arena.all_tasks_completed() {
            return Err(CoreError::AssertionFailure(
                "complete() called before every task finished".into(),
            ));
        }

        self.commit_pipeline
            .run(
                &mut self.transaction_tree,
                &mut self.output_tables,
                &[],
                &commit_inputs,
                &NoopCommitHook,
            )
            .await?;

        self.state.advance(OperationState::Finished(FinalStatus::Completed));
        Ok(())
    }

    /// Takes a snapshot cookie and releases every release queue's
    /// pre-snapshot prefix once the caller reports the snapshot durable
    /// (spec §4.7). The archiver handles released job-spec requests.
    pub async fn release_up_to(
        &mut self,
        checkpoints: controller_snapshot::release::SnapshotCheckpoints,
        archiver: &dyn JobSpecArchiver,
    ) -> Vec<controller_snapshot::SnapshotError> {
        self.release.release(checkpoints, archiver).await
    }

    pub fn snapshot_checkpoint(&self) -> controller_snapshot::release::SnapshotCheckpoints {
        self.release.checkpoint()
    }

    fn enter_failing(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(operation_id = %self.operation_id.0, reason = %reason, "operation entering Failing");
        self.failure_reason = Some(reason);
        self.state.advance(OperationState::Failing);
    }

    /// Forces the operation to its terminal Failed state once the
    /// Failing phase has drained every joblet (spec §5's
    /// `controller_fail_timeout`).
    pub fn finish_failed(&mut self) -> FinalStatus {
        let error = self
            .failure_reason
            .clone()
            .unwrap_or_else(|| "operation failed".to_string());
        let status = FinalStatus::Failed { error };
        self.state.advance(OperationState::Finished(status.clone()));
        status
    }

    pub fn abort(&mut self, reason: impl Into<String>) -> FinalStatus {
        let status = FinalStatus::Aborted {
            error: reason.into(),
        };
        self.state.advance(OperationState::Finished(status.clone()));
        status
    }

    // ---- Snapshotting (spec §4.7) ----

    /// Encodes a durable snapshot of this operation. The task tree's
    /// per-task job counters are the opaque payload; a full snapshot of
    /// in-flight joblets and pool contents would need `ChunkPool` trait
    /// objects to be serializable, which this workspace's pool variants
    /// don't support, so revival restarts every job rather than resuming
    /// mid-stripe (recorded as an open-question resolution in this
    /// crate's design notes).
    pub fn snapshot(&self) -> Result<PersistedSnapshot> {
        let task_summary: Vec<(u64, ProgressCounter)> = self
            .arena
            .task_ids()
            .filter_map(|id| self.arena.get(id).map(|t| (id.get(), *t.job_counter())))
            .collect();
        let payload = bincode::serialize(&task_summary)
            .map_err(|e| CoreError::SnapshotPayloadCorrupt(e.to_string()))?;
        Ok(PersistedSnapshot::new(
            self.operation_id.0.clone(),
            self.transaction_tree.clone(),
            self.output_tables.clone(),
            payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_chunkpool::{ChunkPool, UnorderedChunkPool};
    use controller_model::{ChunkStripe, DataSlice, PoolId, SliceLimit, UserJobSpec};
    use controller_proto::testing::{FakeMaster, FakeScheduler};
    use controller_task::{EdgeDescriptor, TaskTemplate};
    use std::collections::HashMap as Map;

    fn template() -> TaskTemplate {
        TaskTemplate {
            job_type: "map".into(),
            input_format: "yson".into(),
            output_format: "yson".into(),
            user_job_spec: Some(UserJobSpec {
                command: "cat".into(),
                environment: Map::new(),
                file_paths: vec![],
                tmpfs_size: None,
                memory_reserve_factor: 1.0,
            }),
            stripe_slice_count: 1,
            resource_template: ResourceLimits {
                cpu: 1.0,
                memory_bytes: 100,
                network: 0.0,
                user_slots: 1,
            },
            interruptible: false,
            sorted_output: false,
            memory_reserve_quantile: 0.95,
            failed_job_limit: 1,
            destination_cells: vec![],
        }
    }

    fn offer_limits() -> ResourceLimits {
        ResourceLimits {
            cpu: 10.0,
            memory_bytes: 10_000,
            network: 10.0,
            user_slots: 10,
        }
    }

    async fn new_controller() -> OperationController<FakeMaster, FakeScheduler> {
        let master = Arc::new(FakeMaster::new());
        let scheduler = Arc::new(FakeScheduler::new());
        let user = master
            .start_transaction(None, Duration::from_secs(60))
            .await
            .unwrap();
        let table = OutputTable::new(
            "//tmp/out",
            controller_model::CellTag("cell-1".to_string()),
        );
        OperationController::new(
            OperationId("op-1".to_string()),
            OperationSpec::default(),
            master,
            scheduler,
            user,
            vec![table],
        )
    }

    #[tokio::test]
    async fn prepare_opens_input_and_output_transactions_and_enters_running() {
        let mut controller = new_controller().await;
        controller.prepare().await.unwrap();
        assert!(controller.state().is_running());
        assert!(controller.transaction_tree.input.is_some());
        assert!(controller.transaction_tree.output.is_some());
    }

    #[tokio::test]
    async fn happy_path_schedules_completes_and_commits() {
        let mut controller = new_controller().await;
        controller.prepare().await.unwrap();

        let pool_id = PoolId(1);
        let mut pool = UnorderedChunkPool::new(1_000_000, 10);
        let slice = DataSlice::new(
            vec![controller_model::ChunkId(1)],
            SliceLimit::RowIndex(0),
            SliceLimit::RowIndex(10),
            1,
        );
        pool.add(ChunkStripe::new(vec![slice]));

        let table_id = OutputTableId(0);
        let edge = EdgeDescriptor::to_sink(controller_model::EdgeId(1), table_id, table_id);
        let task = Task::new(
            TaskId(1),
            pool_id,
            template(),
            Box::new(pool),
            vec![edge],
            Default::default(),
        );

        let mut group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        group.min_resources = ResourceLimits {
            cpu: 0.0,
            memory_bytes: 0,
            network: 0.0,
            user_slots: 0,
        };
        controller.register_task_group(group);
        controller.register_task(task, TaskGroupId(1));

        let outcome = controller.offer(
            &NodeId("n1".to_string()),
            &offer_limits(),
            Instant::now(),
        );
        let start = outcome.start.expect("job should have been scheduled");

        let summary = JobSummary {
            job_id: start.job_id,
            node: NodeId("n1".to_string()),
            output_chunk_specs: Map::from([(table_id, vec![42])]),
            interrupt_reason: controller_model::InterruptReason::None,
            unread_slices: vec![],
            read_slices: vec![],
            observed_job_proxy_memory: 50,
            observed_user_job_memory: 50,
            stderr_size: None,
            failed_chunk_ids: vec![],
            fatal_error: false,
            error_message: None,
        };
        controller.on_job_completed(start.job_id, &summary).unwrap();
        assert_eq!(controller.output_tables()[0].chunk_trees.len(), 1);

        controller
            .complete(vec![TableCommitInputs::default()])
            .await
            .unwrap();
        assert!(matches!(
            controller.state(),
            OperationState::Finished(FinalStatus::Completed)
        ));
    }

    #[tokio::test]
    async fn job_limit_exceeded_fails_the_operation() {
        let mut controller = new_controller().await;
        controller.prepare().await.unwrap();

        let pool_id = PoolId(1);
        let mut pool = UnorderedChunkPool::new(1_000_000, 10);
        let slice = DataSlice::new(
            vec![controller_model::ChunkId(1)],
            SliceLimit::RowIndex(0),
            SliceLimit::RowIndex(10),
            1,
        );
        pool.add(ChunkStripe::new(vec![slice]));

        let table_id = OutputTableId(0);
        let edge = EdgeDescriptor::to_sink(controller_model::EdgeId(1), table_id, table_id);
        let task = Task::new(
            TaskId(1),
            pool_id,
            template(),
            Box::new(pool),
            vec![edge],
            Default::default(),
        );
        let mut group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        group.min_resources = ResourceLimits {
            cpu: 0.0,
            memory_bytes: 0,
            network: 0.0,
            user_slots: 0,
        };
        controller.register_task_group(group);
        controller.register_task(task, TaskGroupId(1));

        let outcome = controller.offer(&NodeId("n1".into()), &offer_limits(), Instant::now());
        let start = outcome.start.expect("job should have been scheduled");

        let summary = JobSummary {
            job_id: start.job_id,
            node: NodeId("n1".into()),
            output_chunk_specs: Map::new(),
            interrupt_reason: controller_model::InterruptReason::None,
            unread_slices: vec![],
            read_slices: vec![],
            observed_job_proxy_memory: 0,
            observed_user_job_memory: 0,
            stderr_size: None,
            failed_chunk_ids: vec![],
            fatal_error: false,
            error_message: None,
        };
        controller.on_job_failed(start.job_id, &summary).unwrap();

        assert!(matches!(controller.state(), OperationState::Failing));
        let status = controller.finish_failed();
        assert!(matches!(status, FinalStatus::Failed { .. }));
        assert!(controller.state().is_finished());
    }

    #[tokio::test]
    async fn unavailable_chunk_is_tracked_once_and_alerted_once() {
        let mut controller = new_controller().await;
        controller.prepare().await.unwrap();

        let chunk = controller_model::ChunkId(99);
        controller.master.mark_unavailable(chunk);
        controller.input_scraper.add(chunk);

        let alerts = controller.poll_scrapers().await;
        assert_eq!(alerts.len(), 1);
        assert!(controller.unavailable_chunks.contains(&chunk));

        // Still unavailable on the next sweep: the scraper re-reports it
        // every time, but it must not re-alert or grow unbounded.
        let alerts = controller.poll_scrapers().await;
        assert!(alerts.is_empty());
        assert_eq!(controller.unavailable_chunks.len(), 1);
    }

    #[tokio::test]
    async fn fail_on_job_restart_rejects_revival() {
        let mut controller = new_controller().await;
        controller.spec.fail_on_job_restart = true;
        let snapshot = controller.snapshot().unwrap();
        let err = controller.revive(snapshot).unwrap_err();
        assert!(matches!(err, CoreError::FailOnJobRestart));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_revive() {
        let mut controller = new_controller().await;
        controller.prepare().await.unwrap();
        let snapshot = controller.snapshot().unwrap();
        let bytes = snapshot.encode().unwrap();
        let decoded = PersistedSnapshot::decode(&bytes).unwrap();

        let mut other = new_controller().await;
        other.revive(decoded).unwrap();
        assert!(other.state().is_running());
        assert_eq!(other.output_tables().len(), controller.output_tables().len());
    }
}
