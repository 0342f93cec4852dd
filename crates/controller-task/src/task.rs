//! Task (C3, spec §4.2): owns one chunk pool, builds job specs for jobs
//! the scheduling loop accepts, and processes per-job terminal reports.

use std::collections::{HashMap, HashSet};

use controller_chunkpool::ChunkPool;
use controller_model::{
    AbortReason, CellTag, ChunkId, ChunkStripe, ChunkTreeEntry, DataSlice, HandleAllocator,
    InterruptReason, JobId, JobSpec, JobSummary, MemoryDigest, NodeId, OutputTableId, PoolId,
    ResourceLimits, SliceDescriptor, SliceLimit, StartDescriptor, TaskId, UserJobSpec,
};
use controller_progress::ProgressCounter;

use crate::edge::{EdgeDescriptor, EdgeDestination};
use crate::error::{Result, TaskError};
use crate::joblet::{CompletedJob, CompletedJobRegistry, Joblet, JobletRegistry};

/// Lets a `Task` reach a downstream pool without owning the whole
/// operation's pool arena (spec §9's arena-of-handles design): routing a
/// completed job's output only ever needs one other pool at a time, so a
/// lookup trait is enough — the real arena lives one layer up, in
/// whichever type owns every `Task` and `PoolId` in the operation.
pub trait PoolLookup {
    fn pool_mut(&mut self, id: PoolId) -> Option<&mut dyn ChunkPool>;
}

/// Static per-task configuration copied into every job spec this task
/// builds (spec §4.2's "copy the per-task template").
#[derive(Debug, Clone)]
pub struct TaskTemplate {
    pub job_type: String,
    pub input_format: String,
    pub output_format: String,
    pub user_job_spec: Option<UserJobSpec>,
    pub stripe_slice_count: usize,
    pub resource_template: ResourceLimits,
    pub interruptible: bool,
    /// True when this task's output feeds a sorted destination; boundary
    /// keys are then derived from the job's own input slice limits
    /// instead of completion order (spec §4.6 AttachOutputChunks).
    pub sorted_output: bool,
    pub memory_reserve_quantile: f64,
    pub failed_job_limit: u32,
    /// Cells holding this task's destination chunk-list pools, checked by
    /// the scheduling loop's `HasEnough(cellTag, k)` pre-allocation gate
    /// (spec §4.4) before a job from this task is accepted.
    pub destination_cells: Vec<CellTag>,
}

/// One edge's worth of routed output, handed back to the caller to apply
/// (this crate has no access to the destination `OutputTable`, which
/// lives in `controller-model`/`controller-txn`'s territory).
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRoute {
    pub table: OutputTableId,
    pub entry: ChunkTreeEntry,
}

/// Outcome of routing one completed job's output across every edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRouting {
    pub sink_routes: Vec<SinkRoute>,
    /// Edges this task has no downstream pool for right now (the caller's
    /// `PoolLookup` returned `None`); the caller should treat this as a
    /// bug, not silently drop data.
    pub missing_pools: Vec<PoolId>,
}

/// What the caller should do after `on_job_failed` (spec §4.2's "On
/// failure").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Stripe returned to pending; operation keeps running.
    Counted,
    /// The job error was marked `fatal`; fail the whole operation.
    Fatal,
    /// The per-task failed-job limit was exceeded; fail the operation.
    LimitExceeded,
}

/// What the caller should do after `on_job_aborted` (spec §4.2's "On
/// abort").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    /// Stripe returned to pending, no further side effect.
    Counted,
    /// `ResourceOverdraft`: memory digest already bumped.
    MemoryDigestBumped,
    /// `FailedChunks`: caller should mark the named chunks unavailable.
    FailedChunks,
    /// `AccountLimitExceeded`: caller should suspend the operation.
    SuspendOperation,
}

pub struct Task {
    pub id: TaskId,
    pub pool_id: PoolId,
    template: TaskTemplate,
    pool: Box<dyn ChunkPool>,
    edges: Vec<EdgeDescriptor>,
    expected_predecessors: HashSet<TaskId>,
    finished_predecessors: HashSet<TaskId>,
    job_proxy_memory_digest: MemoryDigest,
    user_job_memory_digest: MemoryDigest,
    counter: ProgressCounter,
    job_ids: HandleAllocator,
    joblets: JobletRegistry,
    completed_jobs: CompletedJobRegistry,
    output_order_counter: u64,
}

impl Task {
    pub fn new(
        id: TaskId,
        pool_id: PoolId,
        template: TaskTemplate,
        pool: Box<dyn ChunkPool>,
        edges: Vec<EdgeDescriptor>,
        expected_predecessors: HashSet<TaskId>,
    ) -> Self {
        Self {
            id,
            pool_id,
            template,
            pool,
            edges,
            expected_predecessors,
            finished_predecessors: HashSet::new(),
            job_proxy_memory_digest: MemoryDigest::new(1.0, 1.5),
            user_job_memory_digest: MemoryDigest::new(1.0, 1.5),
            counter: ProgressCounter::new(),
            job_ids: HandleAllocator::new(),
            joblets: JobletRegistry::new(),
            completed_jobs: CompletedJobRegistry::new(),
            output_order_counter: 0,
        }
    }

    pub fn job_counter(&self) -> &ProgressCounter {
        &self.counter
    }

    pub fn joblets(&self) -> &JobletRegistry {
        &self.joblets
    }

    /// Reaches this task's own pool for cross-task routing (spec §9's
    /// arena-of-handles design): the per-operation arena that owns every
    /// `Task` implements `PoolLookup` by resolving a `PoolId` to its
    /// owning task and delegating here.
    pub fn pool_mut(&mut self) -> &mut dyn ChunkPool {
        self.pool.as_mut()
    }

    // ---- GetPendingJobCount / GetTotalNeededResources / GetMinNeededResources ----

    pub fn get_pending_job_count(&self) -> i64 {
        self.pool.job_counter().pending
    }

    pub fn get_total_needed_resources(&self) -> ResourceLimits {
        let n = self.get_pending_job_count().max(0) as f64;
        scale_resources(&self.template.resource_template, n)
    }

    pub fn get_min_needed_resources(&self) -> ResourceLimits {
        if self.get_pending_job_count() > 0 {
            self.template.resource_template
        } else {
            ResourceLimits {
                cpu: 0.0,
                memory_bytes: 0,
                network: 0.0,
                user_slots: 0,
            }
        }
    }

    pub fn locality(&self, node: &NodeId) -> i64 {
        self.pool.locality(node)
    }

    /// Number of fresh chunk-list ids this task's next job needs, one per
    /// outgoing edge (spec §4.2).
    pub fn required_chunk_lists(&self) -> usize {
        self.edges.len()
    }

    pub fn destination_cells(&self) -> &[CellTag] {
        &self.template.destination_cells
    }

    // ---- ScheduleJob ----

    /// Extract a ready stripe for `node` and build the job that will
    /// consume it (spec §4.2). Returns `None` if the pool had nothing
    /// ready.
    pub fn schedule_job(&mut self, node: &NodeId, output_chunk_list_ids: Vec<u64>) -> Option<StartDescriptor> {
        let (output_cookie, extraction) = self.pool.extract(node)?;

        let job_id = JobId(self.job_ids.alloc());
        let job_proxy_factor = self
            .job_proxy_memory_digest
            .reserve_factor(self.template.memory_reserve_quantile);
        let user_job_factor = self
            .user_job_memory_digest
            .reserve_factor(self.template.memory_reserve_quantile);

        let memory_limit_bytes =
            (self.template.resource_template.memory_bytes as f64 * job_proxy_factor) as u64;

        let user_job_spec = self.template.user_job_spec.clone().map(|mut spec| {
            spec.memory_reserve_factor = user_job_factor;
            spec
        });

        let spec = JobSpec {
            job_id,
            input_format: self.template.input_format.clone(),
            output_format: self.template.output_format.clone(),
            user_job_spec,
            stripe_slice_count: self.template.stripe_slice_count,
            output_chunk_list_ids,
            memory_limit_bytes,
            interruptible: self.template.interruptible,
        };

        let resources = ResourceLimits {
            memory_bytes: memory_limit_bytes,
            ..self.template.resource_template
        };

        let joblet = Joblet {
            job_id,
            node: node.clone(),
            input_cookies: Vec::new(),
            output_cookie,
            stripe_list: extraction.stripe_list,
            spec: spec.clone(),
            resources,
            user_job_memory_reserve_factor: user_job_factor,
            interruptible: self.template.interruptible,
            speculative_sibling: None,
        };
        self.joblets.insert(joblet);

        Some(StartDescriptor {
            job_id,
            resources,
            interruptible: self.template.interruptible,
        })
    }

    // ---- OnJobCompleted ----

    pub fn on_job_completed(
        &mut self,
        job_id: JobId,
        summary: &JobSummary,
        pools: &mut dyn PoolLookup,
    ) -> Result<CompletionRouting> {
        let joblet = self
            .joblets
            .remove(job_id)
            .ok_or(TaskError::UnknownJob(job_id))?;

        self.pool.completed(joblet.output_cookie, summary)?;
        self.counter.inc_completed(1);

        self.job_proxy_memory_digest.add_sample(
            summary.observed_job_proxy_memory as f64 / joblet.resources.memory_bytes.max(1) as f64,
        );
        self.user_job_memory_digest.add_sample(
            summary.observed_user_job_memory as f64
                / (joblet.resources.memory_bytes.max(1) as f64 * joblet.user_job_memory_reserve_factor),
        );

        let routing = self.route_output(&joblet, summary, pools);

        let needs_recovery = routing.missing_pools.is_empty() && self.any_edge_needs_recovery();
        if needs_recovery {
            self.completed_jobs.insert(CompletedJob {
                job_id,
                output_cookie: joblet.output_cookie,
                input_cookies: joblet.input_cookies.clone(),
                stripe_list: joblet.stripe_list.clone(),
                output_chunks: summary
                    .output_chunk_specs
                    .values()
                    .flatten()
                    .map(|id| ChunkId(*id))
                    .collect(),
                already_lost: false,
            });
        }

        if summary.interrupt_reason != InterruptReason::None {
            self.reinsert_interrupted_work(summary);
        }

        Ok(routing)
    }

    fn any_edge_needs_recovery(&self) -> bool {
        self.edges.iter().any(|e| matches!(e.destination, EdgeDestination::Pool(_)))
    }

    fn route_output(
        &mut self,
        joblet: &Joblet,
        summary: &JobSummary,
        pools: &mut dyn PoolLookup,
    ) -> CompletionRouting {
        let mut routing = CompletionRouting::default();

        for edge in &self.edges {
            let Some(chunk_ids) = summary.output_chunk_specs.get(&edge.output_stream) else {
                continue;
            };
            if chunk_ids.is_empty() {
                continue;
            }

            match edge.destination {
                EdgeDestination::Sink(table) => {
                    for &raw in chunk_ids {
                        let entry = self.make_chunk_tree_entry(joblet, raw);
                        routing.sink_routes.push(SinkRoute { table, entry });
                    }
                }
                EdgeDestination::Pool(pool_id) => {
                    let Some(downstream) = pools.pool_mut(pool_id) else {
                        routing.missing_pools.push(pool_id);
                        continue;
                    };
                    let slice = DataSlice::new(
                        chunk_ids.iter().map(|id| ChunkId(*id)).collect(),
                        SliceLimit::ChunkIndex(0),
                        SliceLimit::ChunkIndex(chunk_ids.len() as u32),
                        joblet.job_id.0,
                    );
                    downstream.add(ChunkStripe::new(vec![slice]));
                }
            }
        }

        routing
    }

    fn make_chunk_tree_entry(&mut self, joblet: &Joblet, chunk_tree_id: u64) -> ChunkTreeEntry {
        if self.template.sorted_output {
            let (min_key, max_key) = stripe_list_key_bounds(&joblet.stripe_list);
            ChunkTreeEntry {
                min_key,
                max_key,
                chunk_tree_id,
                output_order_index: None,
            }
        } else {
            let index = self.output_order_counter;
            self.output_order_counter += 1;
            ChunkTreeEntry {
                min_key: None,
                max_key: None,
                chunk_tree_id,
                output_order_index: Some(index),
            }
        }
    }

    /// Reconstruct remaining work from an interrupted job's unread/read
    /// slice descriptors and re-insert it into the pool (spec §4.3).
    fn reinsert_interrupted_work(&mut self, summary: &JobSummary) {
        if summary.unread_slices.is_empty() {
            return;
        }
        let split_count = estimate_split_count(&summary.read_slices, &summary.unread_slices);
        for group in split_into_groups(&summary.unread_slices, split_count) {
            if group.is_empty() {
                continue;
            }
            self.pool.add(ChunkStripe::new(group));
        }
    }

    // ---- OnJobFailed ----

    pub fn on_job_failed(&mut self, job_id: JobId, summary: &JobSummary) -> Result<FailOutcome> {
        let joblet = self
            .joblets
            .remove(job_id)
            .ok_or(TaskError::UnknownJob(job_id))?;

        if summary.fatal_error {
            self.counter.inc_failed(1);
            return Ok(FailOutcome::Fatal);
        }

        self.pool.failed(joblet.output_cookie)?;
        self.counter.inc_failed(1);

        if self.counter.failed as u32 > self.template.failed_job_limit {
            return Ok(FailOutcome::LimitExceeded);
        }
        Ok(FailOutcome::Counted)
    }

    // ---- OnJobAborted ----

    pub fn on_job_aborted(
        &mut self,
        job_id: JobId,
        summary: &JobSummary,
        reason: AbortReason,
    ) -> Result<AbortOutcome> {
        let joblet = self
            .joblets
            .remove(job_id)
            .ok_or(TaskError::UnknownJob(job_id))?;

        self.pool.aborted(joblet.output_cookie)?;
        self.counter.inc_aborted(1);

        if !reason.has_side_effect() {
            return Ok(AbortOutcome::Counted);
        }

        match reason {
            AbortReason::ResourceOverdraft => {
                let actual = summary.observed_job_proxy_memory as f64
                    / joblet.resources.memory_bytes.max(1) as f64;
                self.job_proxy_memory_digest.add_overdraft_sample(actual);
                Ok(AbortOutcome::MemoryDigestBumped)
            }
            AbortReason::FailedChunks => Ok(AbortOutcome::FailedChunks),
            AbortReason::AccountLimitExceeded => Ok(AbortOutcome::SuspendOperation),
            AbortReason::UserRequest | AbortReason::Other => Ok(AbortOutcome::Counted),
        }
    }

    // ---- OnJobLost ----

    /// A previously-completed job's output was reported lost. If the
    /// pool can resurrect a finalized cookie directly (only the Sink
    /// variant can, today), it does; otherwise this task falls back to
    /// its own `CompletedJob` record and marks the job unrecoverable
    /// (spec §4.2: "mark all chunks of that stripe unavailable and
    /// fail") since the pool no longer holds the stripe needed to
    /// re-extract it.
    pub fn on_job_lost(&mut self, job_id: JobId) -> Result<Vec<ChunkId>> {
        let mut completed = self
            .completed_jobs
            .remove(job_id)
            .ok_or(TaskError::UnknownJob(job_id))?;

        match self.pool.lost(completed.output_cookie) {
            Ok(()) => {
                self.counter.lose_completed()?;
                Ok(Vec::new())
            }
            Err(_) if !completed.already_lost => {
                completed.already_lost = true;
                self.counter.dec_completed(1)?;
                self.counter.inc_failed(1);
                Ok(completed.output_chunks)
            }
            Err(err) => Err(err.into()),
        }
    }

    // ---- FinishInput / CheckCompleted ----

    pub fn finish_input(&mut self, predecessor: TaskId) {
        self.finished_predecessors.insert(predecessor);
        if self.expected_predecessors.is_subset(&self.finished_predecessors) {
            self.pool.finish();
        }
    }

    pub fn check_completed(&self) -> bool {
        self.pool.is_finished() && self.joblets.is_empty()
    }
}

fn scale_resources(template: &ResourceLimits, n: f64) -> ResourceLimits {
    ResourceLimits {
        cpu: template.cpu * n,
        memory_bytes: (template.memory_bytes as f64 * n) as u64,
        network: template.network * n,
        user_slots: (template.user_slots as f64 * n) as u32,
    }
}

fn stripe_list_key_bounds(stripe_list: &controller_model::ChunkStripeList) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
    let mut min_key: Option<Vec<u8>> = None;
    let mut max_key: Option<Vec<u8>> = None;
    for stripe in &stripe_list.stripes {
        for slice in &stripe.slices {
            if let SliceLimit::Key(k) = &slice.lower_limit {
                if min_key.as_ref().map_or(true, |m| k < m) {
                    min_key = Some(k.clone());
                }
            }
            if let SliceLimit::Key(k) = &slice.upper_limit {
                if max_key.as_ref().map_or(true, |m| k > m) {
                    max_key = Some(k.clone());
                }
            }
        }
    }
    (min_key, max_key)
}

/// Split count from the ratio of unread rows to rows already read (spec
/// §4.3): a job that read 1/4 of its expected rows before being
/// interrupted splits its remainder into roughly 3 new jobs.
fn estimate_split_count(read: &[SliceDescriptor], unread: &[SliceDescriptor]) -> usize {
    let read_rows: u64 = read.iter().map(|d| d.rows_read).sum();
    let unread_rows: u64 = unread.iter().map(|d| d.slice.row_count).sum();
    if read_rows == 0 || unread_rows == 0 {
        return unread.len().max(1);
    }
    let ratio = unread_rows as f64 / read_rows as f64;
    (ratio.ceil() as usize).max(1)
}

fn split_into_groups(slices: &[SliceDescriptor], split_count: usize) -> Vec<Vec<DataSlice>> {
    let mut groups: Vec<Vec<DataSlice>> = vec![Vec::new(); split_count.max(1)];
    for (i, descriptor) in slices.iter().enumerate() {
        groups[i % groups.len()].push(descriptor.slice.clone());
    }
    groups
}
