//! The scheduling loop driver (C4, spec §4.4) and `ScheduleJobStatistics`
//! (spec §B.1): every iteration is bounded and assumes no suspension
//! happens while it runs, so this module is plain synchronous code — the
//! caller is responsible for not calling it from inside an `.await`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use controller_model::{CellTag, JobId, NodeId, ResourceLimits, ScheduleFailReason, StartDescriptor, TaskId};
use tracing::info;

use crate::task::Task;
use crate::task_group::TaskGroup;

/// Looks up a `Task` by handle; implemented by whatever owns the full
/// per-operation task arena (spec §9's arena-of-handles design — this
/// crate never owns more than one task at a time).
pub trait TaskLookup {
    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task>;
}

/// Chunk-list pre-allocation gate (spec §4.4's `HasEnough(cellTag, k)`).
pub trait ChunkListAvailability {
    fn has_enough(&self, cell: &CellTag, k: usize) -> bool;
    /// Kick off an async refill for `cell`; fire-and-forget from the
    /// scheduling loop's point of view.
    fn request_refill(&mut self, cell: &CellTag);
}

/// Outcome of one offer against one task group or the whole priority
/// list (spec §4.4, never raised as an error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleOutcome {
    pub start: Option<StartDescriptor>,
    pub scheduled_task: Option<TaskId>,
    pub fail_reasons: HashMap<ScheduleFailReason, u32>,
}

impl ScheduleOutcome {
    fn record(&mut self, reason: ScheduleFailReason) {
        *self.fail_reasons.entry(reason).or_insert(0) += 1;
    }

    fn merge(&mut self, other: ScheduleOutcome) {
        for (reason, count) in other.fail_reasons {
            *self.fail_reasons.entry(reason).or_insert(0) += count;
        }
        if other.start.is_some() {
            self.start = other.start;
            self.scheduled_task = other.scheduled_task;
        }
    }
}

fn task_satisfies_limits(task: &Task, limits: &ResourceLimits) -> bool {
    task.get_pending_job_count() > 0 && limits.dominates(&task.get_min_needed_resources())
}

fn chunk_lists_available(task: &Task, chunk_lists: &mut dyn ChunkListAvailability) -> bool {
    let k = task.required_chunk_lists();
    if k == 0 {
        return true;
    }
    let mut ok = true;
    for cell in task.destination_cells() {
        if !chunk_lists.has_enough(cell, k) {
            chunk_lists.request_refill(cell);
            ok = false;
        }
    }
    ok
}

/// Try to schedule one job from `task_id` onto `node`, minting fresh
/// chunk-list ids via `allocate`. Returns `None` if the task's pool had
/// nothing ready after all (a race between the eligibility check and the
/// extraction itself).
fn try_schedule(
    tasks: &mut dyn TaskLookup,
    task_id: TaskId,
    node: &NodeId,
    output_chunk_list_ids: Vec<u64>,
) -> Option<StartDescriptor> {
    tasks.task_mut(task_id)?.schedule_job(node, output_chunk_list_ids)
}

/// One task group's worth of the scheduling loop (spec §4.4 steps 1-3).
/// `allocate_chunk_lists` mints `k` fresh chunk-list ids for the task
/// about to be scheduled, one per outgoing edge.
#[allow(clippy::too_many_arguments)]
pub fn schedule_in_group(
    group: &mut TaskGroup,
    tasks: &mut dyn TaskLookup,
    chunk_lists: &mut dyn ChunkListAvailability,
    node: &NodeId,
    limits: &ResourceLimits,
    now: Instant,
    allocate_chunk_lists: &mut dyn FnMut(usize) -> Vec<u64>,
) -> ScheduleOutcome {
    let mut outcome = ScheduleOutcome::default();

    if !limits.dominates(&group.min_resources) {
        outcome.record(ScheduleFailReason::NotEnoughResources);
        return outcome;
    }

    // Local pass: highest-locality-score eligible candidate wins.
    let mut best: Option<(TaskId, i64)> = None;
    for &task_id in group.local_candidates(node) {
        let Some(task) = tasks.task_mut(task_id) else { continue };
        if !task_satisfies_limits(task, limits) {
            continue;
        }
        let score = task.locality(node);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((task_id, score));
        }
    }

    if let Some((task_id, _)) = best {
        let task = tasks.task_mut(task_id).expect("candidate looked up above");
        if chunk_lists_available(task, chunk_lists) {
            let k = task.required_chunk_lists();
            if let Some(start) = try_schedule(tasks, task_id, node, allocate_chunk_lists(k)) {
                outcome.start = Some(start);
                outcome.scheduled_task = Some(task_id);
                return outcome;
            }
        } else {
            outcome.record(ScheduleFailReason::NotEnoughChunkLists);
        }
    }

    // Non-local pass: increasing min-memory order, with per-round delay
    // for candidates touched but not yet schedulable (spec §4.4 step 3).
    let mut min_memory = HashMap::new();
    for &task_id in group.candidates() {
        if let Some(task) = tasks.task_mut(task_id) {
            min_memory.insert(task_id, task.get_min_needed_resources().memory_bytes);
        }
    }

    let candidates = group.non_local_candidates(now, &min_memory);
    if candidates.is_empty() {
        outcome.record(ScheduleFailReason::NoCandidateTasks);
        return outcome;
    }

    for task_id in candidates {
        let Some(task) = tasks.task_mut(task_id) else { continue };
        if !task_satisfies_limits(task, limits) {
            group.delay(task_id, now);
            outcome.record(ScheduleFailReason::TaskDelayed);
            continue;
        }
        if !chunk_lists_available(task, chunk_lists) {
            outcome.record(ScheduleFailReason::NotEnoughChunkLists);
            continue;
        }
        let k = task.required_chunk_lists();
        if let Some(start) = try_schedule(tasks, task_id, node, allocate_chunk_lists(k)) {
            outcome.start = Some(start);
            outcome.scheduled_task = Some(task_id);
            return outcome;
        }
    }

    outcome
}

/// Iterate every group in fixed priority order, stopping at the first
/// one that schedules a job (spec §4.4: "task groups are iterated in
/// fixed priority order").
#[allow(clippy::too_many_arguments)]
pub fn schedule_offer(
    groups: &mut [TaskGroup],
    tasks: &mut dyn TaskLookup,
    chunk_lists: &mut dyn ChunkListAvailability,
    node: &NodeId,
    limits: &ResourceLimits,
    now: Instant,
    allocate_chunk_lists: &mut dyn FnMut(usize) -> Vec<u64>,
) -> ScheduleOutcome {
    let mut total = ScheduleOutcome::default();
    for group in groups.iter_mut() {
        let outcome = schedule_in_group(group, tasks, chunk_lists, node, limits, now, allocate_chunk_lists);
        let scheduled = outcome.start.is_some();
        total.merge(outcome);
        if scheduled {
            break;
        }
    }
    total
}

/// Aggregates per-iteration scheduling outcomes and logs them no more
/// often than `log_backoff` (spec §B.1; original's
/// `ScheduleJobStatisticsLogBackoff`).
#[derive(Debug, Clone)]
pub struct ScheduleJobStatistics {
    fail_reasons: HashMap<ScheduleFailReason, u32>,
    scheduled_count: u32,
    considered_iterations: u32,
    last_logged: Option<Instant>,
    log_backoff: Duration,
}

impl ScheduleJobStatistics {
    pub fn new(log_backoff: Duration) -> Self {
        Self {
            fail_reasons: HashMap::new(),
            scheduled_count: 0,
            considered_iterations: 0,
            last_logged: None,
            log_backoff,
        }
    }

    pub fn record(&mut self, outcome: &ScheduleOutcome) {
        self.considered_iterations += 1;
        if outcome.start.is_some() {
            self.scheduled_count += 1;
        }
        for (reason, count) in &outcome.fail_reasons {
            *self.fail_reasons.entry(*reason).or_insert(0) += count;
        }
    }

    pub fn record_job_id(&mut self, _job_id: JobId) {
        // Hook point for per-job tracing spans; no extra bookkeeping
        // beyond `scheduled_count` is needed today.
    }

    /// Logs and resets the accumulated counters if `log_backoff` has
    /// elapsed since the last log, otherwise does nothing.
    pub fn maybe_log(&mut self, now: Instant, operation_id: &str) {
        if self.last_logged.is_some_and(|t| now.duration_since(t) < self.log_backoff) {
            return;
        }
        info!(
            operation_id,
            iterations = self.considered_iterations,
            scheduled = self.scheduled_count,
            fail_reasons = ?self.fail_reasons,
            "scheduling loop progress"
        );
        self.last_logged = Some(now);
        self.fail_reasons.clear();
        self.scheduled_count = 0;
        self.considered_iterations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeDescriptor;
    use crate::task::{PoolLookup, TaskTemplate};
    use controller_chunkpool::{ChunkPool, UnorderedChunkPool};
    use controller_model::{ChunkId, ChunkStripe, DataSlice, PoolId, SliceLimit, TaskGroupId, UserJobSpec};
    use std::collections::HashMap as Map;

    struct NoopPools;
    impl PoolLookup for NoopPools {
        fn pool_mut(&mut self, _id: PoolId) -> Option<&mut dyn ChunkPool> {
            None
        }
    }

    struct AlwaysEnough;
    impl ChunkListAvailability for AlwaysEnough {
        fn has_enough(&self, _cell: &CellTag, _k: usize) -> bool {
            true
        }
        fn request_refill(&mut self, _cell: &CellTag) {}
    }

    struct TaskArena(HashMap<TaskId, Task>);
    impl TaskLookup for TaskArena {
        fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
            self.0.get_mut(&id)
        }
    }

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
            failed_job_limit: 2,
            destination_cells: vec![],
        }
    }

    fn stripe() -> ChunkStripe {
        let slice = DataSlice::new(vec![ChunkId(1)], SliceLimit::RowIndex(0), SliceLimit::RowIndex(10), 1);
        ChunkStripe::new(vec![slice])
    }

    fn offer_limits() -> ResourceLimits {
        ResourceLimits {
            cpu: 10.0,
            memory_bytes: 10_000,
            network: 10.0,
            user_slots: 10,
        }
    }

    #[test]
    fn group_with_insufficient_min_resources_is_skipped() {
        let mut group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        group.min_resources = ResourceLimits {
            cpu: 1000.0,
            memory_bytes: 0,
            network: 0.0,
            user_slots: 0,
        };
        let mut arena = TaskArena(HashMap::new());
        let mut chunk_lists = AlwaysEnough;
        let outcome = schedule_in_group(
            &mut group,
            &mut arena,
            &mut chunk_lists,
            &NodeId("n1".into()),
            &offer_limits(),
            Instant::now(),
            &mut |_| vec![],
        );
        assert_eq!(outcome.fail_reasons.get(&ScheduleFailReason::NotEnoughResources), Some(&1));
        assert!(outcome.start.is_none());
    }

    #[test]
    fn local_pass_schedules_the_highest_locality_candidate() {
        let mut group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        group.add_candidate(TaskId(1));
        group.add_locality_hint(NodeId("n1".into()), TaskId(1));

        let pool_id = PoolId(1);
        let mut pool = UnorderedChunkPool::new(1_000_000, 10);
        pool.add_with_locality(stripe(), vec![NodeId("n1".into())]);
        let task = Task::new(TaskId(1), pool_id, template(), Box::new(pool), vec![], Default::default());
        let mut arena = TaskArena(HashMap::from([(TaskId(1), task)]));
        let mut chunk_lists = AlwaysEnough;

        let outcome = schedule_in_group(
            &mut group,
            &mut arena,
            &mut chunk_lists,
            &NodeId("n1".into()),
            &offer_limits(),
            Instant::now(),
            &mut |_| vec![],
        );
        assert!(outcome.start.is_some());
        assert_eq!(outcome.scheduled_task, Some(TaskId(1)));
    }

    #[test]
    fn non_local_pass_runs_when_local_pass_finds_nothing() {
        let mut group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        group.add_candidate(TaskId(1));

        let pool_id = PoolId(1);
        let mut pool = UnorderedChunkPool::new(1_000_000, 10);
        pool.add(stripe());
        let task = Task::new(TaskId(1), pool_id, template(), Box::new(pool), vec![], Default::default());
        let mut arena = TaskArena(HashMap::from([(TaskId(1), task)]));
        let mut chunk_lists = AlwaysEnough;

        let outcome = schedule_in_group(
            &mut group,
            &mut arena,
            &mut chunk_lists,
            &NodeId("n1".into()),
            &offer_limits(),
            Instant::now(),
            &mut |_| vec![],
        );
        assert!(outcome.start.is_some());
    }

    #[test]
    fn no_candidates_records_no_candidate_tasks() {
        let mut group = TaskGroup::new(TaskGroupId(1), 0, Duration::from_secs(1));
        let mut arena = TaskArena(HashMap::new());
        let mut chunk_lists = AlwaysEnough;

        let outcome = schedule_in_group(
            &mut group,
            &mut arena,
            &mut chunk_lists,
            &NodeId("n1".into()),
            &offer_limits(),
            Instant::now(),
            &mut |_| vec![],
        );
        assert_eq!(outcome.fail_reasons.get(&ScheduleFailReason::NoCandidateTasks), Some(&1));
    }

    #[test]
    fn schedule_job_statistics_logs_no_more_often_than_backoff() {
        let mut stats = ScheduleJobStatistics::new(Duration::from_secs(60));
        let mut outcome = ScheduleOutcome::default();
        outcome.record(ScheduleFailReason::NotEnoughResources);
        stats.record(&outcome);

        let now = Instant::now();
        stats.maybe_log(now, "op-1");
        assert_eq!(stats.considered_iterations, 0); // reset after logging

        stats.record(&outcome);
        stats.maybe_log(now + Duration::from_secs(1), "op-1");
        assert_eq!(stats.considered_iterations, 1); // backoff still active, not reset
    }

    #[allow(dead_code)]
    fn unused(_edge: EdgeDescriptor) {}
}
