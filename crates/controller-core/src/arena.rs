//! The operation's task/pool arena (spec §9's arena-of-handles design)
//! and the chunk-list pre-allocation gate the scheduling loop calls
//! through `ChunkListAvailability` (spec §4.4, §5's "bulk-allocation
//! policy, allocate-if-below-watermark").

use std::collections::HashMap;

use controller_chunkpool::ChunkPool;
use controller_model::{CellTag, HandleAllocator, JobId, PoolId, TaskId};
use controller_task::{ChunkListAvailability, PoolLookup, Task, TaskLookup};

/// Owns every `Task` in the operation, keyed by its stable handle, plus
/// the `PoolId -> TaskId` index needed to resolve cross-task routing
/// without each task owning the whole arena.
#[derive(Default)]
pub struct TaskArena {
    tasks: HashMap<TaskId, Task>,
    pool_owner: HashMap<PoolId, TaskId>,
    /// Which task a still-running job belongs to, so a terminal summary
    /// keyed only by `JobId` can be routed back to its owner.
    job_owner: HashMap<JobId, TaskId>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_task(&mut self, task: Task) {
        let id = task.id;
        let pool_id = task.pool_id;
        self.tasks.insert(id, task);
        self.pool_owner.insert(pool_id, id);
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn all_tasks_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.values().all(|t| t.check_completed())
    }

    pub fn own_job(&mut self, job_id: JobId, task_id: TaskId) {
        self.job_owner.insert(job_id, task_id);
    }

    pub fn owner_of(&self, job_id: JobId) -> Option<TaskId> {
        self.job_owner.get(&job_id).copied()
    }

    pub fn forget_job(&mut self, job_id: JobId) {
        self.job_owner.remove(&job_id);
    }

    /// Temporarily removes `task_id` from the arena so its caller can
    /// hold `&mut Task` for it while still routing its output into a
    /// *different* task's pool via [`TaskArena::pool_view`] (spec §9:
    /// the task graph is cyclic, so a split borrow through one shared
    /// map won't satisfy the borrow checker). The task must be
    /// reinserted with [`TaskArena::insert_task`] once the caller is
    /// done with it.
    pub fn take(&mut self, task_id: TaskId) -> Option<Task> {
        self.tasks.remove(&task_id)
    }

    /// A `PoolLookup` view over every task currently left in the arena
    /// (i.e. every task other than one removed via `take`).
    pub fn pool_view(&mut self) -> ArenaPoolView<'_> {
        ArenaPoolView {
            tasks: &mut self.tasks,
            pool_owner: &self.pool_owner,
        }
    }
}

impl TaskLookup for TaskArena {
    fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }
}

/// Resolves a `PoolId` to its owning task's pool, borrowing the arena's
/// task map without owning it outright.
pub struct ArenaPoolView<'a> {
    tasks: &'a mut HashMap<TaskId, Task>,
    pool_owner: &'a HashMap<PoolId, TaskId>,
}

impl PoolLookup for ArenaPoolView<'_> {
    fn pool_mut(&mut self, id: PoolId) -> Option<&mut dyn ChunkPool> {
        let owner = *self.pool_owner.get(&id)?;
        self.tasks.get_mut(&owner).map(|t| t.pool_mut())
    }
}

/// Per-cell-tag chunk-list budget (spec §4.4's `HasEnough(cellTag, k)`
/// gate, §5's bulk-allocation policy). A real Master RPC would refill
/// asynchronously; this tops the budget up synchronously on
/// `request_refill` instead, a deliberate simplification recorded as an
/// open-question resolution in this crate's design notes.
pub struct ChunkListBroker {
    budget: HashMap<CellTag, usize>,
    refill_batch: usize,
    watermark: usize,
    ids: HandleAllocator,
}

impl ChunkListBroker {
    pub fn new(refill_batch: usize, watermark: usize) -> Self {
        Self {
            budget: HashMap::new(),
            refill_batch,
            watermark,
            ids: HandleAllocator::new(),
        }
    }

    /// Mint `k` fresh chunk-list ids for a task about to be scheduled,
    /// draining them from `cell`'s budget.
    pub fn allocate(&mut self, cell: &CellTag, k: usize) -> Vec<u64> {
        let available = self.budget.entry(cell.clone()).or_insert(0);
        let take = (*available).min(k);
        *available -= take;
        (0..take).map(|_| self.ids.alloc()).collect()
    }
}

impl ChunkListAvailability for ChunkListBroker {
    fn has_enough(&self, cell: &CellTag, k: usize) -> bool {
        self.budget.get(cell).copied().unwrap_or(0) >= k
    }

    fn request_refill(&mut self, cell: &CellTag) {
        let entry = self.budget.entry(cell.clone()).or_insert(0);
        if *entry < self.watermark {
            *entry += self.refill_batch;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_chunkpool::UnorderedChunkPool;
    use controller_model::{ChunkStripe, DataSlice, PoolId, SliceLimit, TaskId};
    use controller_task::TaskTemplate;
    use std::collections::HashSet;

    fn template() -> TaskTemplate {
        TaskTemplate {
            job_type: "map".into(),
            input_format: "yson".into(),
            output_format: "yson".into(),
            user_job_spec: None,
            stripe_slice_count: 1,
            resource_template: controller_model::ResourceLimits {
                cpu: 1.0,
                memory_bytes: 1024,
                network: 0.0,
                user_slots: 1,
            },
            interruptible: true,
            sorted_output: false,
            memory_reserve_quantile: 0.95,
            failed_job_limit: 2,
            destination_cells: vec![],
        }
    }

    #[test]
    fn pool_view_resolves_a_different_tasks_pool() {
        let mut arena = TaskArena::new();
        let downstream_pool = PoolId(2);
        let downstream = Task::new(
            TaskId(2),
            downstream_pool,
            template(),
            Box::new(UnorderedChunkPool::new(1_000_000, 10)),
            vec![],
            HashSet::new(),
        );
        arena.insert_task(downstream);

        let mut view = arena.pool_view();
        let pool = view.pool_mut(downstream_pool).expect("downstream pool present");
        let slice = DataSlice::new(vec![controller_model::ChunkId(1)], SliceLimit::RowIndex(0), SliceLimit::RowIndex(1), 1);
        pool.add(ChunkStripe::new(vec![slice]));
        assert_eq!(arena.get(TaskId(2)).unwrap().get_pending_job_count(), 1);
    }

    #[test]
    fn chunk_list_broker_refills_up_to_watermark() {
        let mut broker = ChunkListBroker::new(10, 5);
        let cell = CellTag("cell-1".to_string());
        assert!(!broker.has_enough(&cell, 1));

        broker.request_refill(&cell);
        assert!(broker.has_enough(&cell, 5));

        let ids = broker.allocate(&cell, 3);
        assert_eq!(ids.len(), 3);
        assert!(!broker.has_enough(&cell, 5));
    }
}
