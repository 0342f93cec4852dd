//! Task group (C4, spec §4.4): a priority bucket of candidate tasks the
//! scheduling loop iterates over for a single offer.

use std::collections::HashMap;
use std::time::Instant;

use controller_model::{NodeId, ResourceLimits, TaskGroupId, TaskId};

/// One candidate bucket. Task groups are iterated in ascending `priority`
/// order by the scheduling loop; within a group, candidates are tried
/// local-first, then non-local in increasing min-memory order.
pub struct TaskGroup {
    pub id: TaskGroupId,
    pub priority: u32,
    /// The group's minimum resource requirement across every candidate
    /// with pending work; an offer that doesn't dominate this is rejected
    /// for the whole group without visiting any task (spec §4.4 step 1).
    pub min_resources: ResourceLimits,
    candidates: Vec<TaskId>,
    /// Node id -> tasks with a locality hint for it (spec §4.4's local
    /// pass).
    locality_hints: HashMap<NodeId, Vec<TaskId>>,
    /// First time a non-local candidate was visited this round without
    /// being scheduled; it's skipped until `locality_timeout` elapses
    /// (spec §4.4 step 3).
    delayed_since: HashMap<TaskId, Instant>,
    locality_timeout: std::time::Duration,
}

impl TaskGroup {
    pub fn new(id: TaskGroupId, priority: u32, locality_timeout: std::time::Duration) -> Self {
        Self {
            id,
            priority,
            min_resources: ResourceLimits {
                cpu: 0.0,
                memory_bytes: 0,
                network: 0.0,
                user_slots: 0,
            },
            candidates: Vec::new(),
            locality_hints: HashMap::new(),
            delayed_since: HashMap::new(),
            locality_timeout,
        }
    }

    pub fn add_candidate(&mut self, task: TaskId) {
        if !self.candidates.contains(&task) {
            self.candidates.push(task);
        }
    }

    pub fn remove_candidate(&mut self, task: TaskId) {
        self.candidates.retain(|t| *t != task);
        self.delayed_since.remove(&task);
        for hinted in self.locality_hints.values_mut() {
            hinted.retain(|t| *t != task);
        }
    }

    pub fn add_locality_hint(&mut self, node: NodeId, task: TaskId) {
        self.locality_hints.entry(node).or_default().push(task);
    }

    pub fn candidates(&self) -> &[TaskId] {
        &self.candidates
    }

    /// Candidates with a locality hint for `node`, in the order they were
    /// hinted (spec §4.4's local pass iterates "for each task with a
    /// locality hint for this node id").
    pub fn local_candidates(&self, node: &NodeId) -> &[TaskId] {
        self.locality_hints.get(node).map_or(&[], |v| v.as_slice())
    }

    /// Non-local candidates not currently delayed, in increasing
    /// min-memory order. `min_memory` gives each candidate's current min
    /// needed memory, precomputed by the caller (a closure would need to
    /// re-borrow the task arena while this method already holds `&mut
    /// self`, so a plain map keeps the borrow checker out of the loop).
    pub fn non_local_candidates(&mut self, now: Instant, min_memory: &HashMap<TaskId, u64>) -> Vec<TaskId> {
        let expired: Vec<TaskId> = self
            .delayed_since
            .iter()
            .filter(|(_, since)| now.duration_since(**since) >= self.locality_timeout)
            .map(|(task, _)| *task)
            .collect();
        for task in expired {
            self.delayed_since.remove(&task);
        }

        let mut ready: Vec<TaskId> = self
            .candidates
            .iter()
            .copied()
            .filter(|task| !self.delayed_since.contains_key(task))
            .collect();
        ready.sort_by_key(|task| min_memory.get(task).copied().unwrap_or(u64::MAX));
        ready
    }

    /// Mark `task` as touched-but-not-scheduled this round; it won't be
    /// offered again until `locality_timeout` has elapsed.
    pub fn delay(&mut self, task: TaskId, now: Instant) {
        self.delayed_since.entry(task).or_insert(now);
    }

    pub fn is_delayed(&self, task: TaskId) -> bool {
        self.delayed_since.contains_key(&task)
    }
}
