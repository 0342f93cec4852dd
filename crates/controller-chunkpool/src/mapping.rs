//! Input chunk mapping (C2, spec §2): maps an original chunk's identity
//! to its current set of replicas after the chunk has been relocated
//! (e.g. erasure-repaired onto different nodes, or replaced by the
//! scraper after a lost replica was rebuilt elsewhere).
//!
//! Pools never look chunks up directly; the owning Task consults the
//! mapping before calling [`crate::pool::ChunkPool::reset`] so a
//! suspended stripe can be resumed pointing at live replicas.

use controller_model::{ChunkId, Replica};
use std::collections::HashMap;

/// Tracks replica-location overrides for chunks that moved after their
/// `InputChunk` descriptor was first fetched.
#[derive(Debug, Default)]
pub struct InputChunkMapping {
    overrides: HashMap<ChunkId, Vec<Replica>>,
}

impl InputChunkMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a relocation: `chunk` now lives at `replicas` instead of
    /// whatever its original `InputChunk` said.
    pub fn relocate(&mut self, chunk: ChunkId, replicas: Vec<Replica>) {
        self.overrides.insert(chunk, replicas);
    }

    /// Forget a chunk entirely (e.g. operation teardown).
    pub fn forget(&mut self, chunk: ChunkId) {
        self.overrides.remove(&chunk);
    }

    /// Current replicas for `chunk`, if it has ever been relocated.
    pub fn current_replicas(&self, chunk: ChunkId) -> Option<&[Replica]> {
        self.overrides.get(&chunk).map(Vec::as_slice)
    }

    pub fn has_override(&self, chunk: ChunkId) -> bool {
        self.overrides.contains_key(&chunk)
    }

    pub fn relocated_chunk_count(&self) -> usize {
        self.overrides.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::NodeId;

    #[test]
    fn relocated_chunk_reports_new_replicas() {
        let mut mapping = InputChunkMapping::new();
        assert!(!mapping.has_override(ChunkId(1)));

        mapping.relocate(
            ChunkId(1),
            vec![Replica {
                node: NodeId("n2".into()),
                index: 0,
            }],
        );
        assert!(mapping.has_override(ChunkId(1)));
        assert_eq!(mapping.current_replicas(ChunkId(1)).unwrap().len(), 1);
    }

    #[test]
    fn forgetting_a_chunk_clears_its_override() {
        let mut mapping = InputChunkMapping::new();
        mapping.relocate(ChunkId(1), vec![]);
        mapping.forget(ChunkId(1));
        assert!(!mapping.has_override(ChunkId(1)));
    }
}
