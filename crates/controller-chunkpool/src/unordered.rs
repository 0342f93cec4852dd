//! Unordered and Ordered chunk pools (spec §4.1).
//!
//! Unordered packs ready stripes greedily up to a per-job weight target,
//! used by map, unordered-merge, and the regular reduce combiner.
//! Ordered preserves strict input order: it will not hand out stripe *k+1*
//! before stripe *k* has been extracted, even if *k+1* became ready first.

use controller_model::{
    ChunkStripe, ChunkStripeList, InputCookie, JobSummary, NodeId, OutputCookie, Result,
};
use controller_progress::ProgressCounter;

use crate::core::PoolCore;
use crate::pool::{ChunkPool, ExtractionResult};

/// Packs ready stripes greedily until `job_weight_target` is reached or
/// `max_stripes_per_job` stripes have been gathered.
pub struct UnorderedChunkPool {
    core: PoolCore,
    job_weight_target: u64,
    max_stripes_per_job: usize,
}

impl UnorderedChunkPool {
    pub fn new(job_weight_target: u64, max_stripes_per_job: usize) -> Self {
        Self {
            core: PoolCore::new(),
            job_weight_target,
            max_stripes_per_job: max_stripes_per_job.max(1),
        }
    }

    pub fn add_with_locality(&mut self, stripe: ChunkStripe, local_nodes: Vec<NodeId>) -> InputCookie {
        self.core.add_with_locality(stripe, local_nodes)
    }
}

impl ChunkPool for UnorderedChunkPool {
    fn add(&mut self, stripe: ChunkStripe) -> InputCookie {
        self.core.add(stripe)
    }

    fn suspend(&mut self, cookie: InputCookie) -> Result<()> {
        self.core.suspend(cookie)
    }

    fn resume(&mut self, cookie: InputCookie) -> Result<()> {
        self.core.resume(cookie)
    }

    fn reset(&mut self, cookie: InputCookie, new_stripe: ChunkStripe) -> Result<()> {
        self.core.reset(cookie, new_stripe)
    }

    fn finish(&mut self) {
        self.core.finish();
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    fn extract(&mut self, node: &NodeId) -> Option<(OutputCookie, ExtractionResult)> {
        let candidates = self.core.ready_cookies_preferring(node);
        if candidates.is_empty() {
            return None;
        }
        let mut chosen = Vec::new();
        let mut weight = 0u64;
        for cookie in candidates {
            if chosen.len() >= self.max_stripes_per_job {
                break;
            }
            let stripe_weight = self.core.stripe(cookie)?.data_weight();
            if !chosen.is_empty() && weight + stripe_weight > self.job_weight_target {
                break;
            }
            weight += stripe_weight;
            chosen.push(cookie);
        }
        Some(self.core.extract_cookies(chosen))
    }

    fn completed(&mut self, cookie: OutputCookie, summary: &JobSummary) -> Result<()> {
        self.core.completed(cookie, summary)
    }

    fn failed(&mut self, cookie: OutputCookie) -> Result<()> {
        self.core.failed(cookie)
    }

    fn aborted(&mut self, cookie: OutputCookie) -> Result<()> {
        self.core.aborted(cookie)
    }

    fn lost(&mut self, _cookie: OutputCookie) -> Result<()> {
        // Unordered pools don't keep a record of completed jobs once
        // `completed()` finalizes them; the Task owns `CompletedJob` and
        // calls `PoolCore::lost` directly with the reconstructed stripe.
        Err(controller_model::ModelError::Other(
            "lost() on a finalized cookie must go through the owning Task's CompletedJob record"
                .into(),
        ))
    }

    fn job_counter(&self) -> &ProgressCounter {
        self.core.job_counter()
    }

    fn data_weight_counter(&self) -> &ProgressCounter {
        self.core.data_weight_counter()
    }

    fn locality(&self, node: &NodeId) -> i64 {
        self.core.locality(node)
    }
}

/// Preserves strict input order: `extract` only ever offers the
/// earliest-added stripe still pending, and only once it is ready.
pub struct OrderedChunkPool {
    core: PoolCore,
}

impl OrderedChunkPool {
    pub fn new() -> Self {
        Self { core: PoolCore::new() }
    }
}

impl Default for OrderedChunkPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkPool for OrderedChunkPool {
    fn add(&mut self, stripe: ChunkStripe) -> InputCookie {
        self.core.add(stripe)
    }

    fn suspend(&mut self, cookie: InputCookie) -> Result<()> {
        self.core.suspend(cookie)
    }

    fn resume(&mut self, cookie: InputCookie) -> Result<()> {
        self.core.resume(cookie)
    }

    fn reset(&mut self, cookie: InputCookie, new_stripe: ChunkStripe) -> Result<()> {
        self.core.reset(cookie, new_stripe)
    }

    fn finish(&mut self) {
        self.core.finish();
    }

    fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    fn extract(&mut self, node: &NodeId) -> Option<(OutputCookie, ExtractionResult)> {
        let earliest = self.core.ready_cookies_preferring(node).into_iter().min()?;
        Some(self.core.extract_cookies(vec![earliest]))
    }

    fn completed(&mut self, cookie: OutputCookie, summary: &JobSummary) -> Result<()> {
        self.core.completed(cookie, summary)
    }

    fn failed(&mut self, cookie: OutputCookie) -> Result<()> {
        self.core.failed(cookie)
    }

    fn aborted(&mut self, cookie: OutputCookie) -> Result<()> {
        self.core.aborted(cookie)
    }

    fn lost(&mut self, _cookie: OutputCookie) -> Result<()> {
        Err(controller_model::ModelError::Other(
            "lost() on a finalized cookie must go through the owning Task's CompletedJob record"
                .into(),
        ))
    }

    fn job_counter(&self) -> &ProgressCounter {
        self.core.job_counter()
    }

    fn data_weight_counter(&self) -> &ProgressCounter {
        self.core.data_weight_counter()
    }

    fn locality(&self, node: &NodeId) -> i64 {
        self.core.locality(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::{ChunkId, DataSlice, SliceLimit};

    fn stripe(weight: u64) -> ChunkStripe {
        let mut slice = DataSlice::new(
            vec![ChunkId(1)],
            SliceLimit::RowIndex(0),
            SliceLimit::RowIndex(10),
            1,
        );
        slice.data_weight = weight;
        ChunkStripe::new(vec![slice])
    }

    #[test]
    fn unordered_pool_packs_up_to_weight_target() {
        let mut pool = UnorderedChunkPool::new(100, 10);
        pool.add(stripe(40));
        pool.add(stripe(40));
        pool.add(stripe(40));

        let node = NodeId("n1".into());
        let (_cookie, result) = pool.extract(&node).unwrap();
        // first two stripes (80) fit; the third would exceed 100.
        assert_eq!(result.total_chunk_weight, 80);
    }

    #[test]
    fn ordered_pool_blocks_on_unready_head() {
        let mut pool = OrderedChunkPool::new();
        let first = pool.add(stripe(10));
        pool.add(stripe(10));
        pool.suspend(first).unwrap();

        let node = NodeId("n1".into());
        assert!(pool.extract(&node).is_none());

        pool.resume(first).unwrap();
        assert!(pool.extract(&node).is_some());
    }
}
