//! Sorted chunk pool (spec §4.1).
//!
//! Slices are grouped by key range before they ever reach the pool (the
//! owning Task partitions boundary keys according to ReduceBy/JoinBy/
//! SortBy prefixes); this pool's job is to guarantee a stripe is never
//! split across two jobs, so every row sharing a reduce key lands in the
//! same job. When `enable_key_guarantee` is false, the pool falls back to
//! packing by weight like [`crate::unordered::UnorderedChunkPool`].

use controller_model::{ChunkStripe, InputCookie, JobSummary, NodeId, OutputCookie, Result};
use controller_progress::ProgressCounter;

use crate::core::PoolCore;
use crate::pool::{ChunkPool, ExtractionResult};

pub struct SortedChunkPool {
    core: PoolCore,
    enable_key_guarantee: bool,
    job_weight_target: u64,
}

impl SortedChunkPool {
    pub fn new(job_weight_target: u64, enable_key_guarantee: bool) -> Self {
        Self {
            core: PoolCore::new(),
            enable_key_guarantee,
            job_weight_target,
        }
    }
}

impl ChunkPool for SortedChunkPool {
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
        if self.enable_key_guarantee {
            // Every reduce-key group was already assembled into exactly
            // one stripe by the owning Task; never combine two stripes
            // into one job, since that could merge unrelated key ranges.
            let chosen = *candidates.first()?;
            return Some(self.core.extract_cookies(vec![chosen]));
        }
        let mut chosen = Vec::new();
        let mut weight = 0u64;
        for cookie in candidates {
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
            SliceLimit::Key(b"a".to_vec()),
            SliceLimit::Key(b"b".to_vec()),
            1,
        );
        slice.data_weight = weight;
        ChunkStripe::new(vec![slice])
    }

    #[test]
    fn key_guarantee_never_merges_two_stripes() {
        let mut pool = SortedChunkPool::new(1000, true);
        pool.add(stripe(10));
        pool.add(stripe(10));

        let (_cookie, result) = pool.extract(&NodeId("n1".into())).unwrap();
        assert_eq!(result.stripe_list.stripes.len(), 1);
    }

    #[test]
    fn without_key_guarantee_packs_by_weight() {
        let mut pool = SortedChunkPool::new(1000, false);
        pool.add(stripe(10));
        pool.add(stripe(10));

        let (_cookie, result) = pool.extract(&NodeId("n1".into())).unwrap();
        assert_eq!(result.stripe_list.stripes.len(), 2);
    }
}
