//! Shared pending/suspended/extracted bookkeeping used by every pool
//! variant. Each variant owns one [`PoolCore`] and layers its own
//! grouping/extraction-order policy on top.

use controller_model::{
    ChunkStripe, ChunkStripeList, HandleAllocator, InputCookie, JobSummary, ModelError, NodeId,
    OutputCookie, Result,
};
use controller_progress::ProgressCounter;
use std::collections::BTreeMap;

use crate::pool::ExtractionResult;

/// One outstanding extraction: which input cookies composed it, so
/// `lost()`/`failed()`/`aborted()` can reconstruct the stripe list to
/// hand back to pending.
#[derive(Debug, Clone)]
struct Extraction {
    input_cookies: Vec<InputCookie>,
    stripes: Vec<ChunkStripe>,
}

/// Shared state machine behind every [`crate::pool::ChunkPool`]
/// implementation: pending stripes, in-flight extractions, and the two
/// progress counters every variant exposes unchanged.
///
/// `pending` is a `BTreeMap` keyed by `InputCookie`, whose values are
/// handed out in monotonically increasing order by [`HandleAllocator`];
/// iterating it is therefore equivalent to iterating in add-order, which
/// is what the extraction policy's "ties broken by age" needs.
#[derive(Debug)]
pub struct PoolCore {
    input_handles: HandleAllocator,
    output_handles: HandleAllocator,
    pending: BTreeMap<InputCookie, ChunkStripe>,
    /// Nodes with a local replica of at least one chunk in a pending
    /// stripe, as reported by the caller at `add` time. The pool itself
    /// has no chunk registry; locality is supplied, not computed.
    stripe_locality: BTreeMap<InputCookie, Vec<NodeId>>,
    extracted: BTreeMap<OutputCookie, Extraction>,
    finished: bool,
    job_counter: ProgressCounter,
    data_weight_counter: ProgressCounter,
}

impl PoolCore {
    pub fn new() -> Self {
        Self {
            input_handles: HandleAllocator::new(),
            output_handles: HandleAllocator::new(),
            pending: BTreeMap::new(),
            stripe_locality: BTreeMap::new(),
            extracted: BTreeMap::new(),
            finished: false,
            job_counter: ProgressCounter::new(),
            data_weight_counter: ProgressCounter::new(),
        }
    }

    pub fn add(&mut self, stripe: ChunkStripe) -> InputCookie {
        self.add_with_locality(stripe, Vec::new())
    }

    /// Add a stripe, recording which nodes hold a local replica of at
    /// least one of its chunks (spec §4.1 extraction policy).
    pub fn add_with_locality(&mut self, stripe: ChunkStripe, local_nodes: Vec<NodeId>) -> InputCookie {
        let cookie = InputCookie(self.input_handles.alloc());
        self.job_counter.inc_pending(1);
        self.data_weight_counter
            .inc_pending(stripe.data_weight() as i64);
        if !local_nodes.is_empty() {
            self.stripe_locality.insert(cookie, local_nodes);
        }
        self.pending.insert(cookie, stripe);
        cookie
    }

    pub fn suspend(&mut self, cookie: InputCookie) -> Result<()> {
        let stripe = self
            .pending
            .get_mut(&cookie)
            .ok_or(ModelError::CookieNotPending(cookie))?;
        stripe.waiting_chunk_count += 1;
        if stripe.waiting_chunk_count == 1 {
            let weight = stripe.data_weight() as i64;
            self.job_counter.dec_pending(1).ok();
            self.job_counter.inc_suspended(1);
            self.data_weight_counter.dec_pending(weight).ok();
            self.data_weight_counter.inc_suspended(weight);
        }
        Ok(())
    }

    pub fn resume(&mut self, cookie: InputCookie) -> Result<()> {
        let stripe = self
            .pending
            .get_mut(&cookie)
            .ok_or(ModelError::CookieNotPending(cookie))?;
        if stripe.waiting_chunk_count == 0 {
            return Err(ModelError::Other(format!(
                "cannot resume {cookie}: suspension counter is already zero"
            )));
        }
        stripe.waiting_chunk_count -= 1;
        if stripe.waiting_chunk_count == 0 {
            let weight = stripe.data_weight() as i64;
            self.job_counter.dec_suspended(1).ok();
            self.job_counter.inc_pending(1);
            self.data_weight_counter.dec_suspended(weight).ok();
            self.data_weight_counter.inc_pending(weight);
        }
        Ok(())
    }

    pub fn reset(&mut self, cookie: InputCookie, new_stripe: ChunkStripe) -> Result<()> {
        let stripe = self
            .pending
            .get_mut(&cookie)
            .ok_or(ModelError::CookieNotPending(cookie))?;
        *stripe = new_stripe;
        Ok(())
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.pending.is_empty() && self.extracted.is_empty()
    }

    /// Ready cookies (`waiting_chunk_count == 0`) in add-order, with the
    /// ones local to `node` surfaced first (spec §4.1: prefer a local
    /// stripe, ties broken by age).
    pub fn ready_cookies_preferring(&self, node: &NodeId) -> Vec<InputCookie> {
        let (mut local, mut remote): (Vec<_>, Vec<_>) = self
            .pending
            .iter()
            .filter(|(_, stripe)| stripe.is_ready())
            .map(|(cookie, _)| *cookie)
            .partition(|cookie| {
                self.stripe_locality
                    .get(cookie)
                    .is_some_and(|nodes| nodes.contains(node))
            });
        local.append(&mut remote);
        local
    }

    pub fn stripe(&self, cookie: InputCookie) -> Option<&ChunkStripe> {
        self.pending.get(&cookie)
    }

    /// Pull the given cookies out of pending and mint an output cookie
    /// for the extraction. Caller is responsible for choosing cookies
    /// that are all ready.
    pub fn extract_cookies(&mut self, cookies: Vec<InputCookie>) -> (OutputCookie, ExtractionResult) {
        let mut stripes = Vec::with_capacity(cookies.len());
        let mut local_chunk_count = 0u32;
        let mut remote_chunk_count = 0u32;
        for cookie in &cookies {
            if let Some(stripe) = self.pending.remove(cookie) {
                let weight = stripe.data_weight() as i64;
                self.job_counter.dec_pending(1).ok();
                self.job_counter.inc_running(1);
                self.data_weight_counter.dec_pending(weight).ok();
                self.data_weight_counter.inc_running(weight);
                if self.stripe_locality.remove(cookie).is_some() {
                    local_chunk_count += stripe.chunk_count() as u32;
                } else {
                    remote_chunk_count += stripe.chunk_count() as u32;
                }
                stripes.push(stripe);
            }
        }
        let mut stripe_list = ChunkStripeList::from_stripes(stripes.clone());
        stripe_list.local_chunk_count = local_chunk_count;
        stripe_list.remote_chunk_count = remote_chunk_count;
        let result = ExtractionResult {
            total_chunk_weight: stripe_list.total_data_weight,
            total_chunk_count: stripe_list.total_chunk_count,
            local_chunk_count,
            remote_chunk_count,
            stripe_list: stripe_list.clone(),
        };
        let output_cookie = OutputCookie(self.output_handles.alloc());
        self.extracted.insert(
            output_cookie,
            Extraction {
                input_cookies: cookies,
                stripes: stripe_list.stripes,
            },
        );
        (output_cookie, result)
    }

    pub fn completed(&mut self, cookie: OutputCookie, _summary: &JobSummary) -> Result<()> {
        let extraction = self
            .extracted
            .remove(&cookie)
            .ok_or(ModelError::OutputCookieAlreadyFinalized(cookie))?;
        let weight: i64 = extraction
            .stripes
            .iter()
            .map(|s| s.data_weight() as i64)
            .sum();
        // `extract_cookies` runs `inc_running(1)` once per input cookie
        // packed into this job, so completion must mirror that and
        // settle all of them, not just one — otherwise a k>1 stripe job
        // leaks k-1 into `running` forever (spec §4.1 conservation).
        let stripe_count = extraction.stripes.len() as i64;
        self.job_counter.dec_running(stripe_count).ok();
        self.job_counter.inc_completed(stripe_count);
        self.data_weight_counter.dec_running(weight).ok();
        self.data_weight_counter.inc_completed(weight);
        Ok(())
    }

    pub fn failed(&mut self, cookie: OutputCookie) -> Result<()> {
        self.return_to_pending(cookie)
    }

    pub fn aborted(&mut self, cookie: OutputCookie) -> Result<()> {
        self.return_to_pending(cookie)
    }

    fn return_to_pending(&mut self, cookie: OutputCookie) -> Result<()> {
        let extraction = self
            .extracted
            .remove(&cookie)
            .ok_or(ModelError::OutputCookieAlreadyFinalized(cookie))?;
        self.job_counter
            .dec_running(extraction.input_cookies.len() as i64)
            .ok();
        self.job_counter
            .inc_pending(extraction.input_cookies.len() as i64);
        for (input_cookie, stripe) in extraction
            .input_cookies
            .into_iter()
            .zip(extraction.stripes)
        {
            let weight = stripe.data_weight() as i64;
            self.data_weight_counter.dec_running(weight).ok();
            self.data_weight_counter.inc_pending(weight);
            self.pending.insert(input_cookie, stripe);
        }
        Ok(())
    }

    /// Return a lost completed job's stripe to pending exactly once;
    /// `already_lost` is supplied by the caller (the Task, which tracks
    /// `CompletedJob.suspended` per spec §3.1) since the pool itself no
    /// longer has a record of the job once `completed()` removed it.
    pub fn lost(&mut self, stripe: ChunkStripe, already_lost: bool) -> Result<InputCookie> {
        if already_lost {
            return Err(ModelError::Other(
                "stripe already lost; double-lost is a bug".into(),
            ));
        }
        let weight = stripe.data_weight() as i64;
        let cookie = InputCookie(self.input_handles.alloc());
        self.job_counter.dec_completed(1).ok();
        self.job_counter.inc_lost(1);
        self.job_counter.inc_pending(1);
        self.data_weight_counter.dec_completed(weight).ok();
        self.data_weight_counter.inc_pending(weight);
        self.pending.insert(cookie, stripe);
        Ok(cookie)
    }

    pub fn job_counter(&self) -> &ProgressCounter {
        &self.job_counter
    }

    pub fn data_weight_counter(&self) -> &ProgressCounter {
        &self.data_weight_counter
    }

    /// Net locality for `node`: number of pending chunks in stripes
    /// tagged local to it.
    pub fn locality(&self, node: &NodeId) -> i64 {
        self.stripe_locality
            .iter()
            .filter(|(_, nodes)| nodes.contains(node))
            .filter_map(|(cookie, _)| self.pending.get(cookie))
            .map(|stripe| stripe.chunk_count() as i64)
            .sum()
    }
}

impl Default for PoolCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::{ChunkId, DataSlice, SliceLimit};

    fn simple_stripe(weight: u64) -> ChunkStripe {
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
    fn add_then_extract_moves_pending_to_running() {
        let mut core = PoolCore::new();
        let cookie = core.add(simple_stripe(100));
        assert_eq!(core.job_counter().pending, 1);

        let (_out, result) = core.extract_cookies(vec![cookie]);
        assert_eq!(result.total_chunk_weight, 100);
        assert_eq!(core.job_counter().running, 1);
        assert_eq!(core.job_counter().pending, 0);
    }

    #[test]
    fn suspend_and_resume_are_additive() {
        let mut core = PoolCore::new();
        let cookie = core.add(simple_stripe(10));
        core.suspend(cookie).unwrap();
        core.suspend(cookie).unwrap();
        assert_eq!(core.job_counter().suspended, 1);
        assert_eq!(core.stripe(cookie).unwrap().waiting_chunk_count, 2);

        core.resume(cookie).unwrap();
        assert_eq!(core.job_counter().suspended, 1);
        core.resume(cookie).unwrap();
        assert_eq!(core.job_counter().suspended, 0);
        assert_eq!(core.job_counter().pending, 1);
    }

    #[test]
    fn failed_job_returns_stripe_to_pending() {
        let mut core = PoolCore::new();
        let cookie = core.add(simple_stripe(10));
        let (out, _) = core.extract_cookies(vec![cookie]);
        core.failed(out).unwrap();
        assert_eq!(core.job_counter().pending, 1);
        assert_eq!(core.job_counter().running, 0);
    }

    #[test]
    fn multi_stripe_job_settles_running_to_zero_on_completion() {
        let mut core = PoolCore::new();
        let a = core.add(simple_stripe(10));
        let b = core.add(simple_stripe(10));
        let (out, _) = core.extract_cookies(vec![a, b]);
        assert_eq!(core.job_counter().running, 2);

        let summary = JobSummary {
            job_id: controller_model::JobId(1),
            node: controller_model::NodeId("n1".into()),
            output_chunk_specs: Default::default(),
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
        core.completed(out, &summary).unwrap();
        assert_eq!(core.job_counter().running, 0);
        assert_eq!(core.job_counter().completed, 2);
    }

    #[test]
    fn multi_stripe_job_settles_running_to_zero_on_failure() {
        let mut core = PoolCore::new();
        let a = core.add(simple_stripe(10));
        let b = core.add(simple_stripe(10));
        let (out, _) = core.extract_cookies(vec![a, b]);
        assert_eq!(core.job_counter().running, 2);

        core.failed(out).unwrap();
        assert_eq!(core.job_counter().running, 0);
        assert_eq!(core.job_counter().pending, 2);
    }

    #[test]
    fn local_stripes_are_preferred_at_extraction() {
        let mut core = PoolCore::new();
        let remote = core.add(simple_stripe(10));
        let local = core.add_with_locality(simple_stripe(10), vec![NodeId("n1".into())]);

        let preferred = core.ready_cookies_preferring(&NodeId("n1".into()));
        assert_eq!(preferred[0], local);
        assert_eq!(preferred[1], remote);
    }

    #[test]
    fn lost_after_completed_is_rejected_the_second_time() {
        let mut core = PoolCore::new();
        let cookie = core.add(simple_stripe(10));
        let summary = JobSummary {
            job_id: controller_model::JobId(1),
            node: controller_model::NodeId("n1".into()),
            output_chunk_specs: Default::default(),
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
        let (out, result) = core.extract_cookies(vec![cookie]);
        core.completed(out, &summary).unwrap();
        let stripe = result.stripe_list.stripes[0].clone();

        core.lost(stripe.clone(), false).unwrap();
        assert_eq!(core.job_counter().lost, 1);

        assert!(core.lost(stripe, true).is_err());
    }
}
