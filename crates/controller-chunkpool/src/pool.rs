//! The `ChunkPool` trait (spec §4.1): the capability set every pool
//! variant implements, independent of how it chooses to group slices
//! into stripes.

use controller_model::{
    ChunkStripe, ChunkStripeList, InputCookie, JobSummary, NodeId, OutputCookie, Result,
};
use controller_progress::ProgressCounter;

/// Everything an extraction hands back to the caller, mirroring the
/// original's `TPoolExtractionResult` (stripe list plus the locality
/// accounting the progress histograms need).
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub stripe_list: ChunkStripeList,
    pub total_chunk_weight: u64,
    pub total_chunk_count: u32,
    pub local_chunk_count: u32,
    pub remote_chunk_count: u32,
}

/// Common capability set every chunk pool variant exposes (spec §4.1).
///
/// A pool holds pending, suspended, and completed stripes. `Suspend`/
/// `Resume` operate on an already-added stripe's input cookie and are
/// additive: a stripe with two unavailable chunks needs two suspends and
/// two resumes to become ready again. `Extract` hands a ready stripe to
/// a caller and is the only place an `OutputCookie` is minted; `Lost`
/// returns that cookie's stripe to the pending set exactly once.
pub trait ChunkPool: Send {
    /// Add a stripe to the pool; returns the cookie identifying it while
    /// pending.
    fn add(&mut self, stripe: ChunkStripe) -> InputCookie;

    /// Mark one more chunk in `cookie`'s stripe unavailable.
    fn suspend(&mut self, cookie: InputCookie) -> Result<()>;

    /// Mark one previously-unavailable chunk in `cookie`'s stripe as
    /// available again.
    fn resume(&mut self, cookie: InputCookie) -> Result<()>;

    /// Replace a pending stripe's contents (e.g. after input chunk
    /// mapping relocates chunks), without changing its cookie or
    /// suspension state.
    fn reset(&mut self, cookie: InputCookie, new_stripe: ChunkStripe) -> Result<()>;

    /// No more stripes will be added; once every pending/suspended
    /// stripe has been extracted and completed, the pool is finished.
    fn finish(&mut self);

    /// True once `finish()` has been called and no pending, suspended,
    /// or in-flight (extracted-but-not-completed) stripes remain.
    fn is_finished(&self) -> bool;

    /// Extract a ready stripe, preferring one with positive locality for
    /// `node` (spec §4.1 extraction policy). Returns `None` if nothing is
    /// ready.
    fn extract(&mut self, node: &NodeId) -> Option<(OutputCookie, ExtractionResult)>;

    /// Report that the job consuming `cookie` completed successfully.
    fn completed(&mut self, cookie: OutputCookie, summary: &JobSummary) -> Result<()>;

    /// Report that the job consuming `cookie` failed; its stripe returns
    /// to pending.
    fn failed(&mut self, cookie: OutputCookie) -> Result<()>;

    /// Report that the job consuming `cookie` was aborted; its stripe
    /// returns to pending unless the reason has no side effect.
    fn aborted(&mut self, cookie: OutputCookie) -> Result<()>;

    /// Report that a previously-completed job's output was lost. Each
    /// stripe in `stripe_list` (the caller's retained `CompletedJob`
    /// record — the pool itself discarded its own copy in `completed()`)
    /// returns to pending under a freshly minted input cookie, exactly
    /// once; `already_lost` is the caller's own double-lost guard. A
    /// second `lost()` call for the same completed job is a bug.
    fn lost(
        &mut self,
        cookie: OutputCookie,
        stripe_list: &ChunkStripeList,
        already_lost: bool,
    ) -> Result<Vec<InputCookie>>;

    /// Job-count bookkeeping (pending/running/completed/failed/...).
    fn job_counter(&self) -> &ProgressCounter;

    /// Data-weight bookkeeping, same bucket shape as `job_counter`.
    fn data_weight_counter(&self) -> &ProgressCounter;

    /// Net locality score for `node`: positive if the pool holds pending
    /// data local to it.
    fn locality(&self, node: &NodeId) -> i64;
}
