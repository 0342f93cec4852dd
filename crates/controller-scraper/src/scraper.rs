//! Chunk scraper (C6, spec §4.5): a background locator for chunks that
//! became unavailable. Grounded on `orbit_sentinel::daemon`'s OODA sweep
//! loop (`tokio::time::interval`), simplified from its healing-semaphore
//! shape since a scrape batch is one RPC, not N concurrent repairs.

use async_trait::async_trait;
use controller_model::{ChunkId, Replica};
use controller_proto::master::{ChunkLocateResult, Master};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::warn;

use crate::policy::ScraperPolicy;

/// Whether a scraper is tracking input chunks (required for the
/// operation to proceed) or intermediate chunks (expected to disappear
/// during auto-merge; a missing one is not an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScraperKind {
    Input,
    Intermediate,
}

/// Callbacks fired as the scraper resolves chunk ids (spec §4.5).
#[async_trait]
pub trait ScraperObserver: Send + Sync {
    async fn on_available(&self, chunk: ChunkId, replicas: Vec<Replica>);
    async fn on_unavailable(&self, chunk: ChunkId);
    /// Only invoked for an `Input`-kind scraper; the operation fails.
    /// An `Intermediate`-kind scraper drops a missing chunk silently
    /// instead of calling this.
    async fn on_input_chunk_missing(&self, chunk: ChunkId);
}

/// Tracks a set of chunk ids to relocate and periodically asks Master
/// for their replica lists in batches.
pub struct ChunkScraper<M> {
    kind: ScraperKind,
    master: Arc<M>,
    policy: ScraperPolicy,
    pending: Mutex<HashSet<ChunkId>>,
    running: AtomicBool,
    wake: Notify,
}

impl<M: Master + Send + Sync + 'static> ChunkScraper<M> {
    pub fn new(kind: ScraperKind, master: Arc<M>, policy: ScraperPolicy) -> Arc<Self> {
        Arc::new(Self {
            kind,
            master,
            policy,
            pending: Mutex::new(HashSet::new()),
            running: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    /// Add a chunk id to relocate. The scraper is started (if not
    /// already running) when the pending set transitions from empty to
    /// non-empty (spec §4.5).
    pub fn add(&self, chunk: ChunkId) {
        let became_nonempty = {
            let mut pending = self.pending.lock().unwrap();
            let was_empty = pending.is_empty();
            pending.insert(chunk);
            was_empty && !pending.is_empty()
        };
        if became_nonempty {
            self.wake.notify_one();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn kind(&self) -> ScraperKind {
        self.kind
    }

    /// Drive sweeps forever; stops polling (without consuming a task
    /// slot busy-looping) whenever the pending set is empty, and resumes
    /// as soon as `add` wakes it (spec §4.5: "stopped when the
    /// unavailable count hits zero and started when it goes non-zero").
    pub async fn run(self: Arc<Self>, observer: Arc<dyn ScraperObserver>) {
        loop {
            if self.pending.lock().unwrap().is_empty() {
                self.running.store(false, Ordering::Relaxed);
                self.wake.notified().await;
            }
            self.running.store(true, Ordering::Relaxed);

            self.sweep_once(observer.as_ref()).await;
            tokio::time::sleep(self.policy.sweep_interval).await;
        }
    }

    /// One locate-chunks round trip over up to `batch_size` pending
    /// chunks; exposed separately so tests can drive sweeps deterministically
    /// instead of waiting on the sleep-based loop in `run`.
    pub async fn sweep_once(&self, observer: &dyn ScraperObserver) {
        let batch: Vec<ChunkId> = {
            let pending = self.pending.lock().unwrap();
            pending.iter().take(self.policy.batch_size).copied().collect()
        };
        if batch.is_empty() {
            return;
        }

        match self.master.locate_chunks(batch).await {
            Ok(results) => self.apply_results(results, observer).await,
            Err(err) => {
                warn!(error = %err, kind = ?self.kind, "locate_chunks batch failed, retrying next sweep");
            }
        }
    }

    async fn apply_results(&self, results: Vec<ChunkLocateResult>, observer: &dyn ScraperObserver) {
        for result in results {
            match result {
                ChunkLocateResult::Available { chunk, replicas } => {
                    self.pending.lock().unwrap().remove(&chunk);
                    observer.on_available(chunk, replicas).await;
                }
                ChunkLocateResult::Unavailable { chunk } => {
                    observer.on_unavailable(chunk).await;
                }
                ChunkLocateResult::Missing { chunk } => {
                    self.pending.lock().unwrap().remove(&chunk);
                    if self.kind == ScraperKind::Input {
                        observer.on_input_chunk_missing(chunk).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::NodeId;
    use controller_proto::testing::FakeMaster;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingObserver {
        available: StdMutex<Vec<ChunkId>>,
        unavailable: StdMutex<Vec<ChunkId>>,
        missing: StdMutex<Vec<ChunkId>>,
    }

    #[async_trait]
    impl ScraperObserver for RecordingObserver {
        async fn on_available(&self, chunk: ChunkId, _replicas: Vec<Replica>) {
            self.available.lock().unwrap().push(chunk);
        }
        async fn on_unavailable(&self, chunk: ChunkId) {
            self.unavailable.lock().unwrap().push(chunk);
        }
        async fn on_input_chunk_missing(&self, chunk: ChunkId) {
            self.missing.lock().unwrap().push(chunk);
        }
    }

    #[tokio::test]
    async fn available_chunk_is_removed_from_pending_and_reported() {
        let master = Arc::new(FakeMaster::new());
        master.seed_chunk(ChunkId(1), vec![Replica { node: NodeId("n1".into()), index: 0 }]);
        let scraper = ChunkScraper::new(ScraperKind::Input, master, ScraperPolicy::default());
        scraper.add(ChunkId(1));

        let observer = Arc::new(RecordingObserver::default());
        scraper.sweep_once(observer.as_ref()).await;

        assert_eq!(scraper.pending_count(), 0);
        assert_eq!(observer.available.lock().unwrap().as_slice(), &[ChunkId(1)]);
    }

    #[tokio::test]
    async fn unavailable_chunk_stays_pending() {
        let master = Arc::new(FakeMaster::new());
        master.mark_unavailable(ChunkId(2));
        let scraper = ChunkScraper::new(ScraperKind::Input, master, ScraperPolicy::default());
        scraper.add(ChunkId(2));

        let observer = Arc::new(RecordingObserver::default());
        scraper.sweep_once(observer.as_ref()).await;

        assert_eq!(scraper.pending_count(), 1);
        assert_eq!(observer.unavailable.lock().unwrap().as_slice(), &[ChunkId(2)]);
    }

    #[tokio::test]
    async fn missing_input_chunk_is_reported_missing_chunk_dropped() {
        let master = Arc::new(FakeMaster::new());
        let scraper = ChunkScraper::new(ScraperKind::Input, master, ScraperPolicy::default());
        scraper.add(ChunkId(3));

        let observer = Arc::new(RecordingObserver::default());
        scraper.sweep_once(observer.as_ref()).await;

        assert_eq!(scraper.pending_count(), 0);
        assert_eq!(observer.missing.lock().unwrap().as_slice(), &[ChunkId(3)]);
    }

    #[tokio::test]
    async fn missing_intermediate_chunk_is_dropped_silently() {
        let master = Arc::new(FakeMaster::new());
        let scraper = ChunkScraper::new(ScraperKind::Intermediate, master, ScraperPolicy::default());
        scraper.add(ChunkId(4));

        let observer = Arc::new(RecordingObserver::default());
        scraper.sweep_once(observer.as_ref()).await;

        assert_eq!(scraper.pending_count(), 0);
        assert!(observer.missing.lock().unwrap().is_empty());
    }
}
