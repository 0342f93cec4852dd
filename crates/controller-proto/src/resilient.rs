//! Circuit-breaker-wrapped `Master`, grounded on the same
//! `orbit_core_resilience::CircuitBreaker::execute` retry/backoff wrapper
//! `orbit-connect` puts around its gRPC calls — Master is exactly the
//! kind of flaky-network production service that pattern exists for.

use async_trait::async_trait;
use controller_model::{CellTag, ChunkId, TransactionId};
use orbit_core_resilience::{CircuitBreaker, CircuitBreakerConfig, ResilienceError};
use std::time::Duration;

use crate::error::{ProtoError, Result};
use crate::master::{ChunkLocateResult, CypressNode, LockMode, Master, TableStatistics, UploadParams};

/// Wraps any [`Master`] implementation with a circuit breaker and
/// exponential-backoff retries. Every call is routed through
/// `CircuitBreaker::execute`, which already classifies transient vs.
/// permanent failures via [`ResilienceError::is_transient`] — we map
/// [`ProtoError`] into [`ResilienceError`] at the boundary and back.
pub struct ResilientMaster<M> {
    inner: M,
    breaker: CircuitBreaker,
}

impl<M: Master> ResilientMaster<M> {
    pub fn new(inner: M) -> Self {
        Self::with_config(inner, CircuitBreakerConfig::default())
    }

    pub fn with_config(inner: M, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config),
        }
    }

    async fn guarded<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.breaker
            .execute(|| async { op().await.map_err(to_resilience_error) })
            .await
            .map_err(from_resilience_error)
    }
}

fn to_resilience_error(err: ProtoError) -> ResilienceError {
    if err.is_transient() {
        ResilienceError::Transient(err.to_string())
    } else {
        ResilienceError::Permanent(err.to_string())
    }
}

fn from_resilience_error(err: ResilienceError) -> ProtoError {
    match err {
        ResilienceError::CircuitOpen => ProtoError::Unavailable {
            collaborator: "master",
            detail: "circuit breaker open".into(),
        },
        ResilienceError::Timeout(d) => ProtoError::Timeout {
            collaborator: "master",
            timeout: d,
        },
        other => ProtoError::Permanent(other.to_string()),
    }
}

#[async_trait]
impl<M: Master + Send + Sync> Master for ResilientMaster<M> {
    async fn get_node(&self, path: &str) -> Result<CypressNode> {
        self.guarded(|| self.inner.get_node(path)).await
    }

    async fn set_node(&self, path: &str, attributes: serde_json::Value) -> Result<()> {
        self.guarded(|| self.inner.set_node(path, attributes.clone()))
            .await
    }

    async fn create_node(&self, path: &str, node_type: &str) -> Result<()> {
        self.guarded(|| self.inner.create_node(path, node_type)).await
    }

    async fn remove_node(&self, path: &str) -> Result<()> {
        self.guarded(|| self.inner.remove_node(path)).await
    }

    async fn lock_node(&self, path: &str, txn: TransactionId, mode: LockMode) -> Result<()> {
        self.guarded(|| self.inner.lock_node(path, txn, mode)).await
    }

    async fn copy_node(&self, src: &str, dst: &str) -> Result<()> {
        self.guarded(|| self.inner.copy_node(src, dst)).await
    }

    async fn attach_chunk_trees(&self, parent: u64, children: Vec<u64>) -> Result<()> {
        self.guarded(|| self.inner.attach_chunk_trees(parent, children.clone()))
            .await
    }

    async fn get_upload_params(&self, table_path: &str) -> Result<UploadParams> {
        self.guarded(|| self.inner.get_upload_params(table_path)).await
    }

    async fn begin_upload(&self, table_path: &str, scope_txn: TransactionId) -> Result<TransactionId> {
        self.guarded(|| self.inner.begin_upload(table_path, scope_txn))
            .await
    }

    async fn end_upload(
        &self,
        table_path: &str,
        upload_txn: TransactionId,
        stats: TableStatistics,
    ) -> Result<()> {
        self.guarded(|| self.inner.end_upload(table_path, upload_txn, stats.clone()))
            .await
    }

    async fn teleport_chunk(&self, chunk: ChunkId, destination_cell: CellTag) -> Result<()> {
        self.guarded(|| self.inner.teleport_chunk(chunk, destination_cell.clone()))
            .await
    }

    async fn locate_chunks(&self, chunks: Vec<ChunkId>) -> Result<Vec<ChunkLocateResult>> {
        self.guarded(|| self.inner.locate_chunks(chunks.clone())).await
    }

    async fn unstage_chunk_list(&self, chunk_list_id: u64) -> Result<()> {
        self.guarded(|| self.inner.unstage_chunk_list(chunk_list_id)).await
    }

    async fn unstage_chunk_tree(&self, chunk_tree_id: u64) -> Result<()> {
        self.guarded(|| self.inner.unstage_chunk_tree(chunk_tree_id)).await
    }

    async fn start_transaction(
        &self,
        parent: Option<TransactionId>,
        timeout: Duration,
    ) -> Result<TransactionId> {
        self.guarded(|| self.inner.start_transaction(parent, timeout))
            .await
    }

    async fn abort_transaction(&self, id: TransactionId) -> Result<()> {
        self.guarded(|| self.inner.abort_transaction(id)).await
    }

    async fn commit_transaction(&self, id: TransactionId) -> Result<()> {
        self.guarded(|| self.inner.commit_transaction(id)).await
    }
}
