//! Master collaborator (spec §6): the metadata/storage service providing
//! Cypress tree nodes, transactions, chunk lists, and locks.

use async_trait::async_trait;
use controller_model::{CellTag, ChunkId, Replica, TransactionId};
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Snapshot,
    Shared,
    Exclusive,
}

/// Cypress node attributes the controller reads/writes (spec §6): a
/// loose bag rather than a fixed struct since the controller only ever
/// touches a handful of named attributes (`dynamic`, `schema`,
/// `chunk_count`, `compressed_data_size`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CypressNode {
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl CypressNode {
    pub fn attr(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Parameters returned by `GetUploadParams` before a `BeginUpload`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadParams {
    pub cell_tag: CellTag,
    pub max_children_per_attach_request: usize,
}

/// Final schema/statistics written by `EndUpload` (spec §4.6).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStatistics {
    pub row_count: u64,
    pub compressed_data_size: u64,
    pub uncompressed_data_size: u64,
    pub chunk_count: u64,
}

/// Result of a batched `LocateChunks` call (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkLocateResult {
    Available { chunk: ChunkId, replicas: Vec<Replica> },
    Unavailable { chunk: ChunkId },
    Missing { chunk: ChunkId },
}

impl ChunkLocateResult {
    pub fn chunk(&self) -> ChunkId {
        match self {
            ChunkLocateResult::Available { chunk, .. }
            | ChunkLocateResult::Unavailable { chunk }
            | ChunkLocateResult::Missing { chunk } => *chunk,
        }
    }
}

/// Collaborator interface to the Master metadata service (spec §6).
#[async_trait]
pub trait Master: Send + Sync {
    // --- Cypress ---
    async fn get_node(&self, path: &str) -> Result<CypressNode>;
    async fn set_node(&self, path: &str, attributes: serde_json::Value) -> Result<()>;
    async fn create_node(&self, path: &str, node_type: &str) -> Result<()>;
    async fn remove_node(&self, path: &str) -> Result<()>;
    async fn lock_node(&self, path: &str, txn: TransactionId, mode: LockMode) -> Result<()>;
    async fn copy_node(&self, src: &str, dst: &str) -> Result<()>;

    // --- Chunk service ---
    /// Attach a batch of chunk tree ids to `parent`, bounded by
    /// `UploadParams::max_children_per_attach_request` on the caller's
    /// side (spec §4.6).
    async fn attach_chunk_trees(&self, parent: u64, children: Vec<u64>) -> Result<()>;
    async fn get_upload_params(&self, table_path: &str) -> Result<UploadParams>;
    async fn begin_upload(&self, table_path: &str, scope_txn: TransactionId) -> Result<TransactionId>;
    async fn end_upload(
        &self,
        table_path: &str,
        upload_txn: TransactionId,
        stats: TableStatistics,
    ) -> Result<()>;
    async fn teleport_chunk(&self, chunk: ChunkId, destination_cell: CellTag) -> Result<()>;
    async fn locate_chunks(&self, chunks: Vec<ChunkId>) -> Result<Vec<ChunkLocateResult>>;

    /// Reference-release one intermediate stripe list once a snapshot
    /// covering it has been taken; the chunks themselves are untouched,
    /// only the controller's staging reference is dropped (spec §4.7).
    async fn unstage_chunk_list(&self, chunk_list_id: u64) -> Result<()>;
    /// Recursively unstage a chunk tree (spec §4.7), releasing the
    /// controller's reference to every chunk it covers.
    async fn unstage_chunk_tree(&self, chunk_tree_id: u64) -> Result<()>;

    // --- Transactions ---
    async fn start_transaction(
        &self,
        parent: Option<TransactionId>,
        timeout: Duration,
    ) -> Result<TransactionId>;
    async fn abort_transaction(&self, id: TransactionId) -> Result<()>;
    async fn commit_transaction(&self, id: TransactionId) -> Result<()>;
}
