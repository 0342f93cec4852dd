//! Output table bookkeeping (spec §3.1, §4.6).

use crate::ids::{CellTag, TransactionId};
use serde::{Deserialize, Serialize};

/// Schema + upload options for one output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    pub compression_codec: String,
    pub erasure_codec: String,
    pub optimize_for: String,
    /// Applies only to stderr/core tables.
    pub part_size: Option<u64>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            compression_codec: "none".to_string(),
            erasure_codec: "none".to_string(),
            optimize_for: "lookup".to_string(),
            part_size: None,
        }
    }
}

/// One (key, chunk-tree-id) pair accumulated during execution, ordered by
/// either boundary key (sorted output) or recorded output-order entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTreeEntry {
    pub min_key: Option<Vec<u8>>,
    pub max_key: Option<Vec<u8>>,
    pub chunk_tree_id: u64,
    /// Position in the recorded output order, when `GetOutputOrder` is
    /// honored instead of key-sort (spec §4.6).
    pub output_order_index: Option<u64>,
}

/// Target path; schema + upload options; an ordered bag of chunk trees
/// accumulated during execution, resolved at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    pub path: String,
    pub schema_is_sorted: bool,
    pub unique_keys: bool,
    pub upload_options: UploadOptions,
    pub upload_transaction_id: Option<TransactionId>,
    pub result_chunk_list_id: Option<u64>,
    pub chunk_trees: Vec<ChunkTreeEntry>,
    pub cell_tag: CellTag,
}

impl OutputTable {
    pub fn new(path: impl Into<String>, cell_tag: CellTag) -> Self {
        Self {
            path: path.into(),
            schema_is_sorted: false,
            unique_keys: false,
            upload_options: UploadOptions::default(),
            upload_transaction_id: None,
            result_chunk_list_id: None,
            chunk_trees: Vec::new(),
            cell_tag,
        }
    }

    pub fn record_chunk_tree(&mut self, entry: ChunkTreeEntry) {
        self.chunk_trees.push(entry);
    }

    /// Sorts accumulated chunk trees by `GetOutputOrder()` entries when
    /// present, else by min boundary key (spec §4.6 AttachOutputChunks).
    /// Returns an error string describing an overlap or duplicate-key
    /// violation instead of panicking, so the caller can fail the commit.
    pub fn resolve_commit_order(&mut self) -> Result<(), String> {
        if self.chunk_trees.iter().all(|e| e.output_order_index.is_some()) {
            self.chunk_trees.sort_by_key(|e| e.output_order_index.unwrap());
            return Ok(());
        }

        if !self.schema_is_sorted {
            return Ok(());
        }

        self.chunk_trees.sort_by(|a, b| a.min_key.cmp(&b.min_key));

        for pair in self.chunk_trees.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            match (&a.max_key, &b.min_key) {
                (Some(a_max), Some(b_min)) => {
                    if self.unique_keys {
                        if a_max >= b_min {
                            return Err(format!(
                                "duplicate or overlapping key between chunk trees {} and {}",
                                a.chunk_tree_id, b.chunk_tree_id
                            ));
                        }
                    } else if a_max > b_min {
                        return Err(format!(
                            "boundary key overlap between chunk trees {} and {}",
                            a.chunk_tree_id, b.chunk_tree_id
                        ));
                    }
                }
                _ => continue,
            }
        }

        Ok(())
    }
}
