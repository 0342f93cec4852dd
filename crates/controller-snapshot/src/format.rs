//! Binary snapshot encoding (spec §4.7), additive and versioned the way
//! `core_starmap`'s magic-header-plus-bincode format is: a fixed magic
//! and version prefix followed by a bincode-encoded body, so a newer
//! binary can still read an older snapshot as long as the body only grew
//! fields.

use controller_model::{OutputTable, TransactionTree};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapshotError};

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"OPCTLSNP";

/// Current snapshot schema version. Bump when a field is added; old
/// snapshots keep decoding as long as new fields have `#[serde(default)]`.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Everything an operation needs to resume from a checkpoint (spec
/// §4.7, §4.9 revival). `task_tree_payload` is an opaque bincode blob
/// owned by the caller (the task-tree state lives in `controller-task`,
/// which this crate does not depend on) — additive fields belong in the
/// caller's payload, not here, so this envelope's shape stays stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub version: u16,
    pub operation_id: String,
    pub transaction_tree: TransactionTree,
    pub output_tables: Vec<OutputTable>,
    pub task_tree_payload: Vec<u8>,
}

impl OperationSnapshot {
    pub fn new(
        operation_id: impl Into<String>,
        transaction_tree: TransactionTree,
        output_tables: Vec<OutputTable>,
        task_tree_payload: Vec<u8>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            operation_id: operation_id.into(),
            transaction_tree,
            output_tables,
            task_tree_payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(SNAPSHOT_MAGIC.len() + body.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SNAPSHOT_MAGIC.len() {
            return Err(SnapshotError::InvalidMagic {
                expected: SNAPSHOT_MAGIC.to_vec(),
                found: bytes.to_vec(),
            });
        }
        let (magic, body) = bytes.split_at(SNAPSHOT_MAGIC.len());
        if magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic {
                expected: SNAPSHOT_MAGIC.to_vec(),
                found: magic.to_vec(),
            });
        }

        let snapshot: OperationSnapshot =
            bincode::deserialize(body).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionTooNew {
                found: snapshot.version,
                max: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_model::CellTag;

    #[test]
    fn round_trips_through_encode_decode() {
        let tree = TransactionTree::new(controller_model::TransactionId(1));
        let table = OutputTable::new("//tmp/out", CellTag("cell-1".to_string()));
        let snapshot = OperationSnapshot::new("op-1", tree, vec![table], vec![1, 2, 3]);

        let bytes = snapshot.encode().unwrap();
        let decoded = OperationSnapshot::decode(&bytes).unwrap();
        assert_eq!(snapshot, decoded);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = OperationSnapshot::decode(b"not-a-snapshot-file").unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidMagic { .. }));
    }

    #[test]
    fn rejects_a_future_version() {
        let tree = TransactionTree::new(controller_model::TransactionId(1));
        let mut snapshot = OperationSnapshot::new("op-1", tree, vec![], vec![]);
        snapshot.version = SNAPSHOT_VERSION + 1;
        let bytes = snapshot.encode().unwrap();
        let err = OperationSnapshot::decode(&bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::VersionTooNew { .. }));
    }
}
