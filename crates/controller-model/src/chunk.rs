//! Input chunk, data slice, and stripe types (spec §3.1).

use crate::ids::{ChunkId, NodeId};
use serde::{Deserialize, Serialize};

/// Erasure coding scheme applied to a chunk, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErasureCodec {
    None,
    ReedSolomon6_3,
    Lrc12_2_2,
}

/// One replica location of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub node: NodeId,
    pub index: u8,
}

/// Immutable descriptor of one stored data chunk.
///
/// Reference-counted and owned by whichever Task first added it to a pool;
/// `controller-model` only carries the passive fields, ref-counting is the
/// owning pool's responsibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputChunk {
    pub id: ChunkId,
    pub replicas: Vec<Replica>,
    pub row_count: u64,
    pub byte_size: u64,
    pub data_weight: u64,
    pub lower_boundary_key: Option<Vec<u8>>,
    pub upper_boundary_key: Option<Vec<u8>>,
    pub erasure_codec: ErasureCodec,
    pub table_index: u32,
}

impl InputChunk {
    pub fn is_sorted_chunk(&self) -> bool {
        self.lower_boundary_key.is_some() && self.upper_boundary_key.is_some()
    }

    /// Minimal erasure replica count needed before the chunk is considered
    /// available (used by the scraper, §4.5).
    pub fn min_available_replicas(&self) -> usize {
        match self.erasure_codec {
            ErasureCodec::None => 1,
            ErasureCodec::ReedSolomon6_3 => 6,
            ErasureCodec::Lrc12_2_2 => 12,
        }
    }
}

/// Bound on a DataSlice: by key, row index, or chunk index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceLimit {
    Key(Vec<u8>),
    RowIndex(u64),
    ChunkIndex(u32),
}

/// A (possibly versioned) view over one or more chunks with a
/// lower/upper limit. The unit of data a single job can consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSlice {
    pub chunks: Vec<ChunkId>,
    pub lower_limit: SliceLimit,
    pub upper_limit: SliceLimit,
    pub row_count: u64,
    pub data_weight: u64,
    /// Identifies the logical stripe this slice came from; used by
    /// interrupt-and-resume to reconstruct remaining work (spec §4.3).
    pub tag: u64,
}

impl DataSlice {
    pub fn new(chunks: Vec<ChunkId>, lower: SliceLimit, upper: SliceLimit, tag: u64) -> Self {
        Self {
            chunks,
            lower_limit: lower,
            upper_limit: upper,
            row_count: 0,
            data_weight: 0,
            tag,
        }
    }
}

/// A set of DataSlices forming one job's input, possibly per-table.
///
/// `waiting_chunk_count` tracks how many of the slice's chunks are
/// currently suspended (unavailable); the stripe is ready to be extracted
/// iff this count is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStripe {
    pub slices: Vec<DataSlice>,
    pub waiting_chunk_count: u32,
}

impl ChunkStripe {
    pub fn new(slices: Vec<DataSlice>) -> Self {
        Self {
            slices,
            waiting_chunk_count: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.waiting_chunk_count == 0
    }

    pub fn data_weight(&self) -> u64 {
        self.slices.iter().map(|s| s.data_weight).sum()
    }

    pub fn row_count(&self) -> u64 {
        self.slices.iter().map(|s| s.row_count).sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.slices.iter().map(|s| s.chunks.len()).sum()
    }
}

/// Ordered list of stripes handed to one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStripeList {
    pub stripes: Vec<ChunkStripe>,
    pub total_data_weight: u64,
    pub total_row_count: u64,
    pub total_chunk_count: u32,
    pub local_chunk_count: u32,
    pub remote_chunk_count: u32,
}

impl ChunkStripeList {
    pub fn from_stripes(stripes: Vec<ChunkStripe>) -> Self {
        let total_data_weight = stripes.iter().map(|s| s.data_weight()).sum();
        let total_row_count = stripes.iter().map(|s| s.row_count()).sum();
        let total_chunk_count = stripes.iter().map(|s| s.chunk_count() as u32).sum();
        Self {
            stripes,
            total_data_weight,
            total_row_count,
            total_chunk_count,
            local_chunk_count: 0,
            remote_chunk_count: 0,
        }
    }
}
