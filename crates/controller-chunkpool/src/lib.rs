//! Chunk pools and input chunk mapping for the Operation Controller (spec §4.1, §C2).
//!
//! A [`pool::ChunkPool`] is the capability set every pool variant implements;
//! [`core::PoolCore`] is the shared bookkeeping (cookies, suspension counters,
//! job/weight counters) every variant builds on. [`mapping::InputChunkMapping`]
//! tracks chunk identity across relocation, independent of any one pool.

pub mod core;
pub mod mapping;
pub mod pool;
pub mod shuffle;
pub mod sink;
pub mod sorted;
pub mod unordered;

pub use core::PoolCore;
pub use mapping::InputChunkMapping;
pub use pool::{ChunkPool, ExtractionResult};
pub use shuffle::ShuffleChunkPool;
pub use sink::SinkChunkPool;
pub use sorted::SortedChunkPool;
pub use unordered::{OrderedChunkPool, UnorderedChunkPool};
