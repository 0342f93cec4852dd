//! Shared data model for the Operation Controller.
//!
//! Types here are the passive vocabulary shared across the controller's
//! crates: chunk and stripe descriptors, output tables, the transaction
//! tree, job specs/summaries, and the memory-reserve digest. Behavior
//! (chunk pools, tasks, the scraper, the state machine) lives in the
//! crates that depend on this one.

pub mod chunk;
pub mod error;
pub mod ids;
pub mod job;
pub mod memory;
pub mod table;
pub mod transaction;

pub use chunk::{ChunkStripe, ChunkStripeList, DataSlice, ErasureCodec, InputChunk, Replica, SliceLimit};
pub use error::{ModelError, Result};
pub use ids::{
    CellTag, ChunkId, EdgeId, HandleAllocator, InputCookie, JobId, JobletId, NodeId, OperationId,
    OutputCookie, OutputTableId, PoolId, TaskGroupId, TaskId, TransactionId,
};
pub use job::{
    AbortReason, InterruptReason, JobSpec, JobSummary, ResourceLimits, ScheduleFailReason,
    SliceDescriptor, StartDescriptor, UserJobSpec,
};
pub use memory::MemoryDigest;
pub use table::{ChunkTreeEntry, OutputTable, UploadOptions};
pub use transaction::{TransactionRole, TransactionTree};
