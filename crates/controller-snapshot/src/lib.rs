//! Snapshot encoding and release queues for the Operation Controller
//! (C8, spec §4.7).

pub mod error;
pub mod format;
pub mod queue;
pub mod release;

pub use error::{Result, SnapshotError};
pub use format::{OperationSnapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use queue::{Checkpoint, ReleaseQueue};
pub use release::{JobSpecArchiveRequest, JobSpecArchiver, NoopArchiver, ReleaseCoordinator, SnapshotCheckpoints};
