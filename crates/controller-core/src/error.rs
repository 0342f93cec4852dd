//! Errors the top-level state machine can raise, plus the distinction
//! between an error that just gets logged/alerted and one that forces a
//! state transition (spec §7's propagation rules).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Error kinds named by spec §7, independent of which collaborator
/// crate happened to detect them.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Task(#[from] controller_task::TaskError),

    #[error(transparent)]
    Txn(#[from] controller_txn::TxnError),

    #[error(transparent)]
    Snapshot(#[from] controller_snapshot::SnapshotError),

    #[error(transparent)]
    Proto(#[from] controller_proto::ProtoError),

    #[error(transparent)]
    Model(#[from] controller_model::ModelError),

    #[error("operation is not in a state that accepts this call (current: {current})")]
    NotRunning { current: &'static str },

    #[error("unknown task {0}")]
    UnknownTask(controller_model::TaskId),

    #[error("unknown job {0}: no task claims to own it")]
    UnknownJob(controller_model::JobId),

    #[error("revival rejected: fail_on_job_restart is set and a restart was attempted")]
    FailOnJobRestart,

    #[error("snapshot present but task_tree_payload failed to decode: {0}")]
    SnapshotPayloadCorrupt(String),

    #[error("assertion failure: {0}")]
    AssertionFailure(String),
}
