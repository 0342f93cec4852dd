//! Errors raised by a `Task` or `TaskGroup` mutation.

use controller_model::ModelError;
use controller_progress::CounterError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error("job {0} has no joblet or completed-job record on this task")]
    UnknownJob(controller_model::JobId),

    #[error("edge {0} is not attached to this task")]
    UnknownEdge(controller_model::EdgeId),
}
