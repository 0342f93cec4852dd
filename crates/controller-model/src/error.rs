//! Error types shared by the controller's data model.

use crate::ids::{ChunkId, InputCookie, OutputCookie};
use thiserror::Error;

/// Result type used across the `controller-model` crate.
pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("input cookie {0} is not pending")]
    CookieNotPending(InputCookie),

    #[error("output cookie {0} already finalized")]
    OutputCookieAlreadyFinalized(OutputCookie),

    #[error("double-lost output cookie {0}: a cookie may only be lost once")]
    DoubleLost(OutputCookie),

    #[error("chunk {0} referenced but not registered with the pool")]
    UnknownChunk(ChunkId),

    #[error("stripe list is empty")]
    EmptyStripeList,

    #[error("boundary key ordering violated: {0}")]
    BoundaryKeyOrderViolation(String),

    #[error("duplicate key detected and unique_keys is set: {0}")]
    DuplicateKey(String),

    #[error("{0}")]
    Other(String),
}
