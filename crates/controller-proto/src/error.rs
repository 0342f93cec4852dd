//! Errors from the external collaborator traits (spec §6, §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors a `Scheduler` or `Master` call can return. Distinguishes
/// transient (retryable) failures from permanent ones the way
/// `orbit_core_resilience::ResilienceError` does, so [`crate::resilient`]
/// can drive a circuit breaker off the same classification.
#[derive(Error, Debug, Clone)]
pub enum ProtoError {
    #[error("rpc to {collaborator} timed out after {timeout:?}")]
    Timeout {
        collaborator: &'static str,
        timeout: std::time::Duration,
    },

    #[error("{collaborator} unavailable: {detail}")]
    Unavailable {
        collaborator: &'static str,
        detail: String,
    },

    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("transaction {0} not found or already finalized")]
    TransactionNotFound(u64),

    #[error("{0}")]
    Permanent(String),
}

impl ProtoError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtoError::Timeout { .. } | ProtoError::Unavailable { .. }
        )
    }
}
