//! `OperationState` (spec §4.9): `Preparing -> Running -> (Failing ->)?
//! Finished`. Legal transitions only go forward; terminal calls are
//! idempotent once `Finished` is reached.

use std::fmt;

use controller_model::OperationId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalStatus {
    Completed,
    Failed { error: String },
    Aborted { error: String },
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Completed => write!(f, "Completed"),
            FinalStatus::Failed { error } => write!(f, "Failed({error})"),
            FinalStatus::Aborted { error } => write!(f, "Aborted({error})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    Preparing,
    Running,
    /// Graceful fail in progress: the scheduler has been asked to fail
    /// every joblet; a force-fail fires after `controller_fail_timeout`
    /// if jobs don't stop on their own (spec §5).
    Failing,
    Finished(FinalStatus),
}

impl OperationState {
    pub fn name(&self) -> &'static str {
        match self {
            OperationState::Preparing => "Preparing",
            OperationState::Running => "Running",
            OperationState::Failing => "Failing",
            OperationState::Finished(_) => "Finished",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, OperationState::Finished(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, OperationState::Running)
    }

    /// Only forward transitions are legal (spec §4.9); once `Finished`,
    /// every further transition is suppressed rather than rejected as an
    /// error, matching "terminal calls are idempotent."
    fn rank(&self) -> u8 {
        match self {
            OperationState::Preparing => 0,
            OperationState::Running => 1,
            OperationState::Failing => 2,
            OperationState::Finished(_) => 3,
        }
    }

    /// Attempts the transition to `next`; returns `false` (no-op) if
    /// `self` is already `Finished` or `next` would move backward.
    pub fn advance(&mut self, next: OperationState) -> bool {
        if self.is_finished() || next.rank() < self.rank() {
            return false;
        }
        *self = next;
        true
    }
}

/// Tags every log line and alert emitted by the state machine with the
/// operation id (spec §5: "logged with operation id").
pub fn op_span(operation_id: &OperationId) -> tracing::Span {
    tracing::info_span!("operation", id = %operation_id.0)
}
