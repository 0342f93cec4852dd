//! The controller's transaction tree (spec §3.1, §4.6).
//!
//! `User` is ambient (started outside the controller) and contains
//! `Input`, `Output`, and `Debug`. `Async` holds live-preview nodes and is
//! never retried. `OutputCompletion`/`DebugCompletion` are short-lived
//! children created lazily before commit.

use crate::ids::TransactionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionRole {
    User,
    Input,
    Output,
    Debug,
    Async,
    OutputCompletion,
    DebugCompletion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionTree {
    /// Ambient, started outside the controller; never aborted by it.
    pub user: TransactionId,
    pub input: Option<TransactionId>,
    pub output: Option<TransactionId>,
    pub debug: Option<TransactionId>,
    pub r#async: Option<TransactionId>,
    pub output_completion: Option<TransactionId>,
    pub debug_completion: Option<TransactionId>,
}

impl TransactionTree {
    pub fn new(user: TransactionId) -> Self {
        Self {
            user,
            input: None,
            output: None,
            debug: None,
            r#async: None,
            output_completion: None,
            debug_completion: None,
        }
    }

    pub fn set(&mut self, role: TransactionRole, id: TransactionId) {
        match role {
            TransactionRole::User => self.user = id,
            TransactionRole::Input => self.input = Some(id),
            TransactionRole::Output => self.output = Some(id),
            TransactionRole::Debug => self.debug = Some(id),
            TransactionRole::Async => self.r#async = Some(id),
            TransactionRole::OutputCompletion => self.output_completion = Some(id),
            TransactionRole::DebugCompletion => self.debug_completion = Some(id),
        }
    }

    pub fn get(&self, role: TransactionRole) -> Option<TransactionId> {
        match role {
            TransactionRole::User => Some(self.user),
            TransactionRole::Input => self.input,
            TransactionRole::Output => self.output,
            TransactionRole::Debug => self.debug,
            TransactionRole::Async => self.r#async,
            TransactionRole::OutputCompletion => self.output_completion,
            TransactionRole::DebugCompletion => self.debug_completion,
        }
    }

    /// Roles whose abort must happen, in reverse creation order, when the
    /// operation fails before committing (spec §4.6 abort path). The user
    /// transaction is never included.
    pub fn abortable_in_order(&self) -> Vec<(TransactionRole, TransactionId)> {
        let mut out = Vec::new();
        for (role, id) in [
            (TransactionRole::DebugCompletion, self.debug_completion),
            (TransactionRole::OutputCompletion, self.output_completion),
            (TransactionRole::Debug, self.debug),
            (TransactionRole::Output, self.output),
            (TransactionRole::Async, self.r#async),
            (TransactionRole::Input, self.input),
        ] {
            if let Some(id) = id {
                out.push((role, id));
            }
        }
        out
    }
}
