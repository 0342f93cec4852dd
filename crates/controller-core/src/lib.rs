//! The Operation Controller's top-level state machine (C11, spec §4.9).
//!
//! Every other crate in this workspace is a collaborator wired together
//! here: [`arena::TaskArena`] owns the operation's tasks and chunk-list
//! budget, [`controller::OperationController`] drives the scheduling
//! loop and routes terminal job reports, and [`state::OperationState`]
//! is the `Preparing -> Running -> (Failing ->)? Finished` walk the
//! whole thing is built around.

pub mod arena;
pub mod controller;
pub mod error;
pub mod spec;
pub mod state;

pub use arena::{ArenaPoolView, ChunkListBroker, TaskArena};
pub use controller::OperationController;
pub use error::{CoreError, Result};
pub use spec::{OperationSpec, UnavailableChunkPolicy};
pub use state::{op_span, FinalStatus, OperationState};
