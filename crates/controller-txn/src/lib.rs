//! Nested transaction tree and output-commit pipeline for the Operation
//! Controller (C7, spec §4.6).

pub mod error;
pub mod pipeline;

pub use error::{CommitStage, Result, TxnError};
pub use pipeline::{CommitPipeline, CustomCommitHook, NoopCommitHook, TableCommitInputs, TeleportTarget};
