use thiserror::Error;

/// What the commit pipeline was doing when it failed (spec §4.6's
/// stage order), attached to the underlying cause so an abort can be
/// logged against the stage it interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    StartOutputCompletion,
    BeginUploadAll,
    TeleportChunks,
    AttachOutputChunks,
    EndUploadAll,
    CustomCommit,
    CommitOutputCompletion,
    CommitDebugCompletion,
    CommitTransactions,
}

impl std::fmt::Display for CommitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommitStage::StartOutputCompletion => "StartOutputCompletion",
            CommitStage::BeginUploadAll => "BeginUploadAll",
            CommitStage::TeleportChunks => "TeleportChunks",
            CommitStage::AttachOutputChunks => "AttachOutputChunks",
            CommitStage::EndUploadAll => "EndUploadAll",
            CommitStage::CustomCommit => "CustomCommit",
            CommitStage::CommitOutputCompletion => "CommitOutputCompletion",
            CommitStage::CommitDebugCompletion => "CommitDebugCompletion",
            CommitStage::CommitTransactions => "CommitTransactions",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TxnError {
    #[error("commit pipeline failed at {stage}: {source}")]
    Stage {
        stage: CommitStage,
        #[source]
        source: controller_proto::ProtoError,
    },

    #[error("output table {0} failed to resolve a commit order: {1}")]
    CommitOrder(String, String),

    #[error("output table {0} has no result chunk list id to attach to")]
    MissingChunkListId(String),

    #[error("transaction tree has no {0} transaction recorded")]
    MissingTransaction(&'static str),
}

pub type Result<T> = std::result::Result<T, TxnError>;
