use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot magic header mismatch: expected {expected:?}, found {found:?}")]
    InvalidMagic { expected: Vec<u8>, found: Vec<u8> },

    #[error("snapshot version {found} is newer than the newest version this binary understands ({max})")]
    VersionTooNew { found: u16, max: u16 },

    #[error("snapshot encode failed: {0}")]
    Encode(String),

    #[error("snapshot decode failed: {0}")]
    Decode(String),

    #[error("release RPC failed: {0}")]
    Release(#[from] controller_proto::ProtoError),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
