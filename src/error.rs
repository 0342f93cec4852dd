//! Error types for the `controller` binary's CLI/config/logging layer.
//!
//! Library crates under `crates/` each own a `thiserror` enum scoped to
//! their own concerns; this one covers only what's left once a request
//! reaches the wiring layer — bad config, bad CLI input, i/o failures
//! loading a spec or workload file. Anything a controller crate raises
//! flows through here via `#[from]` and is otherwise handled with
//! `anyhow` at the call site, matching the teacher's split between
//! library (`thiserror`) and binary (`anyhow`) error handling.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControllerError>;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as TOML: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] controller_core::CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
