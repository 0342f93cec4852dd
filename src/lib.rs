/*!
 * `controller` — the wiring layer for the Operation Controller binary.
 *
 * Everything that implements the spec lives in the `controller-*`
 * crates under `crates/`; this crate only owns what's explicitly out of
 * scope there (spec §1, §6): CLI argument parsing, the on-disk
 * `ControllerSpec` config, and `tracing-subscriber` initialization.
 */

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ControllerSpec, LogLevel};
pub use error::{ControllerError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
