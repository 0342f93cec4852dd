//! Progress tracking for the Operation Controller.
//!
//! This crate owns the small pieces of bookkeeping the rest of the
//! controller is built on top of: the conservation-preserving job
//! counter, estimated/actual input-weight histograms, and the periodic
//! analyzers that turn accumulated progress into operator-facing alerts
//! (spec §4.10).

pub mod alerts;
pub mod analyzer;
pub mod counter;
pub mod histogram;

pub use alerts::{Alert, AlertKind};
pub use analyzer::{run_all as run_analyzers, OperationSnapshot};
pub use counter::{CounterError, ProgressCounter};
pub use histogram::{DataWeightHistogram, InputWeightHistograms};
