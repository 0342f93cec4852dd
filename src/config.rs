//! `ControllerSpec`: the on-disk config schema for one operation,
//! loaded once at `Prepare` time (spec §6, SPEC_FULL §A). Covers exactly
//! the surface `controller_core::OperationSpec` consumes — timeouts,
//! job counts, limits, auto-merge mode, unavailable-chunk policy,
//! `fail_on_job_restart`, testing delays — the same way
//! `orbit_core_manifest::FlightPlan` is a typed, defaulted manifest
//! loaded from a single file rather than assembled from scattered flags.

use std::path::Path;
use std::time::Duration;

use controller_automerge::AutoMergeMode;
use controller_core::{OperationSpec, UnavailableChunkPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

/// TOML-serializable mirror of `OperationSpec`. Durations are plain
/// seconds/milliseconds fields rather than `std::time::Duration`'s own
/// serde form, so a config file reads as plain integers instead of
/// `{ secs = 300, nanos = 0 }` tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSpec {
    pub prepare_timeout_secs: u64,
    pub controller_fail_timeout_secs: u64,
    pub scheduling_iteration_timeout_ms: u64,
    pub rpc_timeout_secs: u64,
    pub max_failed_job_count: u32,
    pub unavailable_chunk_policy: UnavailableChunkPolicy,
    pub fail_on_job_restart: bool,
    pub auto_merge_mode: AutoMergeMode,
    pub auto_merge_manual_cap: u64,
    pub estimated_output_chunk_count: u64,
    pub memory_reserve_quantile: f64,
    pub testing_delay_before_schedule_ms: u64,
    pub testing_delay_before_commit_ms: u64,
    pub log_level: LogLevel,
    pub log_file: Option<std::path::PathBuf>,
}

impl Default for ControllerSpec {
    fn default() -> Self {
        let defaults = OperationSpec::default();
        Self {
            prepare_timeout_secs: defaults.prepare_timeout.as_secs(),
            controller_fail_timeout_secs: defaults.controller_fail_timeout.as_secs(),
            scheduling_iteration_timeout_ms: defaults.scheduling_iteration_timeout.as_millis() as u64,
            rpc_timeout_secs: defaults.rpc_timeout.as_secs(),
            max_failed_job_count: defaults.max_failed_job_count,
            unavailable_chunk_policy: defaults.unavailable_chunk_policy,
            fail_on_job_restart: defaults.fail_on_job_restart,
            auto_merge_mode: defaults.auto_merge_mode,
            auto_merge_manual_cap: defaults.auto_merge_manual_cap,
            estimated_output_chunk_count: defaults.estimated_output_chunk_count,
            memory_reserve_quantile: defaults.memory_reserve_quantile,
            testing_delay_before_schedule_ms: defaults.testing_delay_before_schedule.as_millis() as u64,
            testing_delay_before_commit_ms: defaults.testing_delay_before_commit.as_millis() as u64,
            log_level: LogLevel::Info,
            log_file: None,
        }
    }
}

impl ControllerSpec {
    /// Load a spec from a TOML file, falling back to built-in defaults
    /// for any field the file omits (`#[serde(default)]` on the whole
    /// struct covers a file that only overrides a handful of fields).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ControllerError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ControllerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ControllerError::ConfigParse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.memory_reserve_quantile) {
            return Err(ControllerError::InvalidConfig(format!(
                "memory_reserve_quantile must be in [0, 1], got {}",
                self.memory_reserve_quantile
            )));
        }
        if self.rpc_timeout_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "rpc_timeout_secs must be nonzero".into(),
            ));
        }
        Ok(())
    }

    /// Build the `controller_core::OperationSpec` this config describes.
    pub fn to_operation_spec(&self) -> OperationSpec {
        OperationSpec {
            prepare_timeout: Duration::from_secs(self.prepare_timeout_secs),
            controller_fail_timeout: Duration::from_secs(self.controller_fail_timeout_secs),
            scheduling_iteration_timeout: Duration::from_millis(self.scheduling_iteration_timeout_ms),
            rpc_timeout: Duration::from_secs(self.rpc_timeout_secs),
            max_failed_job_count: self.max_failed_job_count,
            unavailable_chunk_policy: self.unavailable_chunk_policy,
            fail_on_job_restart: self.fail_on_job_restart,
            auto_merge_mode: self.auto_merge_mode,
            auto_merge_manual_cap: self.auto_merge_manual_cap,
            estimated_output_chunk_count: self.estimated_output_chunk_count,
            memory_reserve_quantile: self.memory_reserve_quantile,
            testing_delay_before_schedule: Duration::from_millis(self.testing_delay_before_schedule_ms),
            testing_delay_before_commit: Duration::from_millis(self.testing_delay_before_commit_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operation_spec_defaults() {
        let spec = ControllerSpec::default();
        let operation_spec = spec.to_operation_spec();
        assert_eq!(operation_spec.max_failed_job_count, 10);
        assert_eq!(operation_spec.memory_reserve_quantile, 0.95);
        assert_eq!(operation_spec.rpc_timeout, Duration::from_secs(30));
    }

    #[test]
    fn validate_rejects_out_of_range_quantile() {
        let mut spec = ControllerSpec::default();
        spec.memory_reserve_quantile = 1.5;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn load_rejects_a_missing_file() {
        let err = ControllerSpec::load(Path::new("/nonexistent/controller.toml")).unwrap_err();
        assert!(matches!(err, ControllerError::ConfigNotFound(_)));
    }

    #[test]
    fn round_trips_through_toml() {
        let spec = ControllerSpec::default();
        let text = toml::to_string(&spec).unwrap();
        let parsed: ControllerSpec = toml::from_str(&text).unwrap();
        assert_eq!(parsed.max_failed_job_count, spec.max_failed_job_count);
    }
}
