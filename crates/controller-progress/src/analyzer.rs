//! Periodic analyzers (spec §4.10): a small set of checks run on a timer
//! against the operation's accumulated progress and job statistics,
//! each producing zero or one [`Alert`].
//!
//! Each analyzer takes a snapshot rather than the live state so the
//! controller's single-writer invoker can compute a snapshot once per
//! tick and fan it out, instead of every analyzer re-reading shared
//! state independently.

use crate::alerts::{Alert, AlertKind};
use crate::counter::ProgressCounter;
use crate::histogram::InputWeightHistograms;
use serde_json::json;

/// Everything an analyzer pass needs, gathered once per tick.
#[derive(Debug, Clone, Default)]
pub struct OperationSnapshot {
    pub counters: ProgressCounter,
    pub weights: InputWeightHistograms,
    pub tmpfs_requested_bytes: u64,
    pub tmpfs_used_bytes: u64,
    pub unavailable_chunk_count: u64,
    pub lost_intermediate_chunk_count: u64,
    pub aborted_job_cpu_seconds: f64,
    pub total_job_cpu_seconds: f64,
    pub disk_io_wait_fraction: f64,
    pub observed_cpu_fraction: f64,
    pub mean_job_duration_secs: f64,
    pub short_job_threshold_secs: f64,
    pub schedule_job_throttled_count: u64,
    pub schedule_job_attempt_count: u64,
}

const TMPFS_UNDERUSE_THRESHOLD: f64 = 0.10;
const ABORTED_TIME_RATIO_THRESHOLD: f64 = 0.25;
const DISK_IO_WOODPECKER_THRESHOLD: f64 = 0.80;
const LOW_CPU_THRESHOLD: f64 = 0.20;
const THROTTLING_RATIO_THRESHOLD: f64 = 0.30;
const ETA_UNRELIABLE_RATIO_LOW: f64 = 0.5;
const ETA_UNRELIABLE_RATIO_HIGH: f64 = 2.0;

/// Run every analyzer against a snapshot and return the alerts that
/// fired. An analyzer that finds nothing wrong contributes nothing —
/// callers diff against the previously-active set to decide what to
/// clear.
pub fn run_all(snapshot: &OperationSnapshot) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if let Some(a) = tmpfs_underuse(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = unavailable_chunks_present(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = lost_intermediates(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = aborted_job_time_ratio(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = disk_io_woodpecker(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = low_cpu_usage(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = short_job_duration(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = job_spec_throttling(snapshot) {
        alerts.push(a);
    }
    if let Some(a) = estimated_operation_duration(snapshot) {
        alerts.push(a);
    }
    alerts
}

fn tmpfs_underuse(s: &OperationSnapshot) -> Option<Alert> {
    if s.tmpfs_requested_bytes == 0 {
        return None;
    }
    let ratio = s.tmpfs_used_bytes as f64 / s.tmpfs_requested_bytes as f64;
    if ratio < TMPFS_UNDERUSE_THRESHOLD {
        Some(Alert::raise(
            AlertKind::TmpfsUnderused,
            format!("tmpfs usage at {:.1}% of request", ratio * 100.0),
            json!({"requested_bytes": s.tmpfs_requested_bytes, "used_bytes": s.tmpfs_used_bytes}),
        ))
    } else {
        None
    }
}

fn unavailable_chunks_present(s: &OperationSnapshot) -> Option<Alert> {
    if s.unavailable_chunk_count > 0 {
        Some(Alert::raise(
            AlertKind::UnavailableChunksPresent,
            format!("{} chunks currently unavailable", s.unavailable_chunk_count),
            json!({"unavailable_chunk_count": s.unavailable_chunk_count}),
        ))
    } else {
        None
    }
}

fn lost_intermediates(s: &OperationSnapshot) -> Option<Alert> {
    if s.lost_intermediate_chunk_count > 0 {
        Some(Alert::raise(
            AlertKind::LostIntermediateChunks,
            format!("{} intermediate chunks lost", s.lost_intermediate_chunk_count),
            json!({"lost_intermediate_chunk_count": s.lost_intermediate_chunk_count}),
        ))
    } else {
        None
    }
}

fn aborted_job_time_ratio(s: &OperationSnapshot) -> Option<Alert> {
    if s.total_job_cpu_seconds == 0.0 {
        return None;
    }
    let ratio = s.aborted_job_cpu_seconds / s.total_job_cpu_seconds;
    if ratio > ABORTED_TIME_RATIO_THRESHOLD {
        Some(Alert::raise(
            AlertKind::AbortedJobsTimeRatioHigh,
            format!("{:.1}% of job CPU time spent on aborted jobs", ratio * 100.0),
            json!({"ratio": ratio}),
        ))
    } else {
        None
    }
}

fn disk_io_woodpecker(s: &OperationSnapshot) -> Option<Alert> {
    if s.disk_io_wait_fraction > DISK_IO_WOODPECKER_THRESHOLD {
        Some(Alert::raise(
            AlertKind::DiskIoWoodpecker,
            format!("disk I/O wait at {:.1}%", s.disk_io_wait_fraction * 100.0),
            json!({"disk_io_wait_fraction": s.disk_io_wait_fraction}),
        ))
    } else {
        None
    }
}

fn low_cpu_usage(s: &OperationSnapshot) -> Option<Alert> {
    if s.counters.running > 0 && s.observed_cpu_fraction < LOW_CPU_THRESHOLD {
        Some(Alert::raise(
            AlertKind::LowCpuUsagePerJobType,
            format!("observed CPU usage at {:.1}%", s.observed_cpu_fraction * 100.0),
            json!({"observed_cpu_fraction": s.observed_cpu_fraction}),
        ))
    } else {
        None
    }
}

fn short_job_duration(s: &OperationSnapshot) -> Option<Alert> {
    if s.counters.completed > 0 && s.mean_job_duration_secs < s.short_job_threshold_secs {
        Some(Alert::raise(
            AlertKind::ShortJobsDuration,
            format!(
                "mean job duration {:.1}s is below the {:.1}s threshold",
                s.mean_job_duration_secs, s.short_job_threshold_secs
            ),
            json!({"mean_job_duration_secs": s.mean_job_duration_secs}),
        ))
    } else {
        None
    }
}

fn job_spec_throttling(s: &OperationSnapshot) -> Option<Alert> {
    if s.schedule_job_attempt_count == 0 {
        return None;
    }
    let ratio = s.schedule_job_throttled_count as f64 / s.schedule_job_attempt_count as f64;
    if ratio > THROTTLING_RATIO_THRESHOLD {
        Some(Alert::raise(
            AlertKind::JobSpecThrottling,
            format!("{:.1}% of ScheduleJob attempts throttled", ratio * 100.0),
            json!({"ratio": ratio}),
        ))
    } else {
        None
    }
}

/// Compares actual vs. estimated input data weight; an estimate that's
/// off by 2x in either direction makes the operation's completion ETA
/// unreliable (spec §4.10's "estimated-operation-duration" analyzer).
fn estimated_operation_duration(s: &OperationSnapshot) -> Option<Alert> {
    let ratio = s.weights.mean_ratio()?;
    if !(ETA_UNRELIABLE_RATIO_LOW..=ETA_UNRELIABLE_RATIO_HIGH).contains(&ratio) {
        Some(Alert::raise(
            AlertKind::OperationCompletionEtaUnreliable,
            format!("actual/estimated input weight ratio is {:.2}", ratio),
            json!({"actual_to_estimated_ratio": ratio}),
        ))
    } else {
        None
    }
}
