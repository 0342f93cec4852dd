//! Controller alerts: named, structured conditions raised by the
//! periodic analyzers (spec §4.10) and surfaced both as `tracing` events
//! and as Prometheus counters, following the metrics style of
//! [`orbit_observability::metrics`].

use chrono::{DateTime, Utc};
use orbit_observability::{EventPayload, OrbitEvent};
use prometheus::{CounterVec, Opts, Registry};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The fixed set of alerts the controller can raise about an operation.
/// Named after the condition, not the analyzer that found it, since an
/// alert outlives any one analyzer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    TmpfsUnderused,
    UnavailableChunksPresent,
    LostIntermediateChunks,
    AbortedJobsTimeRatioHigh,
    DiskIoWoodpecker,
    LowCpuUsagePerJobType,
    ShortJobsDuration,
    OperationCompletionEtaUnreliable,
    JobSpecThrottling,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::TmpfsUnderused => "tmpfs_underused",
            AlertKind::UnavailableChunksPresent => "unavailable_chunks_present",
            AlertKind::LostIntermediateChunks => "lost_intermediate_chunks",
            AlertKind::AbortedJobsTimeRatioHigh => "aborted_jobs_time_ratio_high",
            AlertKind::DiskIoWoodpecker => "disk_io_woodpecker",
            AlertKind::LowCpuUsagePerJobType => "low_cpu_usage_per_job_type",
            AlertKind::ShortJobsDuration => "short_jobs_duration",
            AlertKind::OperationCompletionEtaUnreliable => "operation_completion_eta_unreliable",
            AlertKind::JobSpecThrottling => "job_spec_throttling",
        }
    }
}

/// A raised (or cleared) alert, with enough context to explain itself
/// without the reader needing to re-run the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub raised_at: DateTime<Utc>,
    pub active: bool,
    pub detail: String,
    pub attributes: serde_json::Value,
}

impl Alert {
    pub fn raise(kind: AlertKind, detail: impl Into<String>, attributes: serde_json::Value) -> Self {
        let alert = Self {
            kind,
            raised_at: Utc::now(),
            active: true,
            detail: detail.into(),
            attributes,
        };
        alert.emit();
        metrics::inc_alert(kind);
        alert
    }

    pub fn clear(kind: AlertKind, detail: impl Into<String>) -> Self {
        let alert = Self {
            kind,
            raised_at: Utc::now(),
            active: false,
            detail: detail.into(),
            attributes: serde_json::Value::Null,
        };
        alert.emit();
        alert
    }

    fn emit(&self) {
        if self.active {
            tracing::warn!(
                alert = self.kind.as_str(),
                detail = %self.detail,
                attributes = %self.attributes,
                "controller alert raised"
            );
        } else {
            tracing::info!(
                alert = self.kind.as_str(),
                detail = %self.detail,
                "controller alert cleared"
            );
        }
    }

    /// Project this alert onto the workspace's unified event schema so it
    /// can flow through the same audit chain as everything else the
    /// operation does, instead of a bespoke alert-only sink.
    pub fn to_event(&self) -> OrbitEvent {
        OrbitEvent::new(EventPayload::Custom {
            event_type: format!("controller_alert.{}", self.kind.as_str()),
            data: serde_json::json!({
                "active": self.active,
                "detail": self.detail,
                "attributes": self.attributes,
            }),
        })
    }
}

/// Prometheus counters for alerts, following the `OnceLock<CounterVec>`
/// registration style used across the workspace's observability crate.
pub mod metrics {
    use super::*;

    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    static ALERTS_RAISED_TOTAL: OnceLock<CounterVec> = OnceLock::new();

    fn registry() -> &'static Registry {
        REGISTRY.get_or_init(Registry::new)
    }

    pub(crate) fn alerts_raised_total() -> &'static CounterVec {
        ALERTS_RAISED_TOTAL.get_or_init(|| {
            let counter = CounterVec::new(
                Opts::new(
                    "controller_alerts_raised_total",
                    "Total number of controller alerts raised, by kind",
                ),
                &["kind"],
            )
            .expect("failed to create controller_alerts_raised_total");
            registry()
                .register(Box::new(counter.clone()))
                .expect("failed to register controller_alerts_raised_total");
            counter
        })
    }

    pub fn inc_alert(kind: AlertKind) {
        alerts_raised_total()
            .with_label_values(&[kind.as_str()])
            .inc();
    }
}
