//! Health Monitor: Continuous mid-transfer health checks
//!
//! Unlike pre-flight checks that run once before transfer, the health monitor
//! runs periodically during transfer to detect degrading conditions early:
//! - Disk fill rate trending toward full
//! - Network throughput dropping below threshold
//! - Memory pressure rising
//! - Source/destination becoming unreachable
//!
//! # Design
//!
//! The health monitor is a pure-logic state machine. It receives health
//! samples from the caller and produces advisories. The caller is responsible
//! for collecting the actual system metrics and acting on advisories.
//!
//! # Example
//!
//! ```
//! use orbit_core_resilience::health_monitor::{HealthMonitor, HealthSample, HealthConfig, Advisory};
//!
//! let config = HealthConfig {
//!     disk_critical_pct: 95.0,
//!     disk_warning_pct: 85.0,
//!     throughput_floor_bps: 1_000_000, // 1 MB/s minimum
//!     check_interval_secs: 30,
//! };
//!
//! let mut monitor = HealthMonitor::new(config);
//!
//! // Feed a health sample
//! let advisories = monitor.check(HealthSample {
//!     disk_used_pct: 96.0,
//!     throughput_bps: 500_000,
//!     memory_used_pct: 70.0,
//!     active_errors: 2,
//!     ..Default::default()
//! });
//!
//! // Monitor produces advisories
//! assert!(advisories.iter().any(|a| matches!(a, Advisory::DiskCritical { .. })));
//! ```

use std::collections::VecDeque;
use std::time::Instant;

/// Configuration for health monitoring thresholds
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Disk usage percentage that triggers a critical advisory (pause transfer)
    pub disk_critical_pct: f64,

    /// Disk usage percentage that triggers a warning advisory
    pub disk_warning_pct: f64,

    /// Minimum throughput in bytes/sec — below this triggers a warning
    pub throughput_floor_bps: u64,

    /// How often checks should be performed (guidance for the caller)
    pub check_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            disk_critical_pct: 95.0,
            disk_warning_pct: 85.0,
            throughput_floor_bps: 100_000, // 100 KB/s
            check_interval_secs: 30,
        }
    }
}

/// A snapshot of system health metrics
#[derive(Debug, Clone, Default)]
pub struct HealthSample {
    /// Destination disk usage as a percentage (0.0 - 100.0)
    pub disk_used_pct: f64,

    /// Current throughput in bytes per second
    pub throughput_bps: u64,

    /// System memory usage as a percentage (0.0 - 100.0)
    pub memory_used_pct: f64,

    /// Number of errors in the current sample window
    pub active_errors: u32,

    /// Available disk space in bytes (optional, for trending)
    pub disk_available_bytes: Option<u64>,
}

/// Advisory produced by the health monitor
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    /// Disk usage is critical — should pause transfer
    DiskCritical { used_pct: f64 },

    /// Disk usage is elevated — should alert operator
    DiskWarning { used_pct: f64 },

    /// Disk fill rate predicts exhaustion within N seconds
    DiskExhaustionPredicted { seconds_remaining: f64 },

    /// Throughput has dropped below the configured floor
    ThroughputLow { current_bps: u64, floor_bps: u64 },

    /// Error rate is elevated
    ErrorRateHigh { errors: u32, window_secs: u64 },

    /// System is healthy — no issues detected
    Healthy,
}

/// Continuous health monitor that produces advisories from health samples.
#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthConfig,
    /// Recent disk available bytes for fill-rate prediction
    disk_history: VecDeque<(Instant, u64)>,
    /// Maximum samples to keep for trending
    max_history: usize,
    /// Total checks performed
    check_count: u64,
    /// Total advisories produced (excluding Healthy)
    advisory_count: u64,
}

impl HealthMonitor {
    /// Create a new health monitor with the given configuration
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            disk_history: VecDeque::with_capacity(64),
            max_history: 60, // ~30 minutes at 30s intervals
            check_count: 0,
            advisory_count: 0,
        }
    }

    /// Process a health sample and produce advisories.
    ///
    /// Returns a list of advisories. If the system is healthy, returns
    /// a single `Advisory::Healthy`.
    pub fn check(&mut self, sample: HealthSample) -> Vec<Advisory> {
        self.check_count += 1;
        let mut advisories = Vec::new();

        // Disk checks
        if sample.disk_used_pct >= self.config.disk_critical_pct {
            advisories.push(Advisory::DiskCritical {
                used_pct: sample.disk_used_pct,
            });
        } else if sample.disk_used_pct >= self.config.disk_warning_pct {
            advisories.push(Advisory::DiskWarning {
                used_pct: sample.disk_used_pct,
            });
        }

        // Disk fill rate prediction
        if let Some(available) = sample.disk_available_bytes {
            let now = Instant::now();
            self.disk_history.push_back((now, available));
            while self.disk_history.len() > self.max_history {
                self.disk_history.pop_front();
            }

            if let Some(prediction) = self.predict_disk_exhaustion() {
                if prediction > 0.0 && prediction < 3600.0 {
                    // Less than 1 hour
                    advisories.push(Advisory::DiskExhaustionPredicted {
                        seconds_remaining: prediction,
                    });
                }
            }
        }

        // Throughput check
        if sample.throughput_bps > 0 && sample.throughput_bps < self.config.throughput_floor_bps {
            advisories.push(Advisory::ThroughputLow {
                current_bps: sample.throughput_bps,
                floor_bps: self.config.throughput_floor_bps,
            });
        }

        // Error rate check
        if sample.active_errors > 5 {
            advisories.push(Advisory::ErrorRateHigh {
                errors: sample.active_errors,
                window_secs: self.config.check_interval_secs,
            });
        }

        if advisories.is_empty() {
            advisories.push(Advisory::Healthy);
        } else {
            self.advisory_count += advisories.len() as u64;
        }

        advisories
    }

    /// Predict seconds until disk exhaustion based on fill rate trend.
    ///
    /// Uses linear regression over the disk availability history.
    fn predict_disk_exhaustion(&self) -> Option<f64> {
        if self.disk_history.len() < 3 {
            return None;
        }

        let first = self.disk_history.front()?;
        let last = self.disk_history.back()?;

        let elapsed_secs = last.0.duration_since(first.0).as_secs_f64();
        if elapsed_secs < 10.0 {
            return None; // Not enough time span for meaningful prediction
        }

        let bytes_consumed = first.1.saturating_sub(last.1);
        if bytes_consumed == 0 {
            return None; // Disk usage not increasing
        }

        let consume_rate_bps = bytes_consumed as f64 / elapsed_secs;
        let remaining_secs = last.1 as f64 / consume_rate_bps;

        Some(remaining_secs)
    }

    /// Get monitoring statistics
    pub fn stats(&self) -> HealthMonitorStats {
        HealthMonitorStats {
            check_count: self.check_count,
            advisory_count: self.advisory_count,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }
}

/// Statistics for the health monitor
#[derive(Debug, Clone)]
pub struct HealthMonitorStats {
    /// Total health checks performed
    pub check_count: u64,
    /// Total advisories produced (excluding Healthy)
    pub advisory_count: u64,
}
