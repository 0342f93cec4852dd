//! Progress counter: the concrete mechanism behind the Conservation
//! invariant (spec §8.1, supplemented by §B.6's `progress_counter.h`).
//!
//! A `ProgressCounter` tracks how many units (jobs, or data weight) are in
//! each of a fixed set of buckets. Every transition is a paired
//! increment/decrement so the total never silently drifts; debug builds
//! would assert non-negativity, here we return an error instead since the
//! controller must never panic on a bad transition, only refuse it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CounterError {
    #[error("cannot decrement {bucket} below zero (current {current}, delta {delta})")]
    Underflow {
        bucket: &'static str,
        current: i64,
        delta: i64,
    },
}

/// Counts of in-flight units across the buckets a job or stripe can be in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounter {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub lost: i64,
    pub aborted: i64,
    pub suspended: i64,
}

macro_rules! bucket_ops {
    ($field:ident, $inc:ident, $dec:ident, $name:expr) => {
        pub fn $inc(&mut self, delta: i64) {
            self.$field += delta;
        }

        pub fn $dec(&mut self, delta: i64) -> Result<(), CounterError> {
            if self.$field < delta {
                return Err(CounterError::Underflow {
                    bucket: $name,
                    current: self.$field,
                    delta,
                });
            }
            self.$field -= delta;
            Ok(())
        }
    };
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    bucket_ops!(pending, inc_pending, dec_pending, "pending");
    bucket_ops!(running, inc_running, dec_running, "running");
    bucket_ops!(completed, inc_completed, dec_completed, "completed");
    bucket_ops!(failed, inc_failed, dec_failed, "failed");
    bucket_ops!(lost, inc_lost, dec_lost, "lost");
    bucket_ops!(aborted, inc_aborted, dec_aborted, "aborted");
    bucket_ops!(suspended, inc_suspended, dec_suspended, "suspended");

    /// Move one unit from `pending` to `running` (job started).
    pub fn start(&mut self) -> Result<(), CounterError> {
        self.dec_pending(1)?;
        self.inc_running(1);
        Ok(())
    }

    /// Move one unit from `running` to `completed`.
    pub fn complete(&mut self) -> Result<(), CounterError> {
        self.dec_running(1)?;
        self.inc_completed(1);
        Ok(())
    }

    /// Move one unit from `running` to `failed`.
    pub fn fail(&mut self) -> Result<(), CounterError> {
        self.dec_running(1)?;
        self.inc_failed(1);
        Ok(())
    }

    /// Move one unit from `running` to `aborted`.
    pub fn abort(&mut self) -> Result<(), CounterError> {
        self.dec_running(1)?;
        self.inc_aborted(1);
        Ok(())
    }

    /// Move one unit from `completed` back to `pending` (lost-job event,
    /// spec §8.1's carve-out for the monotone-progress invariant).
    pub fn lose_completed(&mut self) -> Result<(), CounterError> {
        self.dec_completed(1)?;
        self.inc_lost(1);
        self.inc_pending(1);
        Ok(())
    }

    /// Total units tracked across every bucket; used to verify
    /// conservation against a task's input total (spec §8.1 item 1).
    pub fn total(&self) -> i64 {
        self.pending + self.running + self.completed + self.failed + self.lost + self.aborted
    }
}
