//! Memory reserve-factor digest (spec §4.10; supplemented behavior §B.2, §B.4).
//!
//! Each task keeps two independent digests — one for job-proxy memory, one
//! for user-job memory — fed by `observed-max-memory / reserved-memory`
//! samples. The reserve factor for the next job is the digest's quantile
//! (default p95).

use serde::{Deserialize, Serialize};

/// A minimal quantile digest: samples are inserted in sorted order and a
/// quantile is read by linear interpolation. This workspace doesn't need
/// the streaming-approximate digest the original's t-digest gives it at
/// scale — an operation's job count fits comfortably in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDigest {
    samples: Vec<f64>,
    default_factor: f64,
    last_factor: f64,
    overdraft_factor: f64,
}

impl MemoryDigest {
    pub fn new(default_factor: f64, overdraft_factor: f64) -> Self {
        Self {
            samples: Vec::new(),
            default_factor,
            last_factor: default_factor,
            overdraft_factor,
        }
    }

    /// Record an ordinary sample (`observed / reserved`).
    pub fn add_sample(&mut self, factor: f64) {
        let idx = self.samples.partition_point(|s| *s < factor);
        self.samples.insert(idx, factor);
    }

    /// Record a sample taken after a ResourceOverdraft abort. The original
    /// bumps the digest by at least `previous_factor * overdraft_factor`
    /// rather than the raw observed factor, so a single overdraft can't be
    /// undone by a lucky small sample immediately after.
    pub fn add_overdraft_sample(&mut self, actual_factor: f64) {
        let bumped = (self.last_factor * self.overdraft_factor).max(actual_factor);
        self.add_sample(bumped);
    }

    /// Quantile lookup (e.g. 0.95 for p95); empty digest returns the
    /// configured default.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.samples.is_empty() {
            return self.default_factor;
        }
        let q = q.clamp(0.0, 1.0);
        let rank = (q * (self.samples.len() - 1) as f64).round() as usize;
        self.samples[rank.min(self.samples.len() - 1)]
    }

    /// Reserve factor to use for the next scheduled job, at the given
    /// quantile; also updates `last_factor` for the next overdraft bump.
    pub fn reserve_factor(&mut self, q: f64) -> f64 {
        let factor = self.quantile(q);
        self.last_factor = factor;
        factor
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest_returns_default() {
        let digest = MemoryDigest::new(1.2, 1.5);
        assert_eq!(digest.quantile(0.95), 1.2);
    }

    #[test]
    fn quantile_never_decreases_below_any_sampled_ratio() {
        let mut digest = MemoryDigest::new(1.0, 1.5);
        for f in [1.1, 1.3, 1.5, 1.7, 2.0] {
            digest.add_sample(f);
        }
        // p99 should be at or above every individual observed U/R.
        let p99 = digest.quantile(0.99);
        for f in [1.1, 1.3, 1.5, 1.7, 2.0] {
            assert!(p99 >= f, "p99 {} should dominate sample {}", p99, f);
        }
    }

    #[test]
    fn overdraft_sample_uses_max_of_actual_and_bumped_previous() {
        let mut digest = MemoryDigest::new(1.0, 2.0);
        digest.add_sample(1.0);
        let prev = digest.reserve_factor(0.95);
        assert_eq!(prev, 1.0);

        // actual factor (0.5) is below previous*overdraft (1.0*2.0=2.0);
        // the bump must win.
        digest.add_overdraft_sample(0.5);
        assert_eq!(digest.quantile(1.0), 2.0);
    }

    #[test]
    fn overdraft_sample_respects_larger_actual() {
        let mut digest = MemoryDigest::new(1.0, 1.2);
        digest.add_sample(1.0);
        digest.reserve_factor(0.95);

        // actual (5.0) exceeds previous*overdraft (1.2); actual wins.
        digest.add_overdraft_sample(5.0);
        assert_eq!(digest.quantile(1.0), 5.0);
    }
}
