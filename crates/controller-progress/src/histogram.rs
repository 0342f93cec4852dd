//! Fixed-bucket histograms for estimated vs. actual input data weight
//! (spec §4.10), used by the "estimated operation duration" analyzer to
//! compare the two distributions.

use serde::{Deserialize, Serialize};

/// A log-scale histogram over byte counts: bucket `i` covers
/// `[2^i, 2^(i+1))` bytes, with a final overflow bucket for anything at or
/// above `2^(BUCKET_COUNT-1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataWeightHistogram {
    buckets: Vec<u64>,
    count: u64,
    sum: u64,
}

const BUCKET_COUNT: usize = 48;

impl DataWeightHistogram {
    pub fn new() -> Self {
        Self {
            buckets: vec![0; BUCKET_COUNT],
            count: 0,
            sum: 0,
        }
    }

    fn bucket_for(weight: u64) -> usize {
        if weight == 0 {
            return 0;
        }
        let bit = 63 - weight.leading_zeros() as usize;
        bit.min(BUCKET_COUNT - 1)
    }

    pub fn record(&mut self, weight: u64) {
        let idx = Self::bucket_for(weight);
        self.buckets[idx] += 1;
        self.count += 1;
        self.sum = self.sum.saturating_add(weight);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Approximate quantile, returned as the lower bound of the bucket
    /// containing the requested rank.
    pub fn quantile(&self, q: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let q = q.clamp(0.0, 1.0);
        let target = (q * self.count as f64).ceil() as u64;
        let mut seen = 0u64;
        for (idx, bucket) in self.buckets.iter().enumerate() {
            seen += bucket;
            if seen >= target {
                return 1u64 << idx;
            }
        }
        1u64 << (BUCKET_COUNT - 1)
    }
}

impl Default for DataWeightHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Paired estimated/actual histograms for one task, compared by the
/// "estimated operation duration" analyzer to flag input estimates that
/// are systematically off (spec §4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputWeightHistograms {
    pub estimated: DataWeightHistogram,
    pub actual: DataWeightHistogram,
}

impl InputWeightHistograms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_estimated(&mut self, weight: u64) {
        self.estimated.record(weight);
    }

    pub fn record_actual(&mut self, weight: u64) {
        self.actual.record(weight);
    }

    /// Ratio of actual to estimated mean data weight; far from 1.0 means
    /// the estimate was poor.
    pub fn mean_ratio(&self) -> Option<f64> {
        let estimated_mean = self.estimated.mean();
        if estimated_mean == 0.0 {
            None
        } else {
            Some(self.actual.mean() / estimated_mean)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_places_weight_in_expected_bucket() {
        let mut h = DataWeightHistogram::new();
        h.record(1024);
        assert_eq!(h.count(), 1);
        assert!(h.quantile(1.0) >= 1024);
    }

    #[test]
    fn mean_tracks_running_sum() {
        let mut h = DataWeightHistogram::new();
        for w in [100, 200, 300] {
            h.record(w);
        }
        assert_eq!(h.mean(), 200.0);
    }

    #[test]
    fn mean_ratio_is_none_until_estimates_exist() {
        let mut histos = InputWeightHistograms::new();
        assert_eq!(histos.mean_ratio(), None);
        histos.record_estimated(1000);
        histos.record_actual(2000);
        assert_eq!(histos.mean_ratio(), Some(2.0));
    }
}
