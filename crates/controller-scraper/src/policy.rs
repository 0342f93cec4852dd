//! Scraper policy: batch size and sweep cadence (spec §4.5).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ScraperPolicy {
    /// Chunks requested from Master per `LocateChunks` batch.
    pub batch_size: usize,
    /// How often a sweep fires while chunk ids are outstanding.
    pub sweep_interval: Duration,
}

impl Default for ScraperPolicy {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl ScraperPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        Ok(())
    }
}
