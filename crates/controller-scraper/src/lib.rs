//! Chunk scraper (C6, spec §4.5): relocates chunks Master reports
//! unavailable and distinguishes input-chunk loss (fails the operation)
//! from intermediate-chunk loss (expected during auto-merge, dropped
//! silently).

pub mod policy;
pub mod scraper;

pub use policy::ScraperPolicy;
pub use scraper::{ChunkScraper, ScraperKind, ScraperObserver};
