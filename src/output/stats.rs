//! Statistics over the persisted link state
//!
//! This module provides functionality for summarizing where every known
//! link currently stands, without modifying any state file.

use crate::state::{LinkSet, LinkState};
use crate::storage::{LinkStateStore, StorageResult};
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Links with a record in the observation store
    pub scraped: usize,

    /// Links still waiting to be scraped (excluding failed ones)
    pub pending: usize,

    /// Links that failed in the current or last run
    pub failed: usize,

    /// Links parked after reaching the attempt ceiling
    pub exhausted: usize,

    /// Size of the work queue the next reconciliation would produce
    pub queued_next_run: usize,
}

impl HarvestStatistics {
    /// Total number of distinct links known
    pub fn total(&self) -> usize {
        self.scraped + self.pending + self.failed + self.exhausted
    }

    /// Percentage of known links that are scraped
    pub fn completion_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.scraped as f64 / self.total() as f64) * 100.0
        }
    }
}

/// Loads statistics from a link-state store
pub async fn load_statistics<S: LinkStateStore>(store: &S) -> StorageResult<HarvestStatistics> {
    let pending = store.load_pending().await?;
    let failed = store.load_failed().await?;
    let scraped = store.load_scraped().await?;
    let exhausted = store.load_exhausted().await?;
    let attempts = store.load_attempts().await?;

    let mut all = scraped.clone();
    all.extend(exhausted.iter().cloned());
    all.extend(failed.iter().cloned());
    all.extend(pending.iter().cloned());

    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    let mut queued = LinkSet::new();
    for link in all.iter() {
        let state = LinkState::classify(link, &scraped, &failed, &exhausted, &attempts);
        *counts.entry(state.as_str()).or_default() += 1;
        if state.is_queued() {
            queued.insert(link.clone());
        }
    }

    let count = |key: &str| counts.get(key).copied().unwrap_or(0);
    Ok(HarvestStatistics {
        scraped: count("scraped"),
        pending: count("pending"),
        failed: count("failed"),
        exhausted: count("exhausted"),
        queued_next_run: queued.len(),
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");
    println!("  Known links:     {}", stats.total());
    println!(
        "  Scraped:         {} ({:.1}%)",
        stats.scraped,
        stats.completion_rate()
    );
    println!("  Pending:         {}", stats.pending);
    println!("  Failed:          {}", stats.failed);
    println!("  Exhausted:       {}", stats.exhausted);
    println!("  Next run queue:  {}", stats.queued_next_run);
}
