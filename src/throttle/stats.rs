//! Aggregate statistics over the counter store.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use super::category::Category;
use super::registry::CategoryRegistry;
use super::store::CounterStore;

/// Aggregates for a single category.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStatistics {
    /// Tracked entries
    pub total: usize,
    /// Entries with a block in effect
    pub blocked: usize,
    /// Mean attempt count across tracked entries (0 when none)
    pub avg_attempt_count: f64,
}

/// Engine-wide statistics.
///
/// Gathered shard by shard without a global lock, so the figures are only
/// eventually consistent with concurrent updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThrottleStatistics {
    /// Tracked entries across all categories
    pub total_tracked: usize,
    /// Entries with a block in effect
    pub currently_blocked: usize,
    /// Per-category breakdown; every registered category is present
    pub per_category: BTreeMap<Category, CategoryStatistics>,
    /// Attempts allowed because the engine failed internally
    pub fail_open_total: u64,
    /// Entries removed by the reaper
    pub reaped_total: u64,
}

impl ThrottleStatistics {
    /// Collect statistics from `store` as of `now`.
    pub fn collect(
        store: &CounterStore,
        registry: &CategoryRegistry,
        now: Instant,
        fail_open_total: u64,
    ) -> Self {
        let mut attempt_sums: BTreeMap<Category, u64> = BTreeMap::new();
        let mut per_category: BTreeMap<Category, CategoryStatistics> = registry
            .categories()
            .map(|category| (category, CategoryStatistics::default()))
            .collect();

        let mut total_tracked = 0;
        let mut currently_blocked = 0;

        store.for_each(|key, entry| {
            let blocked = entry.is_blocked(now);
            total_tracked += 1;
            if blocked {
                currently_blocked += 1;
            }

            let stats = per_category.entry(key.category).or_default();
            stats.total += 1;
            if blocked {
                stats.blocked += 1;
            }
            *attempt_sums.entry(key.category).or_default() += u64::from(entry.attempt_count);
        });

        for (category, stats) in per_category.iter_mut() {
            if stats.total > 0 {
                let sum = attempt_sums.get(category).copied().unwrap_or_default();
                stats.avg_attempt_count = sum as f64 / stats.total as f64;
            }
        }

        Self {
            total_tracked,
            currently_blocked,
            per_category,
            fail_open_total,
            reaped_total: store.reaped_total(),
        }
    }
}
