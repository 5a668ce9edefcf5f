//! Rank-spike detection: compares a listing's current sales rank with its
//! last recorded value and classifies the improvement. History writes go
//! through an hourly dedup window; spikes also stamp the listing row for
//! the aggregator's spike count.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::config::{spike_thresholds, RANK_DEDUP_WINDOW_SECS};
use crate::db::store::KnowledgeStore;
use crate::error::Result;
use crate::types::{Listing, RankDelta, SpikeSeverity};

/// Percent rank improvement → severity. Lower rank numbers are better, so
/// improvement is `(previous - current) / previous`.
pub fn classify_improvement(percent: f64) -> Option<SpikeSeverity> {
    use spike_thresholds::*;
    if percent > VIRAL_MIN_PCT {
        Some(SpikeSeverity::Viral)
    } else if percent > MAJOR_MIN_PCT {
        Some(SpikeSeverity::Major)
    } else if percent > MINOR_MIN_PCT {
        Some(SpikeSeverity::Minor)
    } else {
        None
    }
}

/// Build the rank delta for a listing given its last known rank.
/// First sighting carries no change and no spike.
pub fn detect(listing_id: &str, current_rank: i64, previous_rank: Option<i64>) -> RankDelta {
    let Some(previous) = previous_rank.filter(|p| *p > 0) else {
        return RankDelta {
            listing_id: listing_id.to_string(),
            rank: current_rank,
            previous_rank: None,
            rank_change: None,
            percent_change: None,
            severity: None,
        };
    };

    let change = current_rank - previous;
    let percent = (previous - current_rank) as f64 / previous as f64 * 100.0;

    RankDelta {
        listing_id: listing_id.to_string(),
        rank: current_rank,
        previous_rank: Some(previous),
        rank_change: Some(change),
        percent_change: Some(percent),
        severity: classify_improvement(percent),
    }
}

/// Shared last-known-rank cache, hydrated once per run from rank history
/// and read by the concurrent per-niche tasks.
pub struct RankCache {
    inner: DashMap<String, (i64, i64)>,
}

impl RankCache {
    pub fn from_latest(latest: HashMap<String, (i64, i64)>) -> Self {
        Self { inner: latest.into_iter().collect() }
    }

    fn last_seen(&self, listing_id: &str) -> Option<(i64, i64)> {
        self.inner.get(listing_id).map(|entry| *entry.value())
    }

    fn record(&self, listing_id: &str, rank: i64, at: i64) {
        self.inner.insert(listing_id.to_string(), (rank, at));
    }
}

pub struct RankSpikeDetector {
    store: KnowledgeStore,
    cache: RankCache,
}

impl RankSpikeDetector {
    pub fn new(store: KnowledgeStore, cache: RankCache) -> Self {
        Self { store, cache }
    }

    /// Observe one listing's current rank. Returns the recorded delta, or
    /// None when suppressed by the dedup window or the listing has no rank.
    pub async fn observe(&self, listing: &Listing, now: i64) -> Result<Option<RankDelta>> {
        if listing.sales_rank <= 0 {
            return Ok(None);
        }

        let last = self.cache.last_seen(&listing.id);
        if let Some((_, recorded_at)) = last {
            if now - recorded_at < RANK_DEDUP_WINDOW_SECS {
                return Ok(None);
            }
        }

        let delta = detect(&listing.id, listing.sales_rank, last.map(|(rank, _)| rank));
        if !self.store.insert_rank_entry(&delta, now).await? {
            return Ok(None);
        }
        self.cache.record(&listing.id, listing.sales_rank, now);

        if delta.is_spike() {
            if let Some(change) = delta.rank_change {
                self.store.flag_listing_spike(&listing.id, change, now).await?;
            }
        }

        Ok(Some(delta))
    }
}
