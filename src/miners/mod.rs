//! The five pattern miners. Each implements [`Miner`] and is iterated
//! uniformly by the orchestrator; the grouping and validation plumbing
//! shared by the success/trial-shaped miners lives here.

pub mod cross_niche;
pub mod listing_structure;
pub mod phrase;
pub mod seasonality;
pub mod style;

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::config::validation::{MIN_CONFIDENCE, MIN_DISTINCT_PERIODS, MIN_SAMPLE_SIZE};
use crate::stats::confidence::confidence;
use crate::stats::temporal::distinct_weeks;
use crate::types::{InsightDraft, InsightType, Observation, PatternCandidate, RiskLevel};

/// One mining dimension over an observation batch. Implementations are
/// stateless; `mine` is a pure in-memory reduction over the batch.
pub trait Miner: Send + Sync {
    fn name(&self) -> &'static str;
    fn insight_type(&self) -> InsightType;
    fn mine(&self, observations: &[Observation]) -> MinerOutput;
}

/// What one miner produced from a batch: the candidates that survived
/// validation, plus how many were considered and dropped.
#[derive(Debug, Default)]
pub struct MinerOutput {
    pub drafts: Vec<InsightDraft>,
    pub rejected: u64,
}

pub fn all_miners() -> Vec<Box<dyn Miner>> {
    vec![
        Box::new(phrase::PhraseTemplateMiner),
        Box::new(style::StyleEffectivenessMiner),
        Box::new(seasonality::NicheTimingMiner),
        Box::new(listing_structure::ListingStructureMiner),
        Box::new(cross_niche::CrossNicheMiner),
    ]
}

// ---------------------------------------------------------------------------
// Bucket — a grouped candidate before validation
// ---------------------------------------------------------------------------

pub(crate) struct Bucket<'a> {
    pub key: String,
    /// Insertion order, deduplicated by observation id.
    pub members: Vec<&'a Observation>,
    pub success_count: usize,
}

impl Bucket<'_> {
    pub fn total(&self) -> usize {
        self.members.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.members.is_empty() {
            0.0
        } else {
            self.success_count as f64 / self.members.len() as f64
        }
    }

    pub fn observation_ids(&self) -> Vec<String> {
        self.members.iter().map(|o| o.id.clone()).collect()
    }

    /// Freeze the bucket into the ephemeral candidate handed to
    /// description. Rebuilt from scratch every run, never persisted.
    pub fn to_candidate(&self, insight_type: InsightType) -> PatternCandidate {
        PatternCandidate {
            insight_type,
            pattern_key: self.key.clone(),
            observation_ids: self.observation_ids(),
            success_count: self.success_count,
            total_count: self.total(),
        }
    }
}

/// Group a batch into buckets by extracted pattern key. An observation may
/// yield zero, one, or several keys; within a bucket each observation id
/// counts once even if the extractor repeats a key. Bucket order follows
/// first appearance in the batch (stable ties).
pub(crate) fn group_by_key<'a, E, S>(
    observations: &'a [Observation],
    extract: E,
    is_success: S,
) -> Vec<Bucket<'a>>
where
    E: Fn(&Observation) -> Vec<String>,
    S: Fn(&Observation) -> bool,
{
    let mut buckets: Vec<Bucket<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen: HashMap<usize, HashSet<&str>> = HashMap::new();

    for obs in observations {
        for key in extract(obs) {
            let idx = *index.entry(key.clone()).or_insert_with(|| {
                buckets.push(Bucket { key, members: Vec::new(), success_count: 0 });
                buckets.len() - 1
            });
            let ids = seen.entry(idx).or_default();
            if !ids.insert(obs.id.as_str()) {
                continue;
            }
            buckets[idx].members.push(obs);
            if is_success(obs) {
                buckets[idx].success_count += 1;
            }
        }
    }

    buckets
}

/// Apply the shared validation thresholds to a bucket. Returns the
/// estimator confidence for survivors; rejected buckets are dropped
/// silently (trace only — a rejection is not an error).
pub(crate) fn validate_bucket(insight_type: InsightType, bucket: &Bucket<'_>) -> Option<f64> {
    let total = bucket.total();
    if total < MIN_SAMPLE_SIZE {
        trace!(%insight_type, key = %bucket.key, total, "rejected: below minimum sample size");
        return None;
    }

    let periods = distinct_weeks(bucket.members.iter().map(|o| o.created_at));
    if periods < MIN_DISTINCT_PERIODS {
        trace!(%insight_type, key = %bucket.key, periods, "rejected: insufficient temporal spread");
        return None;
    }

    let score = confidence(bucket.success_count, total, periods);
    if score < MIN_CONFIDENCE {
        trace!(%insight_type, key = %bucket.key, score, "rejected: below confidence threshold");
        return None;
    }

    Some(score)
}

/// Most frequent niche in a bucket (normalized); ties break toward first
/// appearance. Used as the insight's category.
pub(crate) fn dominant_niche(bucket: &Bucket<'_>) -> String {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for obs in &bucket.members {
        let key = crate::db::store::normalize_niche(&obs.niche);
        if !counts.contains_key(&key) {
            order.push(key.clone());
        }
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut best: Option<(&String, usize)> = None;
    for niche in &order {
        let count = counts[niche];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((niche, count));
        }
    }
    best.map(|(n, _)| n.clone()).unwrap_or_else(|| "general".to_string())
}

/// Risk label for a materialized insight, from its evidence strength.
pub(crate) fn risk_label(confidence: f64, sample_size: usize) -> RiskLevel {
    if confidence >= 0.92 && sample_size >= 50 {
        RiskLevel::Low
    } else if confidence >= 0.85 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Niches represented in a bucket with at least `min_samples` members and
/// at least 50% success among them, in first-appearance order.
pub(crate) fn applicable_niches(bucket: &Bucket<'_>, is_success: impl Fn(&Observation) -> bool, min_samples: usize) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, (usize, usize)> = HashMap::new();
    for obs in &bucket.members {
        let key = crate::db::store::normalize_niche(&obs.niche);
        if !totals.contains_key(&key) {
            order.push(key.clone());
        }
        let entry = totals.entry(key).or_insert((0, 0));
        entry.0 += 1;
        if is_success(obs) {
            entry.1 += 1;
        }
    }
    order
        .into_iter()
        .filter(|n| {
            let (total, success) = totals[n];
            total >= min_samples && success * 2 >= total
        })
        .collect()
}
