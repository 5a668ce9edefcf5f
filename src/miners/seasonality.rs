//! Niche-timing miner: builds month-granularity demand profiles per niche
//! and surfaces months whose mean conversion clearly outruns the niche's
//! baseline.
//!
//! The validation unit here is the calendar month, not the ISO week the
//! other miners use, so this miner scores with its own sample-count
//! confidence instead of the shared estimator.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::trace;

use crate::db::store::normalize_niche;
use crate::miners::{risk_label, Miner, MinerOutput};
use crate::stats::temporal::month_index;
use crate::types::{InsightDraft, InsightType, Observation};

/// A month needs this many samples to join the niche profile.
const MIN_MONTH_SAMPLES: usize = 5;
/// Profile months required before a niche can validate.
const MIN_PROFILE_MONTHS: usize = 3;
/// Total samples across profile months required to validate.
const MIN_TOTAL_SAMPLES: usize = 10;
/// A month is a peak when its mean conversion reaches this multiple of the
/// niche's overall mean.
const PEAK_MULTIPLIER: f64 = 1.5;

const MONTH_NAMES: &[&str] = &[
    "January", "February", "March", "April", "May", "June", "July",
    "August", "September", "October", "November", "December",
];

fn month_name(index: u32) -> &'static str {
    MONTH_NAMES.get(index as usize - 1).copied().unwrap_or("?")
}

/// `min(0.95, total / 20)` — proportional to sample count, capped.
fn seasonal_confidence(total_samples: usize) -> f64 {
    (total_samples as f64 / 20.0).min(0.95)
}

pub struct NicheTimingMiner;

impl Miner for NicheTimingMiner {
    fn name(&self) -> &'static str {
        "niche-timing"
    }

    fn insight_type(&self) -> InsightType {
        InsightType::SeasonalTrend
    }

    fn mine(&self, observations: &[Observation]) -> MinerOutput {
        // Niche → observations, dedup by id, insertion order.
        let mut by_niche: BTreeMap<String, Vec<&Observation>> = BTreeMap::new();
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for obs in observations {
            if !seen.insert(obs.id.as_str()) {
                continue;
            }
            by_niche.entry(normalize_niche(&obs.niche)).or_default().push(obs);
        }

        let mut output = MinerOutput::default();
        for (niche, members) in by_niche {
            match self.profile_niche(&niche, &members) {
                Some(draft) => output.drafts.push(draft),
                None => output.rejected += 1,
            }
        }
        output
    }
}

impl NicheTimingMiner {
    fn profile_niche(&self, niche: &str, members: &[&Observation]) -> Option<InsightDraft> {
        let mut by_month: BTreeMap<u32, Vec<&Observation>> = BTreeMap::new();
        for &obs in members {
            by_month.entry(month_index(obs.created_at)).or_default().push(obs);
        }

        // Only months with enough samples enter the profile.
        let profile: Vec<(u32, &Vec<&Observation>)> = by_month
            .iter()
            .filter(|(_, obs)| obs.len() >= MIN_MONTH_SAMPLES)
            .map(|(month, obs)| (*month, obs))
            .collect();

        if profile.len() < MIN_PROFILE_MONTHS {
            trace!(niche, months = profile.len(), "seasonality rejected: too few profiled months");
            return None;
        }

        let total_samples: usize = profile.iter().map(|(_, obs)| obs.len()).sum();
        if total_samples < MIN_TOTAL_SAMPLES {
            trace!(niche, total_samples, "seasonality rejected: too few samples");
            return None;
        }

        let overall_mean = profile
            .iter()
            .flat_map(|(_, obs)| obs.iter())
            .map(|o| o.sales as f64)
            .sum::<f64>()
            / total_samples as f64;
        if overall_mean <= 0.0 {
            trace!(niche, "seasonality rejected: no conversion signal");
            return None;
        }

        let month_means: Vec<(u32, usize, f64)> = profile
            .iter()
            .map(|(month, obs)| {
                let mean = obs.iter().map(|o| o.sales as f64).sum::<f64>() / obs.len() as f64;
                (*month, obs.len(), mean)
            })
            .collect();

        let peak_months: Vec<u32> = month_means
            .iter()
            .filter(|(_, _, mean)| *mean >= PEAK_MULTIPLIER * overall_mean)
            .map(|(month, _, _)| *month)
            .collect();

        if peak_months.is_empty() {
            trace!(niche, "seasonality rejected: no peak month");
            return None;
        }

        let confidence = seasonal_confidence(total_samples);
        let success_rate = profile
            .iter()
            .flat_map(|(_, obs)| obs.iter())
            .filter(|o| o.sales > 0)
            .count() as f64
            / total_samples as f64;

        let peak_names: Vec<&str> = peak_months.iter().map(|m| month_name(*m)).collect();
        let breakdown: Vec<serde_json::Value> = month_means
            .iter()
            .map(|(month, samples, mean)| {
                json!({ "month": month, "samples": samples, "mean_sales": mean })
            })
            .collect();

        let observation_ids: Vec<String> = profile
            .iter()
            .flat_map(|(_, obs)| obs.iter().map(|o| o.id.clone()))
            .collect();

        Some(InsightDraft {
            insight_type: InsightType::SeasonalTrend,
            pattern_key: niche.to_string(),
            category: niche.to_string(),
            title: format!("Seasonal demand: {niche}"),
            description: format!(
                "{niche} conversion peaks in {} at \u{2265}{PEAK_MULTIPLIER}x the niche baseline",
                peak_names.join(", "),
            ),
            payload: json!({
                "peak_months": peak_months,
                "multiplier": PEAK_MULTIPLIER,
                "monthly_breakdown": breakdown,
            }),
            sample_size: total_samples,
            confidence,
            success_rate,
            niches: vec![niche.to_string()],
            timeframe: "annual".to_string(),
            risk: risk_label(confidence, total_samples),
            observation_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(month: u32, day: u32) -> i64 {
        chrono::NaiveDate::from_ymd_opt(2026, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp()
    }

    fn obs(id: &str, month: u32, day: u32, sales: i64) -> Observation {
        Observation {
            id: id.to_string(),
            label: "x".to_string(),
            niche: "christmas sweaters".to_string(),
            style: None,
            tone: None,
            source_query: None,
            approved: true,
            sales,
            engagement: 0,
            rating: None,
            created_at: ts(month, day),
        }
    }

    /// Months 3 and 6 at 1 sale each, month 12 at 4 — a clear December peak.
    fn seasonal_batch() -> Vec<Observation> {
        let mut batch = Vec::new();
        for month in [3u32, 6, 12] {
            for day in 1..=6u32 {
                let sales = if month == 12 { 4 } else { 1 };
                batch.push(obs(&format!("o{month}-{day}"), month, day, sales));
            }
        }
        batch
    }

    #[test]
    fn detects_peak_month() {
        let drafts = NicheTimingMiner.mine(&seasonal_batch()).drafts;
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.insight_type, InsightType::SeasonalTrend);
        assert_eq!(draft.sample_size, 18);
        // overall mean 2.0, December mean 4.0 = 2x ≥ 1.5x.
        assert_eq!(draft.payload["peak_months"], json!([12]));
    }

    #[test]
    fn month_below_multiplier_is_not_a_peak() {
        // All months at the same rate — no month reaches 1.5x the mean.
        let mut batch = Vec::new();
        for month in [3u32, 6, 12] {
            for day in 1..=6u32 {
                batch.push(obs(&format!("o{month}-{day}"), month, day, 2));
            }
        }
        assert!(NicheTimingMiner.mine(&batch).drafts.is_empty());
    }

    #[test]
    fn requires_three_profiled_months() {
        // Two strong months only.
        let mut batch = Vec::new();
        for month in [6u32, 12] {
            for day in 1..=8u32 {
                batch.push(obs(&format!("o{month}-{day}"), month, day, 3));
            }
        }
        assert!(NicheTimingMiner.mine(&batch).drafts.is_empty());
    }

    #[test]
    fn sparse_months_are_excluded_from_profile() {
        // Month 12 has only 4 samples — below the per-month minimum, so the
        // profile has 2 months and the niche cannot validate.
        let mut batch = Vec::new();
        for month in [3u32, 6] {
            for day in 1..=6u32 {
                batch.push(obs(&format!("o{month}-{day}"), month, day, 1));
            }
        }
        for day in 1..=4u32 {
            batch.push(obs(&format!("o12-{day}"), 12, day, 5));
        }
        assert!(NicheTimingMiner.mine(&batch).drafts.is_empty());
    }

    #[test]
    fn confidence_is_sample_proportional_and_capped() {
        assert_eq!(seasonal_confidence(10), 0.5);
        assert_eq!(seasonal_confidence(19), 0.95);
        assert_eq!(seasonal_confidence(1000), 0.95);
    }
}
