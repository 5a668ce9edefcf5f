//! Listing-structure miner: classifies product titles against four
//! independent framing heuristics and validates the ones that keep
//! converting. A title may match zero, one, or several categories.

use serde_json::json;

use crate::miners::phrase::PROFESSIONS;
use crate::miners::{
    applicable_niches, dominant_niche, group_by_key, risk_label, validate_bucket, Bucket, Miner,
    MinerOutput,
};
use crate::types::{InsightDraft, InsightType, Observation};

const MAX_EXAMPLES: usize = 3;
const NICHE_MIN_SAMPLES: usize = 3;

pub fn is_gift_framed(title: &str) -> bool {
    let lowered = title.to_lowercase();
    lowered.contains("gift") || lowered.contains("present for")
}

pub fn is_humor_framed(title: &str) -> bool {
    let lowered = title.to_lowercase();
    ["funny", "humor", "joke", "sarcastic"]
        .iter()
        .any(|w| lowered.contains(w))
}

pub fn is_profession_led(title: &str) -> bool {
    title
        .to_lowercase()
        .split_whitespace()
        .any(|word| PROFESSIONS.contains(&word))
}

pub fn is_quote_style(title: &str) -> bool {
    let trimmed = title.trim();
    trimmed.starts_with('"') || trimmed.starts_with('\u{201c}')
}

/// All structure categories a title matches, in a fixed order.
pub fn classify_title(title: &str) -> Vec<String> {
    let checks: [(&str, fn(&str) -> bool); 4] = [
        ("gift-framing", is_gift_framed),
        ("humor-framing", is_humor_framed),
        ("profession-led", is_profession_led),
        ("quote-style", is_quote_style),
    ];
    checks
        .iter()
        .filter(|(_, check)| check(title))
        .map(|(key, _)| key.to_string())
        .collect()
}

fn is_success(obs: &Observation) -> bool {
    obs.sales > 0
}

pub struct ListingStructureMiner;

impl Miner for ListingStructureMiner {
    fn name(&self) -> &'static str {
        "listing-structure"
    }

    fn insight_type(&self) -> InsightType {
        InsightType::ListingStructure
    }

    fn mine(&self, observations: &[Observation]) -> MinerOutput {
        let buckets = group_by_key(observations, |obs| classify_title(&obs.label), is_success);

        let mut output = MinerOutput::default();
        for bucket in &buckets {
            match validate_bucket(self.insight_type(), bucket) {
                Some(confidence) => output.drafts.push(describe(bucket, confidence)),
                None => output.rejected += 1,
            }
        }
        output
    }
}

fn describe(bucket: &Bucket<'_>, confidence: f64) -> InsightDraft {
    let total = bucket.total() as f64;
    let mean_sales = bucket.members.iter().map(|o| o.sales as f64).sum::<f64>() / total;
    let examples: Vec<&str> = bucket
        .members
        .iter()
        .take(MAX_EXAMPLES)
        .map(|o| o.label.as_str())
        .collect();

    let candidate = bucket.to_candidate(InsightType::ListingStructure);
    let sample_size = candidate.total_count;
    let success_rate = candidate.success_rate();

    InsightDraft {
        insight_type: candidate.insight_type,
        pattern_key: candidate.pattern_key,
        category: dominant_niche(bucket),
        title: format!("Listing structure: {}", bucket.key),
        description: format!(
            "{} titles convert in {:.0}% of {sample_size} listings",
            bucket.key,
            success_rate * 100.0,
        ),
        payload: json!({
            "structure": bucket.key,
            "mean_sales": mean_sales,
            "examples": examples,
        }),
        sample_size,
        confidence,
        success_rate,
        niches: applicable_niches(bucket, is_success, NICHE_MIN_SAMPLES),
        timeframe: "rolling".to_string(),
        risk: risk_label(confidence, sample_size),
        observation_ids: candidate.observation_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: i64 = 7 * 86_400;

    fn obs(id: &str, label: &str, sales: i64, created_at: i64) -> Observation {
        Observation {
            id: id.to_string(),
            label: label.to_string(),
            niche: "nurses".to_string(),
            style: None,
            tone: None,
            source_query: None,
            approved: false,
            sales,
            engagement: 0,
            rating: None,
            created_at,
        }
    }

    #[test]
    fn a_title_may_match_several_categories() {
        let matches = classify_title("Funny Nurse Gift Shirt");
        assert_eq!(matches, vec!["gift-framing", "humor-framing", "profession-led"]);
    }

    #[test]
    fn a_title_may_match_none() {
        assert!(classify_title("Plain Cat Shirt").is_empty());
    }

    #[test]
    fn quote_style_requires_leading_quote() {
        assert!(is_quote_style("\"Best Day Ever\" Shirt"));
        assert!(is_quote_style("\u{201c}Best Day Ever\u{201d} Tee"));
        assert!(!is_quote_style("Best \"Day\" Ever"));
    }

    #[test]
    fn converting_structure_validates_with_mean_sales() {
        let batch: Vec<Observation> = (0..12)
            .map(|i| {
                let sales = if i < 11 { 3 } else { 0 };
                obs(&format!("t{i}"), "Funny Dog Tee", sales, (i as i64 % 3) * WEEK)
            })
            .collect();
        let output = ListingStructureMiner.mine(&batch);
        assert_eq!(output.drafts.len(), 1);
        let draft = &output.drafts[0];
        assert_eq!(draft.pattern_key, "humor-framing");
        assert_eq!(draft.sample_size, 12);
        assert_eq!(draft.payload["mean_sales"], json!(33.0 / 12.0));
        assert_eq!(draft.payload["examples"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn multi_matching_observation_counts_in_each_bucket_once() {
        let batch: Vec<Observation> = (0..12)
            .map(|i| obs(&format!("t{i}"), "Funny Nurse Gift", 2, (i as i64 % 3) * WEEK))
            .collect();
        let output = ListingStructureMiner.mine(&batch);
        // Three buckets, each seeded by the same 12 observations.
        assert_eq!(output.drafts.len(), 3);
        for draft in &output.drafts {
            assert_eq!(draft.sample_size, 12);
        }
    }
}
