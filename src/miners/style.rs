//! Style-effectiveness miner: groups observations by their style tag and
//! validates styles whose approval rate holds up across weeks.

use serde_json::json;

use crate::miners::{
    applicable_niches, dominant_niche, group_by_key, risk_label, validate_bucket, Bucket, Miner,
    MinerOutput,
};
use crate::types::{InsightDraft, InsightType, Observation};

/// Untagged observations still carry signal; they score in their own
/// clearly-labeled bucket rather than being dropped.
const UNKNOWN_STYLE: &str = "Unknown";

const NICHE_MIN_SAMPLES: usize = 3;

fn style_key(obs: &Observation) -> String {
    obs.style
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_STYLE)
        .to_string()
}

fn is_success(obs: &Observation) -> bool {
    obs.approved
}

pub struct StyleEffectivenessMiner;

impl Miner for StyleEffectivenessMiner {
    fn name(&self) -> &'static str {
        "style-effectiveness"
    }

    fn insight_type(&self) -> InsightType {
        InsightType::StyleEffectiveness
    }

    fn mine(&self, observations: &[Observation]) -> MinerOutput {
        let buckets = group_by_key(observations, |obs| vec![style_key(obs)], is_success);

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
    let mean_engagement =
        bucket.members.iter().map(|o| o.engagement as f64).sum::<f64>() / total;
    let mean_sales = bucket.members.iter().map(|o| o.sales as f64).sum::<f64>() / total;

    let candidate = bucket.to_candidate(InsightType::StyleEffectiveness);
    let sample_size = candidate.total_count;
    let success_rate = candidate.success_rate();

    InsightDraft {
        insight_type: candidate.insight_type,
        pattern_key: candidate.pattern_key,
        category: dominant_niche(bucket),
        title: format!("Effective style: {}", bucket.key),
        description: format!(
            "\"{}\" designs are approved in {:.0}% of {sample_size} observations",
            bucket.key,
            success_rate * 100.0,
        ),
        payload: json!({
            "style": bucket.key,
            "mean_engagement": mean_engagement,
            "mean_sales": mean_sales,
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

    fn obs(id: &str, style: Option<&str>, approved: bool, engagement: i64, created_at: i64) -> Observation {
        Observation {
            id: id.to_string(),
            label: "x".to_string(),
            niche: "dogs".to_string(),
            style: style.map(str::to_string),
            tone: None,
            source_query: None,
            approved,
            sales: 2,
            engagement,
            rating: None,
            created_at,
        }
    }

    #[test]
    fn missing_style_lands_in_unknown_bucket() {
        let batch = vec![
            obs("a", None, true, 0, 0),
            obs("b", Some("  "), true, 0, 0),
            obs("c", Some("vintage"), true, 0, 0),
        ];
        let buckets = group_by_key(&batch, |o| vec![style_key(o)], is_success);
        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["Unknown", "vintage"]);
        assert_eq!(buckets[0].total(), 2);
    }

    #[test]
    fn validated_style_reports_means() {
        let batch: Vec<Observation> = (0..12)
            .map(|i| obs(&format!("s{i}"), Some("retro"), i < 11, 10 + i as i64, (i as i64 % 3) * WEEK))
            .collect();
        let output = StyleEffectivenessMiner.mine(&batch);
        assert_eq!(output.drafts.len(), 1);
        let draft = &output.drafts[0];
        assert_eq!(draft.pattern_key, "retro");
        assert_eq!(draft.payload["mean_sales"], json!(2.0));
        // engagement 10..=21 → mean 15.5
        assert_eq!(draft.payload["mean_engagement"], json!(15.5));
    }

    #[test]
    fn weak_style_is_dropped() {
        // 50% approval cannot clear the confidence bar.
        let batch: Vec<Observation> = (0..12)
            .map(|i| obs(&format!("s{i}"), Some("neon"), i % 2 == 0, 0, (i as i64 % 3) * WEEK))
            .collect();
        let output = StyleEffectivenessMiner.mine(&batch);
        assert!(output.drafts.is_empty());
        assert_eq!(output.rejected, 1);
    }
}
