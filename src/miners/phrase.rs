//! Phrase-template miner: matches generated phrases against a small fixed
//! set of structural templates and validates the recurring ones.

use std::collections::HashMap;

use serde_json::json;

use crate::miners::{
    applicable_niches, dominant_niche, group_by_key, risk_label, validate_bucket, Bucket, Miner,
    MinerOutput,
};
use crate::types::{InsightDraft, InsightType, Observation};

const MAX_EXAMPLES: usize = 5;
const NICHE_MIN_SAMPLES: usize = 3;

/// (key, human-readable template) in match order — first match wins.
const TEMPLATES: &[(&str, &str)] = &[
    ("worlds-superlative", "World's {adj} {noun}"),
    ("powered-by", "Powered by {noun}"),
    ("pronoun-verb-noun", "{pronoun} {verb} {noun}"),
    ("descriptor-profession", "{descriptor} {profession}"),
    ("topic-state", "{topic} {state}"),
    ("adverb-action", "{adverb} {action}"),
];

const PRONOUNS: &[&str] = &["i", "we", "he", "she", "they", "you"];

pub(crate) const PROFESSIONS: &[&str] = &[
    "nurse", "teacher", "engineer", "programmer", "developer", "doctor",
    "lawyer", "farmer", "mechanic", "chef", "barista", "gamer", "dad",
    "mom", "grandma", "grandpa", "coach", "firefighter", "electrician",
    "plumber", "accountant", "welder", "trucker", "veteran",
];

const STATES: &[&str] = &["loading", "mode", "vibes", "season", "era", "time", "incoming"];

/// Classify a phrase against the fixed template set. Checks run in the
/// TEMPLATES order and the first hit wins; phrases matching nothing are
/// skipped by the miner.
pub fn extract_template(label: &str) -> Option<&'static str> {
    let lowered = label.trim().to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }

    let first = words[0];
    let last = words[words.len() - 1];

    if (first == "world's" || first == "worlds") && words.len() >= 3 {
        return Some("worlds-superlative");
    }
    if lowered.contains("powered by ") {
        return Some("powered-by");
    }
    if PRONOUNS.contains(&first) && words.len() >= 3 {
        return Some("pronoun-verb-noun");
    }
    if PROFESSIONS.contains(&last) {
        return Some("descriptor-profession");
    }
    if words.len() == 2 && STATES.contains(&last) {
        return Some("topic-state");
    }
    if first.len() > 4 && first.ends_with("ly") {
        return Some("adverb-action");
    }

    None
}

/// Approval or a positive sale count both count as success for phrases.
fn is_success(obs: &Observation) -> bool {
    obs.approved || obs.sales > 0
}

pub struct PhraseTemplateMiner;

impl Miner for PhraseTemplateMiner {
    fn name(&self) -> &'static str {
        "phrase-template"
    }

    fn insight_type(&self) -> InsightType {
        InsightType::PhrasePattern
    }

    fn mine(&self, observations: &[Observation]) -> MinerOutput {
        let buckets = group_by_key(
            observations,
            |obs| extract_template(&obs.label).map(str::to_string).into_iter().collect(),
            is_success,
        );

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

fn template_display(key: &str) -> &'static str {
    TEMPLATES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, display)| *display)
        .unwrap_or("{unknown}")
}

fn describe(bucket: &Bucket<'_>, confidence: f64) -> InsightDraft {
    let display = template_display(&bucket.key);
    let examples: Vec<&str> = bucket
        .members
        .iter()
        .take(MAX_EXAMPLES)
        .map(|o| o.label.as_str())
        .collect();

    let mut breakdown: HashMap<String, (usize, usize)> = HashMap::new();
    for obs in &bucket.members {
        let entry = breakdown
            .entry(crate::db::store::normalize_niche(&obs.niche))
            .or_insert((0, 0));
        entry.0 += 1;
        if is_success(obs) {
            entry.1 += 1;
        }
    }
    let niche_breakdown: serde_json::Map<String, serde_json::Value> = breakdown
        .into_iter()
        .map(|(niche, (total, success))| {
            (niche, json!({ "total": total, "success": success }))
        })
        .collect();

    let candidate = bucket.to_candidate(InsightType::PhrasePattern);
    let sample_size = candidate.total_count;
    let success_rate = candidate.success_rate();

    InsightDraft {
        insight_type: candidate.insight_type,
        pattern_key: candidate.pattern_key,
        category: dominant_niche(bucket),
        title: format!("Phrase template: {display}"),
        description: format!(
            "\"{display}\" phrases succeed in {:.0}% of {sample_size} observed uses",
            success_rate * 100.0,
        ),
        payload: json!({
            "template": display,
            "examples": examples,
            "niche_breakdown": niche_breakdown,
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

    fn obs(id: &str, label: &str, approved: bool, created_at: i64) -> Observation {
        Observation {
            id: id.to_string(),
            label: label.to_string(),
            niche: "cats".to_string(),
            style: None,
            tone: None,
            source_query: None,
            approved,
            sales: 0,
            engagement: 0,
            rating: None,
            created_at,
        }
    }

    const WEEK: i64 = 7 * 86_400;

    #[test]
    fn template_extraction_cases() {
        assert_eq!(extract_template("World's Okayest Golfer"), Some("worlds-superlative"));
        assert_eq!(extract_template("Powered by Coffee"), Some("powered-by"));
        assert_eq!(extract_template("I Turn Coffee Into Code"), Some("pronoun-verb-noun"));
        assert_eq!(extract_template("Retired Teacher"), Some("descriptor-profession"));
        assert_eq!(extract_template("Sarcasm Loading"), Some("topic-state"));
        assert_eq!(extract_template("Silently Judging You"), Some("adverb-action"));
        assert_eq!(extract_template("Completely Unmatched Text Here Ok"), Some("adverb-action"));
        assert_eq!(extract_template("Just A Cat Picture"), None);
        assert_eq!(extract_template(""), None);
    }

    #[test]
    fn first_matching_template_wins() {
        // Starts with "world's" but also ends in a profession — the earlier
        // check in the fixed order takes it.
        assert_eq!(extract_template("World's Best Nurse"), Some("worlds-superlative"));
    }

    #[test]
    fn reference_scenario_produces_one_validated_insight() {
        // 12 phrases matching "World's {adj} {noun}" across 3 distinct
        // weeks, 10 approved.
        let batch: Vec<Observation> = (0..12)
            .map(|i| {
                obs(
                    &format!("p{i}"),
                    &format!("World's Okayest Thing{i}"),
                    i < 10,
                    (i as i64 % 3) * WEEK,
                )
            })
            .collect();

        let output = PhraseTemplateMiner.mine(&batch);
        assert_eq!(output.drafts.len(), 1);
        assert_eq!(output.rejected, 0);
        let draft = &output.drafts[0];
        assert_eq!(draft.insight_type, InsightType::PhrasePattern);
        assert_eq!(draft.pattern_key, "worlds-superlative");
        assert_eq!(draft.sample_size, 12);
        assert!((draft.success_rate - 10.0 / 12.0).abs() < 1e-9);
        assert!(draft.confidence >= 0.8);
        assert_eq!(draft.niches, vec!["cats"]);
        let examples = draft.payload["examples"].as_array().unwrap();
        assert_eq!(examples.len(), 5);
    }

    #[test]
    fn nine_samples_never_mine() {
        let batch: Vec<Observation> = (0..9)
            .map(|i| obs(&format!("p{i}"), "World's Best Thing", true, i as i64 * WEEK))
            .collect();
        let output = PhraseTemplateMiner.mine(&batch);
        assert!(output.drafts.is_empty());
        assert_eq!(output.rejected, 1);
    }

    #[test]
    fn single_week_burst_never_mines() {
        let batch: Vec<Observation> = (0..50)
            .map(|i| obs(&format!("p{i}"), "World's Best Thing", true, i as i64))
            .collect();
        let output = PhraseTemplateMiner.mine(&batch);
        assert!(output.drafts.is_empty());
        assert_eq!(output.rejected, 1);
    }

    #[test]
    fn unmatched_phrases_are_skipped_not_bucketed() {
        let batch: Vec<Observation> = (0..20)
            .map(|i| obs(&format!("p{i}"), "Random Cat Picture Four", true, (i as i64 % 4) * WEEK))
            .collect();
        let output = PhraseTemplateMiner.mine(&batch);
        assert!(output.drafts.is_empty());
        assert_eq!(output.rejected, 0);
    }
}
