//! Cross-niche co-occurrence miner: finds niche pairs that keep showing up
//! inside the same originating query and proposes them as fusion
//! candidates.
//!
//! Co-occurrence has no natural success/trial ratio, so this miner scores
//! with its own monotonic pair-count confidence instead of the shared
//! estimator.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::json;
use tracing::trace;

use crate::db::store::normalize_niche;
use crate::miners::{risk_label, Miner, MinerOutput};
use crate::types::{InsightDraft, InsightType, Observation};

/// Minimum number of groups a pair must co-occur in.
const MIN_PAIR_OCCURRENCES: usize = 10;

/// `min(0.9, 0.4 + 0.03 * count)` — monotonic in pair count, capped.
fn pair_confidence(count: usize) -> f64 {
    (0.4 + 0.03 * count as f64).min(0.9)
}

#[derive(Default)]
struct PairEvidence {
    /// Groups the pair co-occurred in.
    occurrences: usize,
    /// Groups where some contributing observation had positive sales.
    converting_occurrences: usize,
    /// Contributing observation ids, insertion order, deduplicated.
    observation_ids: Vec<String>,
}

pub struct CrossNicheMiner;

impl Miner for CrossNicheMiner {
    fn name(&self) -> &'static str {
        "cross-niche"
    }

    fn insight_type(&self) -> InsightType {
        InsightType::NicheFusion
    }

    fn mine(&self, observations: &[Observation]) -> MinerOutput {
        // Group by originating query; observations without one cannot
        // co-occur with anything.
        let mut groups: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
        for obs in observations {
            if let Some(query) = obs.source_query.as_deref() {
                groups.entry(query).or_default().push(obs);
            }
        }

        let mut pair_order: Vec<(String, String)> = Vec::new();
        let mut pairs: HashMap<(String, String), PairEvidence> = HashMap::new();

        for members in groups.values() {
            let niches: BTreeSet<String> =
                members.iter().map(|o| normalize_niche(&o.niche)).collect();
            if niches.len() < 2 {
                continue;
            }
            let niche_list: Vec<&String> = niches.iter().collect();
            let group_converts = members.iter().any(|o| o.sales > 0);

            for i in 0..niche_list.len() {
                for j in (i + 1)..niche_list.len() {
                    let key = (niche_list[i].clone(), niche_list[j].clone());
                    if !pairs.contains_key(&key) {
                        pair_order.push(key.clone());
                    }
                    let evidence = pairs.entry(key.clone()).or_default();
                    evidence.occurrences += 1;
                    if group_converts {
                        evidence.converting_occurrences += 1;
                    }
                    for obs in members {
                        let obs_niche = normalize_niche(&obs.niche);
                        if (obs_niche == *niche_list[i] || obs_niche == *niche_list[j])
                            && !evidence.observation_ids.contains(&obs.id)
                        {
                            evidence.observation_ids.push(obs.id.clone());
                        }
                    }
                }
            }
        }

        let mut output = MinerOutput::default();
        for key in pair_order {
            let evidence = &pairs[&key];
            if evidence.occurrences < MIN_PAIR_OCCURRENCES {
                trace!(
                    pair = %format!("{}+{}", key.0, key.1),
                    occurrences = evidence.occurrences,
                    "fusion pair rejected: too few co-occurrences"
                );
                output.rejected += 1;
                continue;
            }
            output.drafts.push(describe(&key.0, &key.1, evidence));
        }
        output
    }
}

fn describe(niche_a: &str, niche_b: &str, evidence: &PairEvidence) -> InsightDraft {
    let confidence = pair_confidence(evidence.occurrences);
    let success_rate = evidence.converting_occurrences as f64 / evidence.occurrences as f64;
    let suggestions = [
        format!("{niche_a} for {niche_b} lovers"),
        format!("{niche_a} meets {niche_b}"),
    ];

    InsightDraft {
        insight_type: InsightType::NicheFusion,
        pattern_key: format!("{niche_a}+{niche_b}"),
        category: niche_a.to_string(),
        title: format!("Niche fusion: {niche_a} \u{00d7} {niche_b}"),
        description: format!(
            "{niche_a} and {niche_b} co-occur in {} distinct queries",
            evidence.occurrences,
        ),
        payload: json!({
            "niche_a": niche_a,
            "niche_b": niche_b,
            "pair_occurrences": evidence.occurrences,
            "fusion_phrases": suggestions,
        }),
        sample_size: evidence.occurrences,
        confidence,
        success_rate,
        niches: vec![niche_a.to_string(), niche_b.to_string()],
        timeframe: "rolling".to_string(),
        risk: risk_label(confidence, evidence.occurrences),
        observation_ids: evidence.observation_ids.clone(),
    }
}
