//! Idempotent create-or-refresh of validated candidates into the insights
//! table. The write is a single conditional upsert against the
//! (insight_type, pattern_key) unique key, so concurrent runs cannot
//! produce duplicate rows and the validation counter increments in SQL.

use serde_json::Value;
use sqlx::SqlitePool;

use crate::db::models::InsightRow;
use crate::error::Result;
use crate::types::InsightDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    Created,
    Refreshed,
}

pub struct Materializer {
    pool: SqlitePool,
}

impl Materializer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist one validated candidate. Scalar evidence (sample size,
    /// confidence, success rate) is replaced with the freshly computed
    /// values; list-valued evidence is unioned with the existing row's.
    pub async fn materialize(&self, draft: &InsightDraft, now: i64) -> Result<MaterializeOutcome> {
        let insight_type = draft.insight_type.to_string();

        let existing: Option<InsightRow> = sqlx::query_as(
            r#"
            SELECT id, insight_type, pattern_key, category, title, description,
                   payload, sample_size, confidence, success_rate, niches,
                   timeframe, risk, observation_ids, times_validated,
                   last_validated_at, is_active
            FROM insights
            WHERE insight_type = ? AND pattern_key = ? AND is_active = 1
            "#,
        )
        .bind(&insight_type)
        .bind(&draft.pattern_key)
        .fetch_optional(&self.pool)
        .await?;

        let (niches, observation_ids, payload) = match &existing {
            Some(row) => {
                let prior_niches: Vec<String> = serde_json::from_str(&row.niches)?;
                let prior_ids: Vec<String> = serde_json::from_str(&row.observation_ids)?;
                let prior_payload: Value = serde_json::from_str(&row.payload)?;
                (
                    union_strings(prior_niches, &draft.niches),
                    union_strings(prior_ids, &draft.observation_ids),
                    merge_payload(prior_payload, draft.payload.clone()),
                )
            }
            None => (
                draft.niches.clone(),
                draft.observation_ids.clone(),
                draft.payload.clone(),
            ),
        };

        sqlx::query(
            r#"
            INSERT INTO insights (
                insight_type, pattern_key, category, title, description,
                payload, sample_size, confidence, success_rate, niches,
                timeframe, risk, observation_ids, times_validated,
                last_validated_at, is_active
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, 1)
            ON CONFLICT(insight_type, pattern_key) DO UPDATE SET
                category = excluded.category,
                title = excluded.title,
                description = excluded.description,
                payload = excluded.payload,
                sample_size = excluded.sample_size,
                confidence = excluded.confidence,
                success_rate = excluded.success_rate,
                niches = excluded.niches,
                timeframe = excluded.timeframe,
                risk = excluded.risk,
                observation_ids = excluded.observation_ids,
                times_validated = insights.times_validated + 1,
                last_validated_at = excluded.last_validated_at,
                is_active = 1
            "#,
        )
        .bind(&insight_type)
        .bind(&draft.pattern_key)
        .bind(&draft.category)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(serde_json::to_string(&payload)?)
        .bind(draft.sample_size as i64)
        .bind(draft.confidence)
        .bind(draft.success_rate)
        .bind(serde_json::to_string(&niches)?)
        .bind(&draft.timeframe)
        .bind(draft.risk.to_string())
        .bind(serde_json::to_string(&observation_ids)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(if existing.is_some() {
            MaterializeOutcome::Refreshed
        } else {
            MaterializeOutcome::Created
        })
    }
}

/// Union preserving prior order, appending new entries in their own order.
fn union_strings(mut prior: Vec<String>, fresh: &[String]) -> Vec<String> {
    for item in fresh {
        if !prior.contains(item) {
            prior.push(item.clone());
        }
    }
    prior
}

/// Fresh payload wins for scalar fields; array fields present in both are
/// unioned so accumulated examples survive a refresh.
fn merge_payload(prior: Value, fresh: Value) -> Value {
    match (prior, fresh) {
        (Value::Object(prior_map), Value::Object(mut fresh_map)) => {
            for (key, prior_value) in prior_map {
                let Value::Array(prior_items) = prior_value else {
                    continue;
                };
                if let Some(Value::Array(fresh_items)) = fresh_map.get_mut(&key) {
                    let mut merged = prior_items;
                    for item in std::mem::take(fresh_items) {
                        if !merged.contains(&item) {
                            merged.push(item);
                        }
                    }
                    *fresh_items = merged;
                }
            }
            Value::Object(fresh_map)
        }
        (_, fresh) => fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn union_keeps_prior_order_and_dedups() {
        let merged = union_strings(
            vec!["a".to_string(), "b".to_string()],
            &["b".to_string(), "c".to_string()],
        );
        assert_eq!(merged, vec!["a", "b", "c"]);
    }

    #[test]
    fn payload_arrays_are_unioned_scalars_replaced() {
        let prior = json!({ "examples": ["one", "two"], "mean_sales": 1.0 });
        let fresh = json!({ "examples": ["two", "three"], "mean_sales": 2.5 });
        let merged = merge_payload(prior, fresh);
        assert_eq!(merged["examples"], json!(["one", "two", "three"]));
        assert_eq!(merged["mean_sales"], json!(2.5));
    }

    #[test]
    fn identical_payload_merge_is_a_no_op() {
        let payload = json!({ "examples": ["a"], "rate": 0.5 });
        assert_eq!(merge_payload(payload.clone(), payload.clone()), payload);
    }

    #[test]
    fn non_object_payload_is_replaced() {
        assert_eq!(merge_payload(json!([1]), json!([2])), json!([2]));
    }
}
