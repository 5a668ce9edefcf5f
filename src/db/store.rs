use std::collections::HashMap;

use sqlx::SqlitePool;

use crate::config::{Config, RANK_DEDUP_WINDOW_SECS};
use crate::db::models::{FusionRow, InsightRow, ListingRow, NicheStatsRow, ObservationRow};
use crate::error::Result;
use crate::types::{FusionOutcome, Listing, NicheAggregate, Observation, RankDelta};

/// Typed access to the knowledge store. Cheap to clone; all methods borrow
/// the shared pool.
#[derive(Clone)]
pub struct KnowledgeStore {
    pool: SqlitePool,
}

impl KnowledgeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Observation source
    // -----------------------------------------------------------------------

    /// Bounded snapshot of non-test observations carrying minimum signal,
    /// newest first. `now` is unix seconds.
    pub async fn fetch_observations(&self, cfg: &Config, now: i64) -> Result<Vec<Observation>> {
        let cutoff = now - cfg.observation_max_age_days * 86_400;
        let rows: Vec<ObservationRow> = sqlx::query_as(
            r#"
            SELECT id, label, niche, style, tone, source_query,
                   approved, sales, engagement, rating, created_at
            FROM observations
            WHERE is_test = 0 AND created_at > ? AND engagement >= ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(cutoff)
        .bind(cfg.observation_min_engagement)
        .bind(cfg.observation_batch_cap)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(observation_from_row).collect())
    }

    /// Full current listing snapshot, grouped by normalized niche key.
    pub async fn fetch_listings_by_niche(&self) -> Result<HashMap<String, Vec<Listing>>> {
        let rows: Vec<ListingRow> = sqlx::query_as(
            r#"
            SELECT id, title, niche, price, review_count, rating, sales_rank,
                   engagement, spike_flagged_at, last_rank_change, scraped_at
            FROM listings
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_niche: HashMap<String, Vec<Listing>> = HashMap::new();
        for row in rows {
            let listing = listing_from_row(row);
            let key = normalize_niche(&listing.niche);
            by_niche.entry(key).or_default().push(listing);
        }
        Ok(by_niche)
    }

    // -----------------------------------------------------------------------
    // Rank history
    // -----------------------------------------------------------------------

    /// Latest recorded rank and timestamp per listing, for hydrating the
    /// in-memory rank cache at the start of a run.
    pub async fn latest_ranks(&self) -> Result<HashMap<String, (i64, i64)>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT listing_id, rank, MAX(recorded_at) AS recorded_at
            FROM rank_history
            GROUP BY listing_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, rank, at)| (id, (rank, at)))
            .collect())
    }

    /// Append one rank-history entry unless one already exists for the
    /// listing inside the dedup window. Returns false when suppressed.
    pub async fn insert_rank_entry(&self, delta: &RankDelta, now: i64) -> Result<bool> {
        let last: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(recorded_at) FROM rank_history WHERE listing_id = ?",
        )
        .bind(&delta.listing_id)
        .fetch_one(&self.pool)
        .await?;

        if let Some(last) = last {
            if now - last < RANK_DEDUP_WINDOW_SECS {
                return Ok(false);
            }
        }

        let severity = delta.severity.map(|s| s.to_string());
        sqlx::query(
            r#"
            INSERT INTO rank_history (
                listing_id, rank, previous_rank, rank_change, percent_change,
                is_spike, spike_severity, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&delta.listing_id)
        .bind(delta.rank)
        .bind(delta.previous_rank)
        .bind(delta.rank_change)
        .bind(delta.percent_change)
        .bind(i64::from(delta.is_spike()))
        .bind(severity)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// Stamp the listing row itself when a spike fires, so the aggregator's
    /// spike count can read it without joining the history table.
    pub async fn flag_listing_spike(&self, listing_id: &str, change: i64, now: i64) -> Result<()> {
        sqlx::query("UPDATE listings SET spike_flagged_at = ?, last_rank_change = ? WHERE id = ?")
            .bind(now)
            .bind(change)
            .bind(listing_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Niche aggregates
    // -----------------------------------------------------------------------

    /// Create-or-replace the aggregate row for a niche. query_count is a
    /// usage counter owned by the retrieval API and survives recomputes.
    pub async fn upsert_niche_stats(&self, agg: &NicheAggregate, now: i64) -> Result<()> {
        let saturation = agg.saturation.to_string();
        let recommendation = agg.recommendation.to_string();
        sqlx::query(
            r#"
            INSERT INTO niche_stats (
                niche, listing_count, observation_count,
                avg_price, min_price, max_price, avg_reviews, avg_rating,
                saturation, recommendation, recommendation_reason,
                recommendation_confidence, top_keywords, top_price_points,
                top_styles, detected_gaps, opportunity_score, spike_count,
                last_analyzed_at, query_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(niche) DO UPDATE SET
                listing_count = excluded.listing_count,
                observation_count = excluded.observation_count,
                avg_price = excluded.avg_price,
                min_price = excluded.min_price,
                max_price = excluded.max_price,
                avg_reviews = excluded.avg_reviews,
                avg_rating = excluded.avg_rating,
                saturation = excluded.saturation,
                recommendation = excluded.recommendation,
                recommendation_reason = excluded.recommendation_reason,
                recommendation_confidence = excluded.recommendation_confidence,
                top_keywords = excluded.top_keywords,
                top_price_points = excluded.top_price_points,
                top_styles = excluded.top_styles,
                detected_gaps = excluded.detected_gaps,
                opportunity_score = excluded.opportunity_score,
                spike_count = excluded.spike_count,
                last_analyzed_at = excluded.last_analyzed_at
            "#,
        )
        .bind(&agg.niche)
        .bind(agg.listing_count)
        .bind(agg.observation_count)
        .bind(agg.avg_price)
        .bind(agg.min_price)
        .bind(agg.max_price)
        .bind(agg.avg_reviews)
        .bind(agg.avg_rating)
        .bind(saturation)
        .bind(recommendation)
        .bind(&agg.recommendation_reason)
        .bind(agg.recommendation_confidence)
        .bind(serde_json::to_string(&agg.top_keywords)?)
        .bind(serde_json::to_string(&agg.top_price_points)?)
        .bind(serde_json::to_string(&agg.top_styles)?)
        .bind(serde_json::to_string(&agg.detected_gaps)?)
        .bind(agg.opportunity_score)
        .bind(agg.spike_count)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fusion candidates
    // -----------------------------------------------------------------------

    /// Atomic upsert keyed by the ordered niche pair; the validation counter
    /// increments in SQL so concurrent runs cannot lose counts.
    pub async fn upsert_fusion(&self, fusion: &FusionOutcome, now: i64) -> Result<()> {
        let saturation = fusion.saturation.to_string();
        let recommendation = fusion.recommendation.to_string();
        sqlx::query(
            r#"
            INSERT INTO fusion_candidates (
                niche_a, niche_b, combined_query, matched_listings,
                avg_engagement, avg_rank, opportunity_score, saturation,
                recommendation, example_listing, times_validated, last_scored_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(niche_a, niche_b) DO UPDATE SET
                combined_query = excluded.combined_query,
                matched_listings = excluded.matched_listings,
                avg_engagement = excluded.avg_engagement,
                avg_rank = excluded.avg_rank,
                opportunity_score = excluded.opportunity_score,
                saturation = excluded.saturation,
                recommendation = excluded.recommendation,
                example_listing = excluded.example_listing,
                times_validated = fusion_candidates.times_validated + 1,
                last_scored_at = excluded.last_scored_at
            "#,
        )
        .bind(&fusion.niche_a)
        .bind(&fusion.niche_b)
        .bind(&fusion.combined_query)
        .bind(fusion.matched_listings)
        .bind(fusion.avg_engagement)
        .bind(fusion.avg_rank)
        .bind(fusion.opportunity_score)
        .bind(saturation)
        .bind(recommendation)
        .bind(&fusion.example_listing)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Retrieval (downstream consumer)
    // -----------------------------------------------------------------------

    /// Top still-relevant insights of one type applicable to a niche,
    /// ordered by confidence.
    pub async fn top_insights(
        &self,
        insight_type: &str,
        niche: &str,
        limit: i64,
    ) -> Result<Vec<InsightRow>> {
        let niche = normalize_niche(niche);
        let niche_json = format!("%\"{niche}\"%");
        let rows: Vec<InsightRow> = sqlx::query_as(
            r#"
            SELECT id, insight_type, pattern_key, category, title, description,
                   payload, sample_size, confidence, success_rate, niches,
                   timeframe, risk, observation_ids, times_validated,
                   last_validated_at, is_active
            FROM insights
            WHERE is_active = 1 AND insight_type = ?
              AND (category = ? OR niches LIKE ?)
            ORDER BY confidence DESC
            LIMIT ?
            "#,
        )
        .bind(insight_type)
        .bind(&niche)
        .bind(niche_json)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Current aggregate for a niche, bumping its usage counter.
    pub async fn niche_stats(&self, niche: &str) -> Result<Option<NicheStatsRow>> {
        let niche = normalize_niche(niche);
        sqlx::query("UPDATE niche_stats SET query_count = query_count + 1 WHERE niche = ?")
            .bind(&niche)
            .execute(&self.pool)
            .await?;

        let row: Option<NicheStatsRow> = sqlx::query_as(
            r#"
            SELECT niche, listing_count, observation_count, avg_price,
                   min_price, max_price, avg_reviews, avg_rating, saturation,
                   recommendation, recommendation_reason,
                   recommendation_confidence, top_keywords, top_price_points,
                   top_styles, detected_gaps, opportunity_score, spike_count,
                   last_analyzed_at, query_count
            FROM niche_stats
            WHERE niche = ?
            "#,
        )
        .bind(&niche)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Fusion candidates touching a niche that are not recommended against.
    pub async fn fusions_for_niche(&self, niche: &str) -> Result<Vec<FusionRow>> {
        let niche = normalize_niche(niche);
        let rows: Vec<FusionRow> = sqlx::query_as(
            r#"
            SELECT id, niche_a, niche_b, combined_query, matched_listings,
                   avg_engagement, avg_rank, opportunity_score, saturation,
                   recommendation, example_listing, times_validated,
                   last_scored_at
            FROM fusion_candidates
            WHERE (niche_a = ? OR niche_b = ?) AND recommendation != 'avoid'
            ORDER BY opportunity_score DESC
            "#,
        )
        .bind(&niche)
        .bind(&niche)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Niche keys are lower-cased and trimmed everywhere they are persisted or
/// looked up.
pub fn normalize_niche(niche: &str) -> String {
    niche.trim().to_lowercase()
}

fn observation_from_row(row: ObservationRow) -> Observation {
    Observation {
        id: row.id,
        label: row.label,
        niche: row.niche,
        style: row.style,
        tone: row.tone,
        source_query: row.source_query,
        approved: row.approved != 0,
        sales: row.sales,
        engagement: row.engagement,
        rating: row.rating,
        created_at: row.created_at,
    }
}

fn listing_from_row(row: ListingRow) -> Listing {
    Listing {
        id: row.id,
        title: row.title,
        niche: row.niche,
        price: row.price,
        review_count: row.review_count,
        rating: row.rating,
        sales_rank: row.sales_rank,
        engagement: row.engagement,
        spike_flagged_at: row.spike_flagged_at,
        last_rank_change: row.last_rank_change,
        scraped_at: row.scraped_at,
    }
}
