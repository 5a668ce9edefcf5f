//! Batch orchestration: one `run_once` reads a bounded observation
//! snapshot, fans the five miners out concurrently, materializes the
//! survivors, then runs the market pass (rank spikes → niche aggregates)
//! and the fusion pass. Per-candidate failures are collected into the
//! summary; only configuration errors abort the run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{Config, DB_MAX_CONNECTIONS, MIN_BATCH_SIZE};
use crate::db::store::{normalize_niche, KnowledgeStore};
use crate::error::Result;
use crate::market::aggregator::aggregate_niche;
use crate::market::fusion::{matching_listings, score_fusion};
use crate::market::rank_spike::{RankCache, RankSpikeDetector};
use crate::materializer::{MaterializeOutcome, Materializer};
use crate::miners::all_miners;
use crate::types::{InsightDraft, InsightType, Listing, MiningSummary, Observation};

pub struct Orchestrator {
    cfg: Config,
    store: KnowledgeStore,
}

impl Orchestrator {
    pub fn new(cfg: Config, store: KnowledgeStore) -> Self {
        Self { cfg, store }
    }

    /// One full mining pass. `now` is unix seconds; injecting it keeps runs
    /// reproducible under test.
    pub async fn run_once(&self, now: i64) -> Result<MiningSummary> {
        // Config problems make every downstream number meaningless — abort
        // before any write.
        self.cfg.validate()?;

        let started = Instant::now();
        let mut summary = MiningSummary::default();

        let observations = self.store.fetch_observations(&self.cfg, now).await?;
        summary.observations_loaded = observations.len();

        if observations.len() < MIN_BATCH_SIZE {
            info!(
                count = observations.len(),
                min = MIN_BATCH_SIZE,
                "observation batch below minimum, nothing to mine",
            );
            summary.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(summary);
        }

        let drafts = self.run_miners(Arc::new(observations.clone()), &mut summary).await;
        self.materialize_drafts(&drafts, now, &mut summary).await;
        self.run_market_pass(&observations, &drafts, now, &mut summary).await;

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            created = summary.insights_created,
            updated = summary.insights_updated,
            rejected = summary.candidates_rejected,
            niches = summary.niches_analyzed,
            spikes = summary.spikes_detected,
            fusions = summary.fusions_scored,
            errors = summary.errors.len(),
            elapsed_ms = summary.elapsed_ms,
            "mining run complete",
        );
        Ok(summary)
    }

    /// Fan the miners out as parallel tasks; a panic or error in one miner
    /// never aborts the others.
    async fn run_miners(
        &self,
        observations: Arc<Vec<Observation>>,
        summary: &mut MiningSummary,
    ) -> Vec<InsightDraft> {
        let handles: Vec<_> = all_miners()
            .into_iter()
            .map(|miner| {
                let obs = Arc::clone(&observations);
                tokio::spawn(async move {
                    let name = miner.name();
                    (name, miner.mine(&obs))
                })
            })
            .collect();

        let mut drafts = Vec::new();
        for result in join_all(handles).await {
            match result {
                Ok((name, output)) => {
                    info!(
                        miner = name,
                        validated = output.drafts.len(),
                        rejected = output.rejected,
                        "miner finished",
                    );
                    summary.candidates_rejected += output.rejected;
                    drafts.extend(output.drafts);
                }
                Err(e) => {
                    error!("miner task failed: {e}");
                    summary.errors.push(format!("miner task failed: {e}"));
                }
            }
        }
        drafts
    }

    /// One write per surviving candidate; a failed write is recorded and
    /// mining continues with the next.
    async fn materialize_drafts(
        &self,
        drafts: &[InsightDraft],
        now: i64,
        summary: &mut MiningSummary,
    ) {
        let materializer = Materializer::new(self.store.pool().clone());
        for draft in drafts {
            match materializer.materialize(draft, now).await {
                Ok(MaterializeOutcome::Created) => summary.insights_created += 1,
                Ok(MaterializeOutcome::Refreshed) => summary.insights_updated += 1,
                Err(e) => {
                    error!(
                        insight_type = %draft.insight_type,
                        pattern_key = %draft.pattern_key,
                        "insight write failed: {e}",
                    );
                    summary
                        .errors
                        .push(format!("{}/{}: {e}", draft.insight_type, draft.pattern_key));
                }
            }
        }
    }

    /// Rank spikes, per-niche aggregates, and fusion scoring. Niches are
    /// independent, so they fan out bounded by the pool's connection limit.
    async fn run_market_pass(
        &self,
        observations: &[Observation],
        drafts: &[InsightDraft],
        now: i64,
        summary: &mut MiningSummary,
    ) {
        let listings_by_niche = match self.store.fetch_listings_by_niche().await {
            Ok(map) => map,
            Err(e) => {
                error!("listing fetch failed: {e}");
                summary.errors.push(format!("listing fetch: {e}"));
                return;
            }
        };
        if listings_by_niche.is_empty() {
            return;
        }

        // Kept for the fusion pass, which matches across all niches.
        let all_listings: Vec<Listing> =
            listings_by_niche.values().flatten().cloned().collect();

        let mut obs_by_niche: HashMap<String, Vec<Observation>> = HashMap::new();
        for obs in observations {
            obs_by_niche
                .entry(normalize_niche(&obs.niche))
                .or_default()
                .push(obs.clone());
        }

        let latest = match self.store.latest_ranks().await {
            Ok(map) => map,
            Err(e) => {
                error!("rank history fetch failed: {e}");
                summary.errors.push(format!("rank history fetch: {e}"));
                return;
            }
        };
        let detector = Arc::new(RankSpikeDetector::new(
            self.store.clone(),
            RankCache::from_latest(latest),
        ));
        let semaphore = Arc::new(Semaphore::new(DB_MAX_CONNECTIONS as usize));

        let handles: Vec<_> = listings_by_niche
            .into_iter()
            .map(|(niche, listings)| {
                let store = self.store.clone();
                let detector = Arc::clone(&detector);
                let semaphore = Arc::clone(&semaphore);
                let niche_obs = obs_by_niche.remove(&niche).unwrap_or_default();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    analyze_niche(&store, &detector, niche, listings, niche_obs, now).await
                })
            })
            .collect();

        for result in join_all(handles).await {
            match result {
                Ok(outcome) => {
                    summary.niches_analyzed += 1;
                    summary.spikes_detected += outcome.spikes;
                    summary.errors.extend(outcome.errors);
                }
                Err(e) => {
                    error!("niche analysis task failed: {e}");
                    summary.errors.push(format!("niche analysis task failed: {e}"));
                }
            }
        }

        self.run_fusion_pass(drafts, &all_listings, now, summary).await;
    }

    /// Score the niche pairs surfaced by the co-occurrence miner against
    /// the listings serving both markets.
    async fn run_fusion_pass(
        &self,
        drafts: &[InsightDraft],
        all_listings: &[Listing],
        now: i64,
        summary: &mut MiningSummary,
    ) {
        for draft in drafts {
            if draft.insight_type != InsightType::NicheFusion {
                continue;
            }
            let [niche_a, niche_b] = draft.niches.as_slice() else {
                warn!(pattern_key = %draft.pattern_key, "fusion draft without a niche pair");
                continue;
            };

            let matches = matching_listings(all_listings, niche_a, niche_b);
            let Some(outcome) = score_fusion(niche_a, niche_b, &matches) else {
                continue;
            };

            match self.store.upsert_fusion(&outcome, now).await {
                Ok(()) => summary.fusions_scored += 1,
                Err(e) => {
                    error!(pair = %draft.pattern_key, "fusion write failed: {e}");
                    summary.errors.push(format!("fusion {}: {e}", draft.pattern_key));
                }
            }
        }
    }
}

struct NicheOutcome {
    spikes: u64,
    errors: Vec<String>,
}

/// Rank pass then aggregate for one niche. Spike flags raised in this run
/// are reflected in the local listing copies so the aggregate sees them
/// without a re-read.
async fn analyze_niche(
    store: &KnowledgeStore,
    detector: &RankSpikeDetector,
    niche: String,
    mut listings: Vec<Listing>,
    niche_obs: Vec<Observation>,
    now: i64,
) -> NicheOutcome {
    let mut outcome = NicheOutcome { spikes: 0, errors: Vec::new() };

    for listing in listings.iter_mut() {
        match detector.observe(listing, now).await {
            Ok(Some(delta)) if delta.is_spike() => {
                outcome.spikes += 1;
                listing.spike_flagged_at = Some(now);
                listing.last_rank_change = delta.rank_change;
            }
            Ok(_) => {}
            Err(e) => {
                error!(listing_id = %listing.id, "rank observation failed: {e}");
                outcome.errors.push(format!("rank {}: {e}", listing.id));
            }
        }
    }

    let obs_refs: Vec<&Observation> = niche_obs.iter().collect();
    let aggregate = aggregate_niche(&niche, &listings, &obs_refs, now);
    if let Err(e) = store.upsert_niche_stats(&aggregate, now).await {
        error!(niche = %niche, "aggregate write failed: {e}");
        outcome.errors.push(format!("aggregate {niche}: {e}"));
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    const WEEK: i64 = 7 * 86_400;
    // Mid-2026, far from any period boundary.
    const NOW: i64 = 1_785_000_000;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
        pool
    }

    fn test_config() -> Config {
        Config {
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            miner_interval_secs: 3600,
            observation_batch_cap: 1000,
            observation_max_age_days: 365,
            observation_min_engagement: 0,
        }
    }

    async fn seed_observation(
        pool: &SqlitePool,
        id: &str,
        label: &str,
        approved: bool,
        created_at: i64,
    ) {
        sqlx::query(
            r#"
            INSERT INTO observations (id, label, niche, approved, sales, engagement, is_test, created_at)
            VALUES (?, ?, 'cats', ?, 0, 1, 0, ?)
            "#,
        )
        .bind(id)
        .bind(label)
        .bind(i64::from(approved))
        .bind(created_at)
        .execute(pool)
        .await
        .expect("seed observation");
    }

    async fn seed_listing(pool: &SqlitePool, id: &str, title: &str, rank: i64) {
        sqlx::query(
            r#"
            INSERT INTO listings (id, title, niche, price, review_count, rating, sales_rank, engagement, scraped_at)
            VALUES (?, ?, 'cats', 19.99, 25, 4.2, ?, 10, ?)
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(rank)
        .bind(NOW)
        .execute(pool)
        .await
        .expect("seed listing");
    }

    /// 12 phrases matching one template, 10 approved, across 3 weeks.
    async fn seed_reference_batch(pool: &SqlitePool) {
        for i in 0..12 {
            seed_observation(
                pool,
                &format!("p{i}"),
                &format!("World's Okayest Thing{i}"),
                i < 10,
                NOW - (i % 3) * WEEK,
            )
            .await;
        }
    }

    #[tokio::test]
    async fn small_batch_is_a_noop_not_an_error() {
        let pool = test_pool().await;
        for i in 0..5 {
            seed_observation(&pool, &format!("p{i}"), "World's Best Cat", true, NOW).await;
        }
        let orchestrator = Orchestrator::new(test_config(), KnowledgeStore::new(pool.clone()));
        let summary = orchestrator.run_once(NOW).await.expect("run");
        assert_eq!(summary.observations_loaded, 5);
        assert_eq!(summary.insights_created, 0);
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insights")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn invalid_config_aborts_before_any_write() {
        let pool = test_pool().await;
        seed_reference_batch(&pool).await;
        let mut cfg = test_config();
        cfg.observation_batch_cap = 0;
        let orchestrator = Orchestrator::new(cfg, KnowledgeStore::new(pool.clone()));
        assert!(orchestrator.run_once(NOW).await.is_err());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insights")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn reference_batch_mines_one_phrase_insight() {
        let pool = test_pool().await;
        seed_reference_batch(&pool).await;
        let orchestrator = Orchestrator::new(test_config(), KnowledgeStore::new(pool.clone()));
        let summary = orchestrator.run_once(NOW).await.expect("run");

        assert!(summary.insights_created >= 1);
        assert!(summary.errors.is_empty());

        let rows: Vec<(String, i64, f64, f64)> = sqlx::query_as(
            "SELECT pattern_key, sample_size, success_rate, confidence
             FROM insights WHERE insight_type = 'phrase-pattern'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        let (pattern_key, sample_size, success_rate, confidence) = &rows[0];
        assert_eq!(pattern_key, "worlds-superlative");
        assert_eq!(*sample_size, 12);
        assert!((success_rate - 10.0 / 12.0).abs() < 1e-6);
        assert!(*confidence >= 0.8);
    }

    #[tokio::test]
    async fn rerunning_identical_batch_is_idempotent() {
        let pool = test_pool().await;
        seed_reference_batch(&pool).await;
        let orchestrator = Orchestrator::new(test_config(), KnowledgeStore::new(pool.clone()));

        let first = orchestrator.run_once(NOW).await.expect("first run");
        let created_first = first.insights_created;
        assert!(created_first >= 1);

        let before: Vec<(String, String, i64, f64)> = sqlx::query_as(
            "SELECT insight_type, pattern_key, sample_size, confidence
             FROM insights ORDER BY insight_type, pattern_key",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let second = orchestrator.run_once(NOW).await.expect("second run");
        assert_eq!(second.insights_created, 0);
        assert_eq!(second.insights_updated, created_first);

        let after: Vec<(String, String, i64, f64)> = sqlx::query_as(
            "SELECT insight_type, pattern_key, sample_size, confidence
             FROM insights ORDER BY insight_type, pattern_key",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        // Same rows, same evidence — the refresh with identical input is a
        // no-op in effect.
        assert_eq!(before, after);

        let validations: i64 = sqlx::query_scalar(
            "SELECT times_validated FROM insights WHERE insight_type = 'phrase-pattern'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(validations, 2);
    }

    #[tokio::test]
    async fn new_evidence_updates_in_place() {
        let pool = test_pool().await;
        seed_reference_batch(&pool).await;
        let orchestrator = Orchestrator::new(test_config(), KnowledgeStore::new(pool.clone()));
        orchestrator.run_once(NOW).await.expect("first run");

        // Two more matching, approved observations in a 4th week.
        seed_observation(&pool, "extra1", "World's Okayest Extra", true, NOW + WEEK).await;
        seed_observation(&pool, "extra2", "World's Finest Extra", true, NOW + WEEK).await;

        let summary = orchestrator.run_once(NOW + WEEK).await.expect("second run");
        assert_eq!(summary.insights_created, 0);

        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT sample_size FROM insights WHERE insight_type = 'phrase-pattern'",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 1, "update must not duplicate the insight");
        assert_eq!(rows[0].0, 14);
    }

    #[tokio::test]
    async fn market_pass_writes_aggregates_and_rank_history() {
        let pool = test_pool().await;
        seed_reference_batch(&pool).await;
        for i in 0..4 {
            seed_listing(&pool, &format!("l{i}"), &format!("Cat Tee {i}"), 100_000).await;
        }
        let orchestrator = Orchestrator::new(test_config(), KnowledgeStore::new(pool.clone()));
        let summary = orchestrator.run_once(NOW).await.expect("run");
        assert_eq!(summary.niches_analyzed, 1);
        // First sighting of every listing: history recorded, no spikes.
        assert_eq!(summary.spikes_detected, 0);

        let (listing_count, saturation): (i64, String) = sqlx::query_as(
            "SELECT listing_count, saturation FROM niche_stats WHERE niche = 'cats'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(listing_count, 4);
        assert_eq!(saturation, "low");

        let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rank_history")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(history, 4);
    }

    #[tokio::test]
    async fn rank_spike_fires_on_next_window_and_flags_listing() {
        let pool = test_pool().await;
        seed_reference_batch(&pool).await;
        seed_listing(&pool, "hot", "Cat Tee Hot", 100_000).await;
        let store = KnowledgeStore::new(pool.clone());
        let orchestrator = Orchestrator::new(test_config(), store);

        orchestrator.run_once(NOW).await.expect("first run");

        // Rank improves 60% by the next observation window.
        sqlx::query("UPDATE listings SET sales_rank = 40000 WHERE id = 'hot'")
            .execute(&pool)
            .await
            .unwrap();
        let summary = orchestrator.run_once(NOW + 2 * 3600).await.expect("second run");
        assert_eq!(summary.spikes_detected, 1);

        let (severity, flagged): (Option<String>, Option<i64>) = sqlx::query_as(
            r#"
            SELECT h.spike_severity, l.spike_flagged_at
            FROM rank_history h JOIN listings l ON l.id = h.listing_id
            WHERE h.listing_id = 'hot'
            ORDER BY h.recorded_at DESC LIMIT 1
            "#,
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(severity.as_deref(), Some("viral"));
        assert!(flagged.is_some());
    }
}
