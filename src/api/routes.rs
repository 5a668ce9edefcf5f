//! Read-only retrieval surface for the downstream generation system: top
//! insights per dimension for a niche, the current niche aggregate, and
//! viable fusion candidates. Mining never goes through this router.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{FusionRow, InsightRow};
use crate::db::store::KnowledgeStore;
use crate::error::AppError;

#[derive(Clone)]
pub struct ApiState {
    pub store: KnowledgeStore,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/insights/:niche", get(get_insights))
        .route("/niches/:niche", get(get_niche))
        .route("/fusion/:niche", get(get_fusions))
        .route("/summary", get(get_summary))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct InsightsQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct InsightResponse {
    pub insight_type: String,
    pub pattern_key: String,
    pub title: String,
    pub description: String,
    pub payload: serde_json::Value,
    pub sample_size: i64,
    pub confidence: f64,
    pub success_rate: f64,
    pub niches: Vec<String>,
    pub risk: String,
    pub times_validated: i64,
}

#[derive(Serialize)]
pub struct InsightBundleResponse {
    pub phrase_patterns: Vec<InsightResponse>,
    pub listing_structures: Vec<InsightResponse>,
    pub styles: Vec<InsightResponse>,
    pub seasonal_trends: Vec<InsightResponse>,
}

#[derive(Serialize)]
pub struct NicheResponse {
    pub niche: String,
    pub listing_count: i64,
    pub avg_price: Option<f64>,
    pub avg_reviews: Option<f64>,
    pub avg_rating: Option<f64>,
    pub saturation: String,
    pub recommendation: String,
    pub recommendation_reason: String,
    pub recommendation_confidence: f64,
    pub top_keywords: Vec<String>,
    pub top_price_points: Vec<i64>,
    pub top_styles: Vec<String>,
    pub detected_gaps: Vec<String>,
    pub opportunity_score: f64,
    pub last_analyzed_at: i64,
}

#[derive(Serialize)]
pub struct FusionResponse {
    pub niche_a: String,
    pub niche_b: String,
    pub combined_query: String,
    pub matched_listings: i64,
    pub opportunity_score: f64,
    pub saturation: String,
    pub recommendation: String,
    pub example_listing: Option<String>,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub total_insights: i64,
    pub active_insights: i64,
    pub niches_tracked: i64,
    pub fusion_candidates: i64,
}

fn insight_response(row: InsightRow) -> InsightResponse {
    InsightResponse {
        insight_type: row.insight_type,
        pattern_key: row.pattern_key,
        title: row.title,
        description: row.description,
        payload: serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null),
        sample_size: row.sample_size,
        confidence: row.confidence,
        success_rate: row.success_rate,
        niches: serde_json::from_str(&row.niches).unwrap_or_default(),
        risk: row.risk,
        times_validated: row.times_validated,
    }
}

fn fusion_response(row: FusionRow) -> FusionResponse {
    FusionResponse {
        niche_a: row.niche_a,
        niche_b: row.niche_b,
        combined_query: row.combined_query,
        matched_listings: row.matched_listings,
        opportunity_score: row.opportunity_score,
        saturation: row.saturation,
        recommendation: row.recommendation,
        example_listing: row.example_listing,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_insights(
    State(state): State<ApiState>,
    Path(niche): Path<String>,
    Query(params): Query<InsightsQuery>,
) -> Result<Json<InsightBundleResponse>, AppError> {
    let limit = params.limit.unwrap_or(5).clamp(1, 50);

    let phrase_patterns = state.store.top_insights("phrase-pattern", &niche, limit).await?;
    let listing_structures = state.store.top_insights("listing-structure", &niche, limit).await?;
    let styles = state.store.top_insights("style-effectiveness", &niche, limit).await?;
    let seasonal_trends = state.store.top_insights("seasonal-trend", &niche, limit).await?;

    Ok(Json(InsightBundleResponse {
        phrase_patterns: phrase_patterns.into_iter().map(insight_response).collect(),
        listing_structures: listing_structures.into_iter().map(insight_response).collect(),
        styles: styles.into_iter().map(insight_response).collect(),
        seasonal_trends: seasonal_trends.into_iter().map(insight_response).collect(),
    }))
}

async fn get_niche(
    State(state): State<ApiState>,
    Path(niche): Path<String>,
) -> Result<Json<Option<NicheResponse>>, AppError> {
    let Some(row) = state.store.niche_stats(&niche).await? else {
        return Ok(Json(None));
    };

    Ok(Json(Some(NicheResponse {
        niche: row.niche,
        listing_count: row.listing_count,
        avg_price: row.avg_price,
        avg_reviews: row.avg_reviews,
        avg_rating: row.avg_rating,
        saturation: row.saturation,
        recommendation: row.recommendation,
        recommendation_reason: row.recommendation_reason,
        recommendation_confidence: row.recommendation_confidence,
        top_keywords: serde_json::from_str(&row.top_keywords).unwrap_or_default(),
        top_price_points: serde_json::from_str(&row.top_price_points).unwrap_or_default(),
        top_styles: serde_json::from_str(&row.top_styles).unwrap_or_default(),
        detected_gaps: serde_json::from_str(&row.detected_gaps).unwrap_or_default(),
        opportunity_score: row.opportunity_score,
        last_analyzed_at: row.last_analyzed_at,
    })))
}

async fn get_fusions(
    State(state): State<ApiState>,
    Path(niche): Path<String>,
) -> Result<Json<Vec<FusionResponse>>, AppError> {
    let rows = state.store.fusions_for_niche(&niche).await?;
    Ok(Json(rows.into_iter().map(fusion_response).collect()))
}

async fn get_summary(
    State(state): State<ApiState>,
) -> Result<Json<SummaryResponse>, AppError> {
    let pool = state.store.pool();
    let total_insights: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insights")
        .fetch_one(pool)
        .await?;
    let active_insights: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM insights WHERE is_active = 1")
            .fetch_one(pool)
            .await?;
    let niches_tracked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM niche_stats")
        .fetch_one(pool)
        .await?;
    let fusion_candidates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fusion_candidates")
        .fetch_one(pool)
        .await?;

    Ok(Json(SummaryResponse {
        total_insights,
        active_insights,
        niches_tracked,
        fusion_candidates,
    }))
}
