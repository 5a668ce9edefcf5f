//! Database row types matching migrations/0001_init.sql.
//! Used by sqlx `query_as` calls in the store.

#[derive(Debug, sqlx::FromRow)]
pub struct ObservationRow {
    pub id: String,
    pub label: String,
    pub niche: String,
    pub style: Option<String>,
    pub tone: Option<String>,
    pub source_query: Option<String>,
    pub approved: i64,
    pub sales: i64,
    pub engagement: i64,
    pub rating: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRow {
    pub id: String,
    pub title: String,
    pub niche: String,
    pub price: f64,
    pub review_count: i64,
    pub rating: f64,
    pub sales_rank: i64,
    pub engagement: i64,
    pub spike_flagged_at: Option<i64>,
    pub last_rank_change: Option<i64>,
    pub scraped_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct InsightRow {
    pub id: i64,
    pub insight_type: String,
    pub pattern_key: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub payload: String,
    pub sample_size: i64,
    pub confidence: f64,
    pub success_rate: f64,
    pub niches: String,
    pub timeframe: String,
    pub risk: String,
    pub observation_ids: String,
    pub times_validated: i64,
    pub last_validated_at: i64,
    pub is_active: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct NicheStatsRow {
    pub niche: String,
    pub listing_count: i64,
    pub observation_count: i64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_reviews: Option<f64>,
    pub avg_rating: Option<f64>,
    pub saturation: String,
    pub recommendation: String,
    pub recommendation_reason: String,
    pub recommendation_confidence: f64,
    pub top_keywords: String,
    pub top_price_points: String,
    pub top_styles: String,
    pub detected_gaps: String,
    pub opportunity_score: f64,
    pub spike_count: i64,
    pub last_analyzed_at: i64,
    pub query_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RankHistoryRow {
    pub id: i64,
    pub listing_id: String,
    pub rank: i64,
    pub previous_rank: Option<i64>,
    pub rank_change: Option<i64>,
    pub percent_change: Option<f64>,
    pub is_spike: i64,
    pub spike_severity: Option<String>,
    pub recorded_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct FusionRow {
    pub id: i64,
    pub niche_a: String,
    pub niche_b: String,
    pub combined_query: String,
    pub matched_listings: i64,
    pub avg_engagement: f64,
    pub avg_rank: f64,
    pub opportunity_score: f64,
    pub saturation: String,
    pub recommendation: String,
    pub example_listing: Option<String>,
    pub times_validated: i64,
    pub last_scored_at: i64,
}
