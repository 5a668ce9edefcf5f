use serde::{Deserialize, Serialize};

use crate::config::saturation_thresholds;

// ---------------------------------------------------------------------------
// Observation — one historical record used as raw mining evidence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    /// Free text: a generated phrase or a product title.
    pub label: String,
    pub niche: String,
    pub style: Option<String>,
    pub tone: Option<String>,
    /// Originating query — grouping key for co-occurrence mining.
    pub source_query: Option<String>,
    pub approved: bool,
    pub sales: i64,
    pub engagement: i64,
    pub rating: Option<f64>,
    /// Unix seconds UTC. Immutable; sole basis for temporal partitioning.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Listing — one scraped marketplace record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
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

// ---------------------------------------------------------------------------
// Insight dimensions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightType {
    PhrasePattern,
    StyleEffectiveness,
    SeasonalTrend,
    ListingStructure,
    NicheFusion,
}

impl std::fmt::Display for InsightType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InsightType::PhrasePattern => "phrase-pattern",
            InsightType::StyleEffectiveness => "style-effectiveness",
            InsightType::SeasonalTrend => "seasonal-trend",
            InsightType::ListingStructure => "listing-structure",
            InsightType::NicheFusion => "niche-fusion",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Saturation classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Saturation {
    /// No listings observed — nothing to classify.
    Unknown,
    /// 1–50 listings.
    Low,
    /// 51–200 listings.
    Medium,
    /// 201–500 listings.
    High,
    /// > 500 listings.
    Oversaturated,
}

impl Saturation {
    pub fn from_listing_count(count: i64) -> Self {
        use saturation_thresholds::*;
        if count > HIGH_MAX {
            Saturation::Oversaturated
        } else if count > MEDIUM_MAX {
            Saturation::High
        } else if count > LOW_MAX {
            Saturation::Medium
        } else if count > 0 {
            Saturation::Low
        } else {
            Saturation::Unknown
        }
    }
}

impl std::fmt::Display for Saturation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Saturation::Unknown => "unknown",
            Saturation::Low => "low",
            Saturation::Medium => "medium",
            Saturation::High => "high",
            Saturation::Oversaturated => "oversaturated",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Rank-spike classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeSeverity {
    /// Rank improved by more than 10%.
    Minor,
    /// Rank improved by more than 25%.
    Major,
    /// Rank improved by more than 50%.
    Viral,
}

impl std::fmt::Display for SpikeSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpikeSeverity::Minor => "minor",
            SpikeSeverity::Major => "major",
            SpikeSeverity::Viral => "viral",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Entry / fusion recommendation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Enter,
    Caution,
    Avoid,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Recommendation::Enter => "enter",
            Recommendation::Caution => "caution",
            Recommendation::Avoid => "avoid",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Risk label on a materialized insight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// PatternCandidate — ephemeral, rebuilt from scratch every run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PatternCandidate {
    pub insight_type: InsightType,
    pub pattern_key: String,
    /// Contributing observation ids, deduplicated, insertion order.
    pub observation_ids: Vec<String>,
    pub success_count: usize,
    pub total_count: usize,
}

impl PatternCandidate {
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_count as f64
        }
    }
}

// ---------------------------------------------------------------------------
// InsightDraft — a validated candidate described for materialization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InsightDraft {
    pub insight_type: InsightType,
    pub pattern_key: String,
    pub category: String,
    pub title: String,
    pub description: String,
    /// Dimension-specific payload, persisted as JSON.
    pub payload: serde_json::Value,
    pub sample_size: usize,
    pub confidence: f64,
    pub success_rate: f64,
    pub niches: Vec<String>,
    pub timeframe: String,
    pub risk: RiskLevel,
    pub observation_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// NicheAggregate — recomputed from the full listing set every run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NicheAggregate {
    /// Lower-cased, trimmed niche key.
    pub niche: String,
    pub listing_count: i64,
    pub observation_count: i64,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_reviews: Option<f64>,
    pub avg_rating: Option<f64>,
    pub saturation: Saturation,
    pub recommendation: Recommendation,
    pub recommendation_reason: String,
    pub recommendation_confidence: f64,
    pub top_keywords: Vec<String>,
    pub top_price_points: Vec<i64>,
    pub top_styles: Vec<String>,
    pub detected_gaps: Vec<String>,
    pub opportunity_score: f64,
    pub spike_count: i64,
}

// ---------------------------------------------------------------------------
// RankDelta — one listing's rank movement within an observation window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RankDelta {
    pub listing_id: String,
    pub rank: i64,
    pub previous_rank: Option<i64>,
    /// Signed `new - previous`; negative means the rank improved.
    pub rank_change: Option<i64>,
    /// Percent improvement relative to the previous rank.
    pub percent_change: Option<f64>,
    pub severity: Option<SpikeSeverity>,
}

impl RankDelta {
    pub fn is_spike(&self) -> bool {
        self.severity.is_some()
    }
}

// ---------------------------------------------------------------------------
// FusionOutcome — a scored niche pair, keyed by the ordered pair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FusionOutcome {
    /// Lexicographically first niche of the unordered pair.
    pub niche_a: String,
    pub niche_b: String,
    pub combined_query: String,
    pub matched_listings: i64,
    pub avg_engagement: f64,
    pub avg_rank: f64,
    pub opportunity_score: f64,
    pub saturation: Saturation,
    pub recommendation: Recommendation,
    pub example_listing: Option<String>,
}

// ---------------------------------------------------------------------------
// MiningSummary — structured result of one orchestrator run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct MiningSummary {
    pub observations_loaded: usize,
    pub insights_created: u64,
    pub insights_updated: u64,
    pub candidates_rejected: u64,
    pub niches_analyzed: u64,
    pub spikes_detected: u64,
    pub fusions_scored: u64,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
}
