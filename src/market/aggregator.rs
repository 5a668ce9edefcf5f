//! Per-niche market aggregation: descriptive statistics, saturation tier,
//! derived keyword/price/style lists, gap descriptions, and the entry
//! recommendation. The aggregate is recomputed from the full current
//! listing set for the niche on every run.

use std::collections::HashMap;

use crate::config::SPIKE_LOOKBACK_SECS;
use crate::miners::listing_structure::is_gift_framed;
use crate::types::{Listing, NicheAggregate, Observation, Recommendation, Saturation};

/// Listings feeding keyword and price-point extraction.
const TOP_LISTINGS_FOR_KEYWORDS: usize = 20;
const MAX_KEYWORDS: usize = 20;
const MAX_PRICE_POINTS: usize = 5;
const MAX_STYLES: usize = 5;

/// Tokens dropped before keyword ranking — marketplace boilerplate, not
/// niche signal.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "for", "with", "of", "to", "in", "on",
    "men", "mens", "women", "womens", "unisex", "kids", "shirt", "tshirt",
    "t-shirt", "tee", "hoodie", "gift", "gifts", "size", "sizes",
];

/// Mean/min/max over strictly positive values; non-positive and missing
/// values are excluded from the statistics rather than treated as zero.
fn positive_stats(values: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>, Option<f64>) {
    let positive: Vec<f64> = values.filter(|v| *v > 0.0).collect();
    if positive.is_empty() {
        return (None, None, None);
    }
    let sum: f64 = positive.iter().sum();
    let min = positive.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = positive.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (Some(sum / positive.len() as f64), Some(min), Some(max))
}

/// Frequency-ranked title tokens from the most-reviewed listings.
fn extract_keywords(listings: &[&Listing]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for listing in listings {
        for token in listing
            .title
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|t| t.len() > 2 && !STOP_WORDS.contains(t))
        {
            if !counts.contains_key(token) {
                order.push(token.to_string());
            }
            *counts.entry(token.to_string()).or_insert(0) += 1;
        }
    }
    rank_by_count(order, &counts, MAX_KEYWORDS)
}

/// Frequency-ranked whole-dollar price points from the same listings.
fn extract_price_points(listings: &[&Listing]) -> Vec<i64> {
    let mut order: Vec<i64> = Vec::new();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for listing in listings {
        if listing.price <= 0.0 {
            continue;
        }
        let point = listing.price.round() as i64;
        if !counts.contains_key(&point) {
            order.push(point);
        }
        *counts.entry(point).or_insert(0) += 1;
    }
    rank_by_count(order, &counts, MAX_PRICE_POINTS)
}

/// Frequency-ranked style tags across the niche's observations.
fn extract_styles(observations: &[&Observation]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for obs in observations {
        if let Some(style) = obs.style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            if !counts.contains_key(style) {
                order.push(style.to_string());
            }
            *counts.entry(style.to_string()).or_insert(0) += 1;
        }
    }
    rank_by_count(order, &counts, MAX_STYLES)
}

/// Sort by descending count; first appearance wins ties (stable sort over
/// insertion order).
fn rank_by_count<K: Clone + std::hash::Hash + Eq>(
    order: Vec<K>,
    counts: &HashMap<K, usize>,
    limit: usize,
) -> Vec<K> {
    let mut ranked = order;
    ranked.sort_by_key(|k| std::cmp::Reverse(counts[k]));
    ranked.truncate(limit);
    ranked
}

/// Gap heuristics over the aggregate — each names a concrete absence a new
/// entrant could fill.
fn detect_gaps(listings: &[Listing], avg_reviews: Option<f64>, min_price: Option<f64>) -> Vec<String> {
    let mut gaps = Vec::new();
    if let Some(avg) = avg_reviews {
        if avg < 20.0 {
            gaps.push("low review competition across the niche".to_string());
        }
    }
    if let Some(min) = min_price {
        if min >= 15.0 {
            gaps.push("no budget listings under $15".to_string());
        }
    }
    if !listings.is_empty() && !listings.iter().any(|l| is_gift_framed(&l.title)) {
        gaps.push("no gift-framed titles".to_string());
    }
    gaps
}

/// Entry heuristic: base 50, fixed deltas per input, mapped to a
/// recommendation tier.
pub fn entry_score(
    saturation: Saturation,
    avg_reviews: Option<f64>,
    spike_count: i64,
) -> (f64, Recommendation, String) {
    let mut score: f64 = 50.0;
    let mut reasons: Vec<String> = Vec::new();

    let saturation_delta = match saturation {
        Saturation::Low => 20.0,
        Saturation::Medium => 10.0,
        Saturation::High => -10.0,
        Saturation::Oversaturated => -30.0,
        Saturation::Unknown => 0.0,
    };
    score += saturation_delta;
    reasons.push(format!("{saturation} saturation"));

    if let Some(avg) = avg_reviews {
        if avg < 20.0 {
            score += 20.0;
            reasons.push("weak review competition".to_string());
        } else if avg > 100.0 {
            score -= 20.0;
            reasons.push("entrenched competitors".to_string());
        }
    }

    if spike_count > 5 {
        score += 15.0;
        reasons.push(format!("{spike_count} listings spiking"));
    } else if spike_count > 0 {
        score += 5.0;
        reasons.push(format!("{spike_count} listings spiking"));
    }

    let recommendation = if score >= 70.0 {
        Recommendation::Enter
    } else if score >= 40.0 {
        Recommendation::Caution
    } else {
        Recommendation::Avoid
    };

    (score.clamp(0.0, 100.0), recommendation, reasons.join(", "))
}

/// Build the full aggregate for one niche from its current listings and
/// observations. `now` is unix seconds.
pub fn aggregate_niche(
    niche: &str,
    listings: &[Listing],
    observations: &[&Observation],
    now: i64,
) -> NicheAggregate {
    let listing_count = listings.len() as i64;
    let (avg_price, min_price, max_price) = positive_stats(listings.iter().map(|l| l.price));
    let (avg_reviews, _, _) = positive_stats(listings.iter().map(|l| l.review_count as f64));
    let (avg_rating, _, _) = positive_stats(listings.iter().map(|l| l.rating));

    let saturation = Saturation::from_listing_count(listing_count);

    // Most-reviewed listings drive the derived lists.
    let mut by_reviews: Vec<&Listing> = listings.iter().collect();
    by_reviews.sort_by_key(|l| std::cmp::Reverse(l.review_count));
    by_reviews.truncate(TOP_LISTINGS_FOR_KEYWORDS);

    let spike_count = listings
        .iter()
        .filter(|l| l.spike_flagged_at.is_some_and(|at| now - at <= SPIKE_LOOKBACK_SECS))
        .count() as i64;

    let (opportunity_score, recommendation, recommendation_reason) =
        entry_score(saturation, avg_reviews, spike_count);

    NicheAggregate {
        niche: niche.to_string(),
        listing_count,
        observation_count: observations.len() as i64,
        avg_price,
        min_price,
        max_price,
        avg_reviews,
        avg_rating,
        saturation,
        recommendation,
        recommendation_reason,
        recommendation_confidence: (listing_count as f64 * 2.0).min(100.0),
        top_keywords: extract_keywords(&by_reviews),
        top_price_points: extract_price_points(&by_reviews),
        top_styles: extract_styles(observations),
        detected_gaps: detect_gaps(listings, avg_reviews, min_price),
        opportunity_score,
        spike_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str, title: &str, price: f64, reviews: i64, rating: f64) -> Listing {
        Listing {
            id: id.to_string(),
            title: title.to_string(),
            niche: "cats".to_string(),
            price,
            review_count: reviews,
            rating,
            sales_rank: 100_000,
            engagement: 0,
            spike_flagged_at: None,
            last_rank_change: None,
            scraped_at: 0,
        }
    }

    #[test]
    fn non_positive_values_are_excluded_from_stats() {
        let listings = vec![
            listing("a", "x", 19.99, 10, 4.5),
            listing("b", "x", 0.0, 0, 0.0),
            listing("c", "x", 24.99, 30, 3.5),
        ];
        let agg = aggregate_niche("cats", &listings, &[], 0);
        assert!((agg.avg_price.unwrap() - 22.49).abs() < 1e-9);
        assert!((agg.avg_reviews.unwrap() - 20.0).abs() < 1e-9);
        assert!((agg.avg_rating.unwrap() - 4.0).abs() < 1e-9);
        assert_eq!(agg.min_price, Some(19.99));
        assert_eq!(agg.max_price, Some(24.99));
    }

    #[test]
    fn empty_niche_has_unknown_saturation_and_no_stats() {
        let agg = aggregate_niche("ghosts", &[], &[], 0);
        assert_eq!(agg.saturation, Saturation::Unknown);
        assert_eq!(agg.avg_price, None);
        assert_eq!(agg.recommendation_confidence, 0.0);
    }

    #[test]
    fn keywords_drop_stop_words_and_short_tokens() {
        let listings = vec![
            listing("a", "Funny Cat Shirt for Men", 19.99, 50, 4.0),
            listing("b", "Funny Cat Hoodie", 29.99, 40, 4.0),
            listing("c", "Cat Mom Tee", 17.99, 30, 4.0),
        ];
        let agg = aggregate_niche("cats", &listings, &[], 0);
        // "shirt", "for", "men", "hoodie", "tee" are stop words; "cat"
        // appears three times, "funny" twice, "mom" once.
        assert_eq!(agg.top_keywords, vec!["cat", "funny", "mom"]);
    }

    #[test]
    fn price_points_round_and_rank_by_frequency() {
        let listings = vec![
            listing("a", "x", 19.99, 50, 4.0),
            listing("b", "x", 20.49, 40, 4.0),
            listing("c", "x", 24.99, 30, 4.0),
        ];
        let agg = aggregate_niche("cats", &listings, &[], 0);
        assert_eq!(agg.top_price_points, vec![20, 25]);
    }

    #[test]
    fn entry_score_low_saturation_weak_reviews_and_spikes_says_enter() {
        let (score, rec, _) = entry_score(Saturation::Low, Some(10.0), 6);
        assert_eq!(score, 100.0); // 50 + 20 + 20 + 15, clamped
        assert_eq!(rec, Recommendation::Enter);
    }

    #[test]
    fn entry_score_oversaturated_strong_competitors_says_avoid() {
        let (score, rec, _) = entry_score(Saturation::Oversaturated, Some(150.0), 0);
        assert_eq!(score, 0.0); // 50 - 30 - 20
        assert_eq!(rec, Recommendation::Avoid);
    }

    #[test]
    fn entry_score_middle_ground_says_caution() {
        let (score, rec, _) = entry_score(Saturation::Medium, Some(50.0), 1);
        assert_eq!(score, 65.0); // 50 + 10 + 5
        assert_eq!(rec, Recommendation::Caution);
    }

    #[test]
    fn spike_count_respects_lookback_window() {
        let now = 1_000_000;
        let mut fresh = listing("a", "x", 10.0, 1, 4.0);
        fresh.spike_flagged_at = Some(now - 3600);
        let mut stale = listing("b", "x", 10.0, 1, 4.0);
        stale.spike_flagged_at = Some(now - 2 * SPIKE_LOOKBACK_SECS);
        let agg = aggregate_niche("cats", &[fresh, stale], &[], now);
        assert_eq!(agg.spike_count, 1);
    }

    #[test]
    fn gaps_name_concrete_absences() {
        let listings = vec![listing("a", "Plain Cat Tee", 18.99, 5, 4.0)];
        let agg = aggregate_niche("cats", &listings, &[], 0);
        assert!(agg.detected_gaps.iter().any(|g| g.contains("review competition")));
        assert!(agg.detected_gaps.iter().any(|g| g.contains("under $15")));
        assert!(agg.detected_gaps.iter().any(|g| g.contains("gift-framed")));
    }
}