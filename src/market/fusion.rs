//! Fusion opportunity scoring: takes a co-occurring niche pair, finds the
//! listings serving the combined market, and scores how attractive the
//! joint segment looks for a new entrant.

use crate::types::{FusionOutcome, Listing, Recommendation, Saturation};

/// Minimum matched listings before a pair can be scored at all.
const MIN_MATCHED_LISTINGS: usize = 3;

/// A listing serves the combined market when its title or niche mentions
/// both niche terms.
pub fn matches_pair(listing: &Listing, niche_a: &str, niche_b: &str) -> bool {
    let haystack = format!(
        "{} {}",
        listing.title.to_lowercase(),
        listing.niche.to_lowercase()
    );
    haystack.contains(niche_a) && haystack.contains(niche_b)
}

pub fn matching_listings<'a>(
    listings: &'a [Listing],
    niche_a: &str,
    niche_b: &str,
) -> Vec<&'a Listing> {
    listings
        .iter()
        .filter(|l| matches_pair(l, niche_a, niche_b))
        .collect()
}

/// Score a niche pair from its matched listings. `niche_a`/`niche_b` must
/// already be normalized; the outcome stores them in lexicographic order.
/// Returns None below the minimum match count.
pub fn score_fusion(niche_a: &str, niche_b: &str, matches: &[&Listing]) -> Option<FusionOutcome> {
    if matches.len() < MIN_MATCHED_LISTINGS {
        return None;
    }

    let count = matches.len();
    let avg_engagement =
        matches.iter().map(|l| l.engagement as f64).sum::<f64>() / count as f64;

    let ranked: Vec<i64> = matches
        .iter()
        .map(|l| l.sales_rank)
        .filter(|r| *r > 0)
        .collect();
    let avg_rank = if ranked.is_empty() {
        0.0
    } else {
        ranked.iter().sum::<i64>() as f64 / ranked.len() as f64
    };

    let mut score: f64 = 50.0;
    if count < 10 {
        score += 25.0;
    } else if count > 50 {
        score -= 25.0;
    }
    if avg_engagement < 20.0 {
        score += 20.0;
    } else if avg_engagement > 200.0 {
        score -= 20.0;
    }
    if avg_rank > 0.0 && avg_rank < 100_000.0 {
        score += 15.0;
    }
    let score = score.clamp(0.0, 100.0);

    let recommendation = if count < 10 && avg_engagement < 50.0 {
        Recommendation::Enter
    } else if count > 50 || avg_engagement > 200.0 {
        Recommendation::Avoid
    } else {
        Recommendation::Caution
    };

    let example_listing = matches
        .iter()
        .max_by_key(|l| l.review_count)
        .map(|l| l.title.clone());

    let (first, second) = if niche_a <= niche_b {
        (niche_a, niche_b)
    } else {
        (niche_b, niche_a)
    };

    Some(FusionOutcome {
        niche_a: first.to_string(),
        niche_b: second.to_string(),
        combined_query: format!("{first} {second}"),
        matched_listings: count as i64,
        avg_engagement,
        avg_rank,
        opportunity_score: score,
        saturation: Saturation::from_listing_count(count as i64),
        recommendation,
        example_listing,
    })
}
