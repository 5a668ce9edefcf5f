//! Calendar partitioning of observations. Everything here works in UTC so
//! period boundaries never drift with the host timezone, and is
//! deterministic for identical input.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Utc};

use crate::types::Observation;

fn datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// ISO-week key for a unix-seconds timestamp, e.g. `"2026-W32"`.
/// Uses the ISO week-numbering year, so late-December days that belong to
/// week 1 of the next year key under that year.
pub fn week_key(ts: i64) -> String {
    let iso = datetime(ts).iso_week();
    format!("{}-W{:02}", iso.year(), iso.week())
}

/// Calendar month index 1–12 for a unix-seconds timestamp.
pub fn month_index(ts: i64) -> u32 {
    datetime(ts).month()
}

/// Number of distinct ISO weeks covered by the given timestamps.
pub fn distinct_weeks<I>(timestamps: I) -> usize
where
    I: IntoIterator<Item = i64>,
{
    timestamps
        .into_iter()
        .map(week_key)
        .collect::<HashSet<_>>()
        .len()
}

/// Partition observations by ISO-week key. BTreeMap keeps the period order
/// stable for callers that iterate.
pub fn partition_by_week<'a>(observations: &'a [Observation]) -> BTreeMap<String, Vec<&'a Observation>> {
    let mut map: BTreeMap<String, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        map.entry(week_key(obs.created_at)).or_default().push(obs);
    }
    map
}

/// Partition observations by calendar month index (1–12), collapsing years.
/// This is the month-granularity profile the seasonality miner works on.
pub fn partition_by_month<'a>(observations: &'a [Observation]) -> BTreeMap<u32, Vec<&'a Observation>> {
    let mut map: BTreeMap<u32, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        map.entry(month_index(obs.created_at)).or_default().push(obs);
    }
    map
}
