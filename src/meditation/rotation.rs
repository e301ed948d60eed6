//! Daily rotation: which published meditation is "today's".
//!
//! `day` is the number of whole UTC calendar days since the Unix epoch. For an
//! ordered list of `N > 0` published meditations the day's pick is
//! `list[day mod N]`; a forward schedule repeats the rule with `day + offset`.
//! The pick depends on list order, so publishing or unpublishing shifts every
//! later day's assignment.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// UTC calendar day count since the epoch (floor of midnight millis / day).
pub fn day_index(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().div_euclid(MILLIS_PER_DAY)
}

/// Calendar date of a day index.
pub fn date_of_day(day: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp(day * 86_400, 0)
        .map(|d| d.date_naive())
        .unwrap_or_default()
}

pub fn select_for_day<T>(items: &[T], day: i64) -> Option<&T> {
    if items.is_empty() { return None; }
    let idx = day.rem_euclid(items.len() as i64) as usize;
    items.get(idx)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduledDay<'a, T> {
    pub date: NaiveDate,
    pub day: i64,
    #[serde(rename = "meditation")]
    pub item: &'a T,
}

/// Picks for `start_day, start_day + 1, …` over `days` days. Empty input → empty schedule.
pub fn schedule<T>(items: &[T], start_day: i64, days: usize) -> Vec<ScheduledDay<'_, T>> {
    (0..days as i64)
        .filter_map(|offset| {
            let day = start_day + offset;
            select_for_day(items, day).map(|item| ScheduledDay { date: date_of_day(day), day, item })
        })
        .collect()
}
