// src/bucket.rs
//! Relative-time grouping for presentation: Today, This Week, Next Week, Later.
//!
//! All arithmetic uses a single `now` supplied by the caller. Event times are
//! converted into `now`'s offset first, so "today" means the caller's calendar
//! day. A week starts at `now`'s time of day on the Sunday on or before `now`,
//! so This Week is the seven days from that instant and Next Week the seven after.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Presentation bucket. Declaration order is the fixed display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Today,
    #[serde(rename = "This Week")]
    ThisWeek,
    #[serde(rename = "Next Week")]
    NextWeek,
    Later,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [Bucket::Today, Bucket::ThisWeek, Bucket::NextWeek, Bucket::Later];

    pub fn label(self) -> &'static str {
        match self {
            Bucket::Today => "Today",
            Bucket::ThisWeek => "This Week",
            Bucket::NextWeek => "Next Week",
            Bucket::Later => "Later",
        }
    }
}

/// Grouped events; empty buckets are never present.
pub type Grouped = BTreeMap<Bucket, Vec<Event>>;

/// `now` moved back to the Sunday on or before it. The time of day is kept.
pub fn start_of_week(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now - Duration::days(i64::from(now.weekday().num_days_from_sunday()))
}

/// First matching rule wins: same calendar day, current week, next week, else later.
/// An unknown start time is `Later`.
pub fn classify(now: DateTime<FixedOffset>, start: Option<DateTime<FixedOffset>>) -> Bucket {
    let Some(start) = start else {
        return Bucket::Later;
    };
    let start = start.with_timezone(&now.timezone());
    if start.date_naive() == now.date_naive() {
        return Bucket::Today;
    }

    let this_week = start_of_week(now);
    let next_week = this_week + Duration::days(7);
    let after_next = next_week + Duration::days(7);
    if start >= this_week && start < next_week {
        Bucket::ThisWeek
    } else if start >= next_week && start < after_next {
        Bucket::NextWeek
    } else {
        Bucket::Later
    }
}

/// Partition `events` into buckets, keeping input order inside each bucket.
pub fn group_by_bucket(now: DateTime<FixedOffset>, events: &[Event]) -> Grouped {
    let mut out: Grouped = BTreeMap::new();
    for ev in events {
        out.entry(classify(now, ev.start_time))
            .or_default()
            .push(ev.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cst() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    #[test]
    fn week_start_keeps_time_of_day() {
        // Wednesday 2024-06-05 15:30 CST
        let now = cst().with_ymd_and_hms(2024, 6, 5, 15, 30, 0).unwrap();
        let sow = start_of_week(now);
        assert_eq!(sow, cst().with_ymd_and_hms(2024, 6, 2, 15, 30, 0).unwrap());

        // A Sunday is its own week start.
        let sunday = cst().with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap();
        assert_eq!(start_of_week(sunday), sunday);
    }

    #[test]
    fn midweek_afternoon_edges() {
        // Wednesday 2024-06-05 15:00 CST, week start Sunday 06-02 15:00.
        let now = cst().with_ymd_and_hms(2024, 6, 5, 15, 0, 0).unwrap();
        let at = |d: u32, h: u32, m: u32, s: u32| cst().with_ymd_and_hms(2024, 6, d, h, m, s).unwrap();
        let cases = [
            (at(9, 10, 0, 0), Bucket::ThisWeek),
            (at(9, 14, 59, 59), Bucket::ThisWeek),
            (at(9, 15, 0, 0), Bucket::NextWeek),
            (at(16, 14, 59, 59), Bucket::NextWeek),
            (at(16, 15, 0, 0), Bucket::Later),
            (at(2, 10, 0, 0), Bucket::Later),
            (at(2, 15, 0, 0), Bucket::ThisWeek),
        ];
        for (start, expected) in cases {
            assert_eq!(classify(now, Some(start)), expected, "start {start}");
        }
    }

    #[test]
    fn today_uses_callers_calendar_day() {
        let now = cst().with_ymd_and_hms(2024, 6, 5, 20, 0, 0).unwrap();
        // 03:00 UTC next day is still 21:00 CST today.
        let late = chrono::Utc.with_ymd_and_hms(2024, 6, 6, 3, 0, 0).unwrap().fixed_offset();
        assert_eq!(classify(now, Some(late)), Bucket::Today);
    }

    #[test]
    fn past_days_of_this_week_and_older_events() {
        let now = cst().with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        let monday = cst().with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let last_week = cst().with_ymd_and_hms(2024, 5, 30, 12, 0, 0).unwrap();
        assert_eq!(classify(now, Some(monday)), Bucket::ThisWeek);
        assert_eq!(classify(now, Some(last_week)), Bucket::Later);
        assert_eq!(classify(now, None), Bucket::Later);
    }

    #[test]
    fn grouping_omits_empty_buckets_and_keeps_order() {
        let now = cst().with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        let mk = |id: &str, d: i64| Event {
            id: id.into(),
            start_time: Some(now + Duration::days(d)),
            ..Event::default()
        };
        let evs = vec![mk("later", 30), mk("today", 0), mk("thisweek", 2), mk("later2", 40)];
        let g = group_by_bucket(now, &evs);
        assert_eq!(g.keys().copied().collect::<Vec<_>>(), vec![Bucket::Today, Bucket::ThisWeek, Bucket::Later]);
        let later: Vec<_> = g[&Bucket::Later].iter().map(|e| e.id.as_str()).collect();
        assert_eq!(later, vec!["later", "later2"]);
    }

    #[test]
    fn serializes_with_display_labels_in_fixed_order() {
        let now = cst().with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        let mk = |d: i64| Event {
            start_time: Some(now + Duration::days(d)),
            ..Event::default()
        };
        let g = group_by_bucket(now, &[mk(20), mk(7), mk(1)]);
        let json = serde_json::to_string(&g).unwrap();
        let this_week = json.find("\"This Week\"").unwrap();
        let next_week = json.find("\"Next Week\"").unwrap();
        let later = json.find("\"Later\"").unwrap();
        assert!(this_week < next_week && next_week < later);
        assert!(!json.contains("\"Today\""));
    }
}
