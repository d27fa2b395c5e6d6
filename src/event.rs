// src/event.rs
//! Normalized event record shared by every source, the aggregation engine and
//! the presentation layers (JSON API, chat digest).

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// One listing of a city happening, normalized across sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Event {
    /// Source-qualified id, e.g. `meetup-301234567`. Stable across fetches.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    pub category: String,
    /// Name of the source that produced the record (`meetup`, `eventbrite`, ...).
    pub source: String,
    /// `None` when the listing carried no parsable date ("assume future").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_count: Option<u32>,
}

impl Event {
    /// Cross-source identity: `(url, name)`, trimmed, case-sensitive.
    /// A missing url compares equal to an empty one.
    pub fn dedup_key(&self) -> (String, String) {
        (
            self.url.as_deref().unwrap_or_default().trim().to_string(),
            self.name.trim().to_string(),
        )
    }

    /// True when the start time is known and strictly after `now`, or unknown.
    pub fn starts_after(&self, now: DateTime<Utc>) -> bool {
        match self.start_time {
            Some(start) => start > now,
            None => true,
        }
    }
}

/// Open fetch window handed to every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// `now .. now + days`, saturating at the latest representable instant.
    pub fn upcoming(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now,
            end: now
                .checked_add_signed(chrono::Duration::days(i64::from(days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Unknown start times are kept; known ones must fall strictly inside.
    pub fn contains(&self, start: Option<DateTime<FixedOffset>>) -> bool {
        match start {
            None => true,
            Some(t) => t > self.start && t < self.end,
        }
    }
}

/// Arguments shared by every source during one aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    pub city: String,
    pub category: String,
    pub window: TimeWindow,
}

impl FetchQuery {
    pub fn new(city: impl Into<String>, category: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            city: city.into(),
            category: category.into(),
            window,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(days: i64) -> DateTime<FixedOffset> {
        let base = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        (base + chrono::Duration::days(days)).fixed_offset()
    }

    #[test]
    fn dedup_key_trims_but_keeps_case() {
        let a = Event {
            name: "  Rust Night ".into(),
            url: Some("https://x.test/e/1 ".into()),
            ..Event::default()
        };
        let b = Event {
            name: "rust night".into(),
            url: Some("https://x.test/e/1".into()),
            ..Event::default()
        };
        assert_eq!(a.dedup_key(), ("https://x.test/e/1".into(), "Rust Night".into()));
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn window_is_strict_and_keeps_unknown_dates() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let w = TimeWindow::upcoming(now, 30);
        assert!(w.contains(None));
        assert!(w.contains(Some(at(1))));
        assert!(!w.contains(Some(at(0))));
        assert!(!w.contains(Some(at(30))));
        assert!(!w.contains(Some(at(-2))));
    }

    #[test]
    fn huge_window_saturates_instead_of_overflowing() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let w = TimeWindow::upcoming(now, u32::MAX);
        assert_eq!(w.end, DateTime::<Utc>::MAX_UTC);
        assert!(w.contains(Some(at(400))));
    }

    #[test]
    fn serializes_snake_case_and_skips_absent_optionals() {
        let ev = Event {
            id: "meetup-1".into(),
            name: "Rust Night".into(),
            city: "Winnipeg".into(),
            category: "tech".into(),
            source: "meetup".into(),
            start_time: Some(at(1)),
            attendee_count: Some(12),
            ..Event::default()
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v.get("start_time").is_some());
        assert_eq!(v["attendee_count"], 12);
        assert!(v.get("venue").is_none());
        assert!(v.get("end_time").is_none());
    }
}
