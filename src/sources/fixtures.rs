// src/sources/fixtures.rs
//! Built-in sample listings. Live sources fall back to these when scraping
//! fails, and `FixtureSource` serves them (or any static batch) offline.
//!
//! Dates are relative to `now` so a default 30-day window keeps them.

use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, Offset as _, Utc};

use super::EventSource;
use crate::aggregate::filter_window;
use crate::event::{Event, FetchQuery};

struct Sample {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    url: &'static str,
    days_ahead: i64,
    hours: i64,
    venue: Option<&'static str>,
    price: Option<&'static str>,
    group: Option<&'static str>,
    attendees: Option<u32>,
}

fn build(source: &str, query: &FetchQuery, now: DateTime<Utc>, samples: &[Sample]) -> Vec<Event> {
    // 18:00 in the evening, Central time, N days out.
    let cst = FixedOffset::west_opt(6 * 3600).unwrap_or_else(|| Utc.fix());
    let today = now.with_timezone(&cst).date_naive();
    samples
        .iter()
        .map(|s| {
            let start = (today + Duration::days(s.days_ahead))
                .and_hms_opt(18, 0, 0)
                .and_then(|naive| naive.and_local_timezone(cst).single());
            Event {
                id: s.id.to_string(),
                name: format!("{} {}", query.city, s.name),
                description: s.description.to_string(),
                city: query.city.clone(),
                venue: s.venue.map(str::to_string),
                category: query.category.clone(),
                source: source.to_string(),
                start_time: start,
                end_time: start.map(|t| t + Duration::hours(s.hours)),
                url: Some(s.url.to_string()),
                price: s.price.map(str::to_string),
                group: s.group.map(str::to_string),
                attendee_count: s.attendees,
            }
        })
        .collect()
}

pub fn meetup_sample(query: &FetchQuery, now: DateTime<Utc>) -> Vec<Event> {
    build(
        "meetup",
        query,
        now,
        &[
            Sample {
                id: "meetup-301234567",
                name: "Python User Group",
                description: "Monthly meetup for Python developers. Lightning talks and pizza.",
                url: "https://www.meetup.com/python-user-group/events/301234567/",
                days_ahead: 8,
                hours: 2,
                venue: Some("Innovation Alley"),
                price: Some("Free"),
                group: Some("Python User Group"),
                attendees: Some(42),
            },
            Sample {
                id: "meetup-301234890",
                name: "Rust Study Night",
                description: "Work through async Rust together. Bring a laptop.",
                url: "https://www.meetup.com/rust-study/events/301234890/",
                days_ahead: 3,
                hours: 3,
                venue: Some("Public Library, Carol Shields Room"),
                price: Some("Free"),
                group: Some("Rust Study Group"),
                attendees: Some(17),
            },
            Sample {
                id: "meetup-301235112",
                name: "Women in Tech Social",
                description: "Networking evening for women and non-binary folks in tech.",
                url: "https://www.meetup.com/women-in-tech/events/301235112/",
                days_ahead: 12,
                hours: 2,
                venue: Some("The Forks Market"),
                price: None,
                group: Some("Women in Tech"),
                attendees: Some(60),
            },
        ],
    )
}

pub fn eventbrite_sample(query: &FetchQuery, now: DateTime<Utc>) -> Vec<Event> {
    build(
        "eventbrite",
        query,
        now,
        &[
            Sample {
                id: "eventbrite-812345678901",
                name: "Tech Conference",
                description: "Local and international speakers on software development, AI and digital transformation.",
                url: "https://www.eventbrite.ca/e/tech-conference-tickets-812345678901",
                days_ahead: 18,
                hours: 8,
                venue: Some("RBC Convention Centre"),
                price: Some("CAD 149.00"),
                group: None,
                attendees: None,
            },
            Sample {
                id: "eventbrite-812345679002",
                name: "AI Product Workshop",
                description: "Hands-on workshop: shipping LLM features responsibly.",
                url: "https://www.eventbrite.ca/e/ai-product-workshop-tickets-812345679002",
                days_ahead: 5,
                hours: 4,
                venue: Some("North Forge Technology Exchange"),
                price: Some("CAD 25.00"),
                group: None,
                attendees: None,
            },
        ],
    )
}

pub fn devevents_sample(query: &FetchQuery, now: DateTime<Utc>) -> Vec<Event> {
    build(
        "devevents",
        query,
        now,
        &[
            Sample {
                id: "devevents-tech-summit",
                name: "Tech Summit",
                description: "Annual summit bringing together developers, designers and tech leaders.",
                url: "https://dev.events/conferences/tech-summit",
                days_ahead: 26,
                hours: 8,
                venue: None,
                price: None,
                group: None,
                attendees: None,
            },
            Sample {
                // Mirror of the meetup listing: same url and name, different id.
                id: "devevents-python-user-group",
                name: "Python User Group",
                description: "Monthly meetup for Python developers.",
                url: "https://www.meetup.com/python-user-group/events/301234567/",
                days_ahead: 8,
                hours: 2,
                venue: None,
                price: None,
                group: None,
                attendees: None,
            },
            Sample {
                id: "devevents-code-jam",
                name: "Code Jam",
                description: "24-hour coding competition on social impact projects. Teams of 2-4.",
                url: "https://dev.events/hackathons/code-jam",
                days_ahead: 20,
                hours: 24,
                venue: None,
                price: Some("Free"),
                group: None,
                attendees: None,
            },
        ],
    )
}

/// Sample batch for a built-in source name, if there is one.
pub fn sample_for(source: &str, query: &FetchQuery, now: DateTime<Utc>) -> Option<Vec<Event>> {
    match source {
        "meetup" => Some(meetup_sample(query, now)),
        "eventbrite" => Some(eventbrite_sample(query, now)),
        "devevents" => Some(devevents_sample(query, now)),
        _ => None,
    }
}

enum Batch {
    /// Built-in sample of the named source, regenerated per query.
    Builtin,
    Static(Vec<Event>),
}

/// Offline source: serves the built-in sample of its name, or a fixed batch.
pub struct FixtureSource {
    name: String,
    batch: Batch,
}

impl FixtureSource {
    /// Offline stand-in for a built-in source (`meetup`, `eventbrite`, `devevents`).
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch: Batch::Builtin,
        }
    }

    pub fn with_events(name: impl Into<String>, events: Vec<Event>) -> Self {
        Self {
            name: name.into(),
            batch: Batch::Static(events),
        }
    }
}

#[async_trait::async_trait]
impl EventSource for FixtureSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        match &self.batch {
            Batch::Static(events) => Ok(events.clone()),
            Batch::Builtin => {
                let sample = sample_for(&self.name, query, Utc::now()).unwrap_or_default();
                Ok(filter_window(sample, &query.window))
            }
        }
    }
}
