// src/sources/eventbrite.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use regex::Regex;

use super::client::PageFetcher;
use super::jsonld::{extract_listings, Listing};
use super::{city_slug, fixtures, stable_id, EventSource, SourceSettings};
use crate::event::{Event, FetchQuery};

const NAME: &str = "eventbrite";
const BASE_URL: &str = "https://www.eventbrite.ca";

fn category_path(category: &str) -> &'static str {
    match category.trim().to_ascii_lowercase().as_str() {
        "business" => "business-event",
        "social" => "social-event",
        "arts" => "arts-event",
        "health" => "health-event",
        "education" => "education-event",
        "sports" => "sports-event",
        _ => "tech-event",
    }
}

/// Eventbrite city browse pages (`/d/canada--winnipeg/tech-event/`).
pub struct EventbriteSource {
    http: PageFetcher,
    country: String,
}

impl EventbriteSource {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        Ok(Self {
            http: PageFetcher::new(NAME, BASE_URL, settings)?,
            country: "canada".to_string(),
        })
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn search_url(&self, city: &str, category: &str) -> String {
        format!(
            "{}/d/{}--{}/{}/",
            self.http.base_url(),
            self.country,
            city_slug(city),
            category_path(category)
        )
    }

    fn parse(body: &str, query: &FetchQuery) -> Result<Vec<Event>> {
        let events = extract_listings(body)?
            .into_iter()
            .map(|l| to_event(l, query))
            .filter(|ev| query.window.contains(ev.start_time))
            .collect();
        Ok(events)
    }
}

/// Ticket pages end in `-tickets-<id>`.
fn eventbrite_id(url: Option<&str>) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"-tickets-(\d+)").expect("eventbrite id regex"));
    let caps = re.captures(url?)?;
    Some(format!("{NAME}-{}", &caps[1]))
}

fn to_event(l: Listing, query: &FetchQuery) -> Event {
    let id = eventbrite_id(l.url.as_deref()).unwrap_or_else(|| stable_id(NAME, l.url.as_deref(), &l.name));
    Event {
        id,
        name: l.name,
        description: l.description,
        city: query.city.clone(),
        venue: l.venue,
        category: query.category.clone(),
        source: NAME.to_string(),
        start_time: l.start,
        end_time: l.end,
        url: l.url,
        price: l.price,
        group: l.organizer,
        attendee_count: None,
    }
}

#[async_trait]
impl EventSource for EventbriteSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        let url = self.search_url(&query.city, &query.category);
        tracing::debug!(source = NAME, %url, "fetching");
        self.http
            .fetch_or_fallback(
                &url,
                &query.window,
                |body| Self::parse(body, query),
                || fixtures::eventbrite_sample(query, Utc::now()),
            )
            .await
    }

    async fn probe(&self) -> Result<()> {
        self.http.probe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_uses_country_city_and_category_path() {
        let src = EventbriteSource::new(&SourceSettings::default()).unwrap();
        assert_eq!(
            src.search_url("Winnipeg", "tech"),
            "https://www.eventbrite.ca/d/canada--winnipeg/tech-event/"
        );
        assert_eq!(
            src.search_url("Thunder Bay", "arts"),
            "https://www.eventbrite.ca/d/canada--thunder-bay/arts-event/"
        );
    }

    #[test]
    fn id_comes_from_ticket_url() {
        assert_eq!(
            eventbrite_id(Some("https://www.eventbrite.ca/e/rust-day-tickets-812345678901?aff=x")).as_deref(),
            Some("eventbrite-812345678901")
        );
        assert!(eventbrite_id(Some("https://www.eventbrite.ca/o/org-123")).is_none());
    }
}
