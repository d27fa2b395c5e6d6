// src/sources/devevents.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::client::PageFetcher;
use super::jsonld::{extract_listings, Listing};
use super::{fixtures, stable_id, EventSource, SourceSettings};
use crate::event::{Event, FetchQuery};

const NAME: &str = "devevents";
const BASE_URL: &str = "https://dev.events";

/// dev.events regional listing; the page covers a whole region, so events are
/// kept only when their location mentions the requested city.
pub struct DevEventsSource {
    http: PageFetcher,
    region: String,
}

impl DevEventsSource {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        Ok(Self {
            http: PageFetcher::new(NAME, BASE_URL, settings)?,
            region: "NA/CA".to_string(),
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn listing_url(&self) -> String {
        format!("{}/{}", self.http.base_url(), self.region.trim_matches('/'))
    }

    fn parse(body: &str, query: &FetchQuery) -> Result<Vec<Event>> {
        let events = extract_listings(body)?
            .into_iter()
            .filter(|l| mentions_city(&l.location_text, &query.city))
            .map(|l| to_event(l, query))
            .filter(|ev| query.window.contains(ev.start_time))
            .collect();
        Ok(events)
    }
}

fn mentions_city(location: &str, city: &str) -> bool {
    let city = city.trim();
    !city.is_empty() && location.to_lowercase().contains(&city.to_lowercase())
}

fn to_event(l: Listing, query: &FetchQuery) -> Event {
    Event {
        id: stable_id(NAME, l.url.as_deref(), &l.name),
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
impl EventSource for DevEventsSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        let url = self.listing_url();
        tracing::debug!(source = NAME, %url, city = %query.city, "fetching");
        self.http
            .fetch_or_fallback(
                &url,
                &query.window,
                |body| Self::parse(body, query),
                || fixtures::devevents_sample(query, Utc::now()),
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
    fn city_match_is_case_insensitive_substring() {
        assert!(mentions_city("RBC Convention Centre, Winnipeg, MB", "winnipeg"));
        assert!(!mentions_city("Toronto, ON", "Winnipeg"));
        assert!(!mentions_city("Winnipeg", "  "));
    }

    #[test]
    fn listing_url_joins_region() {
        let settings = SourceSettings {
            base_url: Some("http://127.0.0.1:9/".into()),
            ..SourceSettings::default()
        };
        let src = DevEventsSource::new(&settings).unwrap().with_region("/EU/DE/");
        assert_eq!(src.listing_url(), "http://127.0.0.1:9/EU/DE");
    }
}
