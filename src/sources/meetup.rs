// src/sources/meetup.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::OnceCell;
use regex::Regex;

use super::client::PageFetcher;
use super::jsonld::{extract_listings, Listing};
use super::{city_slug, fixtures, stable_id, EventSource, SourceSettings};
use crate::event::{Event, FetchQuery};

const NAME: &str = "meetup";
const BASE_URL: &str = "https://www.meetup.com";

/// Meetup category ids; anything unknown searches Technology.
fn category_id(category: &str) -> &'static str {
    match category.trim().to_ascii_lowercase().as_str() {
        "business" => "2",
        "social" => "1",
        "arts" => "3",
        "health" => "4",
        "education" => "5",
        "sports" => "6",
        _ => "546",
    }
}

/// Meetup "find" search scraped through its embedded structured data.
pub struct MeetupSource {
    http: PageFetcher,
    /// `country--region` prefix of Meetup's location parameter.
    region: String,
}

impl MeetupSource {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        Ok(Self {
            http: PageFetcher::new(NAME, BASE_URL, settings)?,
            region: "ca--mb".to_string(),
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn search_url(&self, city: &str, category: &str) -> String {
        format!(
            "{}/find/?location={}--{}&source=EVENTS&categoryId={}",
            self.http.base_url(),
            self.region,
            city_slug(city),
            category_id(category)
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

/// Meetup ids live in the listing URL: `/events/301234567/`.
fn meetup_id(url: Option<&str>) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"/events/(\d+)").expect("meetup id regex"));
    let caps = re.captures(url?)?;
    Some(format!("{NAME}-{}", &caps[1]))
}

fn to_event(l: Listing, query: &FetchQuery) -> Event {
    let id = meetup_id(l.url.as_deref()).unwrap_or_else(|| stable_id(NAME, l.url.as_deref(), &l.name));
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
impl EventSource for MeetupSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>> {
        let url = self.search_url(&query.city, &query.category);
        tracing::debug!(source = NAME, %url, city = %query.city, category = %query.category, "fetching");
        self.http
            .fetch_or_fallback(
                &url,
                &query.window,
                |body| Self::parse(body, query),
                || fixtures::meetup_sample(query, Utc::now()),
            )
            .await
    }

    async fn probe(&self) -> Result<()> {
        self.http.probe().await
    }
}
