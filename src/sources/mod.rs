// src/sources/mod.rs
pub mod client;
pub mod devevents;
pub mod eventbrite;
pub mod fixtures;
pub mod jsonld;
pub mod meetup;

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::event::{Event, FetchQuery};

pub use devevents::DevEventsSource;
pub use eventbrite::EventbriteSource;
pub use fixtures::FixtureSource;
pub use meetup::MeetupSource;

/// Names of the built-in sources, in registration order.
pub const BUILTIN_SOURCES: [&str; 3] = ["meetup", "eventbrite", "devevents"];

/// One external listing provider.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Returns a complete batch for `query` or fails; never a partial batch.
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Event>>;

    /// Lightweight reachability check used by the health monitor.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// What a live source does when its page cannot be fetched or parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Log and return the built-in fixture batch.
    #[default]
    Fixture,
    /// Surface the error to the aggregation engine.
    Fail,
}

/// Construction parameters shared by the HTTP-backed sources.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub timeout: Duration,
    pub fallback: FallbackPolicy,
    /// Overrides the site root (tests point this at a local server).
    pub base_url: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            timeout: client::DEFAULT_TIMEOUT,
            fallback: FallbackPolicy::Fixture,
            base_url: None,
        }
    }
}

/// Normalize listing text: decode entities, strip tags, unify quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));

    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags.replace_all(&decoded, " ");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let mut out = re_ws.replace_all(&quoted, " ").trim().to_string();

    // Descriptions can be whole pages of markup.
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Lowercase, hyphen-separated city name for search URLs.
pub fn city_slug(city: &str) -> String {
    city.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Source-qualified id derived from listing content (`{source}-{12 hex}`).
pub fn stable_id(source: &str, url: Option<&str>, name: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(url.unwrap_or_default().trim().as_bytes());
    hasher.update(b"|");
    hasher.update(name.trim().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(source.len() + 13);
    out.push_str(source);
    out.push('-');
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
