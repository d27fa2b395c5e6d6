// src/sources/jsonld.rs
//! schema.org `Event` extraction from `<script type="application/ld+json">` blocks.
//!
//! Listing sites embed structured data for search engines; reading it is far
//! more stable than chasing CSS selectors. Objects are found at the top level,
//! inside arrays, `@graph`, and `ItemList.itemListElement[].item`.

use anyhow::{bail, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};

use super::normalize_text;

/// Raw listing fields before a source turns them into an [`crate::event::Event`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub venue: Option<String>,
    /// Free-text location (venue + address parts), used for city matching.
    pub location_text: String,
    pub price: Option<String>,
    pub organizer: Option<String>,
}

fn script_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
            .expect("ld+json regex")
    })
}

/// Extract every schema.org event on the page.
///
/// A page without any ld+json block is an error (blocked, or the layout
/// changed); a page whose blocks hold no events yields an empty list.
pub fn extract_listings(html: &str) -> Result<Vec<Listing>> {
    let mut blocks = 0usize;
    let mut out = Vec::new();
    for cap in script_re().captures_iter(html) {
        blocks += 1;
        let raw = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        match serde_json::from_str::<Value>(raw) {
            Ok(v) => collect(&v, &mut out),
            Err(e) => tracing::debug!(error = %e, "skipping malformed ld+json block"),
        }
    }
    if blocks == 0 {
        bail!("page has no structured (ld+json) data");
    }
    Ok(out)
}

fn collect(v: &Value, out: &mut Vec<Listing>) {
    match v {
        Value::Array(items) => items.iter().for_each(|it| collect(it, out)),
        Value::Object(map) => {
            if is_event_type(map.get("@type")) {
                if let Some(l) = listing_from(map) {
                    out.push(l);
                }
                return;
            }
            for key in ["@graph", "itemListElement", "item"] {
                if let Some(inner) = map.get(key) {
                    collect(inner, out);
                }
            }
        }
        _ => {}
    }
}

fn is_event_type(t: Option<&Value>) -> bool {
    match t {
        Some(Value::String(s)) => s.ends_with("Event"),
        Some(Value::Array(items)) => items
            .iter()
            .any(|i| i.as_str().is_some_and(|s| s.ends_with("Event"))),
        _ => false,
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(normalize_text)
        .filter(|s| !s.is_empty())
}

fn listing_from(map: &Map<String, Value>) -> Option<Listing> {
    let name = text(map, "name")?;
    let (venue, location_text) = location(map.get("location"));
    Some(Listing {
        name,
        description: text(map, "description").unwrap_or_default(),
        url: map
            .get("url")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        start: map.get("startDate").and_then(Value::as_str).and_then(parse_ld_date),
        end: map.get("endDate").and_then(Value::as_str).and_then(parse_ld_date),
        venue,
        location_text,
        price: price(map),
        organizer: organizer(map.get("organizer")),
    })
}

fn location(v: Option<&Value>) -> (Option<String>, String) {
    match v {
        Some(Value::String(s)) => {
            let s = normalize_text(s);
            (Some(s.clone()).filter(|x| !x.is_empty()), s)
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| location(Some(i)))
            .find(|(venue, _)| venue.is_some())
            .unwrap_or_default(),
        Some(Value::Object(place)) => {
            let online = place
                .get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t == "VirtualLocation");
            let venue = if online {
                Some("Online".to_string())
            } else {
                text(place, "name")
            };
            let mut parts: Vec<String> = venue.iter().cloned().collect();
            match place.get("address") {
                Some(Value::String(s)) => parts.push(normalize_text(s)),
                Some(Value::Object(addr)) => {
                    for key in ["streetAddress", "addressLocality", "addressRegion", "addressCountry"] {
                        if let Some(p) = text(addr, key) {
                            parts.push(p);
                        }
                    }
                }
                _ => {}
            }
            (venue, parts.join(", "))
        }
        _ => (None, String::new()),
    }
}

fn price(map: &Map<String, Value>) -> Option<String> {
    if map.get("isAccessibleForFree").and_then(Value::as_bool) == Some(true) {
        return Some("Free".to_string());
    }
    let offer = match map.get("offers")? {
        Value::Array(items) => items.first()?.as_object()?,
        Value::Object(o) => o,
        _ => return None,
    };
    let amount = offer.get("price").or_else(|| offer.get("lowPrice"))?;
    let value = match amount {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if value <= 0.0 {
        return Some("Free".to_string());
    }
    let currency = offer
        .get("priceCurrency")
        .and_then(Value::as_str)
        .unwrap_or("CAD");
    Some(format!("{currency} {value:.2}"))
}

fn organizer(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Object(o) => text(o, "name"),
        Value::Array(items) => items.iter().find_map(|i| organizer(Some(i))),
        Value::String(s) => Some(normalize_text(s)).filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Parse the date shapes seen in listing markup. Values without an offset are taken as UTC.
pub fn parse_ld_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}
