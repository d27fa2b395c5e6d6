// src/sources/client.rs
//! HTTP plumbing shared by the live sources: a browser-like client, page
//! fetches with status checks, reachability probes and fixture fallback.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};

use super::{FallbackPolicy, SourceSettings};
use crate::aggregate::filter_window;
use crate::event::{Event, TimeWindow};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Client with the headers listing sites expect from a browser.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("building http client")
}

/// GET `url` and return the body; anything but 200 is an error.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String> {
    let t0 = Instant::now();
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if status != StatusCode::OK {
        bail!("GET {url} returned status {status}");
    }
    let body = resp.text().await.with_context(|| format!("reading body of {url}"))?;
    tracing::debug!(
        url,
        bytes = body.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "page fetched"
    );
    Ok(body)
}

/// Reachability check: any 2xx/3xx outcome is healthy.
pub async fn probe_url(client: &Client, url: &str) -> Result<()> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("probe {url}"))?;
    let status = resp.status();
    if status.is_success() || status.is_redirection() {
        Ok(())
    } else {
        bail!("probe {url} returned status {status}")
    }
}

/// Composition helper each live source owns: site root, client and fallback policy.
pub struct PageFetcher {
    source: &'static str,
    base_url: String,
    client: Client,
    fallback: FallbackPolicy,
}

impl PageFetcher {
    pub fn new(source: &'static str, default_base: &str, settings: &SourceSettings) -> Result<Self> {
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| default_base.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            source,
            base_url,
            client: build_client(settings.timeout)?,
            fallback: settings.fallback,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn probe(&self) -> Result<()> {
        probe_url(&self.client, &self.base_url).await
    }

    /// Fetch `url`, parse it with `parse`; on failure apply the fallback policy.
    /// Fixture events are held to `window` like live ones.
    pub async fn fetch_or_fallback<P, F>(
        &self,
        url: &str,
        window: &TimeWindow,
        parse: P,
        fixtures: F,
    ) -> Result<Vec<Event>>
    where
        P: FnOnce(&str) -> Result<Vec<Event>>,
        F: FnOnce() -> Vec<Event>,
    {
        let t0 = Instant::now();
        let live = match fetch_page(&self.client, url).await {
            Ok(body) => parse(&body),
            Err(e) => Err(e),
        };
        histogram!("source_scrape_ms", "source" => self.source).record(t0.elapsed().as_secs_f64() * 1_000.0);

        match live {
            Ok(events) => {
                tracing::info!(source = self.source, events = events.len(), "live listing parsed");
                Ok(events)
            }
            Err(e) => match self.fallback {
                FallbackPolicy::Fixture => {
                    let sample = filter_window(fixtures(), window);
                    tracing::warn!(
                        source = self.source,
                        error = ?e,
                        fixtures = sample.len(),
                        "scrape failed, falling back to fixture data"
                    );
                    counter!("source_fixture_fallbacks_total", "source" => self.source).increment(1);
                    Ok(sample)
                }
                FallbackPolicy::Fail => Err(e.context(format!("{} scrape failed", self.source))),
            },
        }
    }
}
