// src/config.rs
//! Feed configuration: TOML file (optional) + environment overrides.
//!
//! Lookup order for the file:
//! 1) $FEED_CONFIG_PATH (must exist when set)
//! 2) config/feed.toml
//! 3) built-in defaults
//!
//! Environment then overrides individual keys (`CITY`, `CATEGORIES`,
//! `PERIOD_DAYS`, `FEED_SOURCES`, `FEED_OFFLINE`, `TEST_MODE`,
//! `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`). Invalid values are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Offset as _, Utc};
use serde::{Deserialize, Serialize};

use crate::event::TimeWindow;
use crate::sources::{FallbackPolicy, SourceSettings, BUILTIN_SOURCES};

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";

pub const DEFAULT_CITY: &str = "Winnipeg";
pub const DEFAULT_PERIOD_DAYS: u32 = 30;
/// Longest look-ahead accepted from config, env or a query string.
pub const MAX_PERIOD_DAYS: u32 = 3650;

fn default_city() -> String {
    DEFAULT_CITY.to_string()
}
fn default_categories() -> Vec<String> {
    vec!["tech".to_string()]
}
fn default_sources() -> Vec<String> {
    BUILTIN_SOURCES.iter().map(|s| s.to_string()).collect()
}
fn default_period_days() -> u32 {
    DEFAULT_PERIOD_DAYS
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_health_ttl_secs() -> u64 {
    300
}
fn default_digest_interval_secs() -> u64 {
    24 * 3600
}
fn default_utc_offset_minutes() -> i32 {
    // Central Standard Time
    -360
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedConfig {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,
    /// Serve built-in fixtures instead of scraping.
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub fallback: FallbackPolicy,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Optional bound on a whole aggregation; sources enforce their own timeout regardless.
    #[serde(default)]
    pub aggregate_timeout_secs: Option<u64>,
    #[serde(default = "default_health_ttl_secs")]
    pub health_ttl_secs: u64,
    #[serde(default = "default_digest_interval_secs")]
    pub digest_interval_secs: u64,
    /// Offset used for "today" / week boundaries.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Build the digest but do not deliver it.
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            city: default_city(),
            categories: default_categories(),
            period_days: default_period_days(),
            sources: default_sources(),
            offline: false,
            fallback: FallbackPolicy::default(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            aggregate_timeout_secs: None,
            health_ttl_secs: default_health_ttl_secs(),
            digest_interval_secs: default_digest_interval_secs(),
            utc_offset_minutes: default_utc_offset_minutes(),
            test_mode: false,
            telegram: TelegramConfig::default(),
        }
    }
}

impl FeedConfig {
    /// File (if any) + environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match config_path()? {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        tracing::info!(
            city = %cfg.city,
            categories = ?cfg.categories,
            period_days = cfg.period_days,
            sources = ?cfg.sources,
            offline = cfg.offline,
            test_mode = cfg.test_mode,
            telegram = cfg.telegram.bot_token.is_some(),
            "feed config loaded"
        );
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading feed config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: FeedConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(city) = get("CITY") {
            self.city = city;
        }
        if let Some(cats) = get("CATEGORIES") {
            self.categories = split_list(&cats);
        }
        if let Some(days) = get("PERIOD_DAYS").and_then(|v| v.parse::<u32>().ok()) {
            self.period_days = days;
        }
        if let Some(sources) = get("FEED_SOURCES") {
            self.sources = split_list(&sources);
        }
        if let Some(v) = get("FEED_OFFLINE") {
            self.offline = parse_flag(&v);
        }
        if let Some(v) = get("TEST_MODE") {
            self.test_mode = parse_flag(&v);
        }
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat);
        }
        self.sanitize();
    }

    fn sanitize(&mut self) {
        if self.city.trim().is_empty() {
            self.city = default_city();
        }
        self.categories = clean_list(std::mem::take(&mut self.categories));
        if self.categories.is_empty() {
            self.categories = default_categories();
        }
        self.sources = clean_list(std::mem::take(&mut self.sources))
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if self.period_days == 0 {
            self.period_days = DEFAULT_PERIOD_DAYS;
        }
        self.period_days = self.period_days.min(MAX_PERIOD_DAYS);
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_fetch_timeout_secs();
        }
        if !(-14 * 60..=14 * 60).contains(&self.utc_offset_minutes) {
            self.utc_offset_minutes = default_utc_offset_minutes();
        }
        self.telegram.bot_token = self.telegram.bot_token.take().filter(|t| !t.trim().is_empty());
        self.telegram.chat_id = self.telegram.chat_id.take().filter(|c| !c.trim().is_empty());
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            fallback: self.fallback,
            base_url: None,
        }
    }

    pub fn aggregate_deadline(&self) -> Option<Duration> {
        self.aggregate_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    pub fn digest_interval(&self) -> Duration {
        Duration::from_secs(self.digest_interval_secs.max(60))
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    /// `now` in the configured offset, for bucketing and digest headers.
    pub fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset())
    }

    pub fn window(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::upcoming(now, self.period_days)
    }
}


fn config_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(Some(pb));
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

/// Comma-separated list, trimmed, empties dropped, order kept.
pub fn split_list(s: &str) -> Vec<String> {
    clean_list(s.split(',').map(str::to_string).collect())
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

fn parse_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let cfg = FeedConfig::from_toml_str(
            r#"
city = "Brandon"
categories = [" tech ", "", "business", "tech"]
period_days = 0

[telegram]
chat_id = "@wpg_tech"
"#,
        )
        .unwrap();
        assert_eq!(cfg.city, "Brandon");
        assert_eq!(cfg.categories, vec!["tech".to_string(), "business".to_string()]);
        assert_eq!(cfg.period_days, DEFAULT_PERIOD_DAYS);
        assert_eq!(cfg.sources, default_sources());
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("@wpg_tech"));
        assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
        assert_eq!(cfg.fallback, FallbackPolicy::Fixture);
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("CITY", "Regina"),
            ("CATEGORIES", "tech, arts ,"),
            ("PERIOD_DAYS", "seven"),
            ("FEED_SOURCES", "Meetup,devevents"),
            ("TEST_MODE", "true"),
            ("TELEGRAM_BOT_TOKEN", "  "),
        ]
        .into_iter()
        .collect();
        let mut cfg = FeedConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.city, "Regina");
        assert_eq!(cfg.categories, vec!["tech".to_string(), "arts".to_string()]);
        assert_eq!(cfg.period_days, DEFAULT_PERIOD_DAYS);
        assert_eq!(cfg.sources, vec!["meetup".to_string(), "devevents".to_string()]);
        assert!(cfg.test_mode);
        assert!(cfg.telegram.bot_token.is_none());
    }

    #[test]
    fn oversized_period_is_clamped() {
        let mut cfg = FeedConfig::default();
        cfg.apply_env(|k| (k == "PERIOD_DAYS").then(|| "4000000000".to_string()));
        assert_eq!(cfg.period_days, MAX_PERIOD_DAYS);
        let now = Utc::now();
        assert_eq!(cfg.window(now).end - now, chrono::Duration::days(i64::from(MAX_PERIOD_DAYS)));

        let cfg = FeedConfig::from_toml_str("period_days = 99999\n").unwrap();
        assert_eq!(cfg.period_days, MAX_PERIOD_DAYS);
    }

    #[test]
    fn derived_values() {
        let cfg = FeedConfig {
            aggregate_timeout_secs: Some(0),
            ..FeedConfig::default()
        };
        assert!(cfg.aggregate_deadline().is_none());
        assert_eq!(cfg.offset().local_minus_utc(), -6 * 3600);
        assert_eq!(cfg.source_settings().timeout, Duration::from_secs(30));
        let now = Utc::now();
        assert_eq!(cfg.window(now).end - now, chrono::Duration::days(30));
    }
}
