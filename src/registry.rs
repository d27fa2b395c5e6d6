// src/registry.rs
//! Named set of event sources with a cached liveness record per entry.
//!
//! Read-mostly: aggregation and health checks take a read lock just long
//! enough to clone `Arc` handles; register/remove/clear take the write lock.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::health::HealthState;
use crate::sources::{
    DevEventsSource, EventSource, EventbriteSource, FixtureSource, MeetupSource, SourceSettings,
};

/// Registry entry. Cloning shares the source and its health cell.
#[derive(Clone)]
pub struct SourceRecord {
    name: String,
    source: Arc<dyn EventSource>,
    health: Arc<AsyncMutex<HealthState>>,
}

impl SourceRecord {
    fn new(name: String, source: Arc<dyn EventSource>) -> Self {
        Self {
            name,
            source,
            health: Arc::new(AsyncMutex::new(HealthState::fresh())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<dyn EventSource> {
        &self.source
    }

    pub fn health(&self) -> &Arc<AsyncMutex<HealthState>> {
        &self.health
    }
}

#[derive(Default)]
pub struct SourceRegistry {
    records: RwLock<BTreeMap<String, SourceRecord>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. Returns true when an existing entry was replaced.
    pub fn register(&self, name: impl Into<String>, source: Arc<dyn EventSource>) -> bool {
        let name = name.into();
        let record = SourceRecord::new(name.clone(), source);
        let replaced = {
            let mut g = self.records.write().unwrap_or_else(PoisonError::into_inner);
            g.insert(name.clone(), record).is_some()
        };
        info!(source = %name, replaced, "registered source");
        replaced
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EventSource>> {
        let g = self.records.read().unwrap_or_else(PoisonError::into_inner);
        g.get(name).map(|r| Arc::clone(&r.source))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let g = self.records.read().unwrap_or_else(PoisonError::into_inner);
        g.keys().cloned().collect()
    }

    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut g = self.records.write().unwrap_or_else(PoisonError::into_inner);
            g.remove(name).is_some()
        };
        if removed {
            info!(source = %name, "removed source");
        }
        removed
    }

    pub fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("cleared all sources");
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(name, source)` pairs in name order, taken under a single read lock.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn EventSource>)> {
        let g = self.records.read().unwrap_or_else(PoisonError::into_inner);
        g.iter()
            .map(|(name, r)| (name.clone(), Arc::clone(&r.source)))
            .collect()
    }

    /// Full records (with health cells) in name order.
    pub fn records(&self) -> Vec<SourceRecord> {
        let g = self.records.read().unwrap_or_else(PoisonError::into_inner);
        g.values().cloned().collect()
    }

    pub fn record(&self, name: &str) -> Option<SourceRecord> {
        let g = self.records.read().unwrap_or_else(PoisonError::into_inner);
        g.get(name).cloned()
    }

    /// Build the configured sources. Unknown names are logged and skipped;
    /// `offline` swaps every built-in for its fixture stand-in.
    pub fn from_config(cfg: &FeedConfig) -> Result<Self> {
        let registry = Self::new();
        let settings = cfg.source_settings();
        for name in &cfg.sources {
            let name = name.trim().to_ascii_lowercase();
            let source: Arc<dyn EventSource> = if cfg.offline {
                if !crate::sources::BUILTIN_SOURCES.contains(&name.as_str()) {
                    warn!(source = %name, "unknown source name, skipping");
                    continue;
                }
                Arc::new(FixtureSource::builtin(name.clone()))
            } else {
                match build_live(&name, &settings)? {
                    Some(s) => s,
                    None => {
                        warn!(source = %name, "unknown source name, skipping");
                        continue;
                    }
                }
            };
            registry.register(name, source);
        }
        info!(
            count = registry.len(),
            sources = ?registry.list(),
            offline = cfg.offline,
            "source registry ready"
        );
        Ok(registry)
    }
}

fn build_live(name: &str, settings: &SourceSettings) -> Result<Option<Arc<dyn EventSource>>> {
    let source: Arc<dyn EventSource> = match name {
        "meetup" => Arc::new(MeetupSource::new(settings)?),
        "eventbrite" => Arc::new(EventbriteSource::new(settings)?),
        "devevents" => Arc::new(DevEventsSource::new(settings)?),
        _ => return Ok(None),
    };
    Ok(Some(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn fixture(name: &str, n: usize) -> Arc<dyn EventSource> {
        let events = (0..n)
            .map(|i| Event {
                id: format!("{name}-{i}"),
                name: format!("E{i}"),
                source: name.to_string(),
                ..Event::default()
            })
            .collect();
        Arc::new(FixtureSource::with_events(name, events))
    }

    #[test]
    fn register_get_list_remove_clear() {
        let reg = SourceRegistry::new();
        assert!(reg.is_empty());
        assert!(!reg.register("meetup", fixture("meetup", 1)));
        assert!(!reg.register("devevents", fixture("devevents", 1)));
        assert_eq!(reg.list(), vec!["devevents".to_string(), "meetup".to_string()]);
        assert!(reg.get("meetup").is_some());
        assert!(reg.get("eventbrite").is_none());

        assert!(reg.remove("meetup"));
        assert!(!reg.remove("meetup"));
        assert_eq!(reg.len(), 1);

        reg.clear();
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let reg = SourceRegistry::new();
        reg.register("x", fixture("x", 1));
        assert!(reg.register("x", fixture("x", 3)));
        assert_eq!(reg.len(), 1);

        let src = reg.get("x").unwrap();
        let q = crate::event::FetchQuery::new(
            "Winnipeg",
            "tech",
            crate::event::TimeWindow::upcoming(chrono::Utc::now(), 30),
        );
        assert_eq!(src.fetch(&q).await.unwrap().len(), 3);
    }

    #[test]
    fn snapshot_is_detached_from_later_edits() {
        let reg = SourceRegistry::new();
        reg.register("a", fixture("a", 1));
        reg.register("b", fixture("b", 1));
        let snap = reg.snapshot();
        reg.clear();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].0, "a");
        assert!(reg.is_empty());
    }

    #[test]
    fn offline_config_registers_known_fixture_sources_only() {
        let cfg = FeedConfig {
            sources: vec!["Meetup".into(), "bogus".into(), "devevents".into()],
            offline: true,
            ..FeedConfig::default()
        };
        let reg = SourceRegistry::from_config(&cfg).unwrap();
        assert_eq!(reg.list(), vec!["devevents".to_string(), "meetup".to_string()]);
    }

    #[test]
    fn live_config_builds_http_sources() {
        let cfg = FeedConfig::default();
        let reg = SourceRegistry::from_config(&cfg).unwrap();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.get("eventbrite").unwrap().name(), "eventbrite");
    }
}
