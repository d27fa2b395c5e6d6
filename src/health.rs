// src/health.rs
//! Advisory liveness of each registered source.
//!
//! A source is probed only when its cached state is older than the TTL
//! (default five minutes); otherwise the cached flag is returned. Aggregation
//! never consults this: unhealthy sources are still fetched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use crate::registry::{SourceRecord, SourceRegistry};

pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached liveness of one source.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub healthy: bool,
    pub last_checked: Instant,
    pub last_checked_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl HealthState {
    /// New entries start healthy, as if just checked.
    pub fn fresh() -> Self {
        Self {
            healthy: true,
            last_checked: Instant::now(),
            last_checked_at: Utc::now(),
            last_error: None,
        }
    }
}

/// Diagnostics row for one source.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceHealth {
    pub name: String,
    pub healthy: bool,
    pub last_checked: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct HealthMonitor {
    registry: Arc<SourceRegistry>,
    ttl: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            ttl: DEFAULT_HEALTH_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached-or-probed liveness of `name`; `None` when not registered.
    pub async fn is_healthy(&self, name: &str) -> Option<bool> {
        let record = self.registry.record(name)?;
        Some(check(&record, self.ttl).await.healthy)
    }

    /// Liveness of every registered source. Stale entries are probed concurrently.
    pub async fn status(&self) -> BTreeMap<String, bool> {
        self.report()
            .await
            .into_iter()
            .map(|h| (h.name, h.healthy))
            .collect()
    }

    pub async fn report(&self) -> Vec<SourceHealth> {
        let mut set = JoinSet::new();
        for record in self.registry.records() {
            let ttl = self.ttl;
            set.spawn(async move {
                let state = check(&record, ttl).await;
                SourceHealth {
                    name: record.name().to_string(),
                    healthy: state.healthy,
                    last_checked: state.last_checked_at,
                    last_error: state.last_error,
                }
            });
        }

        let mut out = Vec::with_capacity(set.len());
        while let Some(res) = set.join_next().await {
            match res {
                Ok(row) => out.push(row),
                Err(e) => tracing::warn!(error = %e, "health check task failed"),
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Refresh every source on a fixed interval so queries rarely wait on a probe.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let report = self.report().await;
                let unhealthy: Vec<&str> = report
                    .iter()
                    .filter(|h| !h.healthy)
                    .map(|h| h.name.as_str())
                    .collect();
                tracing::info!(
                    target: "health",
                    sources = report.len(),
                    unhealthy = ?unhealthy,
                    "health tick"
                );
            }
        })
    }
}

/// Probe `record` if its state is older than `ttl`, then return the state.
/// The per-record mutex makes concurrent callers share one probe.
async fn check(record: &SourceRecord, ttl: Duration) -> HealthState {
    let mut state = record.health().lock().await;
    if state.last_checked.elapsed() > ttl {
        let outcome = record.source().probe().await;
        state.last_checked = Instant::now();
        state.last_checked_at = Utc::now();
        match outcome {
            Ok(()) => {
                if !state.healthy {
                    tracing::info!(source = record.name(), "source recovered");
                }
                state.healthy = true;
                state.last_error = None;
            }
            Err(e) => {
                tracing::warn!(source = record.name(), error = ?e, "health check failed");
                counter!("source_health_failures_total", "source" => record.name().to_string())
                    .increment(1);
                state.healthy = false;
                state.last_error = Some(format!("{e:#}"));
            }
        }
    }
    state.clone()
}
