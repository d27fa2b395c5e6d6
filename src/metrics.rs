// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::FeedConfig;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder (first call only) and
    /// publish static gauges describing the running config.
    pub fn init(cfg: &FeedConfig) -> Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
            .context("prometheus: install recorder")?
            .clone();

        gauge!("feed_period_days").set(f64::from(cfg.period_days));
        gauge!("feed_sources_configured").set(cfg.sources.len() as f64);
        gauge!("source_health_ttl_secs").set(cfg.health_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
