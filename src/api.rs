// src/api.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::aggregate::{filter_future, Aggregator};
use crate::bucket::group_by_bucket;
use crate::config::{split_list, FeedConfig, MAX_PERIOD_DAYS};
use crate::event::TimeWindow;
use crate::health::HealthMonitor;
use crate::metrics::Metrics;
use crate::registry::SourceRegistry;

pub const SOURCES_FAILED_HEADER: &str = "x-sources-failed";
pub const STATIC_DIR: &str = "web";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<FeedConfig>,
    pub registry: Arc<SourceRegistry>,
    pub aggregator: Arc<Aggregator>,
    pub health: Arc<HealthMonitor>,
    pub metrics: Option<Metrics>,
}

impl AppState {
    /// Wire aggregator and health monitor around an existing registry.
    pub fn new(config: FeedConfig, registry: Arc<SourceRegistry>) -> Self {
        let mut aggregator = Aggregator::new(registry.clone());
        if let Some(d) = config.aggregate_deadline() {
            aggregator = aggregator.with_deadline(d);
        }
        let health = HealthMonitor::new(registry.clone()).with_ttl(config.health_ttl());
        Self {
            config: Arc::new(config),
            registry,
            aggregator: Arc::new(aggregator),
            health: Arc::new(health),
            metrics: None,
        }
    }

    pub fn from_config(config: FeedConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(SourceRegistry::from_config(&config)?);
        Ok(Self::new(config, registry))
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/health", get(api_health))
        .route("/api/events", get(list_events))
        .route("/api/sources", get(list_sources));

    if let Some(m) = &state.metrics {
        app = app.merge(m.router::<AppState>());
    }

    app.fallback_service(ServeDir::new(STATIC_DIR))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Same as [`create_router`]; name used by tests and the binary.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    time: String,
}

async fn api_health() -> Json<HealthOut> {
    Json(HealthOut {
        status: "healthy",
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsParams {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub period_days: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub future: Option<String>,
}

impl EventsParams {
    fn city(&self, cfg: &FeedConfig) -> String {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map_or_else(|| cfg.city.clone(), str::to_string)
    }

    fn categories(&self, cfg: &FeedConfig) -> Vec<String> {
        let parsed = self.categories.as_deref().map(split_list).unwrap_or_default();
        if parsed.is_empty() {
            cfg.categories.clone()
        } else {
            parsed
        }
    }

    fn period_days(&self, cfg: &FeedConfig) -> u32 {
        self.period_days
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|d| *d > 0)
            .map(|d| u32::try_from(d).unwrap_or(u32::MAX).min(MAX_PERIOD_DAYS))
            .unwrap_or(cfg.period_days)
    }
}

fn flag(v: &Option<String>) -> bool {
    v.as_deref()
        .is_some_and(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[derive(Serialize)]
struct ErrorOut {
    error: String,
}

async fn list_events(State(state): State<AppState>, Query(q): Query<EventsParams>) -> Response {
    let cfg = &state.config;
    let city = q.city(cfg);
    let categories = q.categories(cfg);
    let days = q.period_days(cfg);
    let local_now = cfg.local_now();
    let now = local_now.with_timezone(&Utc);

    let agg = match state
        .aggregator
        .aggregate_categories(&city, &categories, TimeWindow::upcoming(now, days))
        .await
    {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(error = %e, kind = e.as_label(), "events request failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorOut {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let failed = agg.failed_sources();
    tracing::info!(
        %city,
        categories = ?categories,
        period_days = days,
        events = agg.events.len(),
        failed = ?failed,
        "events request"
    );

    let events = if flag(&q.future) {
        filter_future(agg.events, now)
    } else {
        agg.events
    };

    let mut resp = if flag(&q.group) {
        Json(group_by_bucket(local_now, &events)).into_response()
    } else {
        Json(events).into_response()
    };

    if !failed.is_empty() {
        if let Ok(v) = HeaderValue::from_str(&failed.join(",")) {
            resp.headers_mut()
                .insert(HeaderName::from_static(SOURCES_FAILED_HEADER), v);
        }
    }
    resp
}

#[derive(Serialize)]
struct SourcesOut {
    sources: Vec<String>,
    health: BTreeMap<String, bool>,
}

async fn list_sources(State(state): State<AppState>) -> Json<SourcesOut> {
    Json(SourcesOut {
        sources: state.registry.list(),
        health: state.health.status().await,
    })
}
