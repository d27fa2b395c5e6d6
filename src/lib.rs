// src/lib.rs
// Public library surface for the server binary, the digest job and integration tests.

pub mod aggregate;
pub mod api;
pub mod bucket;
pub mod config;
pub mod digest;
pub mod error;
pub mod event;
pub mod health;
pub mod metrics;
pub mod notify;
pub mod registry;
pub mod scheduler;
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::{Aggregation, Aggregator, SourceFailure};
pub use crate::api::{create_router, router, AppState};
pub use crate::bucket::{group_by_bucket, Bucket};
pub use crate::config::FeedConfig;
pub use crate::error::AggregateError;
pub use crate::event::{Event, FetchQuery, TimeWindow};
pub use crate::health::HealthMonitor;
pub use crate::notify::{Deliver, TelegramNotifier};
pub use crate::registry::SourceRegistry;
pub use crate::sources::{EventSource, FallbackPolicy};

use std::sync::Arc;

/// Build the full application router from the environment, the same way the
/// server binary does (config + registry + metrics, no background tasks).
pub async fn app() -> anyhow::Result<shuttle_axum::axum::Router> {
    let cfg = FeedConfig::load()?;
    let metrics = crate::metrics::Metrics::init(&cfg)?;
    let state = AppState::from_config(cfg)?.with_metrics(metrics);
    Ok(router(state))
}

/// Telegram notifier from config, when a bot token is present.
pub fn telegram_from_config(cfg: &FeedConfig) -> Option<Arc<dyn Deliver>> {
    let token = cfg.telegram.bot_token.as_deref()?;
    let notifier = TelegramNotifier::new(token).with_api_base(cfg.telegram.api_base.clone());
    Some(Arc::new(notifier))
}
