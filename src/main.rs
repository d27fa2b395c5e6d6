//! Tech Event Feed — Binary Entrypoint
//! Boots the Axum HTTP server: sources, aggregation API, health checks and
//! the optional scheduled Telegram digest.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tech_event_feed::metrics::Metrics;
use tech_event_feed::scheduler::spawn_digest_scheduler;
use tech_event_feed::{router, telegram_from_config, AppState, FeedConfig};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - FEED_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("FEED_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tech_event_feed=info,digest=info,health=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = FeedConfig::load()?;
    let metrics = Metrics::init(&cfg)?;
    let state = AppState::from_config(cfg.clone())?.with_metrics(metrics);

    // Background: keep health fresh, post the digest when Telegram is configured.
    state
        .health
        .clone()
        .spawn_periodic(cfg.health_ttl().max(std::time::Duration::from_secs(60)));
    if let Some(deliver) = telegram_from_config(&cfg) {
        if cfg.telegram.chat_id.is_some() {
            spawn_digest_scheduler(state.config.clone(), state.aggregator.clone(), Some(deliver));
        }
    }

    Ok(router(state).into())
}
