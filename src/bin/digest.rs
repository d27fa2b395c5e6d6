//! One-shot digest job: aggregate, render, post to Telegram, print the JSON report.
//! Exits 0 on success and 1 on failure, for cron-style runners.

use std::process::ExitCode;
use std::sync::Arc;

use tech_event_feed::scheduler::run_digest_once;
use tech_event_feed::{telegram_from_config, Aggregator, FeedConfig, SourceRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    // Report goes to stdout; logs to stderr, as JSON lines when FEED_LOG_JSON=1.
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr);
    if std::env::var("FEED_LOG_JSON").is_ok_and(|v| v == "1") {
        builder.json().init();
    } else {
        builder.init();
    }

    let cfg = match FeedConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = ?e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    let registry = match SourceRegistry::from_config(&cfg) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            tracing::error!(error = ?e, "failed to build sources");
            return ExitCode::FAILURE;
        }
    };

    let mut aggregator = Aggregator::new(registry);
    if let Some(d) = cfg.aggregate_deadline() {
        aggregator = aggregator.with_deadline(d);
    }
    let deliver = telegram_from_config(&cfg);

    let report = run_digest_once(&cfg, &aggregator, deliver.as_deref(), cfg.local_now()).await;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize report"),
    }

    if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
