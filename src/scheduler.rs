// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::aggregate::{filter_future, Aggregator};
use crate::config::FeedConfig;
use crate::digest::format_digest;
use crate::notify::Deliver;

/// Outcome of one digest run; printed as JSON by the `digest` binary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DigestReport {
    pub success: bool,
    pub events_count: usize,
    pub future_count: usize,
    pub message_sent: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub logs: Vec<String>,
    /// Rendered text, kept in test mode so it can be inspected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DigestReport {
    fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            events_count: 0,
            future_count: 0,
            message_sent: false,
            timestamp,
            error: None,
            logs: Vec::new(),
            message: None,
        }
    }

    fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(target: "digest", "{line}");
        self.logs.push(line);
    }

    fn fail(mut self, err: impl Into<String>) -> Self {
        let err = err.into();
        tracing::warn!(target: "digest", error = %err, "digest run failed");
        self.logs.push(err.clone());
        self.error = Some(err);
        self.success = false;
        self
    }

    fn done(mut self) -> Self {
        self.success = true;
        self
    }
}

/// Aggregate, keep future events, render and deliver one digest.
///
/// `deliver` may be `None` in test mode; outside test mode a missing
/// notifier or chat id fails the run.
pub async fn run_digest_once(
    cfg: &FeedConfig,
    aggregator: &Aggregator,
    deliver: Option<&dyn Deliver>,
    now: DateTime<FixedOffset>,
) -> DigestReport {
    let now_utc = now.with_timezone(&Utc);
    let mut report = DigestReport::new(now_utc);
    report.log(format!(
        "config: city={} categories={} period_days={} test_mode={}",
        cfg.city,
        cfg.categories.join(","),
        cfg.period_days,
        cfg.test_mode
    ));

    let outcome = finish(cfg, aggregator, deliver, now, &mut report).await;
    let report = match outcome {
        Ok(()) => report.done(),
        Err(e) => report.fail(e),
    };

    counter!("digest_runs_total", "outcome" => if report.success { "ok" } else { "error" })
        .increment(1);
    gauge!("digest_last_run_ts").set(now_utc.timestamp().max(0) as f64);
    report
}

async fn finish(
    cfg: &FeedConfig,
    aggregator: &Aggregator,
    deliver: Option<&dyn Deliver>,
    now: DateTime<FixedOffset>,
    report: &mut DigestReport,
) -> Result<(), String> {
    let now_utc = now.with_timezone(&Utc);
    let agg = aggregator
        .aggregate_categories(&cfg.city, &cfg.categories, cfg.window(now_utc))
        .await
        .map_err(|e| format!("failed to aggregate events: {e}"))?;

    for f in &agg.failures {
        report.log(format!("{} ({}) error: {}", f.source, f.category, f.error));
    }
    report.events_count = agg.events.len();
    report.log(format!("aggregated {} events", agg.events.len()));
    if agg.events.is_empty() {
        report.log("no events found to post");
        return Ok(());
    }

    let future = filter_future(agg.events, now_utc);
    report.future_count = future.len();
    report.log(format!("filtered to {} future events", future.len()));
    if future.is_empty() {
        report.log("no future events found to post");
        return Ok(());
    }

    let message = format_digest(&cfg.city, now, &future);
    report.log(format!("generated message with {} characters", message.chars().count()));

    if cfg.test_mode {
        report.log("test mode: message not posted");
        report.message = Some(message);
        return Ok(());
    }

    let Some(chat_id) = cfg.telegram.chat_id.as_deref() else {
        return Err("chat id not configured".to_string());
    };
    let Some(deliver) = deliver else {
        return Err("bot token not configured".to_string());
    };

    deliver
        .deliver(chat_id, &message)
        .await
        .map_err(|e| format!("failed to send message: {e:#}"))?;
    report.message_sent = true;
    report.log("message sent");
    Ok(())
}

/// Run the digest every `cfg.digest_interval()`; the first run is one interval out.
pub fn spawn_digest_scheduler(
    cfg: Arc<FeedConfig>,
    aggregator: Arc<Aggregator>,
    deliver: Option<Arc<dyn Deliver>>,
) -> JoinHandle<()> {
    let every: Duration = cfg.digest_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            ticker.tick().await;
            let report =
                run_digest_once(&cfg, &aggregator, deliver.as_deref(), cfg.local_now()).await;
            tracing::info!(
                target: "digest",
                success = report.success,
                events = report.events_count,
                future = report.future_count,
                sent = report.message_sent,
                "digest tick"
            );
        }
    })
}
