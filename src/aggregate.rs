// src/aggregate.rs
//! # Aggregation engine
//! Fans a query out to every registered source concurrently, waits for all of
//! them, then validates, deduplicates and sorts the merged batch.
//!
//! A failing or slow source never blocks or corrupts the others: each worker
//! reports into a mutex-guarded collector and the merge starts only after the
//! join barrier. Only an empty registry is a hard error.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::AggregateError;
use crate::event::{Event, FetchQuery, TimeWindow};
use crate::registry::SourceRegistry;

pub const DEFAULT_CATEGORY: &str = "tech";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("aggregate_runs_total", "Aggregation calls that reached fan-out.");
        describe_counter!(
            "aggregate_events_total",
            "Events returned after validation, dedup and sort."
        );
        describe_counter!(
            "aggregate_source_errors_total",
            "Source fetches that failed, timed out or panicked."
        );
        describe_counter!(
            "aggregate_invalid_total",
            "Events dropped for a missing id, name or source."
        );
        describe_counter!(
            "aggregate_dedup_total",
            "Events dropped as (url, name) duplicates."
        );
        describe_histogram!("source_fetch_ms", "Per-source fetch time in milliseconds.");
    });
}

/// A source that contributed nothing to an aggregation, and why.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub category: String,
    pub error: String,
}

/// Merged result plus diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub events: Vec<Event>,
    pub failures: Vec<SourceFailure>,
    /// Malformed events dropped before the merge.
    pub invalid: usize,
    /// Events dropped as duplicates of an earlier one.
    pub duplicates: usize,
}

impl Aggregation {
    /// Distinct names of failed sources, sorted.
    pub fn failed_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.failures.iter().map(|f| f.source.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Default)]
struct Collector {
    batches: Vec<(usize, Vec<Event>)>,
    failures: Vec<(usize, SourceFailure)>,
}

pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    deadline: Option<Duration>,
}

impl Aggregator {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            deadline: None,
        }
    }

    /// Stop waiting after `deadline`; sources still running are reported as
    /// timed out and left to finish in the background.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub async fn aggregate(&self, query: &FetchQuery) -> Result<Aggregation, AggregateError> {
        ensure_metrics_described();

        let sources = self.registry.snapshot();
        if sources.is_empty() {
            warn!(city = %query.city, category = %query.category, "no sources registered");
            return Err(AggregateError::NoSources);
        }
        counter!("aggregate_runs_total").increment(1);

        let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
        info!(
            city = %query.city,
            category = %query.category,
            sources = ?names,
            "aggregation started"
        );

        let collector = Arc::new(Mutex::new(Collector::default()));
        let mut set = JoinSet::new();
        for (idx, (name, source)) in sources.into_iter().enumerate() {
            let collector = Arc::clone(&collector);
            let query = query.clone();
            set.spawn(async move {
                let t0 = Instant::now();
                let outcome = source.fetch(&query).await;
                let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
                histogram!("source_fetch_ms", "source" => name.clone()).record(elapsed_ms);

                let mut c = collector.lock().unwrap_or_else(PoisonError::into_inner);
                match outcome {
                    Ok(events) => {
                        debug!(source = %name, events = events.len(), elapsed_ms, "source fetched");
                        c.batches.push((idx, events));
                    }
                    Err(e) => {
                        warn!(source = %name, error = ?e, elapsed_ms, "source fetch failed");
                        c.failures.push((
                            idx,
                            SourceFailure {
                                source: name,
                                category: query.category.clone(),
                                error: format!("{e:#}"),
                            },
                        ));
                    }
                }
            });
        }

        let timed_out = join_all(&mut set, self.deadline).await;

        let (mut batches, mut failures) = {
            let mut c = collector.lock().unwrap_or_else(PoisonError::into_inner);
            (std::mem::take(&mut c.batches), std::mem::take(&mut c.failures))
        };

        // Workers that never reported either panicked or missed the deadline.
        let reported: HashSet<usize> = batches
            .iter()
            .map(|(i, _)| *i)
            .chain(failures.iter().map(|(i, _)| *i))
            .collect();
        for (idx, name) in names.iter().enumerate() {
            if reported.contains(&idx) {
                continue;
            }
            let error = match (timed_out, self.deadline) {
                (true, Some(d)) => format!("no result within {d:?}"),
                _ => "worker stopped without reporting".to_string(),
            };
            warn!(source = %name, %error, "source produced no result");
            failures.push((
                idx,
                SourceFailure {
                    source: name.clone(),
                    category: query.category.clone(),
                    error,
                },
            ));
        }

        batches.sort_by_key(|(i, _)| *i);
        failures.sort_by_key(|(i, _)| *i);
        let failures: Vec<SourceFailure> = failures.into_iter().map(|(_, f)| f).collect();
        for f in &failures {
            counter!("aggregate_source_errors_total", "source" => f.source.clone()).increment(1);
        }

        let mut merged = Vec::new();
        let mut invalid = 0usize;
        for (_, batch) in batches {
            for ev in batch {
                if is_valid(&ev) {
                    merged.push(ev);
                } else {
                    invalid += 1;
                    debug!(id = %ev.id, source = %ev.source, "dropping malformed event");
                }
            }
        }

        let (mut events, duplicates) = dedup_events(merged);
        sort_by_start(&mut events);

        counter!("aggregate_events_total").increment(events.len() as u64);
        counter!("aggregate_invalid_total").increment(invalid as u64);
        counter!("aggregate_dedup_total").increment(duplicates as u64);

        let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
        for ev in &events {
            *by_source.entry(ev.source.as_str()).or_default() += 1;
        }
        info!(
            events = events.len(),
            ok_sources = names.len() - failures.len(),
            failed_sources = failures.len(),
            invalid,
            duplicates,
            by_source = ?by_source,
            "aggregation finished"
        );

        Ok(Aggregation {
            events,
            failures,
            invalid,
            duplicates,
        })
    }

    /// Aggregate each category in order and merge the union (dedup + sort again).
    /// An empty category list means the default category.
    pub async fn aggregate_categories(
        &self,
        city: &str,
        categories: &[String],
        window: TimeWindow,
    ) -> Result<Aggregation, AggregateError> {
        let fallback = [DEFAULT_CATEGORY.to_string()];
        let categories = if categories.is_empty() {
            &fallback[..]
        } else {
            categories
        };

        let mut merged = Vec::new();
        let mut out = Aggregation::default();
        for category in categories {
            let query = FetchQuery::new(city, category.clone(), window);
            let part = self.aggregate(&query).await?;
            merged.extend(part.events);
            out.failures.extend(part.failures);
            out.invalid += part.invalid;
            out.duplicates += part.duplicates;
        }

        let (mut events, dups) = dedup_events(merged);
        sort_by_start(&mut events);
        out.events = events;
        out.duplicates += dups;
        Ok(out)
    }
}

/// Wait for every worker, or until `deadline`. Returns true when the deadline hit.
async fn join_all(set: &mut JoinSet<()>, deadline: Option<Duration>) -> bool {
    let drain = async {
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "source worker aborted");
            }
        }
    };
    let Some(deadline) = deadline else {
        drain.await;
        return false;
    };
    let res = tokio::time::timeout(deadline, drain).await;
    if res.is_err() {
        // Let stragglers run to completion; their results are ignored.
        set.detach_all();
        return true;
    }
    false
}

/// An event can be returned only with a non-empty id, name and source.
pub fn is_valid(ev: &Event) -> bool {
    !ev.id.trim().is_empty() && !ev.name.trim().is_empty() && !ev.source.trim().is_empty()
}

/// Drop later events with the same `(url, name)` key. Order is preserved.
/// Returns the kept events and the number dropped.
pub fn dedup_events(events: Vec<Event>) -> (Vec<Event>, usize) {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(events.len());
    let mut keep = Vec::with_capacity(events.len());
    let mut dropped = 0usize;
    for ev in events {
        if seen.insert(ev.dedup_key()) {
            keep.push(ev);
        } else {
            dropped += 1;
        }
    }
    (keep, dropped)
}

/// Stable ascending sort by start time; unknown start times sort first.
pub fn sort_by_start(events: &mut [Event]) {
    events.sort_by_key(|e| e.start_time);
}

/// Keep events starting after `now` (or with an unknown start), in order.
pub fn filter_future(events: Vec<Event>, now: DateTime<Utc>) -> Vec<Event> {
    events.into_iter().filter(|e| e.starts_after(now)).collect()
}

/// Keep events whose start falls inside `window` (unknown starts kept), in order.
pub fn filter_window(events: Vec<Event>, window: &TimeWindow) -> Vec<Event> {
    events
        .into_iter()
        .filter(|e| window.contains(e.start_time))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ev(id: &str, name: &str, url: &str, day: Option<i64>) -> Event {
        let base = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        Event {
            id: id.into(),
            name: name.into(),
            source: "test".into(),
            url: Some(url.into()),
            start_time: day.map(|d| (base + chrono::Duration::days(d)).fixed_offset()),
            ..Event::default()
        }
    }

    #[test]
    fn dedup_keeps_first_of_identical_url_and_name() {
        let evs = vec![
            ev("meetup-1", "Rust Night", "https://m/e/1", Some(3)),
            ev("devevents-9", "Rust Night", "https://m/e/1", Some(3)),
            ev("meetup-2", "Rust Night", "https://m/e/2", Some(3)),
            ev("meetup-3", "rust night", "https://m/e/1", Some(3)),
        ];
        let (kept, dropped) = dedup_events(evs);
        assert_eq!(dropped, 1);
        let ids: Vec<_> = kept.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["meetup-1", "meetup-2", "meetup-3"]);
    }

    #[test]
    fn sort_is_stable_and_puts_unknown_first() {
        let mut evs = vec![
            ev("a", "A", "u", Some(3)),
            ev("b", "B", "u", None),
            ev("c", "C", "u", Some(1)),
            ev("d", "D", "u", Some(3)),
            ev("e", "E", "u", None),
        ];
        sort_by_start(&mut evs);
        let ids: Vec<_> = evs.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "e", "c", "a", "d"]);
    }

    #[test]
    fn future_filter_preserves_order() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let evs = vec![
            ev("f1", "F1", "u1", Some(5)),
            ev("p1", "P1", "u2", Some(-1)),
            ev("f2", "F2", "u3", Some(1)),
            ev("p2", "P2", "u4", Some(-3)),
            ev("f3", "F3", "u5", Some(2)),
        ];
        let out = filter_future(evs, now);
        let ids: Vec<_> = out.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f3"]);
    }

    #[test]
    fn validation_requires_id_name_and_source() {
        let ok = ev("x", "X", "u", Some(1));
        assert!(is_valid(&ok));
        assert!(!is_valid(&Event { id: " ".into(), ..ok.clone() }));
        assert!(!is_valid(&Event { name: String::new(), ..ok.clone() }));
        assert!(!is_valid(&Event { source: String::new(), ..ok }));
    }

    #[test]
    fn window_filter_drops_past_and_far_future() {
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        let w = TimeWindow::upcoming(now, 7);
        let evs = vec![
            ev("in", "In", "u1", Some(3)),
            ev("past", "Past", "u2", Some(-1)),
            ev("far", "Far", "u3", Some(10)),
            ev("unknown", "Unknown", "u4", None),
        ];
        let ids: Vec<_> = filter_window(evs, &w).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["in".to_string(), "unknown".to_string()]);
    }
}
