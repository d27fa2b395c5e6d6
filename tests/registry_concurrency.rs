// tests/registry_concurrency.rs
//
// Registry edits racing with reads, and aggregations that keep the source set
// they started with.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tech_event_feed::sources::FixtureSource;
use tech_event_feed::{Aggregator, Event, EventSource, FetchQuery, SourceRegistry, TimeWindow};
use tokio::sync::Notify;

fn one(name: &str) -> Arc<dyn EventSource> {
    Arc::new(FixtureSource::with_events(
        name,
        vec![Event {
            id: format!("{name}-1"),
            name: format!("{name} night"),
            source: name.to_string(),
            url: Some(format!("https://{name}.example/1")),
            ..Event::default()
        }],
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_register_remove_and_list() {
    let reg = Arc::new(SourceRegistry::new());
    let mut handles = Vec::new();
    for i in 0..32 {
        let reg = reg.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("src-{i:02}");
            reg.register(name.clone(), one(&name));
            let listed = reg.list();
            assert!(listed.windows(2).all(|w| w[0] < w[1]), "list stays sorted");
            if i % 2 == 0 {
                assert!(reg.remove(&name));
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(reg.len(), 16);
    assert!(reg.list().iter().all(|n| {
        let i: u32 = n.trim_start_matches("src-").parse().unwrap();
        i % 2 == 1
    }));
}

/// Blocks in `fetch` until released, so the test can edit the registry mid-flight.
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait::async_trait]
impl EventSource for Gate {
    fn name(&self) -> &str {
        "gate"
    }
    async fn fetch(&self, _q: &FetchQuery) -> Result<Vec<Event>> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(vec![Event {
            id: "gate-1".into(),
            name: "Gate".into(),
            source: "gate".into(),
            ..Event::default()
        }])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn in_flight_aggregation_uses_its_snapshot() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let reg = Arc::new(SourceRegistry::new());
    reg.register(
        "gate",
        Arc::new(Gate {
            entered: entered.clone(),
            release: release.clone(),
        }),
    );

    let aggregator = Arc::new(Aggregator::new(reg.clone()));
    let q = FetchQuery::new("Winnipeg", "tech", TimeWindow::upcoming(Utc::now(), 30));
    let run = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.aggregate(&q).await })
    };

    entered.notified().await;
    reg.register("late", one("late"));
    reg.remove("gate");
    release.notify_one();

    let agg = run.await.unwrap().unwrap();
    let ids: Vec<&str> = agg.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["gate-1"]);
    assert_eq!(reg.list(), vec!["late".to_string()]);
}
