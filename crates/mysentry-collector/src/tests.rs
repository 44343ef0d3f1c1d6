use crate::poller::{Collector, PollSettings};
use crate::ring::SampleRing;
use crate::{CollectError, CollectorEvent, MetricSource};
use async_trait::async_trait;
use chrono::Utc;
use mysentry_common::types::MetricSample;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

fn make_sample(metric: &str, value: f64) -> MetricSample {
    MetricSample {
        id: mysentry_common::id::generate(mysentry_common::id::IdKind::Sample),
        metric_id: metric.to_string(),
        timestamp: Utc::now(),
        value,
        tags: HashMap::new(),
    }
}

#[test]
fn ring_evicts_oldest_when_full() {
    let mut ring = SampleRing::new(3);
    for v in [1.0, 2.0, 3.0, 4.0] {
        ring.push(make_sample("connections", v));
    }
    assert_eq!(ring.len(), 3);
    let values: Vec<f64> = ring.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0]);
}

#[test]
fn ring_recent_returns_fewer_on_cold_start() {
    let mut ring = SampleRing::new(10);
    ring.push(make_sample("connections", 1.0));
    ring.push(make_sample("connections", 2.0));
    let recent = ring.recent(5);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].value, 1.0);
    assert_eq!(recent[1].value, 2.0);
}

#[test]
fn ring_recent_is_oldest_first() {
    let mut ring = SampleRing::new(10);
    for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
        ring.push(make_sample("connections", v));
    }
    let recent = ring.recent(3);
    let values: Vec<f64> = recent.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![3.0, 4.0, 5.0]);
}

/// Source that fails the first `fail_first` calls, then succeeds.
struct FlakySource {
    metric_id: String,
    fail_first: u32,
    calls: AtomicU32,
}

impl FlakySource {
    fn new(metric_id: &str, fail_first: u32) -> Self {
        Self {
            metric_id: metric_id.to_string(),
            fail_first,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MetricSource for FlakySource {
    fn metric_id(&self) -> &str {
        &self.metric_id
    }

    async fn sample(&self) -> crate::Result<MetricSample> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            Err(CollectError::Unavailable("connection refused".into()))
        } else {
            Ok(make_sample(&self.metric_id, 42.0))
        }
    }
}

fn fast_settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(5),
        failure_threshold: 3,
        sample_timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn poller_emits_samples() {
    let source = Arc::new(FlakySource::new("replication_lag_seconds", 0));
    let (tx, mut rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);

    let handles = Collector::new(vec![(source as Arc<dyn MetricSource>, fast_settings())])
        .spawn(tx, stop_rx);

    let event = rx.recv().await.expect("expected an event");
    match event {
        CollectorEvent::Sample(s) => {
            assert_eq!(s.metric_id, "replication_lag_seconds");
            assert_eq!(s.value, 42.0);
        }
        other => panic!("expected sample, got {other:?}"),
    }

    let _ = stop_tx.send(true);
    for h in handles {
        let _ = h.await;
    }
}

#[tokio::test]
async fn poller_reports_down_after_threshold_and_recovers() {
    // Fails exactly 3 polls, succeeds from the 4th on.
    let source = Arc::new(FlakySource::new("connections_current", 3));
    let (tx, mut rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);

    let handles = Collector::new(vec![(source as Arc<dyn MetricSource>, fast_settings())])
        .spawn(tx, stop_rx);

    // First event must be the down report (threshold reached on poll 3),
    // then recovery, then a normal sample.
    match rx.recv().await.expect("down event") {
        CollectorEvent::SourceDown {
            metric_id,
            consecutive_failures,
            ..
        } => {
            assert_eq!(metric_id, "connections_current");
            assert_eq!(consecutive_failures, 3);
        }
        other => panic!("expected SourceDown, got {other:?}"),
    }

    match rx.recv().await.expect("recovery event") {
        CollectorEvent::SourceRecovered { metric_id } => {
            assert_eq!(metric_id, "connections_current");
        }
        other => panic!("expected SourceRecovered, got {other:?}"),
    }

    match rx.recv().await.expect("sample event") {
        CollectorEvent::Sample(s) => assert_eq!(s.value, 42.0),
        other => panic!("expected Sample, got {other:?}"),
    }

    let _ = stop_tx.send(true);
    for h in handles {
        let _ = h.await;
    }
}

#[tokio::test]
async fn poller_failure_is_isolated_per_source() {
    let dead = Arc::new(FlakySource::new("dead_metric", u32::MAX));
    let live = Arc::new(FlakySource::new("live_metric", 0));
    let (tx, mut rx) = mpsc::channel(32);
    let (stop_tx, stop_rx) = watch::channel(false);

    let handles = Collector::new(vec![
        (dead as Arc<dyn MetricSource>, fast_settings()),
        (live as Arc<dyn MetricSource>, fast_settings()),
    ])
    .spawn(tx, stop_rx);

    // The live source must keep producing samples despite the dead one.
    let mut live_samples = 0;
    for _ in 0..10 {
        match rx.recv().await.expect("event") {
            CollectorEvent::Sample(s) if s.metric_id == "live_metric" => live_samples += 1,
            _ => {}
        }
        if live_samples >= 3 {
            break;
        }
    }
    assert!(live_samples >= 3);

    let _ = stop_tx.send(true);
    for h in handles {
        let _ = h.await;
    }
}
