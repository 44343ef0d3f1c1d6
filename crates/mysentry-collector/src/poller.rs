use crate::{CollectError, CollectorEvent, MetricSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Per-source polling parameters.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Interval between polls (default 10s).
    pub interval: Duration,
    /// Consecutive failures before the source is reported down (default 3).
    pub failure_threshold: u32,
    /// Deadline for a single `sample()` call.
    pub sample_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            failure_threshold: 3,
            sample_timeout: Duration::from_secs(5),
        }
    }
}

/// Polls all registered metric sources.
///
/// Each source runs on its own tokio task, so a slow or dead source
/// never blocks the others; the worker pool is naturally bounded at the
/// number of configured sources. Samples and availability transitions
/// are forwarded over a bounded mpsc channel to the single pipeline
/// consumer, which preserves FIFO ordering per metric.
pub struct Collector {
    sources: Vec<(Arc<dyn MetricSource>, PollSettings)>,
}

impl Collector {
    pub fn new(sources: Vec<(Arc<dyn MetricSource>, PollSettings)>) -> Self {
        Self { sources }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Start one polling task per source. Tasks stop cooperatively when
    /// `shutdown` flips to `true`; an in-flight query is bounded by its
    /// sample timeout.
    pub fn spawn(
        self,
        tx: mpsc::Sender<CollectorEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        self.sources
            .into_iter()
            .map(|(source, settings)| {
                let tx = tx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(poll_source(source, settings, tx, shutdown))
            })
            .collect()
    }
}

async fn poll_source(
    source: Arc<dyn MetricSource>,
    settings: PollSettings,
    tx: mpsc::Sender<CollectorEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let metric_id = source.metric_id().to_string();
    let mut tick = interval(settings.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut consecutive_failures: u32 = 0;
    let mut down = false;

    tracing::info!(
        metric_id = %metric_id,
        interval_secs = settings.interval.as_secs(),
        "Source poller started"
    );

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let result = match timeout(settings.sample_timeout, source.sample()).await {
                    Ok(res) => res,
                    Err(_) => Err(CollectError::Timeout(settings.sample_timeout)),
                };

                match result {
                    Ok(sample) => {
                        consecutive_failures = 0;
                        if down {
                            down = false;
                            tracing::info!(metric_id = %metric_id, "Source recovered");
                            if tx.send(CollectorEvent::SourceRecovered {
                                metric_id: metric_id.clone(),
                            }).await.is_err() {
                                break;
                            }
                        }
                        if tx.send(CollectorEvent::Sample(sample)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            metric_id = %metric_id,
                            consecutive_failures,
                            error = %e,
                            "Sample failed"
                        );
                        if consecutive_failures >= settings.failure_threshold {
                            down = true;
                            if tx.send(CollectorEvent::SourceDown {
                                metric_id: metric_id.clone(),
                                consecutive_failures,
                                error: e.to_string(),
                            }).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::debug!(metric_id = %metric_id, "Source poller stopping");
                    break;
                }
            }
        }
    }
}
