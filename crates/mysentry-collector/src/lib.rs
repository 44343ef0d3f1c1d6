//! Metric collection framework for the mysentry agent.
//!
//! Each [`MetricSource`] implementation samples one metric (replication
//! lag, connection count, slow-query count, ...) from the monitored
//! database. The [`poller::Collector`] runs every registered source on
//! its own interval, isolates per-source failures, and forwards samples
//! and availability transitions to the evaluation pipeline over a
//! bounded channel.

pub mod mysql;
pub mod poller;
pub mod ring;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use mysentry_common::types::MetricSample;
use std::time::Duration;

/// Errors raised while sampling a metric source.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The source could not be reached or refused the query.
    #[error("Collect: source unavailable: {0}")]
    Unavailable(String),

    /// The diagnostic query exceeded its deadline.
    #[error("Collect: query timed out after {0:?}")]
    Timeout(Duration),

    /// The query succeeded but the result could not be turned into a number.
    #[error("Collect: failed to parse metric value: {0}")]
    Parse(String),

    /// The query returned no rows to parse.
    #[error("Collect: empty result set")]
    Empty,

    /// Underlying database driver error.
    #[error("Collect: database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience `Result` alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectError>;

/// A polled metric source.
///
/// Implementations are registered in the [`poller::Collector`] and
/// sampled on a fixed per-source interval. The trait requires
/// `Send + Sync` because every source runs on its own tokio task.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// The metric identifier samples from this source carry
    /// (e.g. `"replication_lag_seconds"`).
    fn metric_id(&self) -> &str;

    /// Takes one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unreachable or the result
    /// cannot be parsed; the poller counts consecutive failures and
    /// escalates past the configured threshold.
    async fn sample(&self) -> Result<MetricSample>;
}

/// Events the collector forwards to the evaluation pipeline.
#[derive(Debug, Clone)]
pub enum CollectorEvent {
    /// A successful sample.
    Sample(MetricSample),
    /// The source has failed at least the configured number of
    /// consecutive polls. Emitted on every failed poll past the
    /// threshold so the synthetic alert keeps accumulating occurrences
    /// while the source stays down.
    SourceDown {
        metric_id: String,
        consecutive_failures: u32,
        error: String,
    },
    /// First successful poll after the source was reported down.
    SourceRecovered { metric_id: String },
}
