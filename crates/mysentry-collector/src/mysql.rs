use crate::{CollectError, MetricSource, Result};
use async_trait::async_trait;
use chrono::Utc;
use mysentry_common::id;
use mysentry_common::types::MetricSample;
use serde::Deserialize;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::collections::HashMap;

/// How to turn a diagnostic query's result set into one numeric value.
///
/// Together with the query string this forms the declarative
/// `{query, parser}` table that holds all domain SQL knowledge; adding
/// a new check is configuration, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueParser {
    /// First column of the first row, parsed as a number.
    /// Fits `SELECT`-style probes (e.g. slow-query deltas, disk free).
    Scalar,
    /// Second column of the first row — the `Value` column of
    /// `SHOW GLOBAL STATUS LIKE '...'` name/value pairs.
    StatusVar,
    /// Number of rows in the result set (e.g. `SHOW PROCESSLIST`).
    RowCount,
}

/// A metric source backed by a read-only MySQL diagnostic query.
pub struct MySqlMetricSource {
    metric_id: String,
    query: String,
    parser: ValueParser,
    tags: HashMap<String, String>,
    pool: MySqlPool,
}

impl MySqlMetricSource {
    pub fn new(
        metric_id: impl Into<String>,
        query: impl Into<String>,
        parser: ValueParser,
        tags: HashMap<String, String>,
        pool: MySqlPool,
    ) -> Self {
        Self {
            metric_id: metric_id.into(),
            query: query.into(),
            parser,
            tags,
            pool,
        }
    }

    fn parse(&self, rows: &[MySqlRow]) -> Result<f64> {
        match self.parser {
            ValueParser::Scalar => {
                let row = rows.first().ok_or(CollectError::Empty)?;
                numeric_cell(row, 0)
            }
            ValueParser::StatusVar => {
                let row = rows.first().ok_or(CollectError::Empty)?;
                numeric_cell(row, 1)
            }
            ValueParser::RowCount => Ok(rows.len() as f64),
        }
    }
}

#[async_trait]
impl MetricSource for MySqlMetricSource {
    fn metric_id(&self) -> &str {
        &self.metric_id
    }

    async fn sample(&self) -> Result<MetricSample> {
        let rows = sqlx::query(&self.query).fetch_all(&self.pool).await?;
        let value = self.parse(&rows)?;
        Ok(MetricSample {
            id: id::generate(id::IdKind::Sample),
            metric_id: self.metric_id.clone(),
            timestamp: Utc::now(),
            value,
            tags: self.tags.clone(),
        })
    }
}

/// Read a cell as f64, falling back through the numeric and string
/// representations MySQL uses for status output.
fn numeric_cell(row: &MySqlRow, idx: usize) -> Result<f64> {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(v as f64);
    }
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return Ok(v as f64);
    }
    // SHOW STATUS reports everything as text
    let text = row
        .try_get::<String, _>(idx)
        .map_err(|e| CollectError::Parse(format!("column {idx}: {e}")))?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| CollectError::Parse(format!("'{text}' is not numeric: {e}")))
}
