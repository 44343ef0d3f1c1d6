use crate::{RemediationExecutor, RemedyError, Result};
use async_trait::async_trait;
use mysentry_common::types::RemediationKind;
use sqlx::MySqlPool;
use std::collections::HashMap;

/// Executes remediation actions against the managed MySQL server.
///
/// Statement templates are fixed in code; configuration supplies only
/// validated parameters. The agent must never become a generic remote
/// shell, so there is no path from config text to raw SQL here.
pub struct MySqlRemediationExecutor {
    pool: MySqlPool,
}

impl MySqlRemediationExecutor {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn kill_connection(&self, params: &HashMap<String, String>) -> Result<String> {
        let raw = params
            .get("connection_id")
            .ok_or_else(|| RemedyError::MissingParam("connection_id".into()))?;
        // KILL does not accept placeholders; parsing to u64 keeps the
        // statement injection-safe.
        let connection_id: u64 = raw.parse().map_err(|_| RemedyError::InvalidParam {
            name: "connection_id".into(),
            reason: format!("'{raw}' is not a connection id"),
        })?;
        sqlx::query(&format!("KILL {connection_id}"))
            .execute(&self.pool)
            .await?;
        Ok(format!("killed connection {connection_id}"))
    }

    async fn purge_binary_logs(&self, params: &HashMap<String, String>) -> Result<String> {
        let raw = params
            .get("before")
            .ok_or_else(|| RemedyError::MissingParam("before".into()))?;
        let before = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map_err(
            |e| RemedyError::InvalidParam {
                name: "before".into(),
                reason: format!("'{raw}' is not 'YYYY-MM-DD hh:mm:ss': {e}"),
            },
        )?;
        let stamp = before.format("%Y-%m-%d %H:%M:%S");
        sqlx::query(&format!("PURGE BINARY LOGS BEFORE '{stamp}'"))
            .execute(&self.pool)
            .await?;
        Ok(format!("purged binary logs before {stamp}"))
    }

    async fn restart_replication(&self) -> Result<String> {
        sqlx::query("STOP REPLICA").execute(&self.pool).await?;
        sqlx::query("START REPLICA").execute(&self.pool).await?;
        Ok("replication restarted".to_string())
    }
}

#[async_trait]
impl RemediationExecutor for MySqlRemediationExecutor {
    async fn execute(
        &self,
        kind: RemediationKind,
        params: &HashMap<String, String>,
    ) -> Result<String> {
        match kind {
            RemediationKind::KillConnection => self.kill_connection(params).await,
            RemediationKind::PurgeBinaryLogs => self.purge_binary_logs(params).await,
            RemediationKind::RestartReplication => self.restart_replication().await,
            RemediationKind::NotifyOnly => Ok("no action".to_string()),
        }
    }
}
