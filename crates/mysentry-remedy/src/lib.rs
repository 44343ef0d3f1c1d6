//! Guarded automatic remediation.
//!
//! The [`engine::RemediationEngine`] maps allow-listed alert conditions
//! to a narrow set of safe actions and wraps every execution in
//! guardrails: a per-condition rate limit, a per-kind circuit breaker,
//! and dry-run mode. Everything else degrades to notify-only. Each
//! attempt produces an immutable [`RemediationAction`] audit record.
//!
//! [`RemediationAction`]: mysentry_common::types::RemediationAction

pub mod engine;
pub mod mysql;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use mysentry_common::types::RemediationKind;
use std::collections::HashMap;

/// Errors raised while executing a remediation action.
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    /// A required action parameter is absent from the binding.
    #[error("Remedy: missing parameter '{0}'")]
    MissingParam(String),

    /// A parameter is present but malformed (wrong type, bad format).
    #[error("Remedy: invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    /// The executor does not implement this action kind.
    #[error("Remedy: unsupported action kind '{0}'")]
    Unsupported(RemediationKind),

    /// The management call to the database failed.
    #[error("Remedy: database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience `Result` alias for remediation operations.
pub type Result<T> = std::result::Result<T, RemedyError>;

/// Executes one remediation action against the managed database.
///
/// Implementations own the external call; the engine owns every safety
/// decision around it. The production implementation is
/// [`mysql::MySqlRemediationExecutor`]; tests substitute a mock.
#[async_trait]
pub trait RemediationExecutor: Send + Sync {
    /// Performs the action and returns a short human-readable summary
    /// of what was done.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails; the engine records the
    /// attempt as failed and feeds the circuit breaker.
    async fn execute(
        &self,
        kind: RemediationKind,
        params: &HashMap<String, String>,
    ) -> Result<String>;
}
