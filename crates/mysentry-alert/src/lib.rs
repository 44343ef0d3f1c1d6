//! Rule evaluation and alert lifecycle management.
//!
//! The [`evaluator::Evaluator`] checks each incoming sample's ring
//! buffer against the rules bound to that metric and produces findings;
//! the [`manager::AlertManager`] deduplicates findings into alerts and
//! drives their open / acknowledged / resolved lifecycle.

pub mod evaluator;
pub mod manager;


use chrono::Utc;
use mysentry_common::types::{Finding, Severity};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A static threshold rule, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub metric_id: String,
    pub comparator: mysentry_common::types::Comparator,
    pub threshold: f64,
    /// Number of consecutive samples that must all satisfy the
    /// comparator before a finding is emitted. Must be >= 1.
    pub consecutive_required: usize,
    /// Maximum timestamp span, in seconds, the qualifying samples may
    /// cover. Must be >= poll interval * consecutive_required.
    pub window_secs: u64,
    pub severity: Severity,
}

/// Rule validation failures; fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum RuleValidationError {
    #[error("rule '{rule_id}': consecutive_required must be >= 1")]
    ZeroConsecutive { rule_id: String },

    #[error(
        "rule '{rule_id}': window ({window_secs}s) is shorter than \
         poll interval ({poll_secs}s) x consecutive_required ({consecutive})"
    )]
    WindowTooShort {
        rule_id: String,
        window_secs: u64,
        poll_secs: u64,
        consecutive: usize,
    },
}

impl Rule {
    /// Validate structural invariants against the poll interval of the
    /// metric this rule is bound to.
    pub fn validate(&self, poll_interval: Duration) -> Result<(), RuleValidationError> {
        if self.consecutive_required == 0 {
            return Err(RuleValidationError::ZeroConsecutive {
                rule_id: self.rule_id.clone(),
            });
        }
        let poll_secs = poll_interval.as_secs();
        if self.window_secs < poll_secs * self.consecutive_required as u64 {
            return Err(RuleValidationError::WindowTooShort {
                rule_id: self.rule_id.clone(),
                window_secs: self.window_secs,
                poll_secs,
                consecutive: self.consecutive_required,
            });
        }
        Ok(())
    }
}

/// Build a finding that does not originate from a rule evaluation
/// (source unavailability, operator-forced simulation, degradation).
pub fn synthetic_finding(rule_id: &str, severity: Severity, message: &str) -> Finding {
    Finding {
        id: mysentry_common::id::generate(mysentry_common::id::IdKind::Finding),
        rule_id: rule_id.to_string(),
        triggered_at: Utc::now(),
        samples: Vec::new(),
        severity,
        message: message.to_string(),
    }
}

/// Rule id under which source-unavailability findings are raised.
pub fn source_down_rule_id(metric_id: &str) -> String {
    format!("source_unavailable:{metric_id}")
}

/// Rule id of the alert raised when the finding queue overflows.
pub const DEGRADED_RULE_ID: &str = "alerting_degraded";
