use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single timestamped metric observation produced by the collector.
///
/// Immutable once created; the evaluator only ever reads samples out of
/// the per-metric ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: String,
    pub metric_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub tags: HashMap<String, String>,
}

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use mysentry_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Comparison operator applied by a rule against its threshold.
///
/// Accepts both short (`gt`) and long (`greater_than`) spellings when
/// parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl Comparator {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Lt => value < threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Le => value <= threshold,
            Comparator::Eq => value == threshold,
        }
    }

    /// Human-readable phrasing used in alert messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Comparator::Gt => "above",
            Comparator::Lt => "below",
            Comparator::Ge => "at or above",
            Comparator::Le => "at or below",
            Comparator::Eq => "equal to",
        }
    }
}

impl std::str::FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gt" | "greater_than" => Ok(Comparator::Gt),
            "lt" | "less_than" => Ok(Comparator::Lt),
            "ge" | "gte" | "greater_equal" => Ok(Comparator::Ge),
            "le" | "lte" | "less_equal" => Ok(Comparator::Le),
            "eq" | "equal" => Ok(Comparator::Eq),
            _ => Err(format!("unknown comparator: {s}")),
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparator::Gt => write!(f, "gt"),
            Comparator::Lt => write!(f, "lt"),
            Comparator::Ge => write!(f, "ge"),
            Comparator::Le => write!(f, "le"),
            Comparator::Eq => write!(f, "eq"),
        }
    }
}

/// A single detected rule violation, produced by the evaluator and
/// consumed immediately by the alert manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub rule_id: String,
    pub triggered_at: DateTime<Utc>,
    /// The consecutive samples that satisfied the rule, oldest first.
    pub samples: Vec<MetricSample>,
    pub severity: Severity,
    pub message: String,
}

/// Lifecycle state of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Open,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertState::Open => write!(f, "open"),
            AlertState::Acknowledged => write!(f, "acknowledged"),
            AlertState::Resolved => write!(f, "resolved"),
        }
    }
}

/// The deduplicated, stateful representation of an ongoing or past
/// condition. Owned exclusively by the alert manager; at most one
/// open-or-acknowledged alert exists per `rule_id` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub state: AlertState,
    pub severity: Severity,
    pub message: String,
    pub opened_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub occurrence_count: u64,
}

/// Kind of remediation action the engine may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    KillConnection,
    PurgeBinaryLogs,
    RestartReplication,
    NotifyOnly,
}

impl std::fmt::Display for RemediationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationKind::KillConnection => write!(f, "kill_connection"),
            RemediationKind::PurgeBinaryLogs => write!(f, "purge_binary_logs"),
            RemediationKind::RestartReplication => write!(f, "restart_replication"),
            RemediationKind::NotifyOnly => write!(f, "notify_only"),
        }
    }
}

impl std::str::FromStr for RemediationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kill_connection" => Ok(RemediationKind::KillConnection),
            "purge_binary_logs" => Ok(RemediationKind::PurgeBinaryLogs),
            "restart_replication" => Ok(RemediationKind::RestartReplication),
            "notify_only" => Ok(RemediationKind::NotifyOnly),
            _ => Err(format!("unknown remediation kind: {s}")),
        }
    }
}

/// Outcome of a remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    Success,
    Failed,
    SkippedGuardrail,
}

impl std::fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemediationOutcome::Success => write!(f, "success"),
            RemediationOutcome::Failed => write!(f, "failed"),
            RemediationOutcome::SkippedGuardrail => write!(f, "skipped_guardrail"),
        }
    }
}

/// Immutable audit record of one remediation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: String,
    pub alert_id: String,
    pub rule_id: String,
    pub kind: RemediationKind,
    pub dry_run: bool,
    pub executed_at: DateTime<Utc>,
    pub outcome: RemediationOutcome,
    /// Executor output on success, error or skip reason otherwise.
    pub detail: String,
}

/// Event type for outbound notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventType {
    AlertOpened,
    AlertResolved,
    RemediationExecuted,
}

impl std::fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationEventType::AlertOpened => write!(f, "alert_opened"),
            NotificationEventType::AlertResolved => write!(f, "alert_resolved"),
            NotificationEventType::RemediationExecuted => write!(f, "remediation_executed"),
        }
    }
}

/// The structured event handed to notifier channels — the agent's only
/// outbound side effect besides remediation calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: NotificationEventType,
    pub alert_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
}

impl NotificationEvent {
    pub fn alert_opened(alert: &Alert) -> Self {
        Self {
            event_type: NotificationEventType::AlertOpened,
            alert_id: alert.id.clone(),
            rule_id: alert.rule_id.clone(),
            severity: alert.severity,
            timestamp: Utc::now(),
            details: alert.message.clone(),
        }
    }

    pub fn alert_resolved(alert: &Alert) -> Self {
        Self {
            event_type: NotificationEventType::AlertResolved,
            alert_id: alert.id.clone(),
            rule_id: alert.rule_id.clone(),
            severity: alert.severity,
            timestamp: Utc::now(),
            details: format!("condition cleared: {}", alert.message),
        }
    }

    pub fn remediation_executed(action: &RemediationAction, severity: Severity) -> Self {
        Self {
            event_type: NotificationEventType::RemediationExecuted,
            alert_id: action.alert_id.clone(),
            rule_id: action.rule_id.clone(),
            severity,
            timestamp: Utc::now(),
            details: format!(
                "{} ({}{}): {}",
                action.kind,
                action.outcome,
                if action.dry_run { ", dry-run" } else { "" },
                action.detail
            ),
        }
    }
}

/// Format a tag map into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use mysentry_common::types::format_tags;
///
/// let mut tags = HashMap::new();
/// tags.insert("channel".to_string(), "replica-1".to_string());
/// assert_eq!(format_tags(&tags), "channel=replica-1");
/// ```
pub fn format_tags(tags: &HashMap<String, String>) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(", ")
}
