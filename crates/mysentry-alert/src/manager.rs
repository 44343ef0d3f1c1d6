use crate::{synthetic_finding, DEGRADED_RULE_ID};
use chrono::{DateTime, Utc};
use mysentry_common::id;
use mysentry_common::types::{Alert, AlertState, Finding, Severity};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Maximum resolved alerts kept for the status view.
const RESOLVED_HISTORY_CAP: usize = 256;

/// Alert lifecycle outcomes the pipeline reacts to.
#[derive(Debug, Clone)]
pub enum AlertTransition {
    /// A new alert was created; notify and consider remediation.
    Opened(Alert),
    /// An open alert fired again past the re-notify interval.
    Reannounced(Alert),
    /// Occurrence counted, nothing to announce.
    Updated(Alert),
    /// Cool-down elapsed with no matching finding.
    Resolved(Alert),
}

impl AlertTransition {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertTransition::Opened(a)
            | AlertTransition::Reannounced(a)
            | AlertTransition::Updated(a)
            | AlertTransition::Resolved(a) => a,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("alert not found: {0}")]
    NotFound(String),
}

/// Tunables for the alert lifecycle.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Consecutive clear evaluation cycles before an alert resolves.
    pub cool_down_cycles: u32,
    /// Minimum interval between repeat announcements of a still-open alert.
    pub renotify: Duration,
    /// Capacity of the staged-finding queue.
    pub pending_capacity: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            cool_down_cycles: 3,
            renotify: Duration::from_secs(1800),
            pending_capacity: 256,
        }
    }
}

/// Single owner of the alert table.
///
/// All mutation happens through the state-machine methods here; other
/// components only see cloned snapshots. Per-rule serialization is by
/// construction: the manager lives on the one pipeline task.
pub struct AlertManager {
    settings: ManagerSettings,
    /// rule_id -> the one open-or-acknowledged alert for that rule.
    active: HashMap<String, Alert>,
    resolved: VecDeque<Alert>,
    /// rule_id -> consecutive evaluation cycles without a finding.
    clear_cycles: HashMap<String, u32>,
    /// rule_id -> timestamp of the last announcement.
    last_notified: HashMap<String, DateTime<Utc>>,
    /// rule_id -> id of the finding counted in the current cycle,
    /// so duplicate delivery increments occurrence_count once.
    last_finding: HashMap<String, String>,
    pending: VecDeque<Finding>,
    degraded: bool,
    /// Whether any staged finding was dropped since the last drain.
    dropped_since_drain: bool,
}

impl AlertManager {
    pub fn new(settings: ManagerSettings) -> Self {
        Self {
            settings,
            active: HashMap::new(),
            resolved: VecDeque::new(),
            clear_cycles: HashMap::new(),
            last_notified: HashMap::new(),
            last_finding: HashMap::new(),
            pending: VecDeque::new(),
            degraded: false,
            dropped_since_drain: false,
        }
    }

    /// Stage a finding for processing.
    ///
    /// On overflow the oldest staged finding is dropped and a single
    /// `alerting_degraded` alert is raised, so signal loss is surfaced
    /// rather than silent.
    pub fn enqueue(&mut self, finding: Finding) -> Option<AlertTransition> {
        let mut degraded_transition = None;
        if self.pending.len() >= self.settings.pending_capacity {
            self.dropped_since_drain = true;
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    rule_id = %dropped.rule_id,
                    finding_id = %dropped.id,
                    "Finding queue full, dropped oldest"
                );
            }
            if !self.degraded {
                self.degraded = true;
                let finding = synthetic_finding(
                    DEGRADED_RULE_ID,
                    Severity::Warning,
                    "alert pipeline overloaded: findings are being dropped",
                );
                degraded_transition = self.record(finding, Utc::now());
            }
        }
        self.pending.push_back(finding);
        degraded_transition
    }

    /// Process all staged findings in FIFO order.
    ///
    /// A drain with no intervening drop counts as one clear cycle for
    /// the degradation alert, so a transient overload resolves through
    /// the normal cool-down instead of standing forever.
    pub fn drain(&mut self, now: DateTime<Utc>) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();
        while let Some(finding) = self.pending.pop_front() {
            if let Some(t) = self.record(finding, now) {
                transitions.push(t);
            }
        }
        if self.degraded && !self.dropped_since_drain {
            if let Some(t) = self.observe_clear(DEGRADED_RULE_ID, now) {
                if matches!(t, AlertTransition::Resolved(_)) {
                    self.degraded = false;
                }
                transitions.push(t);
            }
        }
        self.dropped_since_drain = false;
        transitions
    }

    /// Apply one finding to the state machine.
    pub fn record(&mut self, finding: Finding, now: DateTime<Utc>) -> Option<AlertTransition> {
        // Duplicate delivery of the same finding within a cycle counts once.
        if self
            .last_finding
            .get(&finding.rule_id)
            .is_some_and(|id| *id == finding.id)
        {
            tracing::debug!(
                rule_id = %finding.rule_id,
                finding_id = %finding.id,
                "Duplicate finding delivery ignored"
            );
            return None;
        }
        self.last_finding
            .insert(finding.rule_id.clone(), finding.id.clone());
        self.clear_cycles.remove(&finding.rule_id);

        if let Some(alert) = self.active.get_mut(&finding.rule_id) {
            alert.occurrence_count += 1;
            alert.last_seen_at = now;
            alert.message = finding.message;

            // Acknowledged alerts keep counting but never re-announce.
            if alert.state == AlertState::Open {
                let due = self
                    .last_notified
                    .get(&finding.rule_id)
                    .map_or(true, |last| now - *last >= to_chrono(self.settings.renotify));
                if due {
                    self.last_notified.insert(finding.rule_id.clone(), now);
                    return Some(AlertTransition::Reannounced(alert.clone()));
                }
            }
            return Some(AlertTransition::Updated(alert.clone()));
        }

        let alert = Alert {
            id: id::generate(id::IdKind::Alert),
            rule_id: finding.rule_id.clone(),
            state: AlertState::Open,
            severity: finding.severity,
            message: finding.message,
            opened_at: now,
            last_seen_at: now,
            resolved_at: None,
            occurrence_count: 1,
        };
        tracing::info!(
            alert_id = %alert.id,
            rule_id = %alert.rule_id,
            severity = %alert.severity,
            "Alert opened"
        );
        self.last_notified.insert(finding.rule_id, now);
        self.active.insert(alert.rule_id.clone(), alert.clone());
        Some(AlertTransition::Opened(alert))
    }

    /// Register one evaluation cycle in which `rule_id` produced no
    /// finding. After `cool_down_cycles` consecutive clears the alert
    /// resolves; any intervening finding resets the count.
    pub fn observe_clear(&mut self, rule_id: &str, now: DateTime<Utc>) -> Option<AlertTransition> {
        if !self.active.contains_key(rule_id) {
            return None;
        }
        // A clear observation ends the current evaluation cycle.
        self.last_finding.remove(rule_id);

        let cycles = self.clear_cycles.entry(rule_id.to_string()).or_insert(0);
        *cycles += 1;
        if *cycles < self.settings.cool_down_cycles {
            return None;
        }

        self.clear_cycles.remove(rule_id);
        self.last_notified.remove(rule_id);
        let mut alert = self.active.remove(rule_id)?;
        alert.state = AlertState::Resolved;
        alert.resolved_at = Some(now);
        tracing::info!(
            alert_id = %alert.id,
            rule_id = %rule_id,
            occurrences = alert.occurrence_count,
            "Alert resolved"
        );
        if self.resolved.len() >= RESOLVED_HISTORY_CAP {
            self.resolved.pop_front();
        }
        self.resolved.push_back(alert.clone());
        Some(AlertTransition::Resolved(alert))
    }

    /// Operator acknowledgement. Idempotent for already-acknowledged
    /// alerts; resolved alerts cannot be acknowledged.
    pub fn acknowledge(&mut self, alert_id: &str) -> Result<Alert, ManagerError> {
        let alert = self
            .active
            .values_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| ManagerError::NotFound(alert_id.to_string()))?;
        alert.state = AlertState::Acknowledged;
        tracing::info!(alert_id = %alert.id, rule_id = %alert.rule_id, "Alert acknowledged");
        Ok(alert.clone())
    }

    pub fn active_alert(&self, rule_id: &str) -> Option<&Alert> {
        self.active.get(rule_id)
    }

    /// Current alert table: active alerts plus the resolved history,
    /// most recently opened first.
    pub fn snapshot(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .active
            .values()
            .cloned()
            .chain(self.resolved.iter().cloned())
            .collect();
        alerts.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        alerts
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000))
}
