use crate::RemediationExecutor;
use chrono::{DateTime, Utc};
use mysentry_common::id;
use mysentry_common::types::{
    Alert, RemediationAction, RemediationKind, RemediationOutcome,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// One allow-list entry: alerts for `rule_id` may trigger `kind`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemediationBinding {
    pub rule_id: String,
    pub kind: RemediationKind,
    /// Action parameters (e.g. `connection_id`, `before`). The
    /// executor validates these; configuration never supplies SQL.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Per-binding dry-run override.
    #[serde(default)]
    pub dry_run: bool,
}

/// Guardrail tunables.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Minimum interval between non-dry-run actions for one condition.
    pub rate_limit: Duration,
    /// Failures of one kind within `breaker_window` that open the breaker.
    pub breaker_max_failures: u32,
    pub breaker_window: Duration,
    /// Deadline for a single executor call.
    pub action_timeout: Duration,
    /// Global dry-run switch.
    pub dry_run: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rate_limit: Duration::from_secs(900),
            breaker_max_failures: 3,
            breaker_window: Duration::from_secs(3600),
            action_timeout: Duration::from_secs(10),
            dry_run: false,
        }
    }
}

/// Maps allow-listed alerts to remediation actions, enforcing
/// guardrails in a fixed order: rate limit, circuit breaker, dry-run.
///
/// The engine reads alert state and appends audit records; it never
/// mutates alerts — a failed remediation leaves the alert open, since
/// resolution must reflect observed recovery, not intent.
pub struct RemediationEngine {
    settings: EngineSettings,
    bindings: HashMap<String, RemediationBinding>,
    executor: Arc<dyn RemediationExecutor>,
    /// rule_id -> last non-dry-run execution attempt.
    last_executed: HashMap<String, DateTime<Utc>>,
    /// kind -> recent failure timestamps within the breaker window.
    failures: HashMap<RemediationKind, VecDeque<DateTime<Utc>>>,
    disabled: HashSet<RemediationKind>,
}

impl RemediationEngine {
    pub fn new(
        settings: EngineSettings,
        bindings: Vec<RemediationBinding>,
        executor: Arc<dyn RemediationExecutor>,
    ) -> Self {
        Self {
            settings,
            bindings: bindings
                .into_iter()
                .map(|b| (b.rule_id.clone(), b))
                .collect(),
            executor,
            last_executed: HashMap::new(),
            failures: HashMap::new(),
            disabled: HashSet::new(),
        }
    }

    /// Attempt remediation for an open alert.
    ///
    /// Always returns an audit record; the record's outcome tells the
    /// caller whether anything was executed, skipped, or failed.
    pub async fn attempt(&mut self, alert: &Alert) -> RemediationAction {
        let now = Utc::now();

        let Some(binding) = self.bindings.get(&alert.rule_id).cloned() else {
            return self.action_record(
                alert,
                RemediationKind::NotifyOnly,
                false,
                now,
                RemediationOutcome::Success,
                "rule not in remediation allow-list; notify only".to_string(),
            );
        };

        // Guardrail 1: rate limit per condition.
        if let Some(last) = self.last_executed.get(&alert.rule_id) {
            let elapsed = now - *last;
            let limit = chrono_duration(self.settings.rate_limit);
            if elapsed < limit {
                return self.action_record(
                    alert,
                    binding.kind,
                    false,
                    now,
                    RemediationOutcome::SkippedGuardrail,
                    format!(
                        "rate limited: last action {}s ago, limit {}s",
                        elapsed.num_seconds(),
                        self.settings.rate_limit.as_secs()
                    ),
                );
            }
        }

        // Guardrail 2: per-kind circuit breaker.
        if self.disabled.contains(&binding.kind) {
            return self.action_record(
                alert,
                binding.kind,
                false,
                now,
                RemediationOutcome::SkippedGuardrail,
                format!(
                    "circuit breaker open for '{}' after repeated failures; re-enable manually",
                    binding.kind
                ),
            );
        }

        // Guardrail 3: dry-run, global or per-binding.
        if self.settings.dry_run || binding.dry_run {
            tracing::info!(
                alert_id = %alert.id,
                rule_id = %alert.rule_id,
                kind = %binding.kind,
                "Dry-run: remediation resolved but not executed"
            );
            return self.action_record(
                alert,
                binding.kind,
                true,
                now,
                RemediationOutcome::Success,
                format!("dry-run: would execute {}", binding.kind),
            );
        }

        // The rate limit covers every real execution attempt,
        // successful or not.
        self.last_executed.insert(alert.rule_id.clone(), now);

        let result = timeout(
            self.settings.action_timeout,
            self.executor.execute(binding.kind, &binding.params),
        )
        .await;

        match result {
            Ok(Ok(detail)) => {
                tracing::info!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    kind = %binding.kind,
                    "Remediation executed"
                );
                self.action_record(alert, binding.kind, false, now, RemediationOutcome::Success, detail)
            }
            Ok(Err(e)) => {
                self.record_failure(binding.kind, now);
                tracing::error!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    kind = %binding.kind,
                    error = %e,
                    "Remediation failed; alert stays open"
                );
                self.action_record(
                    alert,
                    binding.kind,
                    false,
                    now,
                    RemediationOutcome::Failed,
                    e.to_string(),
                )
            }
            Err(_) => {
                self.record_failure(binding.kind, now);
                tracing::error!(
                    alert_id = %alert.id,
                    rule_id = %alert.rule_id,
                    kind = %binding.kind,
                    timeout_secs = self.settings.action_timeout.as_secs(),
                    "Remediation timed out"
                );
                self.action_record(
                    alert,
                    binding.kind,
                    false,
                    now,
                    RemediationOutcome::Failed,
                    format!(
                        "timed out after {}s",
                        self.settings.action_timeout.as_secs()
                    ),
                )
            }
        }
    }

    /// Manually re-enable a kind after its circuit breaker opened.
    pub fn re_enable(&mut self, kind: RemediationKind) {
        if self.disabled.remove(&kind) {
            self.failures.remove(&kind);
            tracing::info!(kind = %kind, "Remediation kind re-enabled");
        }
    }

    pub fn disabled_kinds(&self) -> Vec<RemediationKind> {
        self.disabled.iter().copied().collect()
    }

    pub fn is_allow_listed(&self, rule_id: &str) -> bool {
        self.bindings.contains_key(rule_id)
    }

    fn record_failure(&mut self, kind: RemediationKind, now: DateTime<Utc>) {
        let window = chrono_duration(self.settings.breaker_window);
        let entries = self.failures.entry(kind).or_default();
        entries.push_back(now);
        while let Some(front) = entries.front() {
            if now - *front > window {
                entries.pop_front();
            } else {
                break;
            }
        }
        if entries.len() as u32 >= self.settings.breaker_max_failures {
            self.disabled.insert(kind);
            tracing::warn!(
                kind = %kind,
                failures = entries.len(),
                window_secs = self.settings.breaker_window.as_secs(),
                "Circuit breaker opened; kind disabled until re-enabled"
            );
        }
    }

    fn action_record(
        &self,
        alert: &Alert,
        kind: RemediationKind,
        dry_run: bool,
        executed_at: DateTime<Utc>,
        outcome: RemediationOutcome,
        detail: String,
    ) -> RemediationAction {
        RemediationAction {
            id: id::generate(id::IdKind::Action),
            alert_id: alert.id.clone(),
            rule_id: alert.rule_id.clone(),
            kind,
            dry_run,
            executed_at,
            outcome,
            detail,
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1000))
}
