use crate::engine::{EngineSettings, RemediationBinding, RemediationEngine};
use crate::{RemediationExecutor, RemedyError, Result};
use async_trait::async_trait;
use chrono::Utc;
use mysentry_common::types::{
    Alert, AlertState, RemediationKind, RemediationOutcome, Severity,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Executor that counts calls and fails or stalls on demand.
struct MockExecutor {
    calls: AtomicU32,
    fail: bool,
    stall: Option<Duration>,
}

impl MockExecutor {
    fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: false,
            stall: None,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: true,
            stall: None,
        })
    }

    fn stalling(for_: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: false,
            stall: Some(for_),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemediationExecutor for MockExecutor {
    async fn execute(
        &self,
        kind: RemediationKind,
        _params: &HashMap<String, String>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.stall {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            Err(RemedyError::InvalidParam {
                name: "connection_id".into(),
                reason: "server said no".into(),
            })
        } else {
            Ok(format!("executed {kind}"))
        }
    }
}

fn open_alert(rule_id: &str) -> Alert {
    Alert {
        id: mysentry_common::id::generate(mysentry_common::id::IdKind::Alert),
        rule_id: rule_id.to_string(),
        state: AlertState::Open,
        severity: Severity::Critical,
        message: "too many connections".to_string(),
        opened_at: Utc::now(),
        last_seen_at: Utc::now(),
        resolved_at: None,
        occurrence_count: 1,
    }
}

fn kill_binding(rule_id: &str) -> RemediationBinding {
    let mut params = HashMap::new();
    params.insert("connection_id".to_string(), "42".to_string());
    RemediationBinding {
        rule_id: rule_id.to_string(),
        kind: RemediationKind::KillConnection,
        params,
        dry_run: false,
    }
}

fn settings() -> EngineSettings {
    EngineSettings {
        rate_limit: Duration::from_secs(900),
        breaker_max_failures: 3,
        breaker_window: Duration::from_secs(3600),
        action_timeout: Duration::from_millis(50),
        dry_run: false,
    }
}

#[tokio::test]
async fn unlisted_rule_degrades_to_notify_only() {
    let executor = MockExecutor::succeeding();
    let mut engine = RemediationEngine::new(
        settings(),
        vec![kill_binding("too_many_connections")],
        executor.clone(),
    );

    let action = engine.attempt(&open_alert("replication-lag-high")).await;
    assert_eq!(action.kind, RemediationKind::NotifyOnly);
    assert_eq!(action.outcome, RemediationOutcome::Success);
    assert_eq!(executor.call_count(), 0, "no side effect for unlisted rules");
}

#[tokio::test]
async fn scenario_c_second_attempt_within_window_is_rate_limited() {
    let executor = MockExecutor::succeeding();
    let mut engine = RemediationEngine::new(
        settings(),
        vec![kill_binding("too_many_connections")],
        executor.clone(),
    );

    // Two alert instances for the same condition, minutes apart.
    let first = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(first.outcome, RemediationOutcome::Success);

    let second = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(second.outcome, RemediationOutcome::SkippedGuardrail);
    assert!(second.detail.contains("rate limited"), "{}", second.detail);
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn dry_run_resolves_without_executing_or_consuming_rate_limit() {
    let executor = MockExecutor::succeeding();
    let mut cfg = settings();
    cfg.dry_run = true;
    let mut engine = RemediationEngine::new(
        cfg,
        vec![kill_binding("too_many_connections")],
        executor.clone(),
    );

    let action = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(action.outcome, RemediationOutcome::Success);
    assert!(action.dry_run);
    assert_eq!(executor.call_count(), 0);

    // Dry runs do not consume the rate-limit budget.
    let again = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(again.outcome, RemediationOutcome::Success);
    assert!(again.dry_run);
}

#[tokio::test]
async fn per_binding_dry_run_overrides_global_off() {
    let executor = MockExecutor::succeeding();
    let mut binding = kill_binding("too_many_connections");
    binding.dry_run = true;
    let mut engine = RemediationEngine::new(settings(), vec![binding], executor.clone());

    let action = engine.attempt(&open_alert("too_many_connections")).await;
    assert!(action.dry_run);
    assert_eq!(executor.call_count(), 0);
}

#[tokio::test]
async fn breaker_opens_after_repeated_failures_and_reenables() {
    let executor = MockExecutor::failing();
    let mut cfg = settings();
    cfg.rate_limit = Duration::from_secs(0); // isolate the breaker
    let mut engine = RemediationEngine::new(
        cfg,
        vec![kill_binding("too_many_connections")],
        executor.clone(),
    );

    for _ in 0..3 {
        let action = engine.attempt(&open_alert("too_many_connections")).await;
        assert_eq!(action.outcome, RemediationOutcome::Failed);
    }
    assert_eq!(engine.disabled_kinds(), vec![RemediationKind::KillConnection]);

    // K failures within the window: the next attempt is skipped, not executed.
    let skipped = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(skipped.outcome, RemediationOutcome::SkippedGuardrail);
    assert!(skipped.detail.contains("circuit breaker"), "{}", skipped.detail);
    assert_eq!(executor.call_count(), 3);

    engine.re_enable(RemediationKind::KillConnection);
    let retried = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(retried.outcome, RemediationOutcome::Failed);
    assert_eq!(executor.call_count(), 4);
}

#[tokio::test]
async fn execution_past_deadline_is_recorded_failed() {
    let executor = MockExecutor::stalling(Duration::from_secs(5));
    let mut engine = RemediationEngine::new(
        settings(), // action_timeout = 50ms
        vec![kill_binding("too_many_connections")],
        executor.clone(),
    );

    let action = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(action.outcome, RemediationOutcome::Failed);
    assert!(action.detail.contains("timed out"), "{}", action.detail);
}

#[tokio::test]
async fn failed_attempt_still_consumes_rate_limit() {
    // A failing action counts as the one allowed attempt per window;
    // retry storms against a broken server are not permitted.
    let executor = MockExecutor::failing();
    let mut engine = RemediationEngine::new(
        settings(),
        vec![kill_binding("too_many_connections")],
        executor.clone(),
    );

    let first = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(first.outcome, RemediationOutcome::Failed);

    let second = engine.attempt(&open_alert("too_many_connections")).await;
    assert_eq!(second.outcome, RemediationOutcome::SkippedGuardrail);
    assert_eq!(executor.call_count(), 1);
}
