use chrono::Utc;
use mysentry_alert::evaluator::Evaluator;
use mysentry_alert::manager::{AlertManager, AlertTransition};
use mysentry_alert::{source_down_rule_id, synthetic_finding};
use mysentry_collector::ring::SampleRing;
use mysentry_collector::CollectorEvent;
use mysentry_common::types::{
    Alert, MetricSample, NotificationEvent, RemediationAction, RemediationKind, Severity,
};
use mysentry_notify::NotifierSet;
use mysentry_remedy::engine::RemediationEngine;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, oneshot, watch};

/// Recent remediation actions kept for the status view.
const ACTION_HISTORY_CAP: usize = 128;

/// Requests from the admin API into the pipeline. The pipeline task is
/// the single owner of the alert table; everyone else goes through
/// these messages.
#[derive(Debug)]
pub enum AdminCommand {
    Status(oneshot::Sender<StatusReport>),
    Ack {
        alert_id: String,
        reply: oneshot::Sender<Result<Alert, String>>,
    },
    Simulate {
        rule_id: String,
        reply: oneshot::Sender<Result<Alert, String>>,
    },
}

/// Snapshot of agent state returned by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub alerts: Vec<Alert>,
    pub recent_actions: Vec<RemediationAction>,
    pub degraded: bool,
    pub disabled_remediation_kinds: Vec<RemediationKind>,
}

/// The evaluation pipeline: owns the sample rings, the evaluator, the
/// alert manager and the remediation engine, and runs them on one task
/// so all per-rule state transitions are serialized without locks.
pub struct Pipeline {
    rings: HashMap<String, SampleRing>,
    evaluator: Evaluator,
    manager: AlertManager,
    engine: RemediationEngine,
    notifiers: NotifierSet,
    actions: VecDeque<RemediationAction>,
}

impl Pipeline {
    pub fn new(
        rings: HashMap<String, SampleRing>,
        evaluator: Evaluator,
        manager: AlertManager,
        engine: RemediationEngine,
        notifiers: NotifierSet,
    ) -> Self {
        Self {
            rings,
            evaluator,
            manager,
            engine,
            notifiers,
            actions: VecDeque::new(),
        }
    }

    /// Run until shutdown. The current event is always processed to
    /// completion before the loop exits, so a remediation call is never
    /// abandoned mid-flight; its own timeout bounds the delay.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<CollectorEvent>,
        mut commands: mpsc::Receiver<AdminCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!("Pipeline started");
        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_collector_event(event).await;
                }
                Some(command) = commands.recv() => {
                    self.handle_admin_command(command).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Pipeline stopping");
                        break;
                    }
                }
                else => break,
            }
        }
    }

    async fn handle_collector_event(&mut self, event: CollectorEvent) {
        match event {
            CollectorEvent::Sample(sample) => self.handle_sample(sample).await,
            CollectorEvent::SourceDown {
                metric_id,
                consecutive_failures,
                error,
            } => {
                let finding = synthetic_finding(
                    &source_down_rule_id(&metric_id),
                    Severity::Warning,
                    &format!(
                        "metric '{metric_id}' unavailable after {consecutive_failures} \
                         consecutive failures: {error}"
                    ),
                );
                self.apply_finding(finding).await;
            }
            CollectorEvent::SourceRecovered { metric_id } => {
                // Resolution is driven by the samples that follow.
                tracing::info!(metric_id = %metric_id, "Source recovered, awaiting cool-down");
            }
        }
    }

    async fn handle_sample(&mut self, sample: MetricSample) {
        let metric_id = sample.metric_id.clone();
        let ring = self
            .rings
            .entry(metric_id.clone())
            .or_insert_with(|| SampleRing::new(8));
        ring.push(sample);

        let findings = self.evaluator.evaluate(&metric_id, ring);
        let fired: Vec<String> = findings.iter().map(|f| f.rule_id.clone()).collect();

        let mut transitions = Vec::new();
        for finding in findings {
            if let Some(t) = self.manager.enqueue(finding) {
                transitions.push(t);
            }
        }
        let now = Utc::now();
        transitions.extend(self.manager.drain(now));

        // This sample ends one evaluation cycle for every rule on the
        // metric; rules that did not fire accumulate a clear cycle.
        for rule_id in self
            .evaluator
            .rules_for(&metric_id)
            .iter()
            .map(|r| r.rule_id.clone())
            .collect::<Vec<_>>()
        {
            if !fired.contains(&rule_id) {
                if let Some(t) = self.manager.observe_clear(&rule_id, now) {
                    transitions.push(t);
                }
            }
        }

        // A successful sample also clears the source-unavailable condition.
        if let Some(t) = self
            .manager
            .observe_clear(&source_down_rule_id(&metric_id), now)
        {
            transitions.push(t);
        }

        for transition in transitions {
            self.process_transition(transition).await;
        }
    }

    async fn apply_finding(&mut self, finding: mysentry_common::types::Finding) {
        let mut transitions = Vec::new();
        if let Some(t) = self.manager.enqueue(finding) {
            transitions.push(t);
        }
        transitions.extend(self.manager.drain(Utc::now()));
        for transition in transitions {
            self.process_transition(transition).await;
        }
    }

    async fn process_transition(&mut self, transition: AlertTransition) {
        match transition {
            AlertTransition::Opened(alert) => {
                self.notifiers
                    .publish(&NotificationEvent::alert_opened(&alert))
                    .await;
                self.attempt_remediation(&alert).await;
            }
            AlertTransition::Reannounced(alert) => {
                let mut event = NotificationEvent::alert_opened(&alert);
                event.details = format!(
                    "{} (still open, {} occurrences)",
                    event.details, alert.occurrence_count
                );
                self.notifiers.publish(&event).await;
                self.attempt_remediation(&alert).await;
            }
            AlertTransition::Updated(_) => {}
            AlertTransition::Resolved(alert) => {
                self.notifiers
                    .publish(&NotificationEvent::alert_resolved(&alert))
                    .await;
            }
        }
    }

    async fn attempt_remediation(&mut self, alert: &Alert) {
        let allow_listed = self.engine.is_allow_listed(&alert.rule_id);
        let action = self.engine.attempt(alert).await;

        if self.actions.len() >= ACTION_HISTORY_CAP {
            self.actions.pop_front();
        }
        self.actions.push_back(action.clone());

        // Unlisted rules produce a notify-only audit record; the alert
        // notification already went out, so no extra event for those.
        if allow_listed {
            self.notifiers
                .publish(&NotificationEvent::remediation_executed(
                    &action,
                    alert.severity,
                ))
                .await;
        }
    }

    async fn handle_admin_command(&mut self, command: AdminCommand) {
        match command {
            AdminCommand::Status(reply) => {
                let report = StatusReport {
                    alerts: self.manager.snapshot(),
                    recent_actions: self.actions.iter().cloned().collect(),
                    degraded: self.manager.is_degraded(),
                    disabled_remediation_kinds: self.engine.disabled_kinds(),
                };
                let _ = reply.send(report);
            }
            AdminCommand::Ack { alert_id, reply } => {
                let result = self
                    .manager
                    .acknowledge(&alert_id)
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            AdminCommand::Simulate { rule_id, reply } => {
                let result = self.simulate(&rule_id).await;
                let _ = reply.send(result);
            }
        }
    }

    /// Force a finding for a configured rule, exercising the full
    /// alert / notification / remediation path.
    async fn simulate(&mut self, rule_id: &str) -> Result<Alert, String> {
        let Some(rule) = self.evaluator.rule(rule_id) else {
            return Err(format!("unknown rule: {rule_id}"));
        };
        let finding = synthetic_finding(
            rule_id,
            rule.severity,
            &format!("simulated finding for rule '{rule_id}'"),
        );
        self.apply_finding(finding).await;
        self.manager
            .active_alert(rule_id)
            .cloned()
            .ok_or_else(|| format!("simulation produced no alert for rule '{rule_id}'"))
    }
}
