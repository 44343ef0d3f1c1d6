use crate::{Notifier, Result};
use async_trait::async_trait;
use mysentry_common::types::{NotificationEvent, Severity};

/// Writes events to the structured log. Always configured implicitly
/// in development; useful as the only channel on an air-gapped host.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: &NotificationEvent) -> Result<()> {
        match event.severity {
            Severity::Critical => tracing::error!(
                event_type = %event.event_type,
                alert_id = %event.alert_id,
                rule_id = %event.rule_id,
                severity = %event.severity,
                "{}",
                event.details
            ),
            Severity::Warning => tracing::warn!(
                event_type = %event.event_type,
                alert_id = %event.alert_id,
                rule_id = %event.rule_id,
                severity = %event.severity,
                "{}",
                event.details
            ),
            Severity::Info => tracing::info!(
                event_type = %event.event_type,
                alert_id = %event.alert_id,
                rule_id = %event.rule_id,
                severity = %event.severity,
                "{}",
                event.details
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
