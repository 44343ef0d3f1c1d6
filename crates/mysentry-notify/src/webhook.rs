use crate::{Notifier, NotifyError, Result};
use async_trait::async_trait;
use mysentry_common::types::NotificationEvent;
use serde::Serialize;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;

/// Wire shape of an outbound webhook event.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    event_type: String,
    alert_id: &'a str,
    rule_id: &'a str,
    severity: String,
    timestamp: String,
    details: &'a str,
}

impl<'a> From<&'a NotificationEvent> for WebhookPayload<'a> {
    fn from(event: &'a NotificationEvent) -> Self {
        Self {
            event_type: event.event_type.to_string(),
            alert_id: &event.alert_id,
            rule_id: &event.rule_id,
            severity: event.severity.to_string(),
            timestamp: event.timestamp.to_rfc3339(),
            details: &event.details,
        }
    }
}

/// Posts events as JSON to an HTTP endpoint, with exponential backoff
/// between attempts.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub(crate) fn render_body(event: &NotificationEvent) -> Result<String> {
        Ok(serde_json::to_string(&WebhookPayload::from(event))?)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, event: &NotificationEvent) -> Result<()> {
        let body = Self::render_body(event)?;
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = status.as_u16(),
                        "Webhook returned non-success status, retrying"
                    );
                    last_err = Some(NotifyError::Endpoint {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err.unwrap_or(NotifyError::InvalidConfig("no attempt made".into())))
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
