//! Notification delivery for alert lifecycle and remediation events.
//!
//! The pipeline hands every [`NotificationEvent`] to a [`NotifierSet`],
//! which fans out to the configured channels. A channel failure is
//! logged and isolated; it never blocks the pipeline or the other
//! channels.
//!
//! [`NotificationEvent`]: mysentry_common::types::NotificationEvent

pub mod log;
pub mod webhook;


use async_trait::async_trait;
use mysentry_common::types::NotificationEvent;

/// Errors that can occur while delivering a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to an external endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("Notify: endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },

    /// The event could not be encoded to the wire format.
    #[error("Notify: failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;

/// A delivery channel for structured agent events.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event through this channel.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn publish(&self, event: &NotificationEvent) -> Result<()>;

    /// Channel name for logging (e.g. `"log"`, `"webhook"`).
    fn name(&self) -> &str;
}

/// Fans one event out to every configured channel.
pub struct NotifierSet {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver to all channels, logging per-channel failures.
    pub async fn publish(&self, event: &NotificationEvent) {
        for channel in &self.channels {
            if let Err(e) = channel.publish(event).await {
                tracing::error!(
                    channel = channel.name(),
                    event_type = %event.event_type,
                    alert_id = %event.alert_id,
                    rule_id = %event.rule_id,
                    error = %e,
                    "Failed to deliver notification"
                );
            }
        }
    }
}
