//! Client side of the admin API, used by the CLI subcommands.

use crate::runtime::StatusReport;
use anyhow::{bail, Context};
use mysentry_common::types::Alert;
use std::time::Duration;

pub struct AdminClient {
    base_url: String,
    client: reqwest::Client,
}

impl AdminClient {
    pub fn new(admin_listen: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: format!("http://{admin_listen}"),
            client,
        })
    }

    pub async fn status(&self) -> anyhow::Result<StatusReport> {
        let url = format!("{}/v1/status", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("is the agent running? failed to reach admin API")?;
        if !response.status().is_success() {
            bail!("status request failed: HTTP {}", response.status());
        }
        response
            .json()
            .await
            .context("failed to decode status response")
    }

    pub async fn ack(&self, alert_id: &str) -> anyhow::Result<Alert> {
        let url = format!("{}/v1/alerts/{alert_id}/ack", self.base_url);
        self.post_alert(&url).await
    }

    pub async fn simulate(&self, rule_id: &str) -> anyhow::Result<Alert> {
        let url = format!("{}/v1/rules/{rule_id}/simulate", self.base_url);
        self.post_alert(&url).await
    }

    async fn post_alert(&self, url: &str) -> anyhow::Result<Alert> {
        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("is the agent running? failed to reach admin API")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("request failed: HTTP {status}: {body}");
        }
        response.json().await.context("failed to decode response")
    }
}
