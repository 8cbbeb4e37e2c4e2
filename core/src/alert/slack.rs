use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

use crate::alert::{AlertError, AlertSink, UpsertAlert};

pub const SLACK_MONITOR_WEBHOOK_ENV: &str = "SLACK_MONITOR_WEBHOOK";

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Slack webhook rejected the alert with status {status}: {body}")]
    ApiError { status: u16, body: String },
}

/// Posts alerts to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackWebhook {
    client: Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: Client::new(), url: url.into() }
    }

    /// Reads the webhook URL from `SLACK_MONITOR_WEBHOOK`; unset or empty means
    /// no alerting.
    pub fn from_env() -> Option<Self> {
        match env::var(SLACK_MONITOR_WEBHOOK_ENV) {
            Ok(url) if !url.trim().is_empty() => Some(Self::new(url.trim())),
            _ => None,
        }
    }

    pub fn payload(alert: &UpsertAlert) -> serde_json::Value {
        let headline = format!(
            "Something went wrong when upserting {} in {}.",
            alert.target, alert.dialect
        );
        json!({
            "text": headline,
            "blocks": [
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": headline
                    }
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("Traceback:\n```{}```", alert.error)
                    }
                }
            ]
        })
    }
}

#[async_trait]
impl AlertSink for SlackWebhook {
    async fn notify(&self, alert: &UpsertAlert) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&Self::payload(alert))
            .send()
            .await
            .map_err(SlackError::from)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SlackError::ApiError { status: status.as_u16(), body }.into())
        }
    }
}
