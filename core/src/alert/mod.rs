mod slack;

use async_trait::async_trait;
pub use slack::{SlackError, SlackWebhook, SLACK_MONITOR_WEBHOOK_ENV};

/// What an operator needs to know about a failed upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertAlert {
    pub dialect: String,
    pub target: String,
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AlertError {
    #[error("{0}")]
    Slack(#[from] SlackError),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, alert: &UpsertAlert) -> Result<(), AlertError>;
}
