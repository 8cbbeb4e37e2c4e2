use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alert::{AlertSink, SlackWebhook};
use crate::database::setup::DialectKind;
use crate::manifest::credentials::Credentials;
use crate::types::{ColumnSchema, TableRef};

fn default_namespace() -> String {
    "public".to_string()
}

fn default_update_existing() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatastoreSettings {
    pub dialect: DialectKind,

    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AlertSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TableOperation {
    #[default]
    Append,
    Upsert,
    /// Drop and create the table, then append.
    Recreate,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TableConfig {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub operation: TableOperation,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_keys: Vec<String>,

    #[serde(default = "default_update_existing")]
    pub update_existing: bool,

    pub columns: ColumnSchema,
}

impl TableConfig {
    pub fn target(&self) -> TableRef {
        TableRef::new(&self.namespace, &self.name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Manifest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `.env` file loaded before `${VAR}` substitution, relative to the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_path: Option<String>,

    pub datastore: DatastoreSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alerts: Option<AlertSettings>,

    pub tables: Vec<TableConfig>,
}

impl Manifest {
    pub fn find_table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// The manifest's Slack webhook, falling back to `SLACK_MONITOR_WEBHOOK`.
    pub fn alert_sink(&self) -> Option<Arc<dyn AlertSink>> {
        let configured = self
            .alerts
            .as_ref()
            .and_then(|alerts| alerts.slack_webhook.as_deref())
            .filter(|url| !url.trim().is_empty())
            .map(SlackWebhook::new);

        configured.or_else(SlackWebhook::from_env).map(|webhook| Arc::new(webhook) as Arc<dyn AlertSink>)
    }
}
