use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alert::AlertSink;
use crate::database::datastore::Datastore;
use crate::database::error::DatastoreError;
use crate::database::postgres::{PostgresClient, PostgresDatastore};
use crate::database::snowflake::{SnowflakeClient, SnowflakeConnectionConfig, SnowflakeDatastore};
use crate::manifest::credentials::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    Snowflake,
    #[serde(rename = "bigquery")]
    BigQuery,
}

impl Display for DialectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DialectKind::Postgres => write!(f, "postgres"),
            DialectKind::Snowflake => write!(f, "snowflake"),
            DialectKind::BigQuery => write!(f, "bigquery"),
        }
    }
}

impl FromStr for DialectKind {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "snowflake" => Ok(DialectKind::Snowflake),
            "bigquery" => Ok(DialectKind::BigQuery),
            other => Err(DatastoreError::Configuration(format!(
                "unknown datastore dialect {}, expected postgres, snowflake or bigquery",
                other
            ))),
        }
    }
}

/// Opens a connection for `kind` and wraps it in the matching datastore.
/// Credentials are validated before anything touches the network.
pub async fn connect(
    kind: DialectKind,
    credentials: &Credentials,
    alerts: Option<Arc<dyn AlertSink>>,
) -> Result<Box<dyn Datastore>, DatastoreError> {
    info!("Connecting to {}", kind);

    match kind {
        DialectKind::Postgres => {
            let client = PostgresClient::connect(credentials).await?;
            Ok(Box::new(PostgresDatastore::new(client).with_alerts(alerts)))
        }
        DialectKind::Snowflake => {
            let config = SnowflakeConnectionConfig::from_credentials(credentials)?;
            let client = SnowflakeClient::connect(&config).await.map_err(|e| {
                DatastoreError::Connection { dialect: "snowflake", message: e.to_string() }
            })?;
            Ok(Box::new(SnowflakeDatastore::new(client).with_alerts(alerts)))
        }
        DialectKind::BigQuery => connect_bigquery(credentials).await,
    }
}

#[cfg(feature = "bigquery")]
async fn connect_bigquery(credentials: &Credentials) -> Result<Box<dyn Datastore>, DatastoreError> {
    let datastore = crate::database::bigquery::BigQueryDatastore::connect(credentials).await?;
    Ok(Box::new(datastore))
}

#[cfg(not(feature = "bigquery"))]
async fn connect_bigquery(_credentials: &Credentials) -> Result<Box<dyn Datastore>, DatastoreError> {
    Err(DatastoreError::Configuration(
        "bigquery support is not compiled in, enable the bigquery feature".to_string(),
    ))
}
