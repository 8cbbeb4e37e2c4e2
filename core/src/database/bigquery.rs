use async_trait::async_trait;
use gcp_bigquery_client::Client;
use tracing::info;

use crate::database::datastore::{Datastore, LoadSummary};
use crate::database::error::DatastoreError;
use crate::manifest::credentials::Credentials;
use crate::types::{ColumnSchema, StagedDataset, TableRef};

const DIALECT: &str = "bigquery";

/// Credential naming the service account key file.
const KEY_PATH: &str = "key_path";

fn key_path(credentials: &Credentials) -> Option<&str> {
    credentials.get(KEY_PATH).map(str::trim).filter(|path| !path.is_empty())
}

/// A connected BigQuery client. Loading is not supported for BigQuery yet, so
/// every table operation fails without calling the API.
pub struct BigQueryDatastore {
    client: Client,
    project_id: Option<String>,
}

impl BigQueryDatastore {
    /// Authenticates with the service account key at `key_path` when
    /// given, otherwise with application default credentials.
    pub async fn connect(credentials: &Credentials) -> Result<Self, DatastoreError> {
        let connection_error = |e: gcp_bigquery_client::error::BQError| DatastoreError::Connection {
            dialect: DIALECT,
            message: e.to_string(),
        };

        let client = match key_path(credentials) {
            Some(path) => Client::from_service_account_key_file(path).await.map_err(connection_error)?,
            None => Client::from_application_default_credentials().await.map_err(connection_error)?,
        };

        let project_id = credentials.get("project_id").map(str::to_string);
        match &project_id {
            Some(project_id) => info!("Connected to BigQuery project {}", project_id),
            None => info!("Connected to BigQuery"),
        }

        Ok(Self { client, project_id })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

#[async_trait]
impl Datastore for BigQueryDatastore {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    async fn ensure_table(
        &mut self,
        _target: &TableRef,
        _schema: &ColumnSchema,
        _primary_keys: &[String],
    ) -> Result<(), DatastoreError> {
        Err(DatastoreError::unsupported(DIALECT, "ensure_table"))
    }

    async fn drop_table(&mut self, _target: &TableRef) -> Result<(), DatastoreError> {
        Err(DatastoreError::unsupported(DIALECT, "drop_table"))
    }

    async fn recreate_table(
        &mut self,
        _target: &TableRef,
        _schema: &ColumnSchema,
        _primary_keys: &[String],
    ) -> Result<(), DatastoreError> {
        Err(DatastoreError::unsupported(DIALECT, "recreate_table"))
    }

    async fn append(
        &mut self,
        _target: &TableRef,
        _staged: &StagedDataset,
        _primary_keys: &[String],
    ) -> Result<LoadSummary, DatastoreError> {
        Err(DatastoreError::unsupported(DIALECT, "append"))
    }

    async fn upsert(
        &mut self,
        _target: &TableRef,
        _staged: &StagedDataset,
        _primary_keys: &[String],
        _update_existing: bool,
    ) -> Result<LoadSummary, DatastoreError> {
        Err(DatastoreError::unsupported(DIALECT, "upsert"))
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        Ok(())
    }
}
