use std::time::Duration;

use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{task, time::timeout};
use tokio_postgres::types::ToSql;
use tokio_postgres::{config::SslMode, Client, Config};
use tracing::{debug, error};

use crate::database::error::{DatastoreError, ExecutionError};
use crate::database::executor::{BatchExecutor, Executor};
use crate::manifest::credentials::{Credentials, POSTGRES_REQUIRED_KEYS};
use crate::types::Value;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("{0}")]
    MissingCredentials(String),

    #[error("Port {0} is not a valid port number")]
    InvalidPort(String),

    #[error("Unknown sslmode {0}, expected disable, prefer or require")]
    InvalidSslMode(String),

    #[error("Can not connect to the database please make sure your credentials are correct")]
    CanNotConnectToDatabase,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

impl From<PostgresConnectionError> for DatastoreError {
    fn from(value: PostgresConnectionError) -> Self {
        match value {
            PostgresConnectionError::MissingCredentials(message) => {
                DatastoreError::Configuration(message)
            }
            other => DatastoreError::Connection { dialect: "postgres", message: other.to_string() },
        }
    }
}

fn ssl_mode(credentials: &Credentials) -> Result<Option<SslMode>, PostgresConnectionError> {
    match credentials.get("sslmode").map(|mode| mode.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(mode) => match mode.as_str() {
            "disable" => Ok(Some(SslMode::Disable)),
            "prefer" => Ok(Some(SslMode::Prefer)),
            "require" => Ok(Some(SslMode::Require)),
            _ => Err(PostgresConnectionError::InvalidSslMode(mode)),
        },
    }
}

fn connection_config(credentials: &Credentials) -> Result<Config, PostgresConnectionError> {
    credentials
        .require("postgres", POSTGRES_REQUIRED_KEYS)
        .map_err(|e| PostgresConnectionError::MissingCredentials(e.to_string()))?;

    // `require` above guarantees these keys exist
    let value = |key: &str| credentials.get(key).unwrap_or_default();

    let port = value("port");
    let port: u16 =
        port.trim().parse().map_err(|_| PostgresConnectionError::InvalidPort(port.to_string()))?;

    let mut config = Config::new();
    config
        .host(value("host"))
        .port(port)
        .dbname(value("dbname"))
        .user(value("user"))
        .password(value("password"))
        .connect_timeout(CONNECT_TIMEOUT);

    if let Some(mode) = ssl_mode(credentials)? {
        config.ssl_mode(mode);
    }

    Ok(config)
}

/// A single Postgres connection. Statements open a transaction lazily, which
/// stays open until `commit` or `rollback`.
pub struct PostgresClient {
    client: Client,
    in_transaction: bool,
}

impl PostgresClient {
    pub async fn connect(credentials: &Credentials) -> Result<Self, PostgresConnectionError> {
        async fn _connect(
            mut config: Config,
            disable_ssl: bool,
        ) -> Result<PostgresClient, PostgresConnectionError> {
            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            let (client, connection) =
                match timeout(CONNECT_TIMEOUT, config.connect(tls_connector)).await {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        // retry without ssl if ssl has been attempted and failed
                        if !disable_ssl &&
                            config.get_ssl_mode() != SslMode::Disable &&
                            config.get_ssl_mode() != SslMode::Require
                        {
                            debug!("Postgres connection failed with ssl, retrying without: {}", e);
                            return Box::pin(_connect(config, true)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                };

            task::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Postgres connection error: {}", e);
                }
            });

            Ok(PostgresClient { client, in_transaction: false })
        }

        _connect(connection_config(credentials)?, false).await
    }

    async fn begin_if_needed(&mut self) -> Result<(), ExecutionError> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn finish(&mut self, statement: &str) -> Result<(), ExecutionError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.client.batch_execute(statement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for PostgresClient {
    async fn execute(&mut self, sql: &str) -> Result<u64, ExecutionError> {
        self.begin_if_needed().await?;
        Ok(self.client.execute(sql, &[]).await?)
    }

    async fn commit(&mut self) -> Result<(), ExecutionError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), ExecutionError> {
        self.finish("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        // uncommitted work is discarded, like closing a DB-API connection
        self.finish("ROLLBACK").await
    }
}

#[async_trait]
impl BatchExecutor for PostgresClient {
    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[&Value],
    ) -> Result<u64, ExecutionError> {
        self.begin_if_needed().await?;
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|value| *value as &(dyn ToSql + Sync)).collect();
        Ok(self.client.execute(sql, &params).await?)
    }
}
