use crate::database::snowflake::client::SnowflakeError;

/// A statement the database (or its client) refused to run.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("PgError {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Snowflake(#[from] SnowflakeError),

    #[error("{0}")]
    Database(String),
}

#[derive(thiserror::Error, Debug)]
pub enum DatastoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Type mismatch for column {column} within {table}: {reason}")]
    TypeMismatch { table: String, column: String, reason: String },

    #[error("Could not connect to {dialect}: {message}")]
    Connection { dialect: &'static str, message: String },

    #[error("Statement failed: {source}")]
    StatementExecution {
        sql: String,
        #[source]
        source: ExecutionError,
    },

    #[error("{operation} is not supported for {dialect}")]
    UnsupportedOperation { dialect: &'static str, operation: &'static str },

    #[error("Upsert into {target} failed: {source}")]
    UpsertFailed {
        target: String,
        sql: Option<String>,
        #[source]
        source: Box<DatastoreError>,
    },
}

impl DatastoreError {
    pub fn statement(sql: impl Into<String>, source: impl Into<ExecutionError>) -> Self {
        DatastoreError::StatementExecution { sql: sql.into(), source: source.into() }
    }

    pub fn unsupported(dialect: &'static str, operation: &'static str) -> Self {
        DatastoreError::UnsupportedOperation { dialect, operation }
    }

    /// The SQL text implicated in the failure, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            DatastoreError::StatementExecution { sql, .. } => Some(sql),
            DatastoreError::UpsertFailed { sql, source, .. } => {
                sql.as_deref().or_else(|| source.sql())
            }
            _ => None,
        }
    }
}
