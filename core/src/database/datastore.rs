use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::alert::{AlertSink, UpsertAlert};
use crate::database::dialect::Dialect;
use crate::database::error::DatastoreError;
use crate::types::{ColumnSchema, StagedDataset, StagedRow, TableRef};

/// Rows per literal `VALUES` statement; bounds statement size.
pub const MAX_CHUNK_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub rows: usize,
    pub chunks: usize,
}

/// The operations every dialect offers on top of its connection.
#[async_trait]
pub trait Datastore: Send {
    fn dialect(&self) -> &'static str;

    /// `CREATE TABLE IF NOT EXISTS` for `schema`, with an optional primary key.
    async fn ensure_table(
        &mut self,
        target: &TableRef,
        schema: &ColumnSchema,
        primary_keys: &[String],
    ) -> Result<(), DatastoreError>;

    async fn drop_table(&mut self, target: &TableRef) -> Result<(), DatastoreError>;

    /// Drops then creates the table. Not transactional: a failed create leaves
    /// the table dropped.
    async fn recreate_table(
        &mut self,
        target: &TableRef,
        schema: &ColumnSchema,
        primary_keys: &[String],
    ) -> Result<(), DatastoreError> {
        self.drop_table(target).await?;
        self.ensure_table(target, schema, primary_keys).await
    }

    async fn append(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        primary_keys: &[String],
    ) -> Result<LoadSummary, DatastoreError>;

    /// Inserts rows, updating rows whose primary key already exists when
    /// `update_existing` is set and leaving them untouched otherwise.
    async fn upsert(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        primary_keys: &[String],
        update_existing: bool,
    ) -> Result<LoadSummary, DatastoreError>;

    async fn close(&mut self) -> Result<(), DatastoreError>;
}

/// Rejects schemas and key sets no table can be created from.
pub fn validate_table_definition(
    target: &TableRef,
    schema: &ColumnSchema,
    primary_keys: &[String],
) -> Result<(), DatastoreError> {
    if schema.is_empty() {
        return Err(DatastoreError::Precondition(format!(
            "no columns declared for {}, stage a record set with model columns first",
            target
        )));
    }

    if let Some(missing) = primary_keys.iter().find(|pk| !schema.contains(pk)) {
        return Err(DatastoreError::Precondition(format!(
            "primary key {} is not a column of {}",
            missing, target
        )));
    }

    Ok(())
}

/// Rejects values that can not be stored in their column before any
/// statement is sent.
pub fn check_values<D: Dialect + ?Sized>(
    dialect: &D,
    table: &TableRef,
    schema: &ColumnSchema,
    rows: &[StagedRow],
) -> Result<(), DatastoreError> {
    for row in rows {
        for (name, value) in row.iter() {
            if let Some(column) = schema.get(name) {
                dialect.check_value(column, value).map_err(|reason| {
                    DatastoreError::TypeMismatch {
                        table: table.to_string(),
                        column: name.to_string(),
                        reason,
                    }
                })?;
            }
        }
    }
    Ok(())
}

pub fn require_primary_keys(
    target: &TableRef,
    primary_keys: &[String],
) -> Result<(), DatastoreError> {
    if primary_keys.is_empty() {
        error!(
            "No primary keys declared for {} -- you cannot upsert without at least one. Appending is still an option.",
            target
        );
        return Err(DatastoreError::Precondition(format!(
            "upsert into {} requires at least one primary key",
            target
        )));
    }
    Ok(())
}

/// Logs a failed upsert with its SQL and forwards it to the alert sink.
/// Alert delivery problems are logged, never returned.
pub async fn report_upsert_failure(
    dialect: &'static str,
    target: &TableRef,
    failure: &DatastoreError,
    alerts: Option<&Arc<dyn AlertSink>>,
) {
    error!("Something went wrong during the upsert routine for {}: {}", target, failure);

    if let Some(sql) = failure.sql() {
        info!("Upsert SQL: {}", sql);
    }

    if let Some(sink) = alerts {
        let alert = UpsertAlert {
            dialect: dialect.to_string(),
            target: target.to_string(),
            error: failure.to_string(),
        };
        if let Err(e) = sink.notify(&alert).await {
            error!("Could not send upsert failure alert for {}: {}", target, e);
        }
    }
}
