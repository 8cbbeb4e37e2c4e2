use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::alert::AlertSink;
use crate::database::datastore::{
    check_values, report_upsert_failure, require_primary_keys, validate_table_definition,
    Datastore, LoadSummary, MAX_CHUNK_SIZE,
};
use crate::database::dialect::{Dialect, SnowflakeDialect};
use crate::database::error::DatastoreError;
use crate::database::executor::Executor;
use crate::database::generate::{
    create_table_sql, drop_table_sql, insert_select_values_sql, merge_sql, select_list_sql,
    values_row_sql,
};
use crate::database::snowflake::client::SnowflakeClient;
use crate::types::{ColumnSchema, StagedDataset, TableRef};

/// Loads staged data into Snowflake as literal `VALUES` chunks and upserts
/// through a `<table>_temp` table plus `MERGE`.
pub struct SnowflakeDatastore<E = SnowflakeClient> {
    executor: E,
    dialect: SnowflakeDialect,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl<E: Executor> SnowflakeDatastore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor, dialect: SnowflakeDialect, alerts: None }
    }

    pub fn with_alerts(mut self, alerts: Option<Arc<dyn AlertSink>>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn run(&mut self, sql: String) -> Result<u64, DatastoreError> {
        if sql.starts_with("INSERT") {
            debug!("{}", sql);
        } else {
            info!("{}", sql);
        }
        match self.executor.execute(&sql).await {
            Ok(affected) => Ok(affected),
            Err(e) => Err(DatastoreError::statement(sql, e)),
        }
    }

    async fn commit(&mut self) -> Result<(), DatastoreError> {
        self.executor.commit().await.map_err(|e| DatastoreError::statement("COMMIT", e))
    }

    async fn rollback_after_failure(&mut self) {
        if let Err(e) = self.executor.rollback().await {
            warn!("Rollback after a failed statement also failed: {}", e);
        }
    }

    async fn run_and_commit(&mut self, sql: String) -> Result<(), DatastoreError> {
        self.run(sql).await?;
        self.commit().await
    }

    /// Sends the rows in chunks of at most `MAX_CHUNK_SIZE`, committing each
    /// chunk on its own. A failure leaves earlier chunks committed.
    async fn load_chunks(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
    ) -> Result<LoadSummary, DatastoreError> {
        let schema = staged.schema();
        let select_list = select_list_sql(&self.dialect, schema);
        let mut summary = LoadSummary::default();

        for chunk in staged.rows().chunks(MAX_CHUNK_SIZE) {
            let values = chunk
                .iter()
                .map(|row| values_row_sql(&self.dialect, schema, row))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|cell| DatastoreError::TypeMismatch {
                    table: target.to_string(),
                    column: cell.column,
                    reason: cell.reason,
                })?;

            let sql = insert_select_values_sql(&self.dialect, target, schema, &select_list, &values);
            self.run(sql).await?;
            self.commit().await?;

            summary.rows += chunk.len();
            summary.chunks += 1;
            info!("Loaded chunk {} ({} rows) into {}", summary.chunks, chunk.len(), target);
        }

        Ok(summary)
    }

    async fn merge_through_temp(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        primary_keys: &[String],
        update_existing: bool,
    ) -> Result<LoadSummary, DatastoreError> {
        let temp = target.temp();

        self.ensure_table(target, staged.schema(), primary_keys).await?;
        // a temp table left behind by an interrupted run would get merged twice
        self.run_and_commit(drop_table_sql(&self.dialect, &temp)).await?;
        let summary = self.append(&temp, staged, primary_keys).await?;

        self.run(merge_sql(&self.dialect, target, staged.schema(), primary_keys, update_existing))
            .await?;
        self.commit().await?;

        Ok(summary)
    }
}

#[async_trait]
impl<E: Executor> Datastore for SnowflakeDatastore<E> {
    fn dialect(&self) -> &'static str {
        self.dialect.name()
    }

    async fn ensure_table(
        &mut self,
        target: &TableRef,
        schema: &ColumnSchema,
        primary_keys: &[String],
    ) -> Result<(), DatastoreError> {
        validate_table_definition(target, schema, primary_keys)?;
        self.run_and_commit(create_table_sql(&self.dialect, target, schema, primary_keys)).await
    }

    async fn drop_table(&mut self, target: &TableRef) -> Result<(), DatastoreError> {
        self.run_and_commit(drop_table_sql(&self.dialect, target)).await?;
        info!("Dropped {} if it existed", target);
        Ok(())
    }

    async fn append(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        primary_keys: &[String],
    ) -> Result<LoadSummary, DatastoreError> {
        validate_table_definition(target, staged.schema(), primary_keys)?;
        check_values(&self.dialect, target, staged.schema(), staged.rows())?;

        self.ensure_table(target, staged.schema(), primary_keys).await?;

        match self.load_chunks(target, staged).await {
            Ok(summary) => {
                info!("Appended {} rows to {} in {} chunks", summary.rows, target, summary.chunks);
                Ok(summary)
            }
            Err(e) => {
                self.rollback_after_failure().await;
                Err(e)
            }
        }
    }

    async fn upsert(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        primary_keys: &[String],
        update_existing: bool,
    ) -> Result<LoadSummary, DatastoreError> {
        require_primary_keys(target, primary_keys)?;
        validate_table_definition(target, staged.schema(), primary_keys)?;
        check_values(&self.dialect, target, staged.schema(), staged.rows())?;

        let outcome = match self.merge_through_temp(target, staged, primary_keys, update_existing).await {
            Ok(summary) => Ok(summary),
            Err(failure) => {
                self.rollback_after_failure().await;
                report_upsert_failure(self.dialect.name(), target, &failure, self.alerts.as_ref())
                    .await;
                Err(failure)
            }
        };

        // the temp table is dropped whether or not the merge went through
        let temp = target.temp();
        let cleanup = self.run_and_commit(drop_table_sql(&self.dialect, &temp)).await;

        match (outcome, cleanup) {
            (Ok(summary), Ok(())) => {
                info!("Upserted {} rows into {}", summary.rows, target);
                Ok(summary)
            }
            (Ok(_), Err(cleanup_error)) => {
                error!("Upsert into {} succeeded but {} could not be dropped", target, temp);
                Err(cleanup_error)
            }
            (Err(failure), cleanup) => {
                if let Err(cleanup_error) = cleanup {
                    error!("Could not drop {} after failed upsert: {}", temp, cleanup_error);
                }
                Err(DatastoreError::UpsertFailed {
                    target: target.to_string(),
                    sql: failure.sql().map(str::to_string),
                    source: Box::new(failure),
                })
            }
        }
    }

    async fn close(&mut self) -> Result<(), DatastoreError> {
        self.executor.close().await.map_err(|e| DatastoreError::statement("CLOSE", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::stage::stage;
    use crate::test_utils::{ExecutorEvent, MemoryExecutor, RecordingAlertSink};
    use crate::types::{Record, Value};

    fn schema() -> ColumnSchema {
        ColumnSchema::new()
            .with_column("prikey", "int")
            .with_column("test", "text[]")
            .with_column("tim", "timestamp")
    }

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                [
                    ("prikey".to_string(), Value::Integer(i as i64)),
                    ("test".to_string(), Value::from(vec!["yesgirl"])),
                    ("tim".to_string(), Value::from("2021-01-01 00:00:00")),
                ]
                .into_iter()
                .collect()
            })
            .collect()
    }

    fn staged(count: usize) -> StagedDataset {
        stage(&records(count), &schema(), Some("test_table")).unwrap()
    }

    fn keys() -> Vec<String> {
        vec!["prikey".to_string()]
    }

    fn target() -> TableRef {
        TableRef::new("MT", "test_table")
    }

    fn inserts(events: &[ExecutorEvent]) -> Vec<&String> {
        events
            .iter()
            .filter_map(|event| match event {
                ExecutorEvent::Execute(sql) if sql.starts_with("INSERT") => Some(sql),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_append_single_chunk() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        let summary = store.append(&target(), &staged(2), &keys()).await.unwrap();

        assert_eq!(summary, LoadSummary { rows: 2, chunks: 1 });
        let events = store.executor().events();
        assert_eq!(
            events,
            vec![
                ExecutorEvent::Execute(
                    "CREATE TABLE IF NOT EXISTS MT.test_table (prikey int, test ARRAY, tim timestamp, PRIMARY KEY (prikey))"
                        .to_string()
                ),
                ExecutorEvent::Commit,
                ExecutorEvent::Execute(
                    "INSERT INTO MT.test_table (prikey, test, tim) SELECT $1, PARSE_JSON($2), TO_TIMESTAMP($3) \
                     FROM VALUES (0, '[\"yesgirl\"]', '2021-01-01 00:00:00'), (1, '[\"yesgirl\"]', '2021-01-01 00:00:00')"
                        .to_string()
                ),
                ExecutorEvent::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_append_chunk_boundaries() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        let summary = store.append(&target(), &staged(5000), &keys()).await.unwrap();
        assert_eq!(summary.chunks, 1);

        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        let summary = store.append(&target(), &staged(5001), &keys()).await.unwrap();
        assert_eq!(summary, LoadSummary { rows: 5001, chunks: 2 });

        let events = store.executor().events();
        let inserts = inserts(&events);
        assert_eq!(inserts.len(), 2);
        assert!(inserts[1].ends_with("FROM VALUES (5000, '[\"yesgirl\"]', '2021-01-01 00:00:00')"));
    }

    #[tokio::test]
    async fn test_append_empty_dataset_only_creates_table() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        let summary = store.append(&target(), &staged(0), &keys()).await.unwrap();

        assert_eq!(summary, LoadSummary::default());
        assert_eq!(store.executor().statements().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_earlier_chunks_committed() {
        // the second chunk starts at prikey 5000
        let executor = MemoryExecutor::new().fail_on("FROM VALUES (5000,");
        let mut store = SnowflakeDatastore::new(executor);

        let result = store.append(&target(), &staged(6000), &keys()).await;

        assert!(matches!(result, Err(DatastoreError::StatementExecution { .. })));
        let events = store.executor().events();
        let first_insert = events
            .iter()
            .position(|e| matches!(e, ExecutorEvent::Execute(sql) if sql.starts_with("INSERT")))
            .unwrap();
        assert_eq!(events[first_insert + 1], ExecutorEvent::Commit);
        assert_eq!(events.last(), Some(&ExecutorEvent::Rollback));
    }

    #[tokio::test]
    async fn test_type_mismatch_sends_nothing() {
        let records: Vec<Record> =
            vec![[("prikey".to_string(), Value::from("abc"))].into_iter().collect()];
        let staged = stage(&records, &schema(), Some("test_table")).unwrap();

        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        let result = store.append(&target(), &staged, &keys()).await;

        assert!(matches!(result, Err(DatastoreError::TypeMismatch { .. })));
        assert!(store.executor().events().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_merges_and_drops_temp() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        store.upsert(&target(), &staged(3), &keys(), true).await.unwrap();

        let statements = store.executor().statements();
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE IF NOT EXISTS MT.test_table (prikey int, test ARRAY, tim timestamp, PRIMARY KEY (prikey))".to_string(),
                "DROP TABLE IF EXISTS MT.test_table_temp".to_string(),
                "CREATE TABLE IF NOT EXISTS MT.test_table_temp (prikey int, test ARRAY, tim timestamp, PRIMARY KEY (prikey))".to_string(),
                statements[3].clone(),
                "MERGE INTO MT.test_table AS a USING MT.test_table_temp AS b ON a.prikey = b.prikey \
                 WHEN MATCHED THEN UPDATE SET a.test = b.test, a.tim = b.tim \
                 WHEN NOT MATCHED THEN INSERT (prikey, test, tim) VALUES (b.prikey, b.test, b.tim)"
                    .to_string(),
                "DROP TABLE IF EXISTS MT.test_table_temp".to_string(),
            ]
        );
        assert!(statements[3].starts_with("INSERT INTO MT.test_table_temp "));
        assert_eq!(store.executor().events().last(), Some(&ExecutorEvent::Commit));
    }

    #[tokio::test]
    async fn test_upsert_insert_only_has_no_matched_clause() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        store.upsert(&target(), &staged(1), &keys(), false).await.unwrap();

        let merge = store
            .executor()
            .statements()
            .into_iter()
            .find(|sql| sql.starts_with("MERGE"))
            .unwrap();
        assert!(!merge.contains("WHEN MATCHED"));
    }

    #[tokio::test]
    async fn test_failed_merge_still_drops_temp_and_alerts() {
        let alerts = Arc::new(RecordingAlertSink::default());
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new().fail_on("MERGE INTO"))
            .with_alerts(Some(alerts.clone() as Arc<dyn AlertSink>));

        let result = store.upsert(&target(), &staged(2), &keys(), true).await;

        match result {
            Err(DatastoreError::UpsertFailed { ref target, ref sql, .. }) => {
                assert_eq!(target, "MT.test_table");
                assert!(sql.as_deref().unwrap_or_default().starts_with("MERGE INTO"));
            }
            other => panic!("expected UpsertFailed, got {:?}", other),
        }

        let events = store.executor().events();
        let tail: Vec<&ExecutorEvent> = events.iter().rev().take(3).collect();
        assert_eq!(tail[0], &ExecutorEvent::Commit);
        assert_eq!(tail[1], &ExecutorEvent::Execute("DROP TABLE IF EXISTS MT.test_table_temp".to_string()));
        assert_eq!(tail[2], &ExecutorEvent::Rollback);

        let sent = alerts.alerts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, "MT.test_table");
        assert!(sent[0].error.contains("MERGE INTO"));
    }

    #[tokio::test]
    async fn test_failed_cleanup_after_successful_merge_is_returned() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new().fail_after("DROP TABLE IF EXISTS MT.test_table_temp", 1));

        let result = store.upsert(&target(), &staged(1), &keys(), true).await;

        assert!(matches!(
            result,
            Err(DatastoreError::StatementExecution { ref sql, .. }) if sql == "DROP TABLE IF EXISTS MT.test_table_temp"
        ));
        assert!(store.executor().statements().iter().any(|sql| sql.starts_with("MERGE")));
    }

    #[tokio::test]
    async fn test_upsert_requires_primary_keys() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        let result = store.upsert(&target(), &staged(1), &[], true).await;

        assert!(matches!(result, Err(DatastoreError::Precondition(_))));
        assert!(store.executor().events().is_empty());
    }

    #[tokio::test]
    async fn test_semicolons_never_reach_statements() {
        let schema = ColumnSchema::new().with_column("id;", "int").with_column("note", "varchar;");
        let records: Vec<Record> = vec![[
            ("id;".to_string(), Value::Integer(1)),
            ("note".to_string(), Value::from("a; DROP TABLE x")),
        ]
        .into_iter()
        .collect()];
        let staged = stage(&records, &schema, Some("notes;")).unwrap();

        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        store.append(&staged.target_in("MT"), &staged, &[]).await.unwrap();

        let statements = store.executor().statements();
        assert_eq!(statements[0], "CREATE TABLE IF NOT EXISTS MT.notes (id int, note varchar)");
        // the value stays quoted, so its semicolon is inert
        assert_eq!(
            statements[1],
            "INSERT INTO MT.notes (id, note) SELECT $1, $2 FROM VALUES (1, 'a; DROP TABLE x')"
        );
    }

    #[tokio::test]
    async fn test_reserved_words_are_quoted() {
        let schema = ColumnSchema::new()
            .with_column("order", "varchar")
            .with_column("product_class", "varchar");
        let records: Vec<Record> = vec![[
            ("order".to_string(), Value::from("o-1")),
            ("product_class".to_string(), Value::from("toys")),
        ]
        .into_iter()
        .collect()];
        let staged = stage(&records, &schema, Some("orders")).unwrap();

        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        store.append(&TableRef::new("MT", "orders"), &staged, &[]).await.unwrap();

        let statements = store.executor().statements();
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS MT.orders (\"order\" varchar, \"product_class\" varchar)"
        );
    }

    #[tokio::test]
    async fn test_recreate_then_append() {
        let mut store = SnowflakeDatastore::new(MemoryExecutor::new());
        store.recreate_table(&target(), &schema(), &keys()).await.unwrap();
        store.append(&target(), &staged(1), &keys()).await.unwrap();

        let statements = store.executor().statements();
        assert_eq!(statements[0], "DROP TABLE IF EXISTS MT.test_table");
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS MT.test_table "));
        assert!(statements[3].starts_with("INSERT INTO MT.test_table "));
    }
}
