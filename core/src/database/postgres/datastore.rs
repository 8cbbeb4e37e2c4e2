use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::alert::AlertSink;
use crate::database::datastore::{
    check_values, report_upsert_failure, require_primary_keys, validate_table_definition,
    Datastore, LoadSummary, MAX_CHUNK_SIZE,
};
use crate::database::dialect::{Dialect, PostgresDialect};
use crate::database::error::DatastoreError;
use crate::database::executor::BatchExecutor;
use crate::database::generate::{
    create_table_sql, drop_table_sql, on_conflict_sql, parameterized_insert_sql,
};
use crate::database::postgres::client::PostgresClient;
use crate::types::{ColumnSchema, StagedDataset, TableRef, Value};

/// Postgres binds at most this many parameters per statement.
const MAX_PARAMETERS: usize = 65535;

/// Rows per parameterized insert for a table of `columns` columns.
fn page_size(columns: usize) -> usize {
    (MAX_PARAMETERS / columns.max(1)).clamp(1, MAX_CHUNK_SIZE)
}

/// Loads staged data into Postgres with bound parameters, using
/// `ON CONFLICT` for upserts.
pub struct PostgresDatastore<E = PostgresClient> {
    executor: E,
    dialect: PostgresDialect,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl<E: BatchExecutor> PostgresDatastore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor, dialect: PostgresDialect, alerts: None }
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

    /// Rolls back after a failure; the original failure is what gets reported.
    async fn rollback_after_failure(&mut self) {
        if let Err(e) = self.executor.rollback().await {
            warn!("Rollback after a failed statement also failed: {}", e);
        }
    }

    /// Runs one statement in its own transaction.
    async fn run_and_commit(&mut self, sql: String) -> Result<(), DatastoreError> {
        let result = match self.run(sql).await {
            Ok(_) => self.commit().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.rollback_after_failure().await;
        }
        result
    }

    /// Inserts every staged row in pages, appending `conflict_clause` to each
    /// statement. Nothing is committed here.
    async fn insert_pages(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        conflict_clause: &str,
    ) -> Result<LoadSummary, DatastoreError> {
        let schema = staged.schema();
        let mut summary = LoadSummary::default();

        for page in staged.rows().chunks(page_size(schema.len())) {
            let mut sql = parameterized_insert_sql(&self.dialect, target, schema, page.len());
            sql.push_str(conflict_clause);

            let params: Vec<&Value> = page
                .iter()
                .flat_map(|row| schema.names().map(move |name| row.value_or_null(name)))
                .collect();

            debug!("{} ({} rows)", sql, page.len());
            if let Err(e) = self.executor.execute_with_params(&sql, &params).await {
                return Err(DatastoreError::statement(sql, e));
            }

            summary.rows += page.len();
            summary.chunks += 1;
        }

        Ok(summary)
    }

    async fn upsert_rows(
        &mut self,
        target: &TableRef,
        staged: &StagedDataset,
        primary_keys: &[String],
        update_existing: bool,
    ) -> Result<LoadSummary, DatastoreError> {
        self.ensure_table(target, staged.schema(), primary_keys).await?;
        let conflict_clause =
            on_conflict_sql(&self.dialect, staged.schema(), primary_keys, update_existing);
        let summary = self.insert_pages(target, staged, &conflict_clause).await?;
        self.commit().await?;
        Ok(summary)
    }
}

#[async_trait]
impl<E: BatchExecutor> Datastore for PostgresDatastore<E> {
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

        let result = match self.insert_pages(target, staged, "").await {
            Ok(summary) => self.commit().await.map(|_| summary),
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                info!("Appended {} rows to {} in {} statements", summary.rows, target, summary.chunks);
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

        match self.upsert_rows(target, staged, primary_keys, update_existing).await {
            Ok(summary) => {
                info!("Upserted {} rows into {}", summary.rows, target);
                Ok(summary)
            }
            Err(failure) => {
                self.rollback_after_failure().await;
                report_upsert_failure(self.dialect.name(), target, &failure, self.alerts.as_ref())
                    .await;
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
    use crate::types::Record;

    fn schema() -> ColumnSchema {
        ColumnSchema::new().with_column("k", "int").with_column("v", "text")
    }

    fn records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                [("k".to_string(), Value::Integer(i as i64)), ("v".to_string(), Value::from("x"))]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    fn staged(count: usize) -> StagedDataset {
        stage(&records(count), &schema(), Some("kv")).unwrap()
    }

    fn keys() -> Vec<String> {
        vec!["k".to_string()]
    }

    fn target() -> TableRef {
        TableRef::new("public", "kv")
    }

    #[test]
    fn test_page_size_respects_parameter_limit() {
        assert_eq!(page_size(2), MAX_CHUNK_SIZE);
        assert_eq!(page_size(100), 655);
        assert_eq!(page_size(70_000), 1);
    }

    #[tokio::test]
    async fn test_ensure_table_commits() {
        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        store.ensure_table(&target(), &schema(), &keys()).await.unwrap();

        assert_eq!(
            store.executor().events(),
            vec![
                ExecutorEvent::Execute(
                    "CREATE TABLE IF NOT EXISTS \"public\".\"kv\" (\"k\" int, \"v\" text, PRIMARY KEY (\"k\"))"
                        .to_string()
                ),
                ExecutorEvent::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_binds_values_with_on_conflict() {
        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        let summary = store.upsert(&target(), &staged(2), &keys(), true).await.unwrap();

        assert_eq!(summary, LoadSummary { rows: 2, chunks: 1 });
        let events = store.executor().events();
        assert_eq!(
            events[2],
            ExecutorEvent::ExecuteWithParams {
                sql: "INSERT INTO \"public\".\"kv\" (\"k\", \"v\") VALUES ($1, $2), ($3, $4) \
                      ON CONFLICT (\"k\") DO UPDATE SET \"v\" = EXCLUDED.\"v\""
                    .to_string(),
                params: vec![Value::Integer(0), Value::from("x"), Value::Integer(1), Value::from("x")],
            }
        );
        assert_eq!(events.last(), Some(&ExecutorEvent::Commit));
    }

    #[tokio::test]
    async fn test_upsert_without_update_does_nothing_on_conflict() {
        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        store.upsert(&target(), &staged(1), &keys(), false).await.unwrap();

        let statements = store.executor().statements();
        assert!(statements.last().unwrap().ends_with("ON CONFLICT (\"k\") DO NOTHING"));
    }

    #[tokio::test]
    async fn test_upsert_requires_primary_keys_before_any_statement() {
        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        let result = store.upsert(&target(), &staged(1), &[], true).await;

        assert!(matches!(result, Err(DatastoreError::Precondition(_))));
        assert!(store.executor().events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_upsert_rolls_back_and_alerts() {
        let alerts = Arc::new(RecordingAlertSink::default());
        let mut store = PostgresDatastore::new(MemoryExecutor::new().fail_on("ON CONFLICT"))
            .with_alerts(Some(alerts.clone() as Arc<dyn AlertSink>));

        let result = store.upsert(&target(), &staged(3), &keys(), true).await;

        match result {
            Err(DatastoreError::UpsertFailed { target, sql, .. }) => {
                assert_eq!(target, "public.kv");
                assert!(sql.unwrap().contains("ON CONFLICT"));
            }
            other => panic!("expected UpsertFailed, got {:?}", other),
        }
        assert_eq!(store.executor().events().last(), Some(&ExecutorEvent::Rollback));
        let sent = alerts.alerts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dialect, "postgres");
    }

    #[tokio::test]
    async fn test_append_pages_share_one_transaction() {
        let wide: ColumnSchema = (0..20).map(|i| (format!("c{}", i), "int".to_string())).collect();
        let rows: Vec<Record> = (0..7000)
            .map(|i| wide.names().map(|name| (name.to_string(), Value::Integer(i))).collect())
            .collect();
        let staged = stage(&rows, &wide, Some("wide")).unwrap();

        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        let summary = store.append(&TableRef::new("public", "wide"), &staged, &[]).await.unwrap();

        // 65535 / 20 caps pages at 3276 rows
        assert_eq!(summary, LoadSummary { rows: 7000, chunks: 3 });
        let events = store.executor().events();
        let commits = events.iter().filter(|e| **e == ExecutorEvent::Commit).count();
        assert_eq!(commits, 2);
        assert_eq!(events.last(), Some(&ExecutorEvent::Commit));
    }

    #[tokio::test]
    async fn test_append_missing_columns_bind_null() {
        let records: Vec<Record> =
            vec![[("k".to_string(), Value::Integer(1))].into_iter().collect()];
        let staged = stage(&records, &schema(), Some("kv")).unwrap();

        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        store.append(&target(), &staged, &[]).await.unwrap();

        let params = store.executor().events().into_iter().find_map(|event| match event {
            ExecutorEvent::ExecuteWithParams { params, .. } => Some(params),
            _ => None,
        });
        assert_eq!(params, Some(vec![Value::Integer(1), Value::Null]));
    }

    #[tokio::test]
    async fn test_append_rejects_type_mismatch_before_sending() {
        let records: Vec<Record> =
            vec![[("k".to_string(), Value::from("not a number"))].into_iter().collect()];
        let staged = stage(&records, &schema(), Some("kv")).unwrap();

        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        let result = store.append(&target(), &staged, &[]).await;

        assert!(matches!(result, Err(DatastoreError::TypeMismatch { ref column, .. }) if column == "k"));
        assert!(store.executor().events().is_empty());
    }

    #[tokio::test]
    async fn test_unbindable_dates_and_widths_are_type_mismatches() {
        let events = ColumnSchema::new().with_column("d", "date").with_column("s", "smallint");
        let cases = [
            ("d", Value::from("not-a-date")),
            ("s", Value::Integer(70_000)),
            ("s", Value::Float(1e20)),
        ];

        for (name, value) in cases {
            let records: Vec<Record> = vec![[(name.to_string(), value)].into_iter().collect()];
            let staged = stage(&records, &events, Some("events")).unwrap();

            let mut store = PostgresDatastore::new(MemoryExecutor::new());
            let result = store.append(&TableRef::new("public", "events"), &staged, &[]).await;

            assert!(
                matches!(result, Err(DatastoreError::TypeMismatch { ref table, ref column, .. })
                    if table == "public.events" && column == name),
                "{} gave {:?}",
                name,
                result
            );
            assert!(store.executor().events().is_empty());
        }
    }

    #[tokio::test]
    async fn test_recreate_drops_then_creates() {
        let mut store = PostgresDatastore::new(MemoryExecutor::new());
        store.recreate_table(&target(), &schema(), &keys()).await.unwrap();

        let statements = store.executor().statements();
        assert_eq!(statements[0], "DROP TABLE IF EXISTS \"public\".\"kv\"");
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"kv\""));
    }
}
