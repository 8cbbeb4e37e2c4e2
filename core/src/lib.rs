// public
pub mod alert;
pub mod manifest;
pub mod types;

mod database;
#[cfg(feature = "bigquery")]
pub use database::bigquery::BigQueryDatastore;
pub use database::{
    datastore::{Datastore, LoadSummary, MAX_CHUNK_SIZE},
    dialect::{Dialect, LiteralDialect, PostgresDialect, SnowflakeDialect},
    error::{DatastoreError, ExecutionError},
    executor::{BatchExecutor, Executor},
    generate::{
        create_table_sql, drop_table_sql, insert_select_values_sql, merge_sql, on_conflict_sql,
        parameterized_insert_sql,
    },
    postgres::{PostgresClient, PostgresConnectionError, PostgresDatastore},
    setup::{connect, DialectKind},
    snowflake::{SnowflakeClient, SnowflakeConnectionConfig, SnowflakeDatastore, SnowflakeError},
    stage::stage,
};

mod simple_file_formatters;
pub use simple_file_formatters::{csv::AsyncCsvReader, read_records, RecordFileError};

mod sync;
pub use sync::sync_table;

mod logger;
pub use logger::{level_from_verbosity, setup_info_logger, setup_logger};

#[cfg(test)]
mod test_utils;

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tracing::level_filters::LevelFilter;
