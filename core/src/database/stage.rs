use std::collections::BTreeSet;

use tracing::info;

use crate::database::error::DatastoreError;
use crate::types::{ColumnSchema, Record, RecordSet, StagedDataset, StagedRow};

/// Projects `records` onto `schema`, keeping only declared columns in schema
/// order. Columns a record lacks stay absent; nothing is coerced.
pub fn stage(
    records: &[Record],
    schema: &ColumnSchema,
    table_name: Option<&str>,
) -> Result<StagedDataset, DatastoreError> {
    let table = match table_name.map(str::trim) {
        Some(table) if !table.is_empty() => table.to_string(),
        _ => {
            return Err(DatastoreError::Configuration(
                "target table not defined in function call or record set, set one of those"
                    .to_string(),
            ))
        }
    };

    info!("Loading {} records for interface with {}.", records.len(), table);

    let rows: Vec<StagedRow> = records
        .iter()
        .map(|record| {
            StagedRow::new(
                schema
                    .names()
                    .filter_map(|name| {
                        record.get(name).map(|value| (name.to_string(), value.clone()))
                    })
                    .collect(),
            )
        })
        .collect();

    if let (Some(first_record), Some(first_row)) = (records.first(), rows.first()) {
        let trimmed: BTreeSet<&str> = first_record
            .keys()
            .map(String::as_str)
            .filter(|key| !schema.contains(key))
            .collect();
        info!(
            "Trimmed {} columns to {} for {}. Trimmed the following columns out: {:?}",
            first_record.len(),
            first_row.len(),
            table,
            trimmed
        );
    }

    Ok(StagedDataset::new(table, schema.clone(), rows))
}

impl RecordSet {
    /// Stages this record set, falling back to its own `target_table` when no
    /// table name is given.
    pub fn stage(&self, table_name: Option<&str>) -> Result<StagedDataset, DatastoreError> {
        stage(&self.data, &self.model_columns, table_name.or(self.target_table.as_deref()))
    }
}
