use tracing::info;

use crate::database::datastore::{Datastore, LoadSummary};
use crate::database::error::DatastoreError;
use crate::database::stage::stage;
use crate::manifest::core::{TableConfig, TableOperation};
use crate::types::Record;

/// Stages `records` against the table's columns and runs its configured
/// operation.
pub async fn sync_table(
    datastore: &mut dyn Datastore,
    table: &TableConfig,
    records: &[Record],
) -> Result<LoadSummary, DatastoreError> {
    let staged = stage(records, &table.columns, Some(&table.name))?;
    let target = table.target();

    info!("Syncing {} rows into {} with {:?}", staged.len(), target, table.operation);

    match table.operation {
        TableOperation::Append => datastore.append(&target, &staged, &table.primary_keys).await,
        TableOperation::Upsert => {
            datastore.upsert(&target, &staged, &table.primary_keys, table.update_existing).await
        }
        TableOperation::Recreate => {
            datastore.recreate_table(&target, staged.schema(), &table.primary_keys).await?;
            datastore.append(&target, &staged, &table.primary_keys).await
        }
    }
}
