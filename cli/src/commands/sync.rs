use std::path::{Path, PathBuf};

use datastore::manifest::core::{Manifest, TableConfig};
use datastore::{read_records, sync_table};

use crate::commands::{find_table, load_manifest, open_datastore};
use crate::console::{print_error_message, print_success_message, print_warn_message};

/// The table named on the command line, or the only table in the manifest.
fn select_table<'a>(
    manifest: &'a Manifest,
    table: Option<&str>,
) -> Result<&'a TableConfig, Box<dyn std::error::Error>> {
    match (table, manifest.tables.as_slice()) {
        (Some(table), _) => find_table(manifest, table),
        (None, [only]) => Ok(only),
        (None, _) => {
            let message = format!(
                "Manifest {} declares {} tables, pick one with --table",
                manifest.name,
                manifest.tables.len()
            );
            print_error_message(&message);
            Err(message.into())
        }
    }
}

pub async fn handle_sync_command(
    manifest_path: PathBuf,
    data_path: &Path,
    table: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = load_manifest(&manifest_path)?;
    let table = select_table(&manifest, table)?;

    let records = read_records(data_path).await.map_err(|e| {
        print_error_message(&format!("Could not read records from {}: trace: {}", data_path.display(), e));
        e
    })?;

    if records.is_empty() {
        print_warn_message(&format!("{} holds no records, only the table will be ensured", data_path.display()));
    }

    let mut datastore = open_datastore(&manifest).await?;
    let result = sync_table(datastore.as_mut(), table, &records).await;
    // the session is released even when the load failed
    if let Err(e) = datastore.close().await {
        print_warn_message(&format!("Could not close the {} connection cleanly: {}", manifest.datastore.dialect, e));
    }

    let summary = result.map_err(|e| {
        print_error_message(&format!("Could not sync {}: trace: {}", table.target(), e));
        e
    })?;

    print_success_message(&format!(
        "Synced {} rows into {} in {} statements",
        summary.rows,
        table.target(),
        summary.chunks
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use datastore::manifest::core::{DatastoreSettings, TableOperation};
    use datastore::manifest::credentials::Credentials;
    use datastore::types::ColumnSchema;
    use datastore::DialectKind;

    use super::*;

    fn table(name: &str) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            namespace: "public".to_string(),
            operation: TableOperation::Append,
            primary_keys: vec![],
            update_existing: true,
            columns: ColumnSchema::new().with_column("id", "int"),
        }
    }

    fn manifest(tables: Vec<TableConfig>) -> Manifest {
        Manifest {
            name: "test".to_string(),
            description: None,
            environment_path: None,
            datastore: DatastoreSettings { dialect: DialectKind::Postgres, credentials: Credentials::new() },
            alerts: None,
            tables,
        }
    }

    #[test]
    fn test_select_table() {
        let single = manifest(vec![table("a")]);
        assert_eq!(select_table(&single, None).unwrap().name, "a");

        let many = manifest(vec![table("a"), table("b")]);
        assert!(select_table(&many, None).is_err());
        assert_eq!(select_table(&many, Some("b")).unwrap().name, "b");
        assert!(select_table(&many, Some("c")).is_err());
    }
}
