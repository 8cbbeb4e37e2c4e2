use std::path::PathBuf;

use crate::commands::{find_table, load_manifest, open_datastore};
use crate::console::{confirm, print_error_message, print_success_message, print_warn_message};

pub async fn handle_recreate_command(
    manifest_path: PathBuf,
    table: &str,
    skip_confirmation: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = load_manifest(&manifest_path)?;
    let table = find_table(&manifest, table)?;
    let target = table.target();

    print_warn_message(&format!(
        "This will drop {} and create it again empty. Existing rows are lost.",
        target
    ));

    if !skip_confirmation && !confirm(&format!("Are you sure you wish to recreate {}?", target)) {
        print_success_message("Nothing was changed.");
        return Ok(());
    }

    let mut datastore = open_datastore(&manifest).await?;
    let result = datastore.recreate_table(&target, &table.columns, &table.primary_keys).await;
    datastore.close().await.ok();

    result.map_err(|e| {
        print_error_message(&format!("Could not recreate {}: trace: {}", target, e));
        e
    })?;

    print_success_message(&format!("\n\nSuccessfully recreated {}.\n\n", target));
    Ok(())
}
