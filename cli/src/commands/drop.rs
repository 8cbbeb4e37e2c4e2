use std::path::PathBuf;

use crate::commands::{find_table, load_manifest, open_datastore};
use crate::console::{confirm, print_error_message, print_success_message, print_warn_message};

pub async fn handle_drop_command(
    manifest_path: PathBuf,
    table: &str,
    skip_confirmation: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = load_manifest(&manifest_path)?;
    let table = find_table(&manifest, table)?;
    let target = table.target();

    print_warn_message(&format!(
        "This will drop {} in {} with all of its data.",
        target, manifest.datastore.dialect
    ));
    print_warn_message("This operation can not be reverted. Make sure you know what you are doing.");

    if !skip_confirmation && !confirm(&format!("Are you sure you wish to drop {}?", target)) {
        print_success_message("Nothing was dropped.");
        return Ok(());
    }

    let mut datastore = open_datastore(&manifest).await?;
    let result = datastore.drop_table(&target).await;
    datastore.close().await.ok();

    result.map_err(|e| {
        print_error_message(&format!("Could not drop {}: trace: {}", target, e));
        e
    })?;

    print_success_message(&format!("\n\nSuccessfully dropped {}.\n\n", target));
    Ok(())
}
