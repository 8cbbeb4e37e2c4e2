pub mod drop;
pub mod recreate;
pub mod sync;

use std::path::PathBuf;

use datastore::manifest::core::{Manifest, TableConfig};
use datastore::manifest::yaml::{read_manifest, YAML_CONFIG_NAME};
use datastore::{connect, Datastore};

use crate::console::print_error_message;

pub fn resolve_manifest_path(override_path: &Option<String>) -> Result<PathBuf, String> {
    match override_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(std::env::current_dir()
            .map_err(|_| "Failed to get current directory.".to_string())?
            .join(YAML_CONFIG_NAME)),
    }
}

pub fn load_manifest(manifest_path: &PathBuf) -> Result<Manifest, Box<dyn std::error::Error>> {
    read_manifest(manifest_path).map_err(|e| {
        print_error_message(&format!(
            "Could not read the manifest at {}: trace: {}",
            manifest_path.display(),
            e
        ));
        e.into()
    })
}

pub fn find_table<'a>(
    manifest: &'a Manifest,
    table: &str,
) -> Result<&'a TableConfig, Box<dyn std::error::Error>> {
    manifest.find_table(table).ok_or_else(|| {
        let message = format!("Table {} is not declared in manifest {}", table, manifest.name);
        print_error_message(&message);
        message.into()
    })
}

pub async fn open_datastore(
    manifest: &Manifest,
) -> Result<Box<dyn Datastore>, Box<dyn std::error::Error>> {
    connect(manifest.datastore.dialect, &manifest.datastore.credentials, manifest.alert_sink())
        .await
        .map_err(|e| {
            print_error_message(&format!(
                "Could not connect to {}, make sure the manifest credentials are correct: trace: {}",
                manifest.datastore.dialect, e
            ));
            e.into()
        })
}
