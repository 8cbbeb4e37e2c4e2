use std::path::PathBuf;

use clap::Parser;
use datastore::{level_from_verbosity, setup_logger};

use crate::{
    cli_interface::{Commands, CLI},
    commands::{
        drop::handle_drop_command, recreate::handle_recreate_command,
        resolve_manifest_path, sync::handle_sync_command,
    },
    console::print_error_message,
};

mod cli_interface;
mod commands;
mod console;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::parse();

    setup_logger(level_from_verbosity(cli.quiet, cli.verbose));

    match &cli.command {
        Commands::Sync { manifest, data, table } => {
            let manifest_path = resolve_manifest_path(manifest).map_err(|e| {
                print_error_message(&e);
                e
            })?;
            handle_sync_command(manifest_path, &PathBuf::from(data), table.as_deref()).await
        }
        Commands::Drop { manifest, table, yes } => {
            let manifest_path = resolve_manifest_path(manifest).map_err(|e| {
                print_error_message(&e);
                e
            })?;
            handle_drop_command(manifest_path, table, *yes).await
        }
        Commands::Recreate { manifest, table, yes } => {
            let manifest_path = resolve_manifest_path(manifest).map_err(|e| {
                print_error_message(&e);
                e
            })?;
            handle_recreate_command(manifest_path, table, *yes).await
        }
    }
}
