use clap::{ArgAction, Parser};

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "datastore", about, version)]
pub struct CLI {
    /// Only log errors.
    #[clap(long, short, global = true)]
    pub quiet: bool,

    /// Log more, repeat for trace output.
    #[clap(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Parser, Debug)]
#[clap(about = "Load record files into Postgres, Snowflake or BigQuery tables", long_about = None)]
pub enum Commands {
    /// Loads a JSON or CSV record file into a table declared in the manifest.
    ///
    /// The table's `operation` decides whether rows are appended, upserted on
    /// the primary keys, or loaded into a freshly recreated table.
    ///
    /// Example:
    /// `datastore sync --data customers.json --table customers`
    #[clap(name = "sync")]
    Sync {
        /// optional - Path to the manifest, default is datastore.yaml where the command is run.
        #[clap(long, short)]
        manifest: Option<String>,

        /// The `.json` array of objects or headed `.csv` file to load.
        #[clap(long, short)]
        data: String,

        /// optional - The table to load into, required when the manifest declares more than one.
        #[clap(long, short)]
        table: Option<String>,
    },

    /// Drops a table declared in the manifest.
    ///
    /// Example:
    /// `datastore drop --table customers`
    #[clap(name = "drop")]
    Drop {
        /// optional - Path to the manifest, default is datastore.yaml where the command is run.
        #[clap(long, short)]
        manifest: Option<String>,

        /// The table to drop.
        #[clap(long, short)]
        table: String,

        /// Skip the confirmation prompt.
        #[clap(long, short)]
        yes: bool,
    },

    /// Drops and creates a table declared in the manifest, leaving it empty.
    ///
    /// Example:
    /// `datastore recreate --table customers`
    #[clap(name = "recreate")]
    Recreate {
        /// optional - Path to the manifest, default is datastore.yaml where the command is run.
        #[clap(long, short)]
        manifest: Option<String>,

        /// The table to recreate.
        #[clap(long, short)]
        table: String,

        /// Skip the confirmation prompt.
        #[clap(long, short)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync() {
        let cli = CLI::parse_from(["datastore", "-v", "sync", "--data", "rows.csv", "-t", "customers"]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Sync { manifest, data, table } => {
                assert_eq!(manifest, None);
                assert_eq!(data, "rows.csv");
                assert_eq!(table.as_deref(), Some("customers"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_drop_requires_table() {
        assert!(CLI::try_parse_from(["datastore", "drop"]).is_err());
        let cli = CLI::parse_from(["datastore", "drop", "--table", "customers", "--yes"]);
        assert!(matches!(cli.command, Commands::Drop { yes: true, .. }));
    }
}
