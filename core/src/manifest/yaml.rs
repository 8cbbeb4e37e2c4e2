use std::{
    collections::HashSet,
    env,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use regex::{Captures, Regex};
use tracing::{error, info};

use crate::database::setup::DialectKind;
use crate::manifest::core::{Manifest, TableOperation};
use crate::manifest::credentials::{POSTGRES_REQUIRED_KEYS, SNOWFLAKE_REQUIRED_KEYS};

pub const YAML_CONFIG_NAME: &str = "datastore.yaml";

#[derive(thiserror::Error, Debug)]
pub enum SubstituteEnvError {
    #[error("Environment variable {0} not found")]
    MissingVariable(String),

    #[error("{0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Replaces every `${VAR}` with the value of `VAR`. Every missing variable is
/// logged; the first one is returned as the error.
fn substitute_env_variables(contents: &str) -> Result<String, SubstituteEnvError> {
    let re = Regex::new(r"\$\{([^}]+)\}")?;
    let mut missing: Vec<String> = Vec::new();

    let result = re.replace_all(contents, |caps: &Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                error!("Environment variable {} not found", var_name);
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    match missing.into_iter().next() {
        Some(var_name) => Err(SubstituteEnvError::MissingVariable(var_name)),
        None => Ok(result.into_owned()),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ValidateManifestError {
    #[error("Table names {0} must be unique")]
    TableNameMustBeUnique(String),

    #[error("Table {0} has no columns")]
    TableHasNoColumns(String),

    #[error("Primary key {1} of table {0} is not one of its columns")]
    PrimaryKeyNotAColumn(String, String),

    #[error("Table {0} is upserted but declares no primary keys")]
    UpsertWithoutPrimaryKeys(String),

    #[error("Datastore credentials are missing {0}")]
    MissingCredentials(String),
}

fn validate_manifest(manifest: &Manifest) -> Result<(), ValidateManifestError> {
    let mut seen = HashSet::new();
    for table in &manifest.tables {
        if !seen.insert(table.target()) {
            return Err(ValidateManifestError::TableNameMustBeUnique(table.target().to_string()));
        }

        if table.columns.is_empty() {
            return Err(ValidateManifestError::TableHasNoColumns(table.name.clone()));
        }

        if let Some(pk) = table.primary_keys.iter().find(|pk| !table.columns.contains(pk)) {
            return Err(ValidateManifestError::PrimaryKeyNotAColumn(table.name.clone(), pk.clone()));
        }

        if table.operation == TableOperation::Upsert && table.primary_keys.is_empty() {
            return Err(ValidateManifestError::UpsertWithoutPrimaryKeys(table.name.clone()));
        }
    }

    let required: &[&str] = match manifest.datastore.dialect {
        DialectKind::Postgres => POSTGRES_REQUIRED_KEYS,
        DialectKind::Snowflake => SNOWFLAKE_REQUIRED_KEYS,
        DialectKind::BigQuery => &[],
    };
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|key| manifest.datastore.credentials.get(key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ValidateManifestError::MissingCredentials(missing.join(", ")));
    }

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum ReadManifestError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse manifest: {0}")]
    CouldNotParseManifest(#[from] serde_yaml::Error),

    #[error("Could not substitute env variables: {0}")]
    CouldNotSubstituteEnvVariables(#[from] SubstituteEnvError),

    #[error("Could not validate manifest: {0}")]
    CouldNotValidateManifest(#[from] ValidateManifestError),
}

fn extract_environment_path(contents: &str, file_path: &Path) -> Option<PathBuf> {
    let re = Regex::new(r"(?m)^environment_path:\s*(.+)$").ok()?;
    re.captures(contents).and_then(|cap| cap.get(1)).map(|m| {
        let path_str = m.as_str().trim().replace('\"', "");
        let base_dir = file_path.parent().unwrap_or(Path::new(""));
        let full_path = base_dir.join(path_str);
        full_path.canonicalize().unwrap_or(full_path)
    })
}

/// Loads the `.env` next to the manifest (or the one `environment_path`
/// points at), substitutes `${VAR}` references, then parses and validates.
pub fn read_manifest(file_path: &Path) -> Result<Manifest, ReadManifestError> {
    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    match extract_environment_path(&contents, file_path) {
        Some(path) => {
            if dotenv::from_path(&path).is_err() {
                info!("No environment file found at {}", path.display());
            }
        }
        None => {
            let default_env = file_path.parent().unwrap_or(Path::new("")).join(".env");
            dotenv::from_path(default_env).ok();
        }
    }

    let contents = substitute_env_variables(&contents)?;
    let manifest: Manifest = serde_yaml::from_str(&contents)?;

    validate_manifest(&manifest)?;
    Ok(manifest)
}
