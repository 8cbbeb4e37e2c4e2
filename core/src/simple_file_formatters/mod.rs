pub mod csv;

use std::path::Path;

use tokio::fs;

use crate::types::{Record, Value};

#[derive(thiserror::Error, Debug)]
pub enum RecordFileError {
    #[error("Could not read records file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse CSV: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Could not parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of objects, found {0}")]
    NotAnArrayOfObjects(String),

    #[error("Unsupported records file extension {0}, expected .json or .csv")]
    UnsupportedExtension(String),

    #[error("Background read failed: {0}")]
    BackgroundTask(String),
}

fn json_records(contents: &str) -> Result<Vec<Record>, RecordFileError> {
    let parsed: serde_json::Value = serde_json::from_str(contents)?;
    let serde_json::Value::Array(items) = parsed else {
        return Err(RecordFileError::NotAnArrayOfObjects("a non-array document".to_string()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(fields) => {
                Ok(fields.into_iter().map(|(key, value)| (key, Value::from(value))).collect())
            }
            other => Err(RecordFileError::NotAnArrayOfObjects(format!("{} at index {}", other, i))),
        })
        .collect()
}

/// Reads records from a `.json` array of objects or a headed `.csv` file.
pub async fn read_records(path: &Path) -> Result<Vec<Record>, RecordFileError> {
    let extension =
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();

    match extension.as_str() {
        "json" => json_records(&fs::read_to_string(path).await?),
        "csv" => csv::AsyncCsvReader::new(path).read_records().await,
        other => Err(RecordFileError::UnsupportedExtension(other.to_string())),
    }
}
