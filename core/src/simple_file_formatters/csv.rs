use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::ReaderBuilder;

use crate::simple_file_formatters::RecordFileError;
use crate::types::{Record, Value};

/// Reads a headed CSV file off the async runtime. Every cell is loaded as
/// text; columns are coerced when the rows are bound or rendered.
pub struct AsyncCsvReader {
    path: Arc<Path>,
}

impl AsyncCsvReader {
    pub fn new(file_path: &Path) -> Self {
        AsyncCsvReader { path: Arc::from(PathBuf::from(file_path)) }
    }

    pub async fn read_records(&self) -> Result<Vec<Record>, RecordFileError> {
        let path = Arc::clone(&self.path);

        tokio::task::spawn_blocking(move || {
            let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::Headers).from_path(&path)?;
            let headers = reader.headers()?.clone();

            let mut records = Vec::new();
            for row in reader.records() {
                let row = row?;
                let record: Record = headers
                    .iter()
                    .zip(row.iter())
                    .map(|(header, cell)| (header.to_string(), Value::from(cell)))
                    .collect();
                records.push(record);
            }

            Ok(records)
        })
        .await
        .map_err(|e| RecordFileError::BackgroundTask(e.to_string()))?
    }
}
