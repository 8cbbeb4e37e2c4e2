pub mod record;
pub mod schema;
pub mod value;

pub use record::{Record, RecordSet, StagedDataset, StagedRow, TableRef};
pub use schema::{Column, ColumnSchema, LogicalType};
pub use value::Value;
