use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::types::schema::ColumnSchema;
use crate::types::value::Value;

pub type Record = HashMap<String, Value>;

/// Records plus the column schema they are loaded with. `target_table` lets the
/// producer name the table so callers do not have to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSet {
    pub data: Vec<Record>,

    pub model_columns: ColumnSchema,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_table: Option<String>,
}

impl RecordSet {
    pub fn new(model_columns: ColumnSchema, data: Vec<Record>) -> Self {
        Self { data, model_columns, target_table: None }
    }

    pub fn with_target_table(mut self, target_table: impl Into<String>) -> Self {
        self.target_table = Some(target_table.into());
        self
    }
}

static NULL_VALUE: Value = Value::Null;

/// One record projected onto a schema: only the schema's columns, in schema order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StagedRow {
    values: Vec<(String, Value)>,
}

impl StagedRow {
    pub(crate) fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// The value for `column`, or NULL when the record never had it.
    pub fn value_or_null(&self, column: &str) -> &Value {
        self.get(column).unwrap_or(&NULL_VALUE)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedDataset {
    table: String,
    schema: ColumnSchema,
    rows: Vec<StagedRow>,
}

impl StagedDataset {
    pub(crate) fn new(table: String, schema: ColumnSchema, rows: Vec<StagedRow>) -> Self {
        Self { table, schema, rows }
    }

    /// The table name resolved while staging.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[StagedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A table reference to the staged table inside `namespace`.
    pub fn target_in(&self, namespace: &str) -> TableRef {
        TableRef::new(namespace, &self.table)
    }
}

/// A table inside a schema (Postgres, Snowflake) or dataset (BigQuery).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub namespace: String,
    pub table: String,
}

impl TableRef {
    pub fn new(namespace: impl Into<String>, table: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), table: table.into() }
    }

    /// The staging table merge-based upserts load into first.
    pub fn temp(&self) -> TableRef {
        TableRef { namespace: self.namespace.clone(), table: format!("{}_temp", self.table) }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.table)
    }
}
