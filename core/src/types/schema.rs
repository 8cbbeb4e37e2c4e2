use std::fmt::{self, Display, Formatter};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::value::{float_to_i64, Value};

/// How a declared column type is treated when values are rendered or bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
    Array,
    Other,
}

impl LogicalType {
    /// Classifies a column type string such as `varchar(255)`, `int`, `text[]` or `ARRAY`.
    pub fn from_sql_type(sql_type: &str) -> Self {
        let normalized = sql_type.trim().to_ascii_lowercase();

        if normalized.ends_with("[]") || normalized == "array" || normalized.starts_with("array<")
        {
            return LogicalType::Array;
        }

        let base = normalized.split('(').next().unwrap_or_default().trim();

        match base {
            "text" | "varchar" | "char" | "character" | "character varying" | "string"
            | "bpchar" => LogicalType::Text,
            "int" | "integer" | "int2" | "int4" | "int8" | "int64" | "smallint" | "bigint"
            | "tinyint" | "byteint" | "serial" | "bigserial" => LogicalType::Integer,
            "float" | "float4" | "float8" | "float64" | "real" | "double" | "double precision"
            | "numeric" | "decimal" | "number" => LogicalType::Float,
            "bool" | "boolean" => LogicalType::Boolean,
            "date" => LogicalType::Date,
            "datetime" => LogicalType::Timestamp,
            other if other.starts_with("timestamp") => LogicalType::Timestamp,
            _ => LogicalType::Other,
        }
    }

    /// Checks that `value` can be coerced into a column of this type.
    ///
    /// Returns the reason when it can not. NULL is accepted everywhere.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let accepted = match (self, value) {
            (_, Value::Null) => true,
            (LogicalType::Other, _) => true,
            (LogicalType::Text, Value::Array(_)) => false,
            (LogicalType::Text, _) => true,
            (LogicalType::Integer, Value::Integer(_)) => true,
            (LogicalType::Integer, Value::Float(v)) => float_to_i64(*v).is_some(),
            (LogicalType::Integer, Value::Text(text)) => {
                text.is_empty() || text.trim().parse::<i64>().is_ok()
            }
            (LogicalType::Float, Value::Integer(_)) => true,
            (LogicalType::Float, Value::Float(v)) => v.is_finite(),
            (LogicalType::Float, Value::Text(text)) => {
                text.is_empty() || text.trim().parse::<f64>().is_ok_and(|v| v.is_finite())
            }
            (LogicalType::Boolean, Value::Bool(_)) => true,
            (LogicalType::Boolean, Value::Text(text)) => text.is_empty() || parse_bool(text).is_some(),
            (LogicalType::Timestamp, Value::Text(_) | Value::Integer(_)) => true,
            (LogicalType::Date, Value::Text(_)) => true,
            (LogicalType::Array, Value::Array(_)) => true,
            (LogicalType::Array, Value::Text(text)) => {
                text.is_empty()
                    || serde_json::from_str::<serde_json::Value>(text)
                        .is_ok_and(|parsed| parsed.is_array())
            }
            _ => false,
        };

        if accepted {
            Ok(())
        } else {
            Err(format!("{} value {} can not be stored as {:?}", value.type_name(), value, self))
        }
    }
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
}

impl Column {
    pub fn logical_type(&self) -> LogicalType {
        LogicalType::from_sql_type(&self.sql_type)
    }
}

/// Ordered column name to SQL type mapping. Declaration order drives DDL and
/// the column order of every generated insert.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSchema {
    columns: Vec<Column>,
}

impl ColumnSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.push(name, sql_type);
        self
    }

    /// Adds a column, replacing the type of an existing column with the same name.
    pub fn push(&mut self, name: impl Into<String>, sql_type: impl Into<String>) {
        let name = name.into();
        let sql_type = sql_type.into();
        match self.columns.iter_mut().find(|column| column.name == name) {
            Some(column) => column.sql_type = sql_type,
            None => self.columns.push(Column { name, sql_type }),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns a copy with every column type passed through `convert`.
    pub fn map_types(&self, convert: impl Fn(&str) -> String) -> ColumnSchema {
        ColumnSchema {
            columns: self
                .columns
                .iter()
                .map(|column| Column { name: column.name.clone(), sql_type: convert(&column.sql_type) })
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ColumnSchema {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut schema = ColumnSchema::new();
        for (name, sql_type) in iter {
            schema.push(name, sql_type);
        }
        schema
    }
}

impl Display for ColumnSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.sql_type))
            .collect();
        write!(f, "({})", columns.join(", "))
    }
}

impl Serialize for ColumnSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in &self.columns {
            map.serialize_entry(&column.name, &column.sql_type)?;
        }
        map.end()
    }
}

struct ColumnSchemaVisitor;

impl<'de> Visitor<'de> for ColumnSchemaVisitor {
    type Value = ColumnSchema;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a map of column name to column type")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut schema = ColumnSchema::new();
        while let Some((name, sql_type)) = access.next_entry::<String, String>()? {
            schema.push(name, sql_type);
        }
        Ok(schema)
    }
}

impl<'de> Deserialize<'de> for ColumnSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ColumnSchemaVisitor)
    }
}
