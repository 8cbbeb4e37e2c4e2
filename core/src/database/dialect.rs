use crate::database::escape::{
    backslash_quoted_literal, is_plain_identifier, is_reserved_keyword, quote_identifier,
    strip_semicolons, SNOWFLAKE_INVALID_BARE_IDENTIFIERS,
};
use crate::database::postgres::sql_type_wrapper::check_bindable;
use crate::types::schema::parse_bool;
use crate::types::value::float_to_i64;
use crate::types::{Column, LogicalType, TableRef, Value};

/// Identifier and type handling for one SQL dialect.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Escapes a column, table or schema name for this dialect.
    fn identifier(&self, identifier: &str) -> String;

    /// Maps a declared column type to this dialect's type.
    fn convert_type(&self, sql_type: &str) -> String;

    fn qualified_table(&self, target: &TableRef) -> String {
        format!("{}.{}", self.identifier(&target.namespace), self.identifier(&target.table))
    }

    /// Whether `value` can be stored in `column`, with the reason when not.
    fn check_value(&self, column: &Column, value: &Value) -> Result<(), String> {
        column.logical_type().check(value)
    }
}

/// Dialects whose bulk loads render values as literal SQL text.
pub trait LiteralDialect: Dialect {
    /// Renders one cell of a `VALUES` row.
    fn literal(&self, value: &Value, logical_type: LogicalType) -> Result<String, String>;

    /// The select-list expression for the `position`th (1-based) `VALUES` column.
    fn select_cast(&self, position: usize, logical_type: LogicalType) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn identifier(&self, identifier: &str) -> String {
        quote_identifier(&strip_semicolons(identifier))
    }

    fn convert_type(&self, sql_type: &str) -> String {
        strip_semicolons(sql_type).into_owned()
    }

    fn check_value(&self, column: &Column, value: &Value) -> Result<(), String> {
        column.logical_type().check(value)?;
        check_bindable(column, value)
    }
}

/// Snowflake only understands semi-structured arrays, so generic array types
/// are rewritten before any DDL is generated.
const SNOWFLAKE_TYPE_CONVERSIONS: &[(&str, &str)] = &[("text[]", "ARRAY"), ("varchar[]", "ARRAY")];

#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeDialect;

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn identifier(&self, identifier: &str) -> String {
        let identifier = strip_semicolons(identifier);
        if is_reserved_keyword(&identifier)
            || SNOWFLAKE_INVALID_BARE_IDENTIFIERS.contains(&&*identifier)
            || !is_plain_identifier(&identifier)
        {
            quote_identifier(&identifier)
        } else {
            identifier.into_owned()
        }
    }

    fn convert_type(&self, sql_type: &str) -> String {
        let sql_type = strip_semicolons(sql_type);
        SNOWFLAKE_TYPE_CONVERSIONS
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(sql_type.trim()))
            .map(|(_, to)| to.to_string())
            .unwrap_or_else(|| sql_type.into_owned())
    }
}

impl LiteralDialect for SnowflakeDialect {
    fn literal(&self, value: &Value, logical_type: LogicalType) -> Result<String, String> {
        logical_type.check(value)?;

        let literal = match (logical_type, value) {
            (_, Value::Null) => None,
            // empty text is NULL for every column type
            (_, Value::Text(text)) if text.is_empty() => None,
            (LogicalType::Text, other) => Some(backslash_quoted_literal(&other.to_string())),
            // text that already holds a JSON array is loaded as-is
            (LogicalType::Array, Value::Text(text)) => Some(backslash_quoted_literal(text)),
            (LogicalType::Array, other) => Some(backslash_quoted_literal(&other.to_json().to_string())),
            (LogicalType::Timestamp, Value::Integer(epoch)) => Some(epoch.to_string()),
            (LogicalType::Timestamp | LogicalType::Date, other) => {
                Some(backslash_quoted_literal(&other.to_string()))
            }
            (LogicalType::Integer, Value::Float(number)) => match float_to_i64(*number) {
                Some(whole) => Some(whole.to_string()),
                None => return Err(format!("float value {} does not fit an integer column", number)),
            },
            (LogicalType::Integer | LogicalType::Float, Value::Text(text)) => {
                Some(text.trim().to_string())
            }
            (LogicalType::Boolean, Value::Text(text)) => {
                parse_bool(text).map(|flag| flag.to_string().to_uppercase())
            }
            (_, Value::Bool(flag)) => Some(flag.to_string().to_uppercase()),
            (_, Value::Integer(number)) => Some(number.to_string()),
            (_, Value::Float(number)) => Some(number.to_string()),
            (_, Value::Text(text)) => Some(backslash_quoted_literal(text)),
            (_, array @ Value::Array(_)) => Some(backslash_quoted_literal(&array.to_json().to_string())),
        };

        // NULL wins over anything produced above
        Ok(literal.unwrap_or_else(|| "NULL".to_string()))
    }

    fn select_cast(&self, position: usize, logical_type: LogicalType) -> String {
        let column = format!("${}", position);
        match logical_type {
            LogicalType::Array => format!("PARSE_JSON({})", column),
            LogicalType::Timestamp => format!("TO_TIMESTAMP({})", column),
            LogicalType::Date => format!("TO_DATE({})", column),
            _ => column,
        }
    }
}
