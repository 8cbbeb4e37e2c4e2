use std::error::Error;
use std::str::FromStr;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type as PgType};
use uuid::Uuid;

use crate::types::schema::parse_bool;
use crate::types::value::float_to_i64;
use crate::types::{Column, LogicalType, Value};

type BoxedError = Box<dyn Error + Sync + Send>;

#[derive(thiserror::Error, Debug)]
#[error("can not bind {value_type} value {value} to a {pg_type} parameter")]
pub struct BindError {
    value_type: &'static str,
    value: String,
    pg_type: String,
}

fn bind_error(value: &Value, ty: &PgType) -> BoxedError {
    Box::new(BindError {
        value_type: value.type_name(),
        value: value.to_string(),
        pg_type: ty.name().to_string(),
    })
}

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc).naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(text).map(|timestamp| timestamp.date()))
}

impl Value {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Float(value) => float_to_i64(*value),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Text(text) => parse_timestamp(text),
            Value::Integer(epoch) => DateTime::from_timestamp(*epoch, 0).map(|dt| dt.naive_utc()),
            _ => None,
        }
    }
}

/// Integer range of a declared Postgres column type.
fn integer_range(sql_type: &str) -> (i64, i64) {
    let normalized = sql_type.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "smallint" | "int2" | "smallserial" => (i16::MIN as i64, i16::MAX as i64),
        "int" | "integer" | "int4" | "serial" => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

/// Checks `value` against what the bind for `column` will accept: integer
/// width from the declared type, and parseable dates and timestamps.
pub fn check_bindable(column: &Column, value: &Value) -> Result<(), String> {
    if value.is_null_or_empty() {
        return Ok(());
    }

    let accepted = match column.logical_type() {
        LogicalType::Integer => {
            let (min, max) = integer_range(&column.sql_type);
            value.as_i64().is_some_and(|v| v >= min && v <= max)
        }
        LogicalType::Timestamp => value.as_timestamp().is_some(),
        LogicalType::Date => matches!(value, Value::Text(text) if parse_date(text).is_some()),
        _ => true,
    };

    if accepted {
        Ok(())
    } else {
        Err(format!(
            "{} value {} can not be bound to a {} column",
            value.type_name(),
            value,
            column.sql_type
        ))
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &PgType, out: &mut BytesMut) -> Result<IsNull, BoxedError> {
        // empty text is NULL for every column type, text included
        if self.is_null_or_empty() {
            return Ok(IsNull::Yes);
        }

        if let Kind::Array(_) = ty.kind() {
            return match self {
                Value::Array(items) => items.to_sql(ty, out),
                Value::Text(text) => match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(parsed @ serde_json::Value::Array(_)) => Value::from(parsed).to_sql(ty, out),
                    _ => Err(bind_error(self, ty)),
                },
                _ => Err(bind_error(self, ty)),
            };
        }

        match *ty {
            PgType::BOOL => {
                let flag = match self {
                    Value::Bool(flag) => Some(*flag),
                    Value::Text(text) => parse_bool(text),
                    _ => None,
                };
                flag.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::INT2 => {
                let value = self.as_i64().and_then(|v| i16::try_from(v).ok());
                value.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::INT4 => {
                let value = self.as_i64().and_then(|v| i32::try_from(v).ok());
                value.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::INT8 => self.as_i64().ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out),
            PgType::FLOAT4 => {
                let value = self.as_f64().map(|v| v as f32);
                value.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::FLOAT8 => self.as_f64().ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out),
            PgType::NUMERIC => {
                let decimal = match self {
                    Value::Integer(value) => Some(Decimal::from(*value)),
                    Value::Float(value) => Decimal::try_from(*value).ok(),
                    Value::Text(text) => Decimal::from_str(text.trim()).ok(),
                    _ => None,
                };
                decimal.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::TIMESTAMP => {
                self.as_timestamp().ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::TIMESTAMPTZ => self
                .as_timestamp()
                .map(|naive| naive.and_utc())
                .ok_or_else(|| bind_error(self, ty))?
                .to_sql(ty, out),
            PgType::DATE => {
                let date = match self {
                    Value::Text(text) => parse_date(text),
                    _ => None,
                };
                date.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            PgType::JSON | PgType::JSONB => match self {
                // text is assumed to already hold JSON
                Value::Text(text) => match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(parsed) => parsed.to_sql(ty, out),
                    Err(_) => self.to_json().to_sql(ty, out),
                },
                other => other.to_json().to_sql(ty, out),
            },
            PgType::UUID => {
                let uuid = match self {
                    Value::Text(text) => Uuid::parse_str(text.trim()).ok(),
                    _ => None,
                };
                uuid.ok_or_else(|| bind_error(self, ty))?.to_sql(ty, out)
            }
            _ => match self {
                Value::Array(_) => Err(bind_error(self, ty)),
                Value::Text(text) => text.as_str().to_sql(&PgType::TEXT, out),
                other => other.to_string().as_str().to_sql(&PgType::TEXT, out),
            },
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        true // We accept all types
    }

    to_sql_checked!();
}
