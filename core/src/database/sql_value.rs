use std::fmt;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef as SqliteValueRef};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::{
    types::{to_sql_checked, IsNull, ToSql, Type as PgType},
    Row,
};
use uuid::Uuid;

use crate::metadata::StoreType;

/// A single bound column value, independent of the dialect it is sent to.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Json(Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// True for null and for the zero-equivalent of value types (`false`, `0`, nil uuid).
    pub fn is_default_value(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Bool(value) => !value,
            SqlValue::I16(value) => *value == 0,
            SqlValue::I32(value) => *value == 0,
            SqlValue::I64(value) => *value == 0,
            SqlValue::F64(value) => *value == 0.0,
            SqlValue::Decimal(value) => value.is_zero(),
            SqlValue::Uuid(value) => value.is_nil(),
            SqlValue::String(_) | SqlValue::Bytes(_) | SqlValue::DateTime(_) | SqlValue::Json(_) => {
                false
            }
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(value) => Some(i64::from(*value)),
            SqlValue::I32(value) => Some(i64::from(*value)),
            SqlValue::I64(value) => Some(*value),
            SqlValue::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Maps a store type onto the Postgres wire type used by the binary COPY channel.
    pub fn pg_type(store_type: StoreType) -> PgType {
        match store_type {
            StoreType::Bool => PgType::BOOL,
            StoreType::SmallInt => PgType::INT2,
            StoreType::Integer => PgType::INT4,
            StoreType::BigInt => PgType::INT8,
            StoreType::Double => PgType::FLOAT8,
            StoreType::Numeric => PgType::NUMERIC,
            StoreType::Text => PgType::TEXT,
            StoreType::Bytes => PgType::BYTEA,
            StoreType::Uuid => PgType::UUID,
            StoreType::Timestamp => PgType::TIMESTAMPTZ,
            StoreType::Json => PgType::JSONB,
        }
    }

    pub fn from_pg_row(row: &Row, index: usize) -> Result<SqlValue, tokio_postgres::Error> {
        let ty = row.columns()[index].type_().clone();

        let value = match ty {
            PgType::BOOL => row.try_get::<_, Option<bool>>(index)?.map(SqlValue::Bool),
            PgType::INT2 => row.try_get::<_, Option<i16>>(index)?.map(SqlValue::I16),
            PgType::INT4 => row.try_get::<_, Option<i32>>(index)?.map(SqlValue::I32),
            PgType::INT8 => row.try_get::<_, Option<i64>>(index)?.map(SqlValue::I64),
            PgType::FLOAT4 => {
                row.try_get::<_, Option<f32>>(index)?.map(|v| SqlValue::F64(f64::from(v)))
            }
            PgType::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(SqlValue::F64),
            PgType::NUMERIC => row.try_get::<_, Option<Decimal>>(index)?.map(SqlValue::Decimal),
            PgType::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index)?.map(SqlValue::Bytes),
            PgType::UUID => row.try_get::<_, Option<Uuid>>(index)?.map(SqlValue::Uuid),
            PgType::TIMESTAMPTZ => {
                row.try_get::<_, Option<DateTime<Utc>>>(index)?.map(SqlValue::DateTime)
            }
            PgType::JSON | PgType::JSONB => {
                row.try_get::<_, Option<Value>>(index)?.map(SqlValue::Json)
            }
            _ => row.try_get::<_, Option<String>>(index)?.map(SqlValue::String),
        };

        Ok(value.unwrap_or(SqlValue::Null))
    }

    pub fn from_sqlite_ref(value: SqliteValueRef<'_>) -> SqlValue {
        match value {
            SqliteValueRef::Null => SqlValue::Null,
            SqliteValueRef::Integer(value) => SqlValue::I64(value),
            SqliteValueRef::Real(value) => SqlValue::F64(value),
            SqliteValueRef::Text(value) => {
                SqlValue::String(String::from_utf8_lossy(value).into_owned())
            }
            SqliteValueRef::Blob(value) => SqlValue::Bytes(value.to_vec()),
        }
    }

    fn write_integer(
        value: i64,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match *ty {
            PgType::INT2 => i16::try_from(value)?.to_sql(ty, out),
            PgType::INT4 => i32::try_from(value)?.to_sql(ty, out),
            PgType::NUMERIC => Decimal::from(value).to_sql(ty, out),
            PgType::FLOAT8 => (value as f64).to_sql(ty, out),
            PgType::BOOL => (value != 0).to_sql(ty, out),
            _ => value.to_sql(ty, out),
        }
    }

    fn write_text(
        value: &str,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match *ty {
            PgType::UUID => Uuid::parse_str(value)?.to_sql(ty, out),
            PgType::TIMESTAMPTZ => {
                DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc).to_sql(ty, out)
            }
            PgType::JSON | PgType::JSONB => serde_json::from_str::<Value>(value)?.to_sql(ty, out),
            _ => value.to_sql(ty, out),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(value) => write!(f, "{}", value),
            SqlValue::I16(value) => write!(f, "{}", value),
            SqlValue::I32(value) => write!(f, "{}", value),
            SqlValue::I64(value) => write!(f, "{}", value),
            SqlValue::F64(value) => write!(f, "{}", value),
            SqlValue::Decimal(value) => write!(f, "{}", value),
            SqlValue::String(value) => write!(f, "'{}'", value.replace('\'', "''")),
            SqlValue::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            SqlValue::Uuid(value) => write!(f, "'{}'", value),
            SqlValue::DateTime(value) => write!(f, "'{}'", value.to_rfc3339()),
            SqlValue::Json(value) => write!(f, "'{}'", value),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::I32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::I64(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::F64(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => {
                if *ty == PgType::BOOL {
                    value.to_sql(ty, out)
                } else {
                    Self::write_integer(i64::from(*value), ty, out)
                }
            }
            SqlValue::I16(value) => Self::write_integer(i64::from(*value), ty, out),
            SqlValue::I32(value) => Self::write_integer(i64::from(*value), ty, out),
            SqlValue::I64(value) => Self::write_integer(*value, ty, out),
            SqlValue::F64(value) => {
                if *ty == PgType::FLOAT4 {
                    (*value as f32).to_sql(ty, out)
                } else {
                    value.to_sql(ty, out)
                }
            }
            SqlValue::Decimal(value) => value.to_sql(ty, out),
            SqlValue::String(value) => Self::write_text(value, ty, out),
            SqlValue::Bytes(value) => value.to_sql(ty, out),
            SqlValue::Uuid(value) => value.to_sql(ty, out),
            SqlValue::DateTime(value) => value.to_sql(ty, out),
            SqlValue::Json(value) => value.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        true
    }

    to_sql_checked!();
}

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Bool(value) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*value))),
            SqlValue::I16(value) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*value))),
            SqlValue::I32(value) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*value))),
            SqlValue::I64(value) => ToSqlOutput::Owned(SqliteValue::Integer(*value)),
            SqlValue::F64(value) => ToSqlOutput::Owned(SqliteValue::Real(*value)),
            SqlValue::Decimal(value) => ToSqlOutput::Owned(SqliteValue::Text(value.to_string())),
            SqlValue::String(value) => ToSqlOutput::Borrowed(SqliteValueRef::Text(value.as_bytes())),
            SqlValue::Bytes(value) => ToSqlOutput::Borrowed(SqliteValueRef::Blob(value)),
            SqlValue::Uuid(value) => ToSqlOutput::Owned(SqliteValue::Text(value.to_string())),
            SqlValue::DateTime(value) => {
                ToSqlOutput::Owned(SqliteValue::Text(value.to_rfc3339()))
            }
            SqlValue::Json(value) => ToSqlOutput::Owned(SqliteValue::Text(value.to_string())),
        };

        Ok(output)
    }
}
