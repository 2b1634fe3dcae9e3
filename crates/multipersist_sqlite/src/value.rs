//! Conversion between attribute values and SQLite storage classes.
//!
//! | Attribute type | Column type | Stored as            |
//! |----------------|-------------|----------------------|
//! | integer        | INTEGER     | integer              |
//! | float          | REAL        | real                 |
//! | string         | TEXT        | text                 |
//! | binary         | BLOB        | blob                 |
//! | boolean        | INTEGER     | `0` / `1`            |
//! | datetime       | TEXT        | RFC 3339, µs, `Z`    |

use crate::error::{SqliteError, SqliteResult};
use chrono::{DateTime, Utc};
use multipersist_core::{AttributeType, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Declared column type for an attribute type.
pub(crate) fn column_type(ty: AttributeType) -> &'static str {
    match ty {
        AttributeType::Integer | AttributeType::Boolean => "INTEGER",
        AttributeType::Float => "REAL",
        AttributeType::String | AttributeType::DateTime => "TEXT",
        AttributeType::Binary => "BLOB",
    }
}

/// Converts a value into a statement parameter.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::DateTime(dt) => SqlValue::Text(Value::datetime_text(dt)),
    }
}

/// Reads a column back as its declared type. Columns with no declared
/// type (never produced by this crate) decode by storage class.
pub(crate) fn from_sql(
    column: &str,
    ty: Option<AttributeType>,
    raw: ValueRef<'_>,
) -> SqliteResult<Value> {
    let Some(ty) = ty else {
        return Ok(by_storage_class(raw));
    };
    let mismatch = |detail: String| SqliteError::decode(column, ty.to_string(), detail);

    match (ty, raw) {
        (_, ValueRef::Null) => Ok(Value::Null),
        (AttributeType::Integer, ValueRef::Integer(n)) => Ok(Value::Integer(n)),
        (AttributeType::Float, ValueRef::Real(f)) => Ok(Value::Float(f)),
        (AttributeType::Float, ValueRef::Integer(n)) => Ok(Value::Float(n as f64)),
        (AttributeType::Boolean, ValueRef::Integer(n)) => Ok(Value::Bool(n != 0)),
        (AttributeType::Binary, ValueRef::Blob(b)) => Ok(Value::Bytes(b.to_vec())),
        (AttributeType::Binary, ValueRef::Text(b)) => Ok(Value::Bytes(b.to_vec())),
        (AttributeType::String, ValueRef::Text(b)) => std::str::from_utf8(b)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| mismatch(e.to_string())),
        (AttributeType::DateTime, ValueRef::Text(b)) => {
            let text = std::str::from_utf8(b).map_err(|e| mismatch(e.to_string()))?;
            DateTime::parse_from_rfc3339(text)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| mismatch(format!("{text:?}: {e}")))
        }
        (_, other) => Err(mismatch(format!("{} value", storage_class(other)))),
    }
}

fn by_storage_class(raw: ValueRef<'_>) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(b) => Value::Text(String::from_utf8_lossy(b).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn storage_class(raw: ValueRef<'_>) -> &'static str {
    match raw {
        ValueRef::Null => "null",
        ValueRef::Integer(_) => "integer",
        ValueRef::Real(_) => "real",
        ValueRef::Text(_) => "text",
        ValueRef::Blob(_) => "blob",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn booleans_store_as_integers() {
        assert_eq!(to_sql(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(
            from_sql("ok", Some(AttributeType::Boolean), ValueRef::Integer(0)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn datetimes_store_as_text() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let stored = to_sql(&Value::DateTime(dt));
        assert_eq!(stored, SqlValue::Text("2024-05-06T07:08:09.000000Z".into()));

        let SqlValue::Text(text) = stored else { unreachable!() };
        let back = from_sql("at", Some(AttributeType::DateTime), ValueRef::Text(text.as_bytes())).unwrap();
        assert_eq!(back, Value::DateTime(dt));
    }

    #[test]
    fn integers_widen_into_float_columns() {
        assert_eq!(
            from_sql("x", Some(AttributeType::Float), ValueRef::Integer(3)).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn mismatched_storage_is_a_decode_error() {
        let err = from_sql("age", Some(AttributeType::Integer), ValueRef::Text(b"old")).unwrap_err();
        assert_eq!(err.to_string(), "cannot decode column age as integer: text value");
    }

    #[test]
    fn nulls_decode_for_every_type() {
        for ty in [AttributeType::Integer, AttributeType::String, AttributeType::DateTime] {
            assert_eq!(from_sql("c", Some(ty), ValueRef::Null).unwrap(), Value::Null);
        }
        assert_eq!(from_sql("c", None, ValueRef::Real(1.5)).unwrap(), Value::Float(1.5));
    }
}
