//! Primitive attribute values and records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A row exchanged between a recordset and a backend: attribute name to
/// primitive value. Records never nest.
pub type Record = BTreeMap<String, Value>;

/// A primitive attribute value.
///
/// This is the only value shape that crosses the backend boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Double precision float.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte blob.
    Bytes(Vec<u8>),
    /// Point in time, always UTC.
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a blob.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a timestamp, if it is one.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Canonical text form of a timestamp: RFC 3339, microsecond precision,
    /// `Z` suffix. Fixed width, so lexical order equals time order.
    pub fn datetime_text(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Storage class rank used when comparing values of different kinds.
    ///
    /// Mirrors SQLite: NULL < numeric < text < blob. Timestamps are stored
    /// as text.
    fn class_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) | Value::Integer(_) | Value::Float(_) => 1,
            Value::Text(_) | Value::DateTime(_) => 2,
            Value::Bytes(_) => 3,
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Integer(i64::from(*b))),
            Value::Integer(n) => Some(Number::Integer(*n)),
            Value::Float(f) => Some(Number::Real(*f)),
            _ => None,
        }
    }

    /// Text form of a float as SQLite renders a REAL: 15 significant
    /// digits, always with a fractional part, exponent form outside
    /// `1e-4 ..= 1e15`.
    pub fn float_text(value: f64) -> String {
        if value.is_infinite() {
            return if value > 0.0 { "Inf" } else { "-Inf" }.to_string();
        }
        let scientific = format!("{value:.14e}");
        let Some((mantissa, exponent)) = scientific.split_once('e') else {
            return value.to_string();
        };
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let (sign, mantissa) = match mantissa.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", mantissa),
        };
        let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
        let digits = digits.trim_end_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };

        if !(-4..15).contains(&exponent) {
            let (lead, rest) = digits.split_at(1);
            let rest = if rest.is_empty() { "0" } else { rest };
            let exp_sign = if exponent < 0 { '-' } else { '+' };
            return format!("{sign}{lead}.{rest}e{exp_sign}{:02}", exponent.abs());
        }
        if exponent < 0 {
            let zeros = "0".repeat(exponent.unsigned_abs() as usize - 1);
            return format!("{sign}0.{zeros}{digits}");
        }
        let whole_len = exponent as usize + 1;
        if digits.len() <= whole_len {
            let pad = "0".repeat(whole_len - digits.len());
            format!("{sign}{digits}{pad}.0")
        } else {
            let (whole, fraction) = digits.split_at(whole_len);
            format!("{sign}{whole}.{fraction}")
        }
    }

    /// Total order used for sorting: NULL first, then numbers, text, blobs.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        let (ra, rb) = (self.class_rank(), other.class_rank());
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::DateTime(a), Value::Text(b)) => Self::datetime_text(a).as_str().cmp(b),
            (Value::Text(a), Value::DateTime(b)) => a.as_str().cmp(&Self::datetime_text(b)),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => match (self.number(), other.number()) {
                (Some(a), Some(b)) => a.compare(b),
                _ => Ordering::Equal,
            },
        }
    }

    /// Comparison used by filters. Returns `None` when either side is null,
    /// in which case no comparison operator matches. Values of different
    /// kinds compare by storage class.
    pub fn filter_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.sort_cmp(other))
    }
}

/// A numeric value without conversion loss.
#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Real(f64),
}

impl Number {
    fn compare(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a.cmp(&b),
            (Number::Real(a), Number::Real(b)) => a.total_cmp(&b),
            (Number::Integer(a), Number::Real(b)) => integer_real_cmp(a, b),
            (Number::Real(a), Number::Integer(b)) => integer_real_cmp(b, a).reverse(),
        }
    }
}

/// Compares an integer with a float exactly. Integers beyond 2^53 are not
/// rounded through `f64`; NaN sorts above every integer.
fn integer_real_cmp(int: i64, real: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if real.is_nan() || real >= TWO_POW_63 {
        return Ordering::Less;
    }
    if real < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = real.trunc();
    // `whole` lies in i64 range here, so the cast is exact.
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&real).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::DateTime(dt) => f.write_str(&Self::datetime_text(dt)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn null_sorts_first() {
        assert_eq!(Value::Null.sort_cmp(&Value::Integer(-5)), Ordering::Less);
        assert_eq!(Value::Integer(3).sort_cmp(&Value::Null), Ordering::Greater);
    }

    #[test]
    fn numbers_compare_across_kinds() {
        assert_eq!(
            Value::Integer(2).filter_cmp(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float(3.0).filter_cmp(&Value::Integer(3)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn large_integers_compare_exactly_with_floats() {
        let big = (1i64 << 53) + 1;
        let near = Value::Float((1i64 << 53) as f64);
        assert_eq!(Value::Integer(big).sort_cmp(&near), Ordering::Greater);
        assert_eq!(near.sort_cmp(&Value::Integer(big)), Ordering::Less);
        assert_eq!(
            Value::Integer(i64::MAX).sort_cmp(&Value::Float(9.3e18)),
            Ordering::Less
        );
        assert_eq!(
            Value::Integer(i64::MIN).sort_cmp(&Value::Float(-1e19)),
            Ordering::Greater
        );
        assert_eq!(
            Value::Integer(-2).filter_cmp(&Value::Float(-2.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Bool(true).filter_cmp(&Value::Float(1.0)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn float_text_matches_sqlite_rendering() {
        assert_eq!(Value::float_text(12.5), "12.5");
        assert_eq!(Value::float_text(3.0), "3.0");
        assert_eq!(Value::float_text(-0.25), "-0.25");
        assert_eq!(Value::float_text(0.1 + 0.2), "0.3");
        assert_eq!(Value::float_text(0.0001), "0.0001");
        assert_eq!(Value::float_text(0.00001), "1.0e-05");
        assert_eq!(Value::float_text(1e20), "1.0e+20");
        assert_eq!(Value::float_text(123_456_789_012_345.0), "123456789012345.0");
        assert_eq!(Value::float_text(1e15), "1.0e+15");
        assert_eq!(Value::float_text(0.0), "0.0");
    }

    #[test]
    fn null_is_incomparable_in_filters() {
        assert_eq!(Value::Null.filter_cmp(&Value::Integer(1)), None);
        assert_eq!(Value::Null.filter_cmp(&Value::Null), None);
        assert_eq!(
            Value::Text("a".into()).filter_cmp(&Value::Integer(1)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn datetime_text_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(Value::datetime_text(&a), "2024-01-02T03:04:05.000000Z");
        let b = Value::Text("2024-01-02T03:04:06.000000Z".into());
        assert_eq!(Value::DateTime(a).sort_cmp(&b), Ordering::Less);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }
}
