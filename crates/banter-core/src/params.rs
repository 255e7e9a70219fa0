//! Typed SQL parameter values.
//!
//! [`SqlValue`] is a closed tagged variant covering the four parameter
//! types the storage layer binds (text, integer, real, null). Binding is
//! an exhaustive match, so adding a variant is a compile error everywhere
//! it matters rather than a runtime type-inspection surprise.

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde_json::Number;

use crate::errors::StorageError;

/// A single SQL parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// UTF-8 text.
    Text(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// SQL NULL.
    Null,
}

impl SqlValue {
    /// Encode this value as JSON for the bulk array-to-rows technique.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Operation`] for non-finite reals, which JSON
    /// cannot represent.
    pub fn to_json(&self) -> Result<serde_json::Value, StorageError> {
        match self {
            Self::Text(s) => Ok(serde_json::Value::String(s.clone())),
            Self::Integer(i) => Ok(serde_json::Value::Number(Number::from(*i))),
            Self::Real(r) => Number::from_f64(*r)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    StorageError::operation(format!("cannot encode non-finite real {r} as JSON"))
                }),
            Self::Null => Ok(serde_json::Value::Null),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            Self::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- conversions --

    #[test]
    fn from_impls() {
        assert_eq!(SqlValue::from("hi"), SqlValue::Text("hi".into()));
        assert_eq!(SqlValue::from(42i64), SqlValue::Integer(42));
        assert_eq!(SqlValue::from(7i32), SqlValue::Integer(7));
        assert_eq!(SqlValue::from(1.5f64), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
    }

    // -- binding --

    #[test]
    fn binds_all_variants() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a TEXT, b INTEGER, c REAL, d TEXT)")
            .unwrap();
        let changed = conn
            .execute(
                "INSERT INTO t (a, b, c, d) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    SqlValue::Text("hello".into()),
                    SqlValue::Integer(9),
                    SqlValue::Real(2.25),
                    SqlValue::Null,
                ],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let (a, b, c, d): (String, i64, f64, Option<String>) = conn
            .query_row("SELECT a, b, c, d FROM t", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap();
        assert_eq!(a, "hello");
        assert_eq!(b, 9);
        assert!((c - 2.25).abs() < f64::EPSILON);
        assert_eq!(d, None);
    }

    // -- JSON encoding --

    #[test]
    fn to_json_all_variants() {
        assert_eq!(
            SqlValue::Text("x".into()).to_json().unwrap(),
            serde_json::json!("x")
        );
        assert_eq!(SqlValue::Integer(3).to_json().unwrap(), serde_json::json!(3));
        assert_eq!(
            SqlValue::Real(0.5).to_json().unwrap(),
            serde_json::json!(0.5)
        );
        assert_eq!(SqlValue::Null.to_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn to_json_rejects_non_finite() {
        assert!(SqlValue::Real(f64::NAN).to_json().is_err());
        assert!(SqlValue::Real(f64::INFINITY).to_json().is_err());
    }
}
