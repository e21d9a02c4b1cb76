//! Value conversion between [`FilterValue`] and SQLite storage classes.

use rusqlite::types::{Value, ValueRef};

use quarry_query::filter::FilterValue;

/// Convert a bound parameter to a SQLite value.
///
/// Booleans are stored as `0`/`1`; JSON and lists are stored as JSON text.
pub fn to_sqlite(value: &FilterValue) -> Value {
    match value {
        FilterValue::Null => Value::Null,
        FilterValue::Bool(b) => Value::Integer(i64::from(*b)),
        FilterValue::Int(i) => Value::Integer(*i),
        FilterValue::Float(f) => Value::Real(*f),
        FilterValue::String(s) => Value::Text(s.clone()),
        FilterValue::Json(j) => Value::Text(j.to_string()),
        FilterValue::List(_) => Value::Text(value.to_json().to_string()),
    }
}

/// Convert a column value read from SQLite.
///
/// Text is returned verbatim; non UTF-8 blobs become a list of byte values.
pub fn from_sqlite(value: ValueRef<'_>) -> FilterValue {
    match value {
        ValueRef::Null => FilterValue::Null,
        ValueRef::Integer(i) => FilterValue::Int(i),
        ValueRef::Real(f) => FilterValue::Float(f),
        ValueRef::Text(bytes) => FilterValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => FilterValue::String(s.to_string()),
            Err(_) => FilterValue::List(bytes.iter().map(|b| FilterValue::Int(i64::from(*b))).collect()),
        },
    }
}
