//! Result rows and typed column extraction.
//!
//! Row sources hand back [`Row`]s: an ordered column → value map. Typed access
//! goes through [`FromColumn`]; whole-row conversion through [`FromRow`] or,
//! for `serde` types, [`Row::deserialize`].
//!
//! ```rust
//! use quarry_query::row::Row;
//! use quarry_query::FilterValue;
//!
//! let row = Row::from_pairs([("id", FilterValue::Int(1)), ("name", "Ada".into())]);
//! let id: i64 = row.try_get("id").unwrap();
//! let nick: Option<String> = row.try_get("nickname").unwrap();
//! assert_eq!(id, 1);
//! assert_eq!(nick, None);
//! ```

use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;

/// Ordered attribute map used for rows, inserts and updates.
pub type Attributes = IndexMap<String, FilterValue>;

/// One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Attributes,
}

impl Row {
    /// Wrap an attribute map.
    pub fn new(values: Attributes) -> Self {
        Self { values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FilterValue>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Raw value of a column.
    pub fn get(&self, column: &str) -> Option<&FilterValue> {
        self.values.get(column)
    }

    /// Typed value of a column.
    pub fn try_get<T: FromColumn>(&self, column: &str) -> QueryResult<T> {
        T::from_column(self.get(column), column)
    }

    /// Insert or overwrite a column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) {
        self.values.insert(column.into(), value.into());
    }

    /// Remove a column.
    pub fn remove(&mut self, column: &str) -> Option<FilterValue> {
        self.values.shift_remove(column)
    }

    /// Whether the column is present.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Column names in result order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrow the attribute map.
    pub fn attributes(&self) -> &Attributes {
        &self.values
    }

    /// Take the attribute map.
    pub fn into_attributes(self) -> Attributes {
        self.values
    }

    /// The row as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Deserialize the row into any `serde` type.
    pub fn deserialize<T: DeserializeOwned>(&self) -> QueryResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| QueryError::deserialization(e.to_string()).with_source(e))
    }
}

impl From<Attributes> for Row {
    fn from(values: Attributes) -> Self {
        Self::new(values)
    }
}

/// Types that can be built from a whole row.
pub trait FromRow: Sized {
    /// Deserialize from a row.
    fn from_row(row: &Row) -> QueryResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(row.clone())
    }
}

/// Types that can be extracted from a column value.
pub trait FromColumn: Sized {
    /// Convert the value of `column`; `None` means the column is absent.
    fn from_column(value: Option<&FilterValue>, column: &str) -> QueryResult<Self>;
}

fn missing(column: &str) -> QueryError {
    QueryError::deserialization(format!("column '{}' not found", column)).with_field(column)
}

fn conversion(column: &str, expected: &str, value: &FilterValue) -> QueryError {
    QueryError::deserialization(format!(
        "type conversion error for '{}': expected {}, got {:?}",
        column, expected, value
    ))
    .with_field(column)
}

macro_rules! from_column_impl {
    ($ty:ty, $expected:literal, $convert:expr) => {
        impl FromColumn for $ty {
            fn from_column(value: Option<&FilterValue>, column: &str) -> QueryResult<Self> {
                let value = value.ok_or_else(|| missing(column))?;
                let convert: fn(&FilterValue) -> Option<$ty> = $convert;
                convert(value).ok_or_else(|| conversion(column, $expected, value))
            }
        }
    };
}

from_column_impl!(i64, "integer", |v| v.as_i64());
from_column_impl!(i32, "integer", |v| v.as_i64().and_then(|i| i32::try_from(i).ok()));
from_column_impl!(u64, "unsigned integer", |v| v.as_i64().and_then(|i| u64::try_from(i).ok()));
from_column_impl!(f64, "float", |v| v.as_f64());
from_column_impl!(bool, "boolean", |v| v.as_bool());
from_column_impl!(String, "string", |v| match v {
    FilterValue::Null | FilterValue::List(_) => None,
    FilterValue::String(s) => Some(s.clone()),
    other => Some(other.to_string()),
});
from_column_impl!(FilterValue, "value", |v| Some(v.clone()));
from_column_impl!(serde_json::Value, "json", |v| match v {
    FilterValue::String(s) => serde_json::from_str(s).ok(),
    other => Some(other.to_json()),
});

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(value: Option<&FilterValue>, column: &str) -> QueryResult<Self> {
        match value {
            None | Some(FilterValue::Null) => Ok(None),
            Some(_) => T::from_column(value, column).map(Some),
        }
    }
}
