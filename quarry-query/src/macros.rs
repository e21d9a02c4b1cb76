//! Construction macros.
//!
//! # Examples
//!
//! ```rust
//! use quarry_query::{attrs, predicate};
//! use quarry_query::prelude::*;
//!
//! let values = attrs! { "email" => "ada@example.com", "age" => 36 };
//! assert_eq!(values.len(), 2);
//!
//! let query = QueryBuilder::table("users")
//!     .where_predicate(predicate!(age >= 18))
//!     .where_predicate(predicate!(deleted_at is null));
//! assert_eq!(
//!     query.to_sql(Dialect::Sqlite).unwrap().sql,
//!     "SELECT * FROM \"users\" WHERE \"age\" >= ? AND \"deleted_at\" IS NULL"
//! );
//! ```

/// Build an [`Attributes`](crate::row::Attributes) map, keeping key order.
///
/// ```rust
/// use quarry_query::attrs;
/// use quarry_query::filter::FilterValue;
///
/// let values = attrs! { "name" => "Ada", "admin" => false };
/// assert_eq!(values["admin"], FilterValue::Bool(false));
/// ```
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::row::Attributes::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::row::Attributes::new();
        $(
            map.insert(
                ::std::string::String::from($column),
                $crate::filter::FilterValue::from($value),
            );
        )+
        map
    }};
}

/// Build an `AND`-connected [`Predicate`](crate::filter::Predicate).
///
/// # Syntax
///
/// - `predicate!(field == value)`, `!=`, `>`, `>=`, `<`, `<=`
/// - `predicate!(field like value)`
/// - `predicate!(field is null)`, `predicate!(field is not null)`
/// - `predicate!(field in [v1, v2, ...])`, `predicate!(field not in [...])`
#[macro_export]
macro_rules! predicate {
    (@basic $field:ident, $op:ident, $value:expr) => {
        $crate::filter::Predicate::and($crate::filter::PredicateNode::Basic {
            column: ::std::string::String::from(stringify!($field)),
            operator: $crate::filter::Operator::$op,
            value: $crate::filter::FilterValue::from($value),
        })
    };

    ($field:ident == $value:expr) => { $crate::predicate!(@basic $field, Eq, $value) };
    ($field:ident != $value:expr) => { $crate::predicate!(@basic $field, Ne, $value) };
    ($field:ident >= $value:expr) => { $crate::predicate!(@basic $field, Gte, $value) };
    ($field:ident <= $value:expr) => { $crate::predicate!(@basic $field, Lte, $value) };
    ($field:ident > $value:expr) => { $crate::predicate!(@basic $field, Gt, $value) };
    ($field:ident < $value:expr) => { $crate::predicate!(@basic $field, Lt, $value) };
    ($field:ident like $value:expr) => { $crate::predicate!(@basic $field, Like, $value) };

    ($field:ident is null) => {
        $crate::filter::Predicate::and($crate::filter::PredicateNode::Null {
            column: ::std::string::String::from(stringify!($field)),
            negated: false,
        })
    };

    ($field:ident is not null) => {
        $crate::filter::Predicate::and($crate::filter::PredicateNode::Null {
            column: ::std::string::String::from(stringify!($field)),
            negated: true,
        })
    };

    ($field:ident not in [$($value:expr),* $(,)?]) => {
        $crate::filter::Predicate::and($crate::filter::PredicateNode::NotIn {
            column: ::std::string::String::from(stringify!($field)),
            values: vec![$($crate::filter::FilterValue::from($value)),*],
        })
    };

    ($field:ident in [$($value:expr),* $(,)?]) => {
        $crate::filter::Predicate::and($crate::filter::PredicateNode::In {
            column: ::std::string::String::from(stringify!($field)),
            values: vec![$($crate::filter::FilterValue::from($value)),*],
        })
    };
}

/// Forward fluent builder methods from a wrapper holding `builder: QueryBuilder`.
macro_rules! delegate_builder {
    ($($(#[$meta:meta])* $name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            $(#[$meta])*
            pub fn $name(mut self, $($arg: $ty),*) -> Self {
                self.builder = self.builder.$name($($arg),*);
                self
            }
        )*
    };
}
