//! Bound values, comparison operators and predicate-tree nodes.
//!
//! A `WHERE`/`HAVING` clause is an ordered list of [`Predicate`]s, each tagged
//! with the [`Connector`] that joins it to the previous one. The first
//! predicate's connector is never rendered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};
use crate::query::QueryBuilder;
use crate::sql::Dialect;

/// A value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// JSON value.
    Json(serde_json::Value),
    /// List of values.
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, or a string that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Integer view of the value, accepting integral floats, bools and digit strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The value as JSON. Lists become arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Json(j) => j.clone(),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Float view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value (SQLite and MySQL store booleans as integers).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Normalised key used to match parent and child rows during eager loading.
    pub fn lookup_key(&self) -> Option<LookupKey> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(LookupKey::Int(*i)),
            Self::Bool(b) => Some(LookupKey::Int(i64::from(*b))),
            Self::Float(f) if f.fract() == 0.0 => Some(LookupKey::Int(*f as i64)),
            Self::Float(f) => Some(LookupKey::Text(f.to_string())),
            Self::String(s) => match s.parse::<i64>() {
                Ok(i) if !s.starts_with('+') && !(s.starts_with('0') && s.len() > 1) => {
                    Some(LookupKey::Int(i))
                }
                _ => Some(LookupKey::Text(s.clone())),
            },
            Self::Json(j) => Some(LookupKey::Text(j.to_string())),
            Self::List(_) => None,
        }
    }
}

/// Hashable form of a key value.
///
/// Integer-looking strings collapse onto integers so that a `"7"` foreign key
/// still matches a `7` primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupKey {
    /// Integer key.
    Int(i64),
    /// Any other key, by its text.
    Text(String),
}

impl From<LookupKey> for FilterValue {
    fn from(key: LookupKey) -> Self {
        match key {
            LookupKey::Int(i) => Self::Int(i),
            LookupKey::Text(s) => Self::String(s),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<&String> for FilterValue {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<serde_json::Value> for FilterValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<chrono::NaiveDateTime> for FilterValue {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::String(v.format(crate::entity::TIMESTAMP_FORMAT).to_string())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
            Self::Json(j) => write!(f, "{}", j),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Comparison operators accepted in predicates, joins and `HAVING`.
///
/// Operators are interpolated into SQL text, never bound, so only members
/// of this enum can reach the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>` (`!=` is accepted and normalised)
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// Case-insensitive `LIKE`.
    ILike,
    /// Case-insensitive `NOT LIKE`.
    NotILike,
    /// MySQL null-safe equality `<=>`.
    NullSafeEq,
}

impl Operator {
    /// Render the operator for a dialect.
    ///
    /// `ILIKE` only exists in PostgreSQL; MySQL and SQLite `LIKE` already
    /// compare case-insensitively under their default collations.
    pub fn as_sql(&self, dialect: Dialect) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::ILike if dialect == Dialect::Postgres => "ILIKE",
            Self::ILike => "LIKE",
            Self::NotILike if dialect == Dialect::Postgres => "NOT ILIKE",
            Self::NotILike => "NOT LIKE",
            Self::NullSafeEq if dialect == Dialect::MySql => "<=>",
            Self::NullSafeEq if dialect == Dialect::Postgres => "IS NOT DISTINCT FROM",
            Self::NullSafeEq => "IS",
        }
    }

    /// Parse an operator from user input.
    pub fn parse(input: &str) -> QueryResult<Self> {
        let normalised = input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        match normalised.as_str() {
            "=" | "==" => Ok(Self::Eq),
            "<>" | "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Lte),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Gte),
            "like" => Ok(Self::Like),
            "not like" => Ok(Self::NotLike),
            "ilike" => Ok(Self::ILike),
            "not ilike" => Ok(Self::NotILike),
            "<=>" => Ok(Self::NullSafeEq),
            _ => Err(QueryError::invalid_operator(input)),
        }
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Anything the builder accepts in operator position.
///
/// Strings are parsed against the allow-list; a failure is recorded on the
/// builder and surfaces when the query is compiled.
pub trait IntoOperator {
    /// Convert into an operator.
    fn into_operator(self) -> QueryResult<Operator>;
}

impl IntoOperator for Operator {
    fn into_operator(self) -> QueryResult<Operator> {
        Ok(self)
    }
}

impl IntoOperator for &str {
    fn into_operator(self) -> QueryResult<Operator> {
        Operator::parse(self)
    }
}

impl IntoOperator for String {
    fn into_operator(self) -> QueryResult<Operator> {
        Operator::parse(&self)
    }
}

/// Boolean connector joining a predicate to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    /// `AND`
    #[default]
    And,
    /// `OR`
    Or,
}

impl Connector {
    /// Get the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// The subject of an `EXISTS` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum SubQuery {
    /// A nested query descriptor, owned outright.
    Query(Box<QueryBuilder>),
    /// Raw SQL with its own bindings.
    Raw {
        /// SQL text.
        sql: String,
        /// Values bound to the `?` placeholders in `sql`.
        bindings: Vec<FilterValue>,
    },
}

impl From<QueryBuilder> for SubQuery {
    fn from(query: QueryBuilder) -> Self {
        Self::Query(Box::new(query))
    }
}

impl From<&str> for SubQuery {
    fn from(sql: &str) -> Self {
        Self::Raw {
            sql: sql.to_string(),
            bindings: Vec::new(),
        }
    }
}

impl From<String> for SubQuery {
    fn from(sql: String) -> Self {
        Self::Raw {
            sql,
            bindings: Vec::new(),
        }
    }
}

/// One condition in a predicate tree.
///
/// Leaves that carry literal values hold them in the same position they are
/// rendered in, so walking the tree yields bindings in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateNode {
    /// `column <op> ?`
    Basic {
        /// Column or expression on the left.
        column: String,
        /// Comparison operator.
        operator: Operator,
        /// Bound value.
        value: FilterValue,
    },
    /// Raw SQL fragment with its own bindings.
    Raw {
        /// SQL text.
        sql: String,
        /// Values for the `?` placeholders in `sql`.
        bindings: Vec<FilterValue>,
    },
    /// `left <op> right`, comparing two columns; nothing is bound.
    Columns {
        /// Left column.
        left: String,
        /// Comparison operator.
        operator: Operator,
        /// Right column.
        right: String,
    },
    /// A parenthesised group.
    Nested(Vec<Predicate>),
    /// `column IN (...)`; an empty list never matches.
    In {
        /// Column.
        column: String,
        /// Candidate values.
        values: Vec<FilterValue>,
    },
    /// `column NOT IN (...)`; an empty list always matches.
    NotIn {
        /// Column.
        column: String,
        /// Excluded values.
        values: Vec<FilterValue>,
    },
    /// `column IS [NOT] NULL`
    Null {
        /// Column.
        column: String,
        /// `IS NOT NULL` when set.
        negated: bool,
    },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        /// Column.
        column: String,
        /// Lower bound.
        low: FilterValue,
        /// Upper bound.
        high: FilterValue,
        /// `NOT BETWEEN` when set.
        negated: bool,
    },
    /// `[NOT] EXISTS (subquery)`
    Exists {
        /// The subquery.
        subquery: SubQuery,
        /// `NOT EXISTS` when set.
        negated: bool,
    },
}

impl PredicateNode {
    /// Append this node's bindings to `out`, in rendering order.
    pub fn collect_bindings(&self, out: &mut Vec<FilterValue>) {
        match self {
            Self::Basic { value, .. } => out.push(value.clone()),
            Self::Raw { bindings, .. } => out.extend(bindings.iter().cloned()),
            Self::Columns { .. } | Self::Null { .. } => {}
            Self::Nested(children) => {
                for child in children {
                    child.node.collect_bindings(out);
                }
            }
            Self::In { values, .. } | Self::NotIn { values, .. } => {
                out.extend(values.iter().cloned())
            }
            Self::Between { low, high, .. } => {
                out.push(low.clone());
                out.push(high.clone());
            }
            Self::Exists { subquery, .. } => match subquery {
                SubQuery::Query(query) => out.extend(query.bindings()),
                SubQuery::Raw { bindings, .. } => out.extend(bindings.iter().cloned()),
            },
        }
    }
}

/// A predicate node with the connector that attaches it to its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// How this predicate joins the previous one.
    pub connector: Connector,
    /// The condition itself.
    pub node: PredicateNode,
}

impl Predicate {
    /// An `AND`-connected predicate.
    pub fn and(node: PredicateNode) -> Self {
        Self {
            connector: Connector::And,
            node,
        }
    }

    /// An `OR`-connected predicate.
    pub fn or(node: PredicateNode) -> Self {
        Self {
            connector: Connector::Or,
            node,
        }
    }
}
