//! Common Table Expressions and set operations attached to a query.
//!
//! Both hold their sub-query by value, so cloning the outer query deep-copies
//! them.
//!
//! # Supported Features
//!
//! | Feature          | PostgreSQL | MySQL | SQLite |
//! |------------------|------------|-------|--------|
//! | Non-recursive    | ✅         | ✅    | ✅     |
//! | Recursive        | ✅         | ✅    | ✅     |
//! | Materialized     | ✅         | ❌    | ❌     |
//! | UNION / ALL      | ✅         | ✅    | ✅     |

use serde::{Deserialize, Serialize};

use crate::query::QueryBuilder;
use crate::sql::{quote_segment, Dialect};

/// Materialization hint for CTEs (PostgreSQL only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Materialized {
    /// Force materialization.
    Yes,
    /// Prevent materialization (inline the CTE).
    No,
}

/// A Common Table Expression (CTE) definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    /// Name of the CTE (used in FROM clause).
    pub name: String,
    /// Optional column aliases.
    pub columns: Vec<String>,
    /// Whether this is a recursive CTE.
    pub recursive: bool,
    /// PostgreSQL: MATERIALIZED / NOT MATERIALIZED hint.
    pub materialized: Option<Materialized>,
    /// The query that defines the CTE.
    pub query: Box<QueryBuilder>,
}

impl Cte {
    /// Create a new CTE with the given name and defining query.
    pub fn new(name: impl Into<String>, query: QueryBuilder) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            recursive: false,
            materialized: None,
            query: Box::new(query),
        }
    }

    /// Set the column aliases.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as recursive.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Set a materialization hint.
    pub fn materialized(mut self, hint: Materialized) -> Self {
        self.materialized = Some(hint);
        self
    }

    /// Render the `name (cols) AS [MATERIALIZED]` head; the body is appended by the compiler.
    pub fn head_sql(&self, dialect: Dialect) -> String {
        let mut sql = quote_segment(&self.name, dialect);
        if !self.columns.is_empty() {
            sql.push_str(" (");
            let cols: Vec<String> = self
                .columns
                .iter()
                .map(|c| quote_segment(c, dialect))
                .collect();
            sql.push_str(&cols.join(", "));
            sql.push(')');
        }
        sql.push_str(" AS ");
        if dialect == Dialect::Postgres {
            match self.materialized {
                Some(Materialized::Yes) => sql.push_str("MATERIALIZED "),
                Some(Materialized::No) => sql.push_str("NOT MATERIALIZED "),
                None => {}
            }
        }
        sql
    }
}

/// A `UNION` or `UNION ALL` attached to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    /// `UNION ALL` when set.
    pub all: bool,
    /// The right-hand query.
    pub query: Box<QueryBuilder>,
}

impl Union {
    /// Create a set operation.
    pub fn new(query: QueryBuilder, all: bool) -> Self {
        Self {
            all,
            query: Box::new(query),
        }
    }

    /// Get the SQL keyword.
    pub fn keyword(&self) -> &'static str {
        if self.all { "UNION ALL" } else { "UNION" }
    }
}
