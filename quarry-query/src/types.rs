//! Common types used in query building.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryResult;
use crate::filter::{Connector, IntoOperator, Operator};
use crate::sql::{escape_identifier, escape_table, Dialect};

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Null handling in sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsOrder {
    /// Nulls appear first in the results.
    First,
    /// Nulls appear last in the results.
    Last,
}

impl NullsOrder {
    /// Get the SQL clause for this null order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// One entry of an `ORDER BY` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderItem {
    /// An escaped column with direction and optional null placement.
    Column {
        /// Column name.
        column: String,
        /// Direction.
        order: SortOrder,
        /// Null placement.
        nulls: Option<NullsOrder>,
    },
    /// A raw expression, rendered as written.
    Raw(String),
}

impl OrderItem {
    /// Ascending column ordering.
    pub fn asc(column: impl Into<String>) -> Self {
        Self::Column {
            column: column.into(),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Descending column ordering.
    pub fn desc(column: impl Into<String>) -> Self {
        Self::Column {
            column: column.into(),
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    /// Set null placement on a column ordering.
    pub fn nulls(self, placement: NullsOrder) -> Self {
        match self {
            Self::Column { column, order, .. } => Self::Column {
                column,
                order,
                nulls: Some(placement),
            },
            raw => raw,
        }
    }

    /// Write the SQL for this entry.
    ///
    /// MySQL has no `NULLS FIRST/LAST`; it gets an `IS NULL` sort key instead.
    pub fn write_sql(&self, buffer: &mut String, dialect: Dialect) {
        match self {
            Self::Raw(sql) => buffer.push_str(sql),
            Self::Column { column, order, nulls } => {
                let escaped = escape_identifier(column, dialect);
                match (nulls, dialect) {
                    (Some(placement), Dialect::MySql) => {
                        buffer.push_str(&escaped);
                        buffer.push_str(" IS NULL ");
                        buffer.push_str(match placement {
                            NullsOrder::First => "DESC",
                            NullsOrder::Last => "ASC",
                        });
                        buffer.push_str(", ");
                        buffer.push_str(&escaped);
                        buffer.push(' ');
                        buffer.push_str(order.as_sql());
                    }
                    (Some(placement), _) => {
                        buffer.push_str(&escaped);
                        buffer.push(' ');
                        buffer.push_str(order.as_sql());
                        buffer.push(' ');
                        buffer.push_str(placement.as_sql());
                    }
                    (None, _) => {
                        buffer.push_str(&escaped);
                        buffer.push(' ');
                        buffer.push_str(order.as_sql());
                    }
                }
            }
        }
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectExpr {
    /// A column reference; escaped when rendered.
    Column(String),
    /// A raw expression; rendered as written.
    Raw(String),
}

impl SelectExpr {
    /// Render for a dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        match self {
            Self::Column(column) => escape_identifier(column, dialect),
            Self::Raw(sql) => sql.clone(),
        }
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `CROSS JOIN`
    Cross,
}

impl JoinType {
    /// Get the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// A column-to-column join condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCondition {
    /// How this condition attaches to the previous one.
    pub connector: Connector,
    /// Left column.
    pub first: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Right column.
    pub second: String,
}

/// A join clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Join kind.
    pub kind: JoinType,
    /// Joined table.
    pub table: String,
    /// Optional table alias.
    pub alias: Option<String>,
    /// `ON` conditions, in declaration order.
    pub conditions: Vec<JoinCondition>,
}

impl Join {
    /// Start a join clause.
    pub fn new(kind: JoinType, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: None,
            conditions: Vec::new(),
        }
    }

    /// Alias the joined table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an `AND`-connected condition.
    pub fn on(self, first: impl Into<String>, op: impl IntoOperator, second: impl Into<String>) -> QueryResult<Self> {
        self.push(Connector::And, first, op, second)
    }

    /// Add an `OR`-connected condition.
    pub fn or_on(self, first: impl Into<String>, op: impl IntoOperator, second: impl Into<String>) -> QueryResult<Self> {
        self.push(Connector::Or, first, op, second)
    }

    fn push(
        mut self,
        connector: Connector,
        first: impl Into<String>,
        op: impl IntoOperator,
        second: impl Into<String>,
    ) -> QueryResult<Self> {
        self.conditions.push(JoinCondition {
            connector,
            first: first.into(),
            operator: op.into_operator()?,
            second: second.into(),
        });
        Ok(self)
    }

    /// Write the SQL for this join.
    pub fn write_sql(&self, buffer: &mut String, dialect: Dialect) {
        buffer.push_str(self.kind.as_sql());
        buffer.push(' ');
        buffer.push_str(&escape_table(&self.table, self.alias.as_deref(), dialect));
        if self.kind == JoinType::Cross || self.conditions.is_empty() {
            return;
        }
        buffer.push_str(" ON ");
        for (i, cond) in self.conditions.iter().enumerate() {
            if i > 0 {
                buffer.push(' ');
                buffer.push_str(cond.connector.as_sql());
                buffer.push(' ');
            }
            buffer.push_str(&escape_identifier(&cond.first, dialect));
            buffer.push(' ');
            buffer.push_str(cond.operator.as_sql(dialect));
            buffer.push(' ');
            buffer.push_str(&escape_identifier(&cond.second, dialect));
        }
    }
}

/// Aggregate functions used by the execution bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    /// `COUNT`
    Count,
    /// `COUNT(DISTINCT ...)`
    CountDistinct,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
}

impl Aggregate {
    /// Render the aggregate expression aliased as `aggregate`.
    pub fn to_sql(&self, column: Option<&str>, dialect: Dialect) -> String {
        let target = column
            .map(|c| escape_identifier(c, dialect))
            .unwrap_or_else(|| "*".to_string());
        let expr = match self {
            Self::Count => format!("COUNT({})", target),
            Self::CountDistinct => format!("COUNT(DISTINCT {})", target),
            Self::Sum => format!("SUM({})", target),
            Self::Avg => format!("AVG({})", target),
            Self::Min => format!("MIN({})", target),
            Self::Max => format!("MAX({})", target),
        };
        format!("{} AS aggregate", expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_item_sql() {
        let mut sql = String::new();
        OrderItem::desc("created_at").write_sql(&mut sql, Dialect::Postgres);
        assert_eq!(sql, "\"created_at\" DESC");
    }

    #[test]
    fn test_nulls_order_mysql_emulation() {
        let mut sql = String::new();
        OrderItem::asc("score")
            .nulls(NullsOrder::Last)
            .write_sql(&mut sql, Dialect::MySql);
        assert_eq!(sql, "`score` IS NULL ASC, `score` ASC");
    }

    #[test]
    fn test_join_sql() {
        let join = Join::new(JoinType::Left, "posts")
            .on("users.id", "=", "posts.user_id")
            .unwrap();
        let mut sql = String::new();
        join.write_sql(&mut sql, Dialect::Sqlite);
        assert_eq!(
            sql,
            "LEFT JOIN \"posts\" ON \"users\".\"id\" = \"posts\".\"user_id\""
        );
    }

    #[test]
    fn test_join_rejects_unknown_operator() {
        assert!(Join::new(JoinType::Inner, "posts").on("a", "===", "b").is_err());
    }

    #[test]
    fn test_aggregate_sql() {
        assert_eq!(Aggregate::Count.to_sql(None, Dialect::Sqlite), "COUNT(*) AS aggregate");
        assert_eq!(
            Aggregate::CountDistinct.to_sql(Some("email"), Dialect::MySql),
            "COUNT(DISTINCT `email`) AS aggregate"
        );
    }
}
