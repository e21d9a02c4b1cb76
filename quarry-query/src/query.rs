//! The query descriptor and its fluent builder.
//!
//! A [`QueryBuilder`] is plain data: every method consumes the builder and
//! returns it, and `clone()` deep-copies every nested sub-query (predicates,
//! CTEs and unions all own their children). Nothing here talks to a database;
//! hand the builder to the [`Compiler`](crate::compiler::Compiler) or to an
//! [`Engine`](crate::engine::Engine) terminal.
//!
//! ```rust
//! use quarry_query::prelude::*;
//!
//! let query = QueryBuilder::table("users")
//!     .select(["id", "email"])
//!     .r#where("active", true)
//!     .where_op("age", ">=", 18)
//!     .where_nested(|q| q.r#where("role", "admin").or_where("role", "owner"))
//!     .order_by_desc("created_at")
//!     .limit(10);
//!
//! let compiled = Compiler::new(Dialect::Postgres).compile_select(&query).unwrap();
//! assert_eq!(compiled.params, query.bindings());
//! ```

use crate::cte::{Cte, Union};
use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::filter::{FilterValue, IntoOperator, Operator, Predicate, PredicateNode, SubQuery};
use crate::types::{Join, JoinType, OrderItem, SelectExpr, SortOrder};

/// A builder-time failure, held until the query is compiled.
#[derive(Debug, Clone, PartialEq)]
struct PendingError {
    code: ErrorCode,
    message: String,
}

impl PendingError {
    fn from_error(err: &QueryError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
        }
    }

    fn into_error(self) -> QueryError {
        QueryError::new(self.code, self.message).with_context("build query")
    }
}

/// A clonable description of one `SELECT` statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    pub(crate) table: Option<String>,
    pub(crate) alias: Option<String>,
    pub(crate) columns: Vec<SelectExpr>,
    pub(crate) joins: Vec<Join>,
    pub(crate) wheres: Vec<Predicate>,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Vec<Predicate>,
    pub(crate) orders: Vec<OrderItem>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) distinct: bool,
    pub(crate) lock_for_update: bool,
    pub(crate) from_raw: Option<String>,
    pub(crate) ctes: Vec<Cte>,
    pub(crate) unions: Vec<Union>,
    pending_error: Option<PendingError>,
}

impl QueryBuilder {
    /// Create a builder with no table. Set one with [`from`](Self::from) or
    /// [`from_raw`](Self::from_raw) before compiling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder targeting `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    /// Set the target table.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Alias the target table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Replace the `FROM` target with a raw expression.
    pub fn from_raw(mut self, sql: impl Into<String>) -> Self {
        self.from_raw = Some(sql.into());
        self
    }

    /// The target table, if one is set.
    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// The current limit.
    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// The current offset.
    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// The `WHERE` predicates, in compilation order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.wheres
    }

    /// Surface an error recorded while building, if any.
    pub fn check(&self) -> QueryResult<()> {
        match &self.pending_error {
            Some(pending) => Err(pending.clone().into_error()),
            None => Ok(()),
        }
    }

    fn record_error(&mut self, err: &QueryError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(PendingError::from_error(err));
        }
    }

    fn absorb_error(&mut self, other: &QueryBuilder) {
        if self.pending_error.is_none() {
            self.pending_error = other.pending_error.clone();
        }
    }

    // ============== Select ==============

    /// Replace the select list with columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(|c| SelectExpr::Column(c.into())).collect();
        self
    }

    /// Append columns to the select list.
    pub fn add_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| SelectExpr::Column(c.into())));
        self
    }

    /// Append a raw select expression.
    pub fn select_raw(mut self, sql: impl Into<String>) -> Self {
        self.columns.push(SelectExpr::Raw(sql.into()));
        self
    }

    /// Drop the select list, falling back to `*`.
    pub fn clear_select(mut self) -> Self {
        self.columns.clear();
        self
    }

    /// Select distinct rows.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ============== Joins ==============

    fn push_join(
        mut self,
        kind: JoinType,
        table: impl Into<String>,
        first: impl Into<String>,
        op: impl IntoOperator,
        second: impl Into<String>,
    ) -> Self {
        match Join::new(kind, table).on(first, op, second) {
            Ok(join) => self.joins.push(join),
            Err(err) => self.record_error(&err),
        }
        self
    }

    /// `INNER JOIN table ON first op second`.
    pub fn join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: impl IntoOperator,
        second: impl Into<String>,
    ) -> Self {
        self.push_join(JoinType::Inner, table, first, op, second)
    }

    /// `LEFT JOIN table ON first op second`.
    pub fn left_join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: impl IntoOperator,
        second: impl Into<String>,
    ) -> Self {
        self.push_join(JoinType::Left, table, first, op, second)
    }

    /// `RIGHT JOIN table ON first op second`.
    pub fn right_join(
        self,
        table: impl Into<String>,
        first: impl Into<String>,
        op: impl IntoOperator,
        second: impl Into<String>,
    ) -> Self {
        self.push_join(JoinType::Right, table, first, op, second)
    }

    /// `CROSS JOIN table`.
    pub fn cross_join(mut self, table: impl Into<String>) -> Self {
        self.joins.push(Join::new(JoinType::Cross, table));
        self
    }

    /// Attach a prepared join clause, for multi-condition or aliased joins.
    pub fn join_clause(mut self, join: QueryResult<Join>) -> Self {
        match join {
            Ok(join) => self.joins.push(join),
            Err(err) => self.record_error(&err),
        }
        self
    }

    // ============== Where ==============

    fn push_where(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    fn basic(
        mut self,
        or: bool,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: FilterValue,
    ) -> Self {
        let column = column.into();
        let operator = match op.into_operator() {
            Ok(operator) => operator,
            Err(err) => {
                self.record_error(&err);
                return self;
            }
        };

        let node = match (&value, operator) {
            (FilterValue::Null, Operator::Eq) => PredicateNode::Null {
                column,
                negated: false,
            },
            (FilterValue::Null, Operator::Ne) => PredicateNode::Null {
                column,
                negated: true,
            },
            (FilterValue::List(items), Operator::Eq) => PredicateNode::In {
                column,
                values: items.clone(),
            },
            (FilterValue::List(items), Operator::Ne) => PredicateNode::NotIn {
                column,
                values: items.clone(),
            },
            (FilterValue::List(_), operator) => {
                self.record_error(&QueryError::new(
                    ErrorCode::InvalidFilter,
                    format!(
                        "a list can only be compared with = or <> (column '{}', operator {:?})",
                        column, operator
                    ),
                ));
                return self;
            }
            _ => PredicateNode::Basic {
                column,
                operator,
                value,
            },
        };
        self.push_where(if or { Predicate::or(node) } else { Predicate::and(node) })
    }

    /// `column = value`; a `Null` value becomes `IS NULL`, a list becomes `IN`.
    ///
    /// With [`where_op`](Self::where_op), `<>` turns a list into `NOT IN`;
    /// any other operator with a list fails compilation.
    pub fn r#where(self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.basic(false, column, Operator::Eq, value.into())
    }

    /// `column <op> value`. Unknown operators are recorded and fail compilation.
    pub fn where_op(
        self,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.basic(false, column, op, value.into())
    }

    /// `OR column = value`.
    pub fn or_where(self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.basic(true, column, Operator::Eq, value.into())
    }

    /// `OR column <op> value`.
    pub fn or_where_op(
        self,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.basic(true, column, op, value.into())
    }

    /// Expand `(column, value)` pairs into a parenthesised `AND` chain.
    pub fn where_map<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FilterValue>,
    {
        self.where_nested(|mut q| {
            for (column, value) in pairs {
                q = q.r#where(column, value);
            }
            q
        })
    }

    /// Raw `WHERE` fragment with its own bindings.
    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<FilterValue>) -> Self {
        self.push_where(Predicate::and(PredicateNode::Raw {
            sql: sql.into(),
            bindings,
        }))
    }

    /// `OR` raw fragment.
    pub fn or_where_raw(self, sql: impl Into<String>, bindings: Vec<FilterValue>) -> Self {
        self.push_where(Predicate::or(PredicateNode::Raw {
            sql: sql.into(),
            bindings,
        }))
    }

    /// Append a prepared predicate, e.g. one built with [`predicate!`](crate::predicate).
    pub fn where_predicate(self, predicate: Predicate) -> Self {
        self.push_where(predicate)
    }

    fn column_compare(
        mut self,
        or: bool,
        left: impl Into<String>,
        op: impl IntoOperator,
        right: impl Into<String>,
    ) -> Self {
        match op.into_operator() {
            Ok(operator) => {
                let node = PredicateNode::Columns {
                    left: left.into(),
                    operator,
                    right: right.into(),
                };
                self.push_where(if or { Predicate::or(node) } else { Predicate::and(node) })
            }
            Err(err) => {
                self.record_error(&err);
                self
            }
        }
    }

    /// Compare two columns; nothing is bound.
    pub fn where_column(
        self,
        left: impl Into<String>,
        op: impl IntoOperator,
        right: impl Into<String>,
    ) -> Self {
        self.column_compare(false, left, op, right)
    }

    /// `OR` column comparison.
    pub fn or_where_column(
        self,
        left: impl Into<String>,
        op: impl IntoOperator,
        right: impl Into<String>,
    ) -> Self {
        self.column_compare(true, left, op, right)
    }

    fn nested<F>(mut self, or: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let inner = build(QueryBuilder::new());
        self.absorb_error(&inner);
        if inner.wheres.is_empty() {
            return self;
        }
        let node = PredicateNode::Nested(inner.wheres);
        self.push_where(if or { Predicate::or(node) } else { Predicate::and(node) })
    }

    /// Parenthesised group built by `build`. An empty group is dropped.
    pub fn where_nested<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.nested(false, build)
    }

    /// `OR (...)` group.
    pub fn or_where_nested<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.nested(true, build)
    }

    fn membership<I, V>(self, or: bool, negated: bool, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let column = column.into();
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
        let node = if negated {
            PredicateNode::NotIn { column, values }
        } else {
            PredicateNode::In { column, values }
        };
        self.push_where(if or { Predicate::or(node) } else { Predicate::and(node) })
    }

    /// `column IN (...)`. An empty list compiles to a predicate that never matches.
    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.membership(false, false, column, values)
    }

    /// `column NOT IN (...)`. An empty list compiles to a predicate that always matches.
    pub fn where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.membership(false, true, column, values)
    }

    /// `OR column IN (...)`.
    pub fn or_where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.membership(true, false, column, values)
    }

    /// `OR column NOT IN (...)`.
    pub fn or_where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.membership(true, true, column, values)
    }

    /// `column IS NULL`.
    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push_where(Predicate::and(PredicateNode::Null {
            column: column.into(),
            negated: false,
        }))
    }

    /// `column IS NOT NULL`.
    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push_where(Predicate::and(PredicateNode::Null {
            column: column.into(),
            negated: true,
        }))
    }

    /// `OR column IS NULL`.
    pub fn or_where_null(self, column: impl Into<String>) -> Self {
        self.push_where(Predicate::or(PredicateNode::Null {
            column: column.into(),
            negated: false,
        }))
    }

    /// `OR column IS NOT NULL`.
    pub fn or_where_not_null(self, column: impl Into<String>) -> Self {
        self.push_where(Predicate::or(PredicateNode::Null {
            column: column.into(),
            negated: true,
        }))
    }

    fn between(
        self,
        or: bool,
        negated: bool,
        column: impl Into<String>,
        low: FilterValue,
        high: FilterValue,
    ) -> Self {
        let node = PredicateNode::Between {
            column: column.into(),
            low,
            high,
            negated,
        };
        self.push_where(if or { Predicate::or(node) } else { Predicate::and(node) })
    }

    /// `column BETWEEN low AND high`.
    pub fn where_between(
        self,
        column: impl Into<String>,
        low: impl Into<FilterValue>,
        high: impl Into<FilterValue>,
    ) -> Self {
        self.between(false, false, column, low.into(), high.into())
    }

    /// `column NOT BETWEEN low AND high`.
    pub fn where_not_between(
        self,
        column: impl Into<String>,
        low: impl Into<FilterValue>,
        high: impl Into<FilterValue>,
    ) -> Self {
        self.between(false, true, column, low.into(), high.into())
    }

    /// `OR column BETWEEN low AND high`.
    pub fn or_where_between(
        self,
        column: impl Into<String>,
        low: impl Into<FilterValue>,
        high: impl Into<FilterValue>,
    ) -> Self {
        self.between(true, false, column, low.into(), high.into())
    }

    fn exists(mut self, or: bool, negated: bool, subquery: SubQuery) -> Self {
        if let SubQuery::Query(query) = &subquery {
            self.absorb_error(query);
        }
        let node = PredicateNode::Exists { subquery, negated };
        self.push_where(if or { Predicate::or(node) } else { Predicate::and(node) })
    }

    /// `EXISTS (subquery)`; accepts a builder or raw SQL text.
    pub fn where_exists(self, subquery: impl Into<SubQuery>) -> Self {
        self.exists(false, false, subquery.into())
    }

    /// `NOT EXISTS (subquery)`.
    pub fn where_not_exists(self, subquery: impl Into<SubQuery>) -> Self {
        self.exists(false, true, subquery.into())
    }

    /// `OR EXISTS (subquery)`.
    pub fn or_where_exists(self, subquery: impl Into<SubQuery>) -> Self {
        self.exists(true, false, subquery.into())
    }

    /// `EXISTS` over a sub-query built by `build` from an empty builder.
    pub fn where_exists_with<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.exists(false, false, sub.into())
    }

    /// `NOT EXISTS` over a sub-query built by `build`.
    pub fn where_not_exists_with<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let sub = build(QueryBuilder::new());
        self.exists(false, true, sub.into())
    }

    // ============== Grouping ==============

    /// Append `GROUP BY` columns.
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    fn push_having(
        mut self,
        or: bool,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: FilterValue,
    ) -> Self {
        match op.into_operator() {
            Ok(operator) => {
                let node = PredicateNode::Basic {
                    column: column.into(),
                    operator,
                    value,
                };
                self.havings
                    .push(if or { Predicate::or(node) } else { Predicate::and(node) });
            }
            Err(err) => self.record_error(&err),
        }
        self
    }

    /// `HAVING column <op> value`.
    pub fn having(
        self,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.push_having(false, column, op, value.into())
    }

    /// `OR` having condition.
    pub fn or_having(
        self,
        column: impl Into<String>,
        op: impl IntoOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.push_having(true, column, op, value.into())
    }

    /// Raw `HAVING` fragment.
    pub fn having_raw(mut self, sql: impl Into<String>, bindings: Vec<FilterValue>) -> Self {
        self.havings.push(Predicate::and(PredicateNode::Raw {
            sql: sql.into(),
            bindings,
        }));
        self
    }

    // ============== Ordering ==============

    /// `ORDER BY column <order>`.
    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.orders.push(OrderItem::Column {
            column: column.into(),
            order,
            nulls: None,
        });
        self
    }

    /// `ORDER BY column DESC`.
    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, SortOrder::Desc)
    }

    /// Append a prepared ordering entry (e.g. with null placement).
    pub fn order_by_item(mut self, item: OrderItem) -> Self {
        self.orders.push(item);
        self
    }

    /// Raw ordering expression.
    pub fn order_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.orders.push(OrderItem::Raw(sql.into()));
        self
    }

    /// Newest first by `column`.
    pub fn latest(self, column: impl Into<String>) -> Self {
        self.order_by(column, SortOrder::Desc)
    }

    /// Oldest first by `column`.
    pub fn oldest(self, column: impl Into<String>) -> Self {
        self.order_by(column, SortOrder::Asc)
    }

    /// Remove all ordering.
    pub fn reset_order(mut self) -> Self {
        self.orders.clear();
        self
    }

    // ============== Limits ==============

    /// `LIMIT n`.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `OFFSET n`.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Alias for [`limit`](Self::limit).
    pub fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    /// Alias for [`offset`](Self::offset).
    pub fn skip(self, n: u64) -> Self {
        self.offset(n)
    }

    /// Drop limit and offset.
    pub fn reset_limits(mut self) -> Self {
        self.limit = None;
        self.offset = None;
        self
    }

    /// Append `FOR UPDATE`.
    pub fn for_update(mut self) -> Self {
        self.lock_for_update = true;
        self
    }

    // ============== CTEs and unions ==============

    /// Attach a `WITH name AS (query)` expression.
    pub fn with_cte(self, name: impl Into<String>, query: QueryBuilder) -> Self {
        self.add_cte(Cte::new(name, query))
    }

    /// Attach a `WITH RECURSIVE` expression.
    pub fn with_recursive(self, name: impl Into<String>, query: QueryBuilder) -> Self {
        self.add_cte(Cte::new(name, query).recursive())
    }

    /// Attach a prepared CTE.
    pub fn add_cte(mut self, cte: Cte) -> Self {
        self.absorb_error(&cte.query);
        self.ctes.push(cte);
        self
    }

    /// `UNION query`.
    pub fn union(mut self, query: QueryBuilder) -> Self {
        self.absorb_error(&query);
        self.unions.push(Union::new(query, false));
        self
    }

    /// `UNION ALL query`.
    pub fn union_all(mut self, query: QueryBuilder) -> Self {
        self.absorb_error(&query);
        self.unions.push(Union::new(query, true));
        self
    }

    // ============== Helpers ==============

    /// Apply `build` only when `condition` holds.
    pub fn when<F>(self, condition: bool, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        if condition { build(self) } else { self }
    }

    /// Whether aggregates must wrap this query as a derived table.
    pub fn needs_wrapping_for_aggregate(&self) -> bool {
        self.distinct || !self.groups.is_empty() || !self.unions.is_empty() || !self.havings.is_empty()
    }

    /// Gather the parameters in placeholder order.
    ///
    /// Walks CTEs, `WHERE`, `HAVING` and unions in the same order the
    /// compiler renders them, so the result always equals the compiled
    /// parameter list.
    pub fn bindings(&self) -> Vec<FilterValue> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings(&self, out: &mut Vec<FilterValue>) {
        for cte in &self.ctes {
            cte.query.collect_bindings(out);
        }
        for predicate in &self.wheres {
            predicate.node.collect_bindings(out);
        }
        for predicate in &self.havings {
            predicate.node.collect_bindings(out);
        }
        for union in &self.unions {
            union.query.collect_bindings(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_where_null_value_becomes_is_null() {
        let q = QueryBuilder::table("users").r#where("deleted_at", FilterValue::Null);
        assert_eq!(
            q.predicates()[0].node,
            PredicateNode::Null {
                column: "deleted_at".into(),
                negated: false
            }
        );
    }

    #[test]
    fn test_invalid_operator_is_recorded() {
        let q = QueryBuilder::table("users").where_op("id", "; DROP", 1);
        assert!(q.predicates().is_empty());
        let err = q.check().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperator);
    }

    #[test]
    fn test_list_values_only_pair_with_equality() {
        let q = QueryBuilder::table("users")
            .where_op("role", "<>", vec!["admin", "owner"])
            .or_where("id", vec![1, 2]);
        assert_eq!(
            q.predicates()[0].node,
            PredicateNode::NotIn {
                column: "role".into(),
                values: vec!["admin".into(), "owner".into()],
            }
        );
        assert!(matches!(q.predicates()[1].node, PredicateNode::In { .. }));
        assert!(q.check().is_ok());

        let q = QueryBuilder::table("users").where_op("age", ">", vec![18, 21]);
        assert!(q.predicates().is_empty());
        assert_eq!(q.check().unwrap_err().code, ErrorCode::InvalidFilter);
    }

    #[test]
    fn test_nested_error_propagates() {
        let q = QueryBuilder::table("users").where_nested(|q| q.where_op("a", "===", 1));
        assert!(q.check().is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let sub = QueryBuilder::table("posts").where_column("posts.user_id", "=", "users.id");
        let original = QueryBuilder::table("users")
            .r#where("active", true)
            .where_exists(sub)
            .limit(5);

        let mut copy = original.clone().limit(1).offset(10).r#where("id", 3);
        if let PredicateNode::Exists {
            subquery: SubQuery::Query(q),
            ..
        } = &mut copy.wheres[1].node
        {
            q.wheres.clear();
        }

        assert_eq!(original.limit_value(), Some(5));
        assert_eq!(original.offset_value(), None);
        assert_eq!(original.predicates().len(), 2);
        match &original.wheres[1].node {
            PredicateNode::Exists {
                subquery: SubQuery::Query(q),
                ..
            } => assert_eq!(q.predicates().len(), 1),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_binding_order_walks_ctes_first() {
        let cte = QueryBuilder::table("orders").r#where("status", "paid");
        let q = QueryBuilder::table("paid")
            .with_cte("paid", cte)
            .r#where("total", 10)
            .having("cnt", ">", 2)
            .union(QueryBuilder::table("archive").r#where("year", 2020));

        assert_eq!(
            q.bindings(),
            vec![
                FilterValue::from("paid"),
                FilterValue::Int(10),
                FilterValue::Int(2),
                FilterValue::Int(2020),
            ]
        );
    }

    #[test]
    fn test_when_and_empty_nested() {
        let q = QueryBuilder::table("users")
            .when(false, |q| q.r#where("a", 1))
            .where_nested(|q| q)
            .when(true, |q| q.r#where("b", 2));
        assert_eq!(q.predicates().len(), 1);
    }

    #[test]
    fn test_where_map_groups_pairs() {
        let q = QueryBuilder::table("users").where_map([("a", 1), ("b", 2)]);
        match &q.predicates()[0].node {
            PredicateNode::Nested(children) => assert_eq!(children.len(), 2),
            other => panic!("unexpected node {:?}", other),
        }
    }
}
