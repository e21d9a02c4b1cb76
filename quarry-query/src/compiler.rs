//! Renders query descriptors into SQL text and an ordered parameter list.
//!
//! The compiler is a pure function of `(QueryBuilder, Dialect)`. It always
//! emits `?` placeholders; PostgreSQL renumbering happens later, once, in
//! [`CompiledQuery::finalized`].
//!
//! Clause order for `SELECT`:
//!
//! ```text
//! WITH ... SELECT [DISTINCT] cols FROM table joins WHERE GROUP BY HAVING
//! ORDER BY LIMIT/OFFSET FOR UPDATE [UNION ...]
//! ```
//!
//! Parameters are pushed while rendering, so their order always matches the
//! placeholders in the text.

use crate::error::{QueryError, QueryResult};
use crate::filter::{FilterValue, Predicate, PredicateNode, SubQuery};
use crate::query::QueryBuilder;
use crate::row::Attributes;
use crate::sql::{escape_identifier, escape_table, finalize, Dialect};
use crate::types::{Aggregate, SelectExpr};

/// Compiled SQL text plus its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Bound parameters.
    pub params: Vec<FilterValue>,
}

impl CompiledQuery {
    /// The text as it should be sent to a row source of `dialect`.
    pub fn finalized(&self, dialect: Dialect) -> String {
        finalize(&self.sql, dialect)
    }
}

/// Stateless SQL compiler for one dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Compiler {
    dialect: Dialect,
}

impl Compiler {
    /// Create a compiler for `dialect`.
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// The target dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn ident(&self, value: &str) -> String {
        escape_identifier(value, self.dialect)
    }

    fn target_table<'q>(&self, query: &'q QueryBuilder) -> QueryResult<&'q str> {
        query.table.as_deref().ok_or_else(QueryError::missing_table)
    }

    // ============== SELECT ==============

    /// Compile a `SELECT` statement.
    pub fn compile_select(&self, query: &QueryBuilder) -> QueryResult<CompiledQuery> {
        let mut sql = String::with_capacity(128);
        let mut params = Vec::new();
        self.write_select(query, &mut sql, &mut params)?;
        Ok(CompiledQuery { sql, params })
    }

    fn write_select(
        &self,
        query: &QueryBuilder,
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) -> QueryResult<()> {
        query.check()?;

        if !query.ctes.is_empty() {
            sql.push_str("WITH ");
            if query.ctes.iter().any(|c| c.recursive) {
                sql.push_str("RECURSIVE ");
            }
            for (i, cte) in query.ctes.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str(&cte.head_sql(self.dialect));
                sql.push('(');
                self.write_select(&cte.query, sql, params)?;
                sql.push(')');
            }
            sql.push(' ');
        }

        if query.unions.is_empty() {
            return self.write_core(query, sql, params);
        }

        self.write_union_operand(query, 0, sql, params)?;
        for (i, union) in query.unions.iter().enumerate() {
            sql.push(' ');
            sql.push_str(union.keyword());
            sql.push(' ');
            self.write_union_operand(&union.query, i + 1, sql, params)?;
        }
        Ok(())
    }

    /// Union operands with their own ordering, limits, locks, CTEs or unions
    /// are wrapped as derived tables so each dialect accepts them.
    fn write_union_operand(
        &self,
        query: &QueryBuilder,
        index: usize,
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) -> QueryResult<()> {
        let is_outer = index == 0;
        let needs_wrap = !query.orders.is_empty()
            || query.limit.is_some()
            || query.offset.is_some()
            || query.lock_for_update
            || (!is_outer && (!query.ctes.is_empty() || !query.unions.is_empty()));

        if !needs_wrap {
            return self.write_core(query, sql, params);
        }

        sql.push_str("SELECT * FROM (");
        if is_outer {
            self.write_core(query, sql, params)?;
        } else {
            self.write_select(query, sql, params)?;
        }
        sql.push_str(") AS ");
        sql.push_str(&self.ident(&format!("u{}", index)));
        Ok(())
    }

    /// Everything from `SELECT` through `FOR UPDATE`.
    fn write_core(
        &self,
        query: &QueryBuilder,
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) -> QueryResult<()> {
        sql.push_str("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }

        if query.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<String> = query
                .columns
                .iter()
                .map(|c| c.to_sql(self.dialect))
                .collect();
            sql.push_str(&cols.join(", "));
        }

        sql.push_str(" FROM ");
        match (&query.from_raw, &query.table) {
            (Some(raw), _) => sql.push_str(raw),
            (None, Some(table)) => {
                sql.push_str(&escape_table(table, query.alias.as_deref(), self.dialect))
            }
            (None, None) => return Err(QueryError::missing_table()),
        }

        for join in &query.joins {
            sql.push(' ');
            join.write_sql(sql, self.dialect);
        }

        if !query.wheres.is_empty() {
            sql.push_str(" WHERE ");
            self.write_predicates(&query.wheres, sql, params)?;
        }

        if !query.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            let cols: Vec<String> = query.groups.iter().map(|c| self.ident(c)).collect();
            sql.push_str(&cols.join(", "));
        }

        if !query.havings.is_empty() {
            sql.push_str(" HAVING ");
            self.write_predicates(&query.havings, sql, params)?;
        }

        if !query.orders.is_empty() {
            sql.push_str(" ORDER BY ");
            for (i, order) in query.orders.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                order.write_sql(sql, self.dialect);
            }
        }

        self.write_limit_offset(query.limit, query.offset, sql);

        // SQLite has no row locks; the clause is dropped there.
        if query.lock_for_update && self.dialect != Dialect::Sqlite {
            sql.push_str(" FOR UPDATE");
        }

        Ok(())
    }

    fn write_limit_offset(&self, limit: Option<u64>, offset: Option<u64>, sql: &mut String) {
        match (limit, offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => match self.dialect {
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {}", offset)),
                Dialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                Dialect::MySql => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", u64::MAX, offset))
                }
            },
            (None, None) => {}
        }
    }

    // ============== Predicates ==============

    fn write_predicates(
        &self,
        predicates: &[Predicate],
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) -> QueryResult<()> {
        for (i, predicate) in predicates.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(predicate.connector.as_sql());
                sql.push(' ');
            }
            self.write_node(&predicate.node, sql, params)?;
        }
        Ok(())
    }

    fn write_node(
        &self,
        node: &PredicateNode,
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) -> QueryResult<()> {
        match node {
            PredicateNode::Basic {
                column,
                operator,
                value,
            } => {
                sql.push_str(&self.ident(column));
                sql.push(' ');
                sql.push_str(operator.as_sql(self.dialect));
                sql.push_str(" ?");
                params.push(value.clone());
            }
            PredicateNode::Raw { sql: raw, bindings } => {
                sql.push_str(raw);
                params.extend(bindings.iter().cloned());
            }
            PredicateNode::Columns {
                left,
                operator,
                right,
            } => {
                sql.push_str(&self.ident(left));
                sql.push(' ');
                sql.push_str(operator.as_sql(self.dialect));
                sql.push(' ');
                sql.push_str(&self.ident(right));
            }
            PredicateNode::Nested(children) => {
                sql.push('(');
                self.write_predicates(children, sql, params)?;
                sql.push(')');
            }
            PredicateNode::In { column, values } => {
                if values.is_empty() {
                    sql.push_str("1 = 0");
                } else {
                    self.write_list(column, "IN", values, sql, params);
                }
            }
            PredicateNode::NotIn { column, values } => {
                if values.is_empty() {
                    sql.push_str("1 = 1");
                } else {
                    self.write_list(column, "NOT IN", values, sql, params);
                }
            }
            PredicateNode::Null { column, negated } => {
                sql.push_str(&self.ident(column));
                sql.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            PredicateNode::Between {
                column,
                low,
                high,
                negated,
            } => {
                sql.push_str(&self.ident(column));
                sql.push_str(if *negated { " NOT BETWEEN ? AND ?" } else { " BETWEEN ? AND ?" });
                params.push(low.clone());
                params.push(high.clone());
            }
            PredicateNode::Exists { subquery, negated } => {
                sql.push_str(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                match subquery {
                    SubQuery::Query(query) => self.write_select(query, sql, params)?,
                    SubQuery::Raw { sql: raw, bindings } => {
                        sql.push_str(raw);
                        params.extend(bindings.iter().cloned());
                    }
                }
                sql.push(')');
            }
        }
        Ok(())
    }

    fn write_list(
        &self,
        column: &str,
        keyword: &str,
        values: &[FilterValue],
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) {
        sql.push_str(&self.ident(column));
        sql.push(' ');
        sql.push_str(keyword);
        sql.push_str(" (");
        let placeholders = vec!["?"; values.len()];
        sql.push_str(&placeholders.join(", "));
        sql.push(')');
        params.extend(values.iter().cloned());
    }

    fn write_where_suffix(
        &self,
        query: &QueryBuilder,
        sql: &mut String,
        params: &mut Vec<FilterValue>,
    ) -> QueryResult<()> {
        if !query.wheres.is_empty() {
            sql.push_str(" WHERE ");
            self.write_predicates(&query.wheres, sql, params)?;
        }
        Ok(())
    }

    // ============== Read helpers ==============

    /// Compile an aggregate over `query`.
    ///
    /// Grouped, distinct, having or union queries are wrapped as a derived
    /// table; otherwise the projection is replaced in a clone. Ordering and
    /// limits never apply to an aggregate.
    pub fn compile_aggregate(
        &self,
        query: &QueryBuilder,
        aggregate: Aggregate,
        column: Option<&str>,
    ) -> QueryResult<CompiledQuery> {
        let expr = aggregate.to_sql(column, self.dialect);

        if query.needs_wrapping_for_aggregate() {
            let inner = self.compile_select(&query.clone().reset_order().reset_limits())?;
            return Ok(CompiledQuery {
                sql: format!("SELECT {} FROM ({}) AS aggregate_table", expr, inner.sql),
                params: inner.params,
            });
        }

        let mut counted = query.clone().reset_order().reset_limits();
        counted.columns = vec![SelectExpr::Raw(expr)];
        self.compile_select(&counted)
    }

    /// Compile an existence probe: `SELECT 1 ... LIMIT 1`.
    pub fn compile_exists(&self, query: &QueryBuilder) -> QueryResult<CompiledQuery> {
        let mut probe = query.clone().reset_order().limit(1);
        probe.columns = vec![SelectExpr::Raw("1".to_string())];
        self.compile_select(&probe)
    }

    // ============== Write path ==============

    /// Compile a single-row `INSERT`.
    ///
    /// With `returning` set and a dialect that supports it, the generated key
    /// is read back with `RETURNING`.
    pub fn compile_insert(
        &self,
        table: &str,
        values: &Attributes,
        returning: Option<&str>,
    ) -> QueryResult<CompiledQuery> {
        let mut sql = format!("INSERT INTO {}", self.ident(table));
        let mut params = Vec::with_capacity(values.len());

        if values.is_empty() {
            match self.dialect {
                Dialect::MySql => sql.push_str(" () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => sql.push_str(" DEFAULT VALUES"),
            }
        } else {
            let cols: Vec<String> = values.keys().map(|c| self.ident(c)).collect();
            sql.push_str(" (");
            sql.push_str(&cols.join(", "));
            sql.push_str(") VALUES (");
            sql.push_str(&vec!["?"; values.len()].join(", "));
            sql.push(')');
            params.extend(values.values().cloned());
        }

        if let Some(pk) = returning {
            if self.dialect.supports_returning() {
                sql.push_str(" RETURNING ");
                sql.push_str(&self.ident(pk));
            }
        }

        Ok(CompiledQuery { sql, params })
    }

    /// Compile a multi-row `INSERT`.
    ///
    /// The column list is the union of every row's keys in first-seen order;
    /// rows missing a column bind `NULL` for it.
    pub fn compile_insert_batch(
        &self,
        table: &str,
        rows: &[Attributes],
    ) -> QueryResult<CompiledQuery> {
        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
        if columns.is_empty() {
            return Err(QueryError::empty_payload(table).with_context("insert batch"));
        }

        let cols: Vec<String> = columns.iter().map(|c| self.ident(c)).collect();
        let group = format!("({})", vec!["?"; columns.len()].join(", "));
        let mut sql = format!("INSERT INTO {} ({}) VALUES ", self.ident(table), cols.join(", "));
        sql.push_str(&vec![group.as_str(); rows.len()].join(", "));

        let mut params = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            for col in &columns {
                params.push(row.get(*col).cloned().unwrap_or(FilterValue::Null));
            }
        }

        Ok(CompiledQuery { sql, params })
    }

    /// Compile `UPDATE table SET ... WHERE ...` from an explicit column map.
    pub fn compile_update(
        &self,
        query: &QueryBuilder,
        values: &Attributes,
    ) -> QueryResult<CompiledQuery> {
        query.check()?;
        let table = self.target_table(query)?;
        if values.is_empty() {
            return Err(QueryError::empty_payload(table).with_context("update"));
        }

        let mut sql = format!("UPDATE {} SET ", self.ident(table));
        let mut params = Vec::with_capacity(values.len());
        let sets: Vec<String> = values.keys().map(|c| format!("{} = ?", self.ident(c))).collect();
        sql.push_str(&sets.join(", "));
        params.extend(values.values().cloned());

        self.write_where_suffix(query, &mut sql, &mut params)?;
        Ok(CompiledQuery { sql, params })
    }

    /// Compile `DELETE FROM table WHERE ...`.
    pub fn compile_delete(&self, query: &QueryBuilder) -> QueryResult<CompiledQuery> {
        query.check()?;
        let table = self.target_table(query)?;
        let mut sql = format!("DELETE FROM {}", self.ident(table));
        let mut params = Vec::new();
        self.write_where_suffix(query, &mut sql, &mut params)?;
        Ok(CompiledQuery { sql, params })
    }

    /// Compile `UPDATE table SET column = column + ?` plus extra columns.
    pub fn compile_increment(
        &self,
        query: &QueryBuilder,
        column: &str,
        amount: FilterValue,
        extra: &Attributes,
    ) -> QueryResult<CompiledQuery> {
        self.compile_step(query, column, '+', amount, extra)
    }

    /// Compile `UPDATE table SET column = column - ?` plus extra columns.
    pub fn compile_decrement(
        &self,
        query: &QueryBuilder,
        column: &str,
        amount: FilterValue,
        extra: &Attributes,
    ) -> QueryResult<CompiledQuery> {
        self.compile_step(query, column, '-', amount, extra)
    }

    fn compile_step(
        &self,
        query: &QueryBuilder,
        column: &str,
        sign: char,
        amount: FilterValue,
        extra: &Attributes,
    ) -> QueryResult<CompiledQuery> {
        query.check()?;
        let table = self.target_table(query)?;
        if amount.as_f64().is_none() {
            return Err(QueryError::invalid_input(column, "step amount must be numeric"));
        }

        let target = self.ident(column);
        let mut sql = format!("UPDATE {} SET {} = {} {} ?", self.ident(table), target, target, sign);
        let mut params = vec![amount];
        for (col, value) in extra {
            sql.push_str(&format!(", {} = ?", self.ident(col)));
            params.push(value.clone());
        }

        self.write_where_suffix(query, &mut sql, &mut params)?;
        Ok(CompiledQuery { sql, params })
    }
}

impl QueryBuilder {
    /// Compile this query for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> QueryResult<CompiledQuery> {
        Compiler::new(dialect).compile_select(self)
    }
}
