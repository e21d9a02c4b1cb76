//! The execution bridge: compile, send to a row source, shape the result.
//!
//! An [`Engine`] is the explicit handle every I/O operation goes through. It
//! owns a shared [`RowSource`], the dialect's [`Compiler`], the read retry
//! policy, debug settings and an optional [`CancelSignal`]. Cloning is cheap.
//!
//! Terminal methods never mutate the builder they are given: `first`,
//! `exists`, aggregates and `paginate` work on clones.
//!
//! ```rust,ignore
//! use quarry_query::prelude::*;
//!
//! let engine = Engine::new(source);
//! let active = QueryBuilder::table("users").r#where("active", true);
//!
//! let total = engine.count(&active).await?;
//! let page = engine.paginate(&active.clone().latest("created_at"), 2, 25).await?;
//!
//! engine
//!     .transaction(|tx| async move {
//!         tx.insert("audit", &attrs).await?;
//!         tx.update(&active, &changes).await
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::compiler::{CompiledQuery, Compiler};
use crate::config::{DebugConfig, QuarryConfig};
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::logging::is_debug_enabled;
use crate::pagination::{Page, PageRequest};
use crate::query::QueryBuilder;
use crate::retry::RetryConfig;
use crate::row::{Attributes, FromRow, Row};
use crate::schema::{drop_if_exists_sql, Blueprint};
use crate::sql::Dialect;
use crate::traits::{BoxFuture, ExecResult, RowSource};
use crate::transaction::TransactionConfig;
use crate::types::Aggregate;

/// Explicit execution handle over a row source.
#[derive(Clone)]
pub struct Engine {
    source: Arc<dyn RowSource>,
    compiler: Compiler,
    retry: RetryConfig,
    debug: DebugConfig,
    cancel: Option<CancelSignal>,
    in_transaction: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dialect", &self.compiler.dialect())
            .field("retry", &self.retry)
            .field("debug", &self.debug)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine over `source` with default retry and debug settings.
    pub fn new(source: Arc<dyn RowSource>) -> Self {
        Self {
            compiler: Compiler::new(source.dialect()),
            source,
            retry: RetryConfig::default(),
            debug: DebugConfig::default(),
            cancel: None,
            in_transaction: false,
        }
    }

    /// Create an engine configured from `quarry.toml` settings.
    ///
    /// Fails when the configured dialect differs from the row source's.
    pub fn from_config(source: Arc<dyn RowSource>, config: &QuarryConfig) -> QueryResult<Self> {
        if config.database.dialect != source.dialect() {
            return Err(QueryError::configuration(format!(
                "Configured dialect '{}' does not match the row source ('{}')",
                config.database.dialect.as_str(),
                source.dialect().as_str()
            )));
        }
        Ok(Self::new(source)
            .with_retry(config.retry_config())
            .with_debug(config.debug.clone()))
    }

    /// Replace the read retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the debug settings.
    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    /// Race every row-source call against `signal`.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// The SQL dialect.
    pub fn dialect(&self) -> Dialect {
        self.compiler.dialect()
    }

    /// The compiler used for every statement.
    pub fn compiler(&self) -> Compiler {
        self.compiler
    }

    /// The underlying row source.
    pub fn source(&self) -> &Arc<dyn RowSource> {
        &self.source
    }

    /// Whether this engine is bound to an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Start a query against `table`.
    pub fn table(&self, table: impl Into<String>) -> QueryBuilder {
        QueryBuilder::table(table)
    }

    // ============== Raw access ==============

    /// Run raw SQL that returns rows. `?` placeholders are renumbered for
    /// dialects that need it.
    pub async fn fetch_raw(&self, sql: &str, params: Vec<FilterValue>) -> QueryResult<Vec<Row>> {
        self.run_query(
            CompiledQuery {
                sql: sql.to_string(),
                params,
            },
            true,
        )
        .await
    }

    /// Run raw SQL that returns no rows.
    pub async fn execute_raw(&self, sql: &str, params: Vec<FilterValue>) -> QueryResult<ExecResult> {
        self.run_execute(CompiledQuery {
            sql: sql.to_string(),
            params,
        })
        .await
    }

    // ============== Reads ==============

    /// Run a query and return its rows.
    #[instrument(skip(self, query), fields(table = ?query.table_name()))]
    pub async fn get(&self, query: &QueryBuilder) -> QueryResult<Vec<Row>> {
        let compiled = self.compiler.compile_select(query)?;
        self.run_query(compiled, true).await
    }

    /// Run a query and convert every row.
    pub async fn get_as<T: FromRow>(&self, query: &QueryBuilder) -> QueryResult<Vec<T>> {
        self.get(query).await?.iter().map(T::from_row).collect()
    }

    /// First matching row, if any.
    pub async fn first(&self, query: &QueryBuilder) -> QueryResult<Option<Row>> {
        let rows = self.get(&query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// First matching row, or `RecordNotFound`.
    pub async fn first_or_fail(&self, query: &QueryBuilder) -> QueryResult<Row> {
        self.first(query).await?.ok_or_else(|| {
            QueryError::not_found(query.table_name().unwrap_or("record")).with_context("first_or_fail")
        })
    }

    /// Whether any row matches.
    pub async fn exists(&self, query: &QueryBuilder) -> QueryResult<bool> {
        let compiled = self.compiler.compile_exists(query)?;
        Ok(!self.run_query(compiled, true).await?.is_empty())
    }

    /// Whether no row matches.
    pub async fn doesnt_exist(&self, query: &QueryBuilder) -> QueryResult<bool> {
        Ok(!self.exists(query).await?)
    }

    /// Run an aggregate and return its raw value (`Null` on an empty set).
    #[instrument(skip(self, query), fields(table = ?query.table_name()))]
    pub async fn aggregate(
        &self,
        query: &QueryBuilder,
        aggregate: Aggregate,
        column: Option<&str>,
    ) -> QueryResult<FilterValue> {
        let compiled = self.compiler.compile_aggregate(query, aggregate, column)?;
        let rows = self.run_query(compiled, true).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("aggregate"))
            .unwrap_or(FilterValue::Null))
    }

    /// `COUNT(*)`.
    pub async fn count(&self, query: &QueryBuilder) -> QueryResult<u64> {
        let value = self.aggregate(query, Aggregate::Count, None).await?;
        Ok(as_count(&value))
    }

    /// `COUNT(DISTINCT column)`.
    pub async fn count_distinct(&self, query: &QueryBuilder, column: &str) -> QueryResult<u64> {
        let value = self.aggregate(query, Aggregate::CountDistinct, Some(column)).await?;
        Ok(as_count(&value))
    }

    /// `SUM(column)`; zero for an empty set.
    pub async fn sum(&self, query: &QueryBuilder, column: &str) -> QueryResult<f64> {
        let value = self.aggregate(query, Aggregate::Sum, Some(column)).await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// `AVG(column)`; `None` for an empty set.
    pub async fn avg(&self, query: &QueryBuilder, column: &str) -> QueryResult<Option<f64>> {
        let value = self.aggregate(query, Aggregate::Avg, Some(column)).await?;
        Ok(value.as_f64())
    }

    /// `MIN(column)`.
    pub async fn min(&self, query: &QueryBuilder, column: &str) -> QueryResult<FilterValue> {
        self.aggregate(query, Aggregate::Min, Some(column)).await
    }

    /// `MAX(column)`.
    pub async fn max(&self, query: &QueryBuilder, column: &str) -> QueryResult<FilterValue> {
        self.aggregate(query, Aggregate::Max, Some(column)).await
    }

    /// One count query plus one limited query.
    pub async fn paginate(
        &self,
        query: &QueryBuilder,
        page: u64,
        per_page: u64,
    ) -> QueryResult<Page<Row>> {
        let request = PageRequest::new(page, per_page);
        let total = self.count(query).await?;
        let data = self
            .get(&query.clone().limit(request.per_page).offset(request.offset()))
            .await?;
        Ok(Page::new(data, total, request))
    }

    // ============== Writes ==============

    /// Insert one row.
    #[instrument(skip(self, values), fields(table = %table))]
    pub async fn insert(&self, table: &str, values: &Attributes) -> QueryResult<ExecResult> {
        let compiled = self.compiler.compile_insert(table, values, None)?;
        self.run_execute(compiled).await
    }

    /// Insert many rows in one statement. An empty slice is a no-op.
    #[instrument(skip(self, rows), fields(table = %table, rows = rows.len()))]
    pub async fn insert_batch(&self, table: &str, rows: &[Attributes]) -> QueryResult<ExecResult> {
        if rows.is_empty() {
            return Ok(ExecResult::default());
        }
        let compiled = self.compiler.compile_insert_batch(table, rows)?;
        self.run_execute(compiled).await
    }

    /// Insert one row and return its generated key.
    ///
    /// Uses `RETURNING` where the dialect has it, otherwise the row source's
    /// last-insert id.
    pub async fn insert_get_id(
        &self,
        table: &str,
        values: &Attributes,
        primary_key: &str,
    ) -> QueryResult<FilterValue> {
        let compiled = self.compiler.compile_insert(table, values, Some(primary_key))?;

        if self.dialect().supports_returning() {
            let rows = self.run_query(compiled, false).await?;
            return rows
                .into_iter()
                .next()
                .and_then(|mut row| row.remove(primary_key))
                .ok_or_else(|| {
                    QueryError::internal(format!("INSERT into '{}' returned no key", table))
                });
        }

        let result = self.run_execute(compiled).await?;
        result.last_insert_id.map(FilterValue::Int).ok_or_else(|| {
            QueryError::internal(format!("row source reported no insert id for '{}'", table))
        })
    }

    /// `UPDATE` every matching row; returns the affected count.
    #[instrument(skip(self, query, values), fields(table = ?query.table_name()))]
    pub async fn update(&self, query: &QueryBuilder, values: &Attributes) -> QueryResult<u64> {
        let compiled = self.compiler.compile_update(query, values)?;
        Ok(self.run_execute(compiled).await?.rows_affected)
    }

    /// `DELETE` every matching row; returns the affected count.
    #[instrument(skip(self, query), fields(table = ?query.table_name()))]
    pub async fn delete(&self, query: &QueryBuilder) -> QueryResult<u64> {
        let compiled = self.compiler.compile_delete(query)?;
        Ok(self.run_execute(compiled).await?.rows_affected)
    }

    /// Add `amount` to `column` on every matching row.
    pub async fn increment(
        &self,
        query: &QueryBuilder,
        column: &str,
        amount: impl Into<FilterValue>,
    ) -> QueryResult<u64> {
        self.increment_with(query, column, amount, &Attributes::new()).await
    }

    /// Add `amount` to `column` and set `extra` columns in the same statement.
    pub async fn increment_with(
        &self,
        query: &QueryBuilder,
        column: &str,
        amount: impl Into<FilterValue>,
        extra: &Attributes,
    ) -> QueryResult<u64> {
        let compiled = self.compiler.compile_increment(query, column, amount.into(), extra)?;
        Ok(self.run_execute(compiled).await?.rows_affected)
    }

    /// Subtract `amount` from `column` on every matching row.
    pub async fn decrement(
        &self,
        query: &QueryBuilder,
        column: &str,
        amount: impl Into<FilterValue>,
    ) -> QueryResult<u64> {
        self.decrement_with(query, column, amount, &Attributes::new()).await
    }

    /// Subtract `amount` from `column` and set `extra` columns.
    pub async fn decrement_with(
        &self,
        query: &QueryBuilder,
        column: &str,
        amount: impl Into<FilterValue>,
        extra: &Attributes,
    ) -> QueryResult<u64> {
        let compiled = self.compiler.compile_decrement(query, column, amount.into(), extra)?;
        Ok(self.run_execute(compiled).await?.rows_affected)
    }

    // ============== Schema ==============

    /// Run the blueprint's `CREATE TABLE`.
    pub async fn create_table(&self, blueprint: &Blueprint) -> QueryResult<()> {
        info!(table = blueprint.table(), "Creating table");
        self.execute_raw(&blueprint.to_create_sql(self.dialect()), Vec::new())
            .await?;
        Ok(())
    }

    /// Run `DROP TABLE IF EXISTS`.
    pub async fn drop_table_if_exists(&self, table: &str) -> QueryResult<()> {
        info!(table, "Dropping table");
        self.execute_raw(&drop_if_exists_sql(table, self.dialect()), Vec::new())
            .await?;
        Ok(())
    }

    // ============== Transactions ==============

    /// Run `work` inside a transaction with the default configuration.
    pub async fn transaction<F, Fut, T>(&self, work: F) -> QueryResult<T>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        self.transaction_with(&TransactionConfig::default(), work).await
    }

    /// Run `work` inside a transaction.
    ///
    /// `work` receives an engine bound to the transaction. `Ok` commits,
    /// `Err` rolls back and the error continues to the caller. Reads inside
    /// the transaction are not retried. On an engine that is already inside
    /// a transaction, `work` joins it.
    #[instrument(skip(self, config, work), fields(isolation = config.isolation.as_sql()))]
    pub async fn transaction_with<F, Fut, T>(
        &self,
        config: &TransactionConfig,
        work: F,
    ) -> QueryResult<T>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        if self.in_transaction {
            return work(self.clone()).await;
        }

        let bound = self
            .guarded(self.source.begin(config))
            .await
            .map_err(|e| e.with_context("begin transaction"))?;

        let tx = Engine {
            source: Arc::clone(&bound),
            retry: RetryConfig::disabled(),
            in_transaction: true,
            ..self.clone()
        };

        let outcome = match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, work(tx)).await {
                Ok(result) => result,
                Err(_) => Err(QueryError::timeout(limit.as_millis() as u64).with_context("transaction")),
            },
            None => work(tx).await,
        };

        match outcome {
            Ok(value) => {
                bound.commit().await.map_err(|e| e.with_context("commit transaction"))?;
                info!("Transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = bound.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                info!(error = %err, "Transaction rolled back");
                Err(err)
            }
        }
    }

    // ============== Internals ==============

    async fn guarded<T>(&self, call: BoxFuture<'_, QueryResult<T>>) -> QueryResult<T> {
        match &self.cancel {
            Some(signal) if signal.is_cancelled() => Err(QueryError::cancelled()),
            Some(signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(QueryError::cancelled()),
                    result = call => result,
                }
            }
            None => call.await,
        }
    }

    async fn run_query(&self, compiled: CompiledQuery, retry: bool) -> QueryResult<Vec<Row>> {
        let sql = compiled.finalized(self.dialect());
        let params = compiled.params;
        self.log_statement(&sql, &params);

        let started = Instant::now();
        let (result, attempts) = if retry {
            let engine = self;
            let sql_ref: &str = &sql;
            let params_ref = &params;
            self.retry
                .run(move || engine.guarded(engine.source.query(sql_ref, params_ref.clone())))
                .await
        } else {
            (self.guarded(self.source.query(&sql, params.clone())).await, 1)
        };
        self.log_elapsed(&sql, started.elapsed());

        result.map_err(|e| e.with_sql(sql).with_bindings(params).with_attempts(attempts))
    }

    async fn run_execute(&self, compiled: CompiledQuery) -> QueryResult<ExecResult> {
        let sql = compiled.finalized(self.dialect());
        let params = compiled.params;
        self.log_statement(&sql, &params);

        let started = Instant::now();
        let result = self.guarded(self.source.execute(&sql, params.clone())).await;
        self.log_elapsed(&sql, started.elapsed());

        result.map_err(|e| e.with_sql(sql).with_bindings(params).with_attempts(1))
    }

    fn log_statement(&self, sql: &str, params: &[FilterValue]) {
        if self.debug.log_queries || is_debug_enabled() {
            debug!(sql = %sql, params = ?params, "Executing statement");
        }
    }

    fn log_elapsed(&self, sql: &str, elapsed: Duration) {
        let threshold = self.debug.slow_query_threshold();
        if elapsed >= threshold {
            warn!(
                sql = %sql,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "Slow query"
            );
        }
    }
}

fn as_count(value: &FilterValue) -> u64 {
    value.as_i64().map(|n| n.max(0) as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::mock::MockRowSource;
    use pretty_assertions::assert_eq;

    fn user_rows() -> Vec<Row> {
        vec![
            Row::from_pairs([("id", FilterValue::Int(1)), ("email", "a@x.io".into())]),
            Row::from_pairs([("id", FilterValue::Int(2)), ("email", "b@x.io".into())]),
        ]
    }

    #[tokio::test]
    async fn test_get_sends_finalized_sql() {
        let mock = MockRowSource::new(Dialect::Postgres).on_query("FROM \"users\"", user_rows());
        let engine = Engine::new(mock.shared());

        let rows = engine
            .get(&QueryBuilder::table("users").r#where("active", true).where_op("id", ">", 0))
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        let statement = &mock.statements()[0];
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"users\" WHERE \"active\" = $1 AND \"id\" > $2"
        );
        assert_eq!(statement.params, vec![FilterValue::Bool(true), FilterValue::Int(0)]);
    }

    #[tokio::test]
    async fn test_first_does_not_mutate_builder() {
        let mock = MockRowSource::new(Dialect::Sqlite).on_query("users", user_rows());
        let engine = Engine::new(mock.shared());
        let query = QueryBuilder::table("users");

        let row = engine.first(&query).await.unwrap().unwrap();
        assert_eq!(row.try_get::<i64>("id").unwrap(), 1);
        assert_eq!(query.limit_value(), None);
        assert!(mock.sql_log()[0].ends_with("LIMIT 1"));
    }

    #[tokio::test]
    async fn test_first_or_fail_not_found() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());
        let err = engine.first_or_fail(&QueryBuilder::table("users")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_count_and_exists() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("COUNT(*)", vec![Row::from_pairs([("aggregate", 42)])])
            .on_query("SELECT 1", vec![Row::from_pairs([("1", 1)])]);
        let engine = Engine::new(mock.shared());
        let query = QueryBuilder::table("users").order_by_desc("id").limit(5);

        assert_eq!(engine.count(&query).await.unwrap(), 42);
        assert!(engine.exists(&query).await.unwrap());
        assert_eq!(
            mock.sql_log()[0],
            "SELECT COUNT(*) AS aggregate FROM \"users\""
        );
    }

    #[tokio::test]
    async fn test_empty_aggregates() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("aggregate", vec![Row::from_pairs([("aggregate", FilterValue::Null)])]);
        let engine = Engine::new(mock.shared());
        let query = QueryBuilder::table("orders");

        assert_eq!(engine.sum(&query, "total").await.unwrap(), 0.0);
        assert_eq!(engine.avg(&query, "total").await.unwrap(), None);
        assert_eq!(engine.max(&query, "total").await.unwrap(), FilterValue::Null);
    }

    #[tokio::test]
    async fn test_paginate_issues_two_queries() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("\"users\"", user_rows())
            .on_query("COUNT(*)", vec![Row::from_pairs([("aggregate", 5)])]);
        let engine = Engine::new(mock.shared());

        let page = engine.paginate(&QueryBuilder::table("users"), 2, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(mock.statement_count(), 2);
        assert!(mock.sql_log()[1].ends_with("LIMIT 2 OFFSET 2"));
    }

    #[tokio::test]
    async fn test_insert_get_id_per_dialect() {
        let values: Attributes = [("email".to_string(), FilterValue::from("a@x.io"))].into_iter().collect();

        let mysql = MockRowSource::new(Dialect::MySql);
        let id = Engine::new(mysql.shared()).insert_get_id("users", &values, "id").await.unwrap();
        assert_eq!(id, FilterValue::Int(1));

        let pg = MockRowSource::new(Dialect::Postgres)
            .on_query("RETURNING", vec![Row::from_pairs([("id", 77)])]);
        let id = Engine::new(pg.shared()).insert_get_id("users", &values, "id").await.unwrap();
        assert_eq!(id, FilterValue::Int(77));
        assert_eq!(
            pg.sql_log()[0],
            "INSERT INTO \"users\" (\"email\") VALUES ($1) RETURNING \"id\""
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_retry_transient_errors_with_context() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        for _ in 0..3 {
            mock.fail_next(QueryError::connection("reset by peer"));
        }
        let engine = Engine::new(mock.shared()).with_retry(RetryConfig::new().max_retries(2));

        let err = engine
            .get(&QueryBuilder::table("users").r#where("id", 9))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert_eq!(err.context.attempts, Some(3));
        assert_eq!(err.context.sql.as_deref(), Some("SELECT * FROM \"users\" WHERE \"id\" = ?"));
        assert_eq!(err.context.bindings, Some(vec![FilterValue::Int(9)]));
        assert_eq!(mock.statement_count(), 3);
    }

    #[tokio::test]
    async fn test_writes_are_not_retried() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        mock.fail_next(QueryError::connection("reset by peer"));
        let engine = Engine::new(mock.shared());

        let err = engine.delete(&QueryBuilder::table("users").r#where("id", 1)).await.unwrap_err();
        assert_eq!(err.context.attempts, Some(1));
        assert_eq!(mock.statement_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_operator_never_reaches_source() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());

        let err = engine
            .get(&QueryBuilder::table("users").where_op("id", "; DROP", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOperator);
        assert_eq!(mock.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_transaction_commits_on_ok() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());

        let affected = engine
            .transaction(|tx| async move {
                assert!(tx.in_transaction());
                tx.delete(&QueryBuilder::table("sessions")).await
            })
            .await
            .unwrap();

        assert_eq!(affected, 1);
        assert_eq!(
            mock.sql_log(),
            vec!["BEGIN", "DELETE FROM \"sessions\"", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_err() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());

        let result: QueryResult<()> = engine
            .transaction(|tx| async move {
                tx.delete(&QueryBuilder::table("sessions")).await?;
                Err(QueryError::internal("boom"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(mock.sql_log().last().map(String::as_str), Some("ROLLBACK"));
        assert_eq!(mock.count_starting_with("COMMIT"), 0);
    }

    #[tokio::test]
    async fn test_nested_transaction_joins_outer() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());

        engine
            .transaction(|tx| async move {
                tx.transaction(|inner| async move {
                    inner.delete(&QueryBuilder::table("t")).await
                })
                .await
            })
            .await
            .unwrap();

        assert_eq!(mock.count_starting_with("BEGIN"), 1);
        assert_eq!(mock.count_starting_with("COMMIT"), 1);
    }

    #[tokio::test]
    async fn test_cancelled_engine_fails_fast() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let signal = CancelSignal::new();
        let engine = Engine::new(mock.shared()).with_cancel(signal.clone());
        signal.cancel();

        let err = engine.get(&QueryBuilder::table("users")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Cancelled);
        assert_eq!(mock.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_from_config_checks_dialect() {
        let config: QuarryConfig = "[database]\ndialect = \"postgres\"\n".parse().unwrap();
        let mock = MockRowSource::new(Dialect::Sqlite);
        assert!(Engine::from_config(mock.shared(), &config).unwrap_err().is_configuration());

        let mock = MockRowSource::new(Dialect::Postgres);
        assert!(Engine::from_config(mock.shared(), &config).is_ok());
    }

    #[tokio::test]
    async fn test_create_and_drop_table() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());

        engine
            .create_table(&Blueprint::new("tags").increments("id").string("name", 50))
            .await
            .unwrap();
        engine.drop_table_if_exists("tags").await.unwrap();

        assert!(mock.sql_log()[0].starts_with("CREATE TABLE IF NOT EXISTS \"tags\""));
        assert_eq!(mock.sql_log()[1], "DROP TABLE IF EXISTS \"tags\"");
    }
}
