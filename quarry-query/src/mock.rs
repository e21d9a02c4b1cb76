//! A recording row source for tests.
//!
//! Every statement is logged with its parameters, so tests can assert both
//! the SQL text and how many round trips an operation made. Replies come
//! from scripted responders matched against the SQL text.
//!
//! ```rust,ignore
//! use quarry_query::mock::MockRowSource;
//! use quarry_query::prelude::*;
//!
//! let mock = MockRowSource::new(Dialect::Sqlite)
//!     .on_query("FROM \"users\"", vec![Row::from_pairs([("id", 1)])]);
//! let engine = Engine::new(mock.shared());
//!
//! let rows = engine.get(&QueryBuilder::table("users")).await?;
//! assert_eq!(rows.len(), 1);
//! assert_eq!(mock.statement_count(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::row::Row;
use crate::sql::Dialect;
use crate::traits::{BoxFuture, ExecResult, RowSource};
use crate::transaction::TransactionConfig;

type Responder = Box<dyn Fn(&str, &[FilterValue]) -> Option<Vec<Row>> + Send + Sync>;

/// One statement seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    /// SQL text as received.
    pub sql: String,
    /// Parameters as received.
    pub params: Vec<FilterValue>,
}

struct Inner {
    dialect: Dialect,
    log: Mutex<Vec<RecordedStatement>>,
    responders: Mutex<Vec<Responder>>,
    failures: Mutex<VecDeque<QueryError>>,
    next_id: AtomicI64,
    rows_affected: AtomicI64,
}

/// Recording, scriptable [`RowSource`]. Clones share the log and script.
#[derive(Clone)]
pub struct MockRowSource {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MockRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRowSource")
            .field("dialect", &self.inner.dialect)
            .field("statements", &self.inner.log.lock().len())
            .finish()
    }
}

impl MockRowSource {
    /// Create a mock speaking `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialect,
                log: Mutex::new(Vec::new()),
                responders: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
                next_id: AtomicI64::new(1),
                rows_affected: AtomicI64::new(1),
            }),
        }
    }

    /// This mock as a shared row source.
    pub fn shared(&self) -> Arc<dyn RowSource> {
        Arc::new(self.clone())
    }

    /// Reply with `rows` to every query whose SQL contains `fragment`.
    ///
    /// Responders registered later take precedence.
    pub fn on_query(self, fragment: impl Into<String>, rows: Vec<Row>) -> Self {
        let fragment = fragment.into();
        self.respond_with(move |sql, _| sql.contains(&fragment).then(|| rows.clone()))
    }

    /// Register a responder closure; returning `None` falls through.
    pub fn respond_with<F>(self, responder: F) -> Self
    where
        F: Fn(&str, &[FilterValue]) -> Option<Vec<Row>> + Send + Sync + 'static,
    {
        self.inner.responders.lock().push(Box::new(responder));
        self
    }

    /// Fail the next statement (query or execute) with `error`.
    pub fn fail_next(&self, error: QueryError) {
        self.inner.failures.lock().push_back(error);
    }

    /// Rows-affected count reported by `execute`.
    pub fn set_rows_affected(&self, n: i64) {
        self.inner.rows_affected.store(n, Ordering::SeqCst);
    }

    /// Every statement seen so far.
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.inner.log.lock().clone()
    }

    /// SQL text of every statement seen so far.
    pub fn sql_log(&self) -> Vec<String> {
        self.inner.log.lock().iter().map(|s| s.sql.clone()).collect()
    }

    /// Number of statements seen so far.
    pub fn statement_count(&self) -> usize {
        self.inner.log.lock().len()
    }

    /// Number of statements whose SQL starts with `prefix` (case-insensitive).
    pub fn count_starting_with(&self, prefix: &str) -> usize {
        let prefix = prefix.to_uppercase();
        self.inner
            .log
            .lock()
            .iter()
            .filter(|s| s.sql.to_uppercase().starts_with(&prefix))
            .count()
    }

    /// Forget recorded statements; the script is kept.
    pub fn clear(&self) {
        self.inner.log.lock().clear();
    }

    fn record(&self, sql: &str, params: &[FilterValue]) -> QueryResult<()> {
        self.inner.log.lock().push(RecordedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match self.inner.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reply(&self, sql: &str, params: &[FilterValue]) -> Vec<Row> {
        self.inner
            .responders
            .lock()
            .iter()
            .rev()
            .find_map(|responder| responder(sql, params))
            .unwrap_or_default()
    }
}

impl RowSource for MockRowSource {
    fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: Vec<FilterValue>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        Box::pin(async move {
            self.record(sql, &params)?;
            Ok(self.reply(sql, &params))
        })
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: Vec<FilterValue>,
    ) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            self.record(sql, &params)?;
            let is_insert = sql.trim_start().to_uppercase().starts_with("INSERT");
            Ok(ExecResult {
                rows_affected: self.inner.rows_affected.load(Ordering::SeqCst).max(0) as u64,
                last_insert_id: is_insert
                    .then(|| self.inner.next_id.fetch_add(1, Ordering::SeqCst)),
            })
        })
    }

    fn begin<'a>(
        &'a self,
        config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn RowSource>>> {
        Box::pin(async move {
            for statement in config.begin_statements(self.inner.dialect) {
                self.execute(&statement, Vec::new()).await?;
            }
            Ok(self.shared())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_and_replies() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("users", vec![Row::from_pairs([("id", 1)])])
            .on_query("users WHERE", vec![]);

        let rows = mock.query("SELECT * FROM users", vec![]).await.unwrap();
        assert_eq!(rows.len(), 1);

        let rows = mock.query("SELECT * FROM users WHERE id = ?", vec![2.into()]).await.unwrap();
        assert!(rows.is_empty());

        assert_eq!(mock.statement_count(), 2);
        assert_eq!(mock.statements()[1].params, vec![FilterValue::Int(2)]);
    }

    #[tokio::test]
    async fn test_scripted_failure_and_insert_ids() {
        let mock = MockRowSource::new(Dialect::MySql);
        mock.fail_next(QueryError::connection("gone"));

        assert!(mock.execute("DELETE FROM t", vec![]).await.is_err());
        let first = mock.execute("INSERT INTO t VALUES (1)", vec![]).await.unwrap();
        let second = mock.execute("insert into t values (2)", vec![]).await.unwrap();
        assert_eq!(first.last_insert_id, Some(1));
        assert_eq!(second.last_insert_id, Some(2));
        assert_eq!(mock.count_starting_with("insert"), 2);
    }
}
