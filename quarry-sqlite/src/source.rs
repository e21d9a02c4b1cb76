//! [`RowSource`] over a single `tokio-rusqlite` connection.

use std::sync::Arc;

use parking_lot::Mutex;
use quarry_query::error::{QueryError, QueryResult};
use quarry_query::filter::FilterValue;
use quarry_query::row::{Attributes, Row};
use quarry_query::sql::Dialect;
use quarry_query::traits::{BoxFuture, ExecResult, RowSource};
use quarry_query::transaction::TransactionConfig;
use rusqlite::params_from_iter;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_rusqlite::Connection;
use tracing::{debug, info, trace, warn};

use crate::config::SqliteConfig;
use crate::error::map_error;
use crate::types::{from_sqlite, to_sqlite};

/// Exclusive hold on the connection for the life of one transaction.
type TransactionSlot = Arc<Mutex<Option<OwnedSemaphorePermit>>>;

/// A SQLite database reached through one background connection.
///
/// Clones share the connection. A handle returned by
/// [`begin`](RowSource::begin) owns the connection until it commits or rolls
/// back; statements issued through any other clone wait for it to finish.
#[derive(Clone)]
pub struct SqliteRowSource {
    conn: Connection,
    config: Arc<SqliteConfig>,
    gate: Arc<Semaphore>,
    transaction: Option<TransactionSlot>,
}

impl std::fmt::Debug for SqliteRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRowSource")
            .field("path", &self.config.path.as_str())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl SqliteRowSource {
    /// Open a database with the given settings.
    pub async fn connect(config: SqliteConfig) -> QueryResult<Self> {
        let conn = if config.path.is_memory() {
            Connection::open_in_memory().await
        } else {
            Connection::open(config.path.as_str()).await
        }
        .map_err(|e| map_error(e).with_context(format!("open {}", config.path.as_str())))?;

        let init_sql = config.init_sql();
        conn.call(move |conn| {
            conn.execute_batch(&init_sql)?;
            Ok(())
        })
        .await
        .map_err(map_error)?;

        info!(path = %config.path.as_str(), "SQLite row source opened");
        Ok(Self {
            conn,
            config: Arc::new(config),
            gate: Arc::new(Semaphore::new(1)),
            transaction: None,
        })
    }

    /// Open a database from a URL such as `sqlite://app.db` or `sqlite::memory:`.
    pub async fn open_url(url: &str) -> QueryResult<Self> {
        Self::connect(SqliteConfig::from_url(url)?).await
    }

    /// Open a database file with default settings.
    pub async fn open(path: impl AsRef<std::path::Path>) -> QueryResult<Self> {
        Self::connect(SqliteConfig::file(path)).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> QueryResult<Self> {
        Self::connect(SqliteConfig::memory()).await
    }

    /// This source as a shared trait object, ready for an `Engine`.
    pub fn shared(&self) -> Arc<dyn RowSource> {
        Arc::new(self.clone())
    }

    /// The settings the connection was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Whether this handle holds an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|slot| slot.lock().is_some())
    }

    /// Run several `;`-separated statements without parameters.
    pub async fn execute_batch(&self, sql: &str) -> QueryResult<()> {
        let _permit = self.acquire().await?;
        let sql = sql.to_string();
        debug!(sql = %sql, "Executing batch");
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(map_error)
    }

    /// Wait for the connection unless this handle already owns it.
    async fn acquire(&self) -> QueryResult<Option<OwnedSemaphorePermit>> {
        if self.in_transaction() {
            return Ok(None);
        }
        Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|_| QueryError::connection("SQLite connection gate closed"))
    }

    async fn run_query(&self, sql: &str, params: &[FilterValue]) -> QueryResult<Vec<Row>> {
        let owned = sql.to_string();
        let values: Vec<_> = params.iter().map(to_sqlite).collect();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&owned)?;
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|s| s.to_string()).collect();

                let mut rows = stmt.query(params_from_iter(values))?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    let mut values = Attributes::with_capacity(columns.len());
                    for (i, column) in columns.iter().enumerate() {
                        values.insert(column.clone(), from_sqlite(row.get_ref(i)?));
                    }
                    out.push(Row::new(values));
                }
                Ok(out)
            })
            .await
            .map_err(map_error)
    }

    async fn run_execute(&self, sql: &str, params: &[FilterValue]) -> QueryResult<ExecResult> {
        let owned = sql.to_string();
        let values: Vec<_> = params.iter().map(to_sqlite).collect();
        let is_insert = sql.trim_start().get(..6).is_some_and(|s| s.eq_ignore_ascii_case("INSERT"));

        self.conn
            .call(move |conn| {
                let affected = conn.execute(&owned, params_from_iter(values))?;
                Ok(ExecResult {
                    rows_affected: affected as u64,
                    last_insert_id: is_insert.then(|| conn.last_insert_rowid()),
                })
            })
            .await
            .map_err(map_error)
    }

    /// Run `COMMIT` or `ROLLBACK` and hand the connection back.
    async fn finish(&self, statement: &'static str) -> QueryResult<()> {
        let Some(slot) = &self.transaction else {
            return Err(QueryError::transaction("handle is not bound to a transaction"));
        };
        if slot.lock().is_none() {
            return Err(QueryError::transaction("transaction already finished"));
        }

        let result = self.run_execute(statement, &[]).await.map(|_| ());
        if result.is_err() && statement == "COMMIT" {
            if let Err(err) = self.run_execute("ROLLBACK", &[]).await {
                warn!(error = %err, "Rollback after failed commit failed");
            }
        }
        slot.lock().take();
        debug!(statement, "Transaction finished");
        result
    }
}

impl RowSource for SqliteRowSource {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: Vec<FilterValue>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        Box::pin(async move {
            let _permit = self.acquire().await?;
            debug!(sql = %sql, params = params.len(), "Executing query");
            let rows = self.run_query(sql, &params).await?;
            trace!(rows = rows.len(), "Query returned");
            Ok(rows)
        })
    }

    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: Vec<FilterValue>,
    ) -> BoxFuture<'a, QueryResult<ExecResult>> {
        Box::pin(async move {
            if self.transaction.is_some() {
                let statement = sql.trim().trim_end_matches(';');
                if statement.eq_ignore_ascii_case("COMMIT") {
                    return self.finish("COMMIT").await.map(|_| ExecResult::default());
                }
                if statement.eq_ignore_ascii_case("ROLLBACK") {
                    return self.finish("ROLLBACK").await.map(|_| ExecResult::default());
                }
            }
            let _permit = self.acquire().await?;
            debug!(sql = %sql, params = params.len(), "Executing statement");
            self.run_execute(sql, &params).await
        })
    }

    fn begin<'a>(
        &'a self,
        config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn RowSource>>> {
        Box::pin(async move {
            if self.in_transaction() {
                return Err(QueryError::transaction("transaction already open on this handle"));
            }
            let permit = Arc::clone(&self.gate)
                .acquire_owned()
                .await
                .map_err(|_| QueryError::connection("SQLite connection gate closed"))?;

            // A handle dropped without commit or rollback leaves its transaction open.
            let abandoned = self
                .conn
                .call(|conn| {
                    let open = !conn.is_autocommit();
                    if open {
                        conn.execute_batch("ROLLBACK")?;
                    }
                    Ok(open)
                })
                .await
                .map_err(map_error)?;
            if abandoned {
                warn!("Rolled back a transaction abandoned by a dropped handle");
            }

            for statement in config.begin_statements(Dialect::Sqlite) {
                debug!(sql = %statement, "Opening transaction");
                self.run_execute(&statement, &[]).await?;
            }
            let bound = Self {
                transaction: Some(Arc::new(Mutex::new(Some(permit)))),
                ..self.clone()
            };
            Ok(Arc::new(bound) as Arc<dyn RowSource>)
        })
    }

    fn commit(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(self.finish("COMMIT"))
    }

    fn rollback(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(self.finish("ROLLBACK"))
    }
}
