//! The row-source contract consumed by the execution bridge.
//!
//! A row source owns connectivity. The core only ever hands it finalized SQL
//! text and parameters in placeholder order, and asks it to open a
//! transaction scope.

use std::sync::Arc;

pub use futures::future::BoxFuture;

use crate::error::QueryResult;
use crate::filter::FilterValue;
use crate::row::Row;
use crate::sql::{escape_identifier, Dialect};
use crate::transaction::TransactionConfig;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Generated key of the last inserted row, if the engine reports one.
    pub last_insert_id: Option<i64>,
}

/// A database connection (or pool) that executes compiled statements.
pub trait RowSource: Send + Sync {
    /// The SQL dialect this source speaks.
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns rows.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: Vec<FilterValue>,
    ) -> BoxFuture<'a, QueryResult<Vec<Row>>>;

    /// Run a statement that returns no rows.
    fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: Vec<FilterValue>,
    ) -> BoxFuture<'a, QueryResult<ExecResult>>;

    /// Open a transaction and return a source bound to it.
    ///
    /// Every statement issued through the returned source runs inside the
    /// transaction until [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback) is called on it.
    fn begin<'a>(
        &'a self,
        config: &'a TransactionConfig,
    ) -> BoxFuture<'a, QueryResult<Arc<dyn RowSource>>>;

    /// Commit the transaction this source is bound to.
    fn commit(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move {
            self.execute("COMMIT", Vec::new()).await?;
            Ok(())
        })
    }

    /// Roll back the transaction this source is bound to.
    fn rollback(&self) -> BoxFuture<'_, QueryResult<()>> {
        Box::pin(async move {
            self.execute("ROLLBACK", Vec::new()).await?;
            Ok(())
        })
    }

    /// Quote an identifier for this source's dialect.
    fn quote_identifier(&self, name: &str) -> String {
        escape_identifier(name, self.dialect())
    }
}
