//! Transaction configuration.
//!
//! Set `QUARRY_DEBUG=true` to enable transaction debug logging.
//!
//! The unit-of-work API lives on [`Engine::transaction`](crate::engine::Engine::transaction):
//! begin, run the closure against an engine bound to the transaction, commit
//! on `Ok`, roll back on `Err`.
//!
//! # Isolation Levels
//!
//! ```rust
//! use quarry_query::transaction::IsolationLevel;
//!
//! assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
//! assert_eq!(IsolationLevel::ReadCommitted.as_sql(), "READ COMMITTED");
//! ```
//!
//! # Transaction Configuration
//!
//! ```rust
//! use quarry_query::transaction::{IsolationLevel, TransactionConfig};
//! use quarry_query::Dialect;
//!
//! let config = TransactionConfig::new().isolation(IsolationLevel::Serializable);
//! assert_eq!(
//!     config.begin_statements(Dialect::MySql),
//!     vec!["SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ WRITE", "START TRANSACTION"]
//! );
//! assert_eq!(config.begin_statements(Dialect::Sqlite), vec!["BEGIN"]);
//! ```

use std::time::Duration;

use tracing::debug;

use crate::sql::Dialect;

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    /// Read uncommitted - allows dirty reads.
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    #[default]
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause for this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default).
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
}

impl AccessMode {
    /// Get the SQL clause for this access mode.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadWrite => "READ WRITE",
            Self::ReadOnly => "READ ONLY",
        }
    }
}

/// Configuration for a transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// Isolation level.
    pub isolation: IsolationLevel,
    /// Access mode.
    pub access_mode: AccessMode,
    /// Upper bound for the unit of work; exceeding it rolls back.
    pub timeout: Option<Duration>,
    /// Whether to defer constraint checking.
    pub deferrable: bool,
}

impl TransactionConfig {
    /// Create a new transaction config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Make the transaction read-only.
    pub fn read_only(self) -> Self {
        self.access_mode(AccessMode::ReadOnly)
    }

    /// Make the transaction deferrable.
    pub fn deferrable(mut self) -> Self {
        self.deferrable = true;
        self
    }

    /// Statements that open the transaction on `dialect`.
    ///
    /// SQLite transactions are always serializable, so isolation and access
    /// mode are not rendered there.
    pub fn begin_statements(&self, dialect: Dialect) -> Vec<String> {
        debug!(
            isolation = %self.isolation.as_sql(),
            access_mode = %self.access_mode.as_sql(),
            dialect = dialect.as_str(),
            "Transaction BEGIN"
        );

        match dialect {
            Dialect::Postgres => {
                let mut parts = vec![
                    "BEGIN ISOLATION LEVEL",
                    self.isolation.as_sql(),
                    self.access_mode.as_sql(),
                ];
                // only valid for SERIALIZABLE READ ONLY
                if self.deferrable
                    && self.isolation == IsolationLevel::Serializable
                    && self.access_mode == AccessMode::ReadOnly
                {
                    parts.push("DEFERRABLE");
                }
                vec![parts.join(" ")]
            }
            Dialect::MySql => vec![
                format!(
                    "SET TRANSACTION ISOLATION LEVEL {}, {}",
                    self.isolation.as_sql(),
                    self.access_mode.as_sql()
                ),
                "START TRANSACTION".to_string(),
            ],
            Dialect::Sqlite => vec!["BEGIN".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_config_default() {
        let config = TransactionConfig::new();
        assert_eq!(config.isolation, IsolationLevel::ReadCommitted);
        assert_eq!(config.access_mode, AccessMode::ReadWrite);
        assert!(config.timeout.is_none());
        assert!(!config.deferrable);
    }

    #[test]
    fn test_transaction_config_builder() {
        let config = TransactionConfig::new()
            .isolation(IsolationLevel::Serializable)
            .read_only()
            .deferrable()
            .timeout(Duration::from_secs(30));

        assert_eq!(config.isolation, IsolationLevel::Serializable);
        assert_eq!(config.access_mode, AccessMode::ReadOnly);
        assert!(config.deferrable);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_begin_postgres() {
        let sql = TransactionConfig::new().begin_statements(Dialect::Postgres);
        assert_eq!(sql, vec!["BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE"]);
    }

    #[test]
    fn test_begin_postgres_serializable_deferrable() {
        let sql = TransactionConfig::new()
            .isolation(IsolationLevel::Serializable)
            .read_only()
            .deferrable()
            .begin_statements(Dialect::Postgres);
        assert_eq!(sql, vec!["BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"]);
    }

    #[test]
    fn test_deferrable_ignored_unless_serializable_read_only() {
        let sql = TransactionConfig::new().deferrable().begin_statements(Dialect::Postgres);
        assert!(!sql[0].contains("DEFERRABLE"));
    }
}
