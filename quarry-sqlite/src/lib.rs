//! SQLite row source for the Quarry ORM.
//!
//! Statements run on a single `tokio-rusqlite` connection, which executes
//! them on a dedicated thread. There is no pool: open one source per
//! database and share it through an [`Engine`](quarry_query::Engine).
//!
//! # Example
//!
//! ```rust,no_run
//! use quarry_query::prelude::*;
//! use quarry_sqlite::SqliteRowSource;
//!
//! # async fn run() -> QueryResult<()> {
//! let source = SqliteRowSource::open_url("sqlite://./app.db?busy_timeout=2000").await?;
//! let engine = Engine::new(source.shared());
//!
//! let active = engine.count(&engine.table("users").r#where("active", true)).await?;
//! # let _ = active;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use error::map_error;
pub use source::SqliteRowSource;
