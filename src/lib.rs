//! # Quarry
//!
//! An async query builder and entity layer for Rust.
//!
//! Quarry provides:
//! - A fluent query builder compiled to parameterized SQL for PostgreSQL,
//!   MySQL and SQLite
//! - Models with dirty tracking, timestamps, soft deletes, hooks and validation
//! - Relations with batched eager loading and pivot maintenance
//! - Transactions that commit on `Ok` and roll back on `Err`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use quarry_orm::prelude::*;
//! use quarry_orm::sqlite::SqliteRowSource;
//!
//! struct User;
//!
//! impl Model for User {
//!     const MODEL_NAME: &'static str = "User";
//!     const TABLE_NAME: &'static str = "users";
//!     const FILLABLE: &'static [&'static str] = &["email", "name"];
//!     const SOFT_DELETES: bool = true;
//! }
//!
//! #[tokio::main]
//! async fn main() -> QueryResult<()> {
//!     let source = SqliteRowSource::open("app.db").await?;
//!     let engine = Engine::new(source.shared());
//!
//!     let user = Record::<User>::create(&engine, attrs! { "email" => "ada@example.com" }).await?;
//!     let recent = User::query(&engine).latest("created_at").take(10).get().await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use quarry_query::*;

/// SQLite row source.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use quarry_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use quarry_query::prelude::*;

    #[cfg(feature = "sqlite")]
    pub use quarry_sqlite::SqliteRowSource;
}
