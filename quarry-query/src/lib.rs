//! # quarry-query
//!
//! Query builder and entity layer for the Quarry ORM.
//!
//! This crate provides:
//! - A fluent, immutable [`QueryBuilder`] compiled to parameterized SQL per [`Dialect`]
//! - An async [`Engine`] that runs compiled queries against any [`RowSource`]
//! - Transactions with commit on `Ok` and rollback on `Err`
//! - Entities: [`Model`] declarations, dirty tracking, soft deletes, hooks and validation
//! - Relations with batched eager loading, pivot maintenance and delete rules
//! - Offset pagination and schema blueprints
//!
//! ## Building queries
//!
//! ```rust
//! use quarry_query::prelude::*;
//!
//! let query = QueryBuilder::table("users")
//!     .r#where("active", true)
//!     .where_in("role", ["admin", "editor"])
//!     .order_by_desc("created_at")
//!     .limit(10);
//!
//! let compiled = query.to_sql(Dialect::Postgres).unwrap();
//! assert_eq!(
//!     compiled.finalized(Dialect::Postgres),
//!     "SELECT * FROM \"users\" WHERE \"active\" = $1 AND \"role\" IN ($2, $3) \
//!      ORDER BY \"created_at\" DESC LIMIT 10"
//! );
//! assert_eq!(compiled.params.len(), 3);
//! ```
//!
//! ## Running queries
//!
//! ```rust,ignore
//! use quarry_query::prelude::*;
//!
//! let engine = Engine::new(source);
//! let users = engine.get(&engine.table("users").r#where("active", true)).await?;
//!
//! engine
//!     .transaction(|tx| async move {
//!         tx.insert("audit", &attrs! { "event" => "login" }).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```
//!
//! ## Filter values
//!
//! ```rust
//! use quarry_query::FilterValue;
//!
//! let val: FilterValue = 42.into();
//! assert!(matches!(val, FilterValue::Int(42)));
//!
//! let val: FilterValue = None::<String>.into();
//! assert!(val.is_null());
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

pub mod cancel;
pub mod compiler;
pub mod config;
pub mod cte;
pub mod engine;
pub mod entity;
pub mod error;
pub mod filter;
pub mod inflect;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;
pub mod pagination;
pub mod query;
pub mod relations;
pub mod retry;
pub mod row;
pub mod schema;
pub mod sql;
pub mod traits;
pub mod transaction;
pub mod types;

pub use cancel::CancelSignal;
pub use compiler::{CompiledQuery, Compiler};
pub use config::QuarryConfig;
pub use cte::{Cte, Materialized, Union};
pub use engine::Engine;
pub use entity::hooks::{HookEvent, Hooks};
pub use entity::query::{ModelQuery, TrashedScope};
pub use entity::record::Record;
pub use entity::state::{EntityState, RelationValue};
pub use entity::validation::{RuleRegistry, RuleSet, Validator};
pub use entity::{FindKey, Model, ModelInfo};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult, ValidationErrors};
pub use filter::{Connector, FilterValue, LookupKey, Operator, Predicate, PredicateNode};
pub use pagination::{Page, PageRequest};
pub use query::QueryBuilder;
pub use relations::{
    EagerLoad, OnDelete, Pivot, PivotSpec, RelationDescriptor, RelationKind, Relations, SyncResult,
};
pub use retry::RetryConfig;
pub use row::{Attributes, FromColumn, FromRow, Row};
pub use schema::{Blueprint, ColumnType};
pub use sql::Dialect;
pub use traits::{BoxFuture, ExecResult, RowSource};
pub use transaction::{AccessMode, IsolationLevel, TransactionConfig};
pub use types::{JoinType, SortOrder};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::compiler::{CompiledQuery, Compiler};
    pub use crate::engine::Engine;
    pub use crate::entity::hooks::{HookEvent, Hooks};
    pub use crate::entity::query::ModelQuery;
    pub use crate::entity::record::Record;
    pub use crate::entity::{Model, ModelInfo};
    pub use crate::error::{ErrorCode, QueryError, QueryResult};
    pub use crate::filter::{FilterValue, Operator};
    pub use crate::pagination::Page;
    pub use crate::query::QueryBuilder;
    pub use crate::relations::{EagerLoad, OnDelete, RelationDescriptor, Relations};
    pub use crate::row::{Attributes, Row};
    pub use crate::schema::Blueprint;
    pub use crate::sql::Dialect;
    pub use crate::traits::{ExecResult, RowSource};
    pub use crate::transaction::TransactionConfig;
    pub use crate::types::SortOrder;
    pub use crate::{attrs, predicate};
}
