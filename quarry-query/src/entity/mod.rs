//! Persistent entities: model declarations, state tracking and lifecycle.
//!
//! A model is a marker type implementing [`Model`]: table, key, fillable
//! columns, behaviour flags and a statically declared relation table. Rows
//! of that model are handled as [`Record<M>`](record::Record), a typed view
//! over an [`EntityState`](state::EntityState).
//!
//! ```rust,ignore
//! use quarry_query::prelude::*;
//!
//! struct User;
//!
//! impl Model for User {
//!     const MODEL_NAME: &'static str = "User";
//!     const TABLE_NAME: &'static str = "users";
//!     const FILLABLE: &'static [&'static str] = &["email", "name"];
//!     const RULES: &'static [(&'static str, &'static str)] = &[("email", "required|email")];
//!     const SOFT_DELETES: bool = true;
//!
//!     fn relations() -> Relations {
//!         Relations::new()
//!             .with(RelationDescriptor::has_many::<Self, Post>("posts").on_delete(OnDelete::Cascade))
//!     }
//! }
//!
//! let mut user = Record::<User>::create(&engine, attrs! { "email" => "ada@example.com" }).await?;
//! user.set("name", "Ada");
//! user.save(&engine).await?;
//! ```

pub mod cascade;
pub mod hooks;
pub mod lifecycle;
pub mod query;
pub mod record;
pub mod state;
pub mod validation;

use std::sync::Arc;

use crate::engine::Engine;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::relations::{RelationDescriptor, Relations};

use self::hooks::Hooks;
use self::query::ModelQuery;
use self::validation::Validator;

/// Format used for `created_at`, `updated_at` and `deleted_at` stamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column stamped on insert.
pub const CREATED_AT: &str = "created_at";
/// Column stamped on every write.
pub const UPDATED_AT: &str = "updated_at";
/// Soft-delete marker column.
pub const DELETED_AT: &str = "deleted_at";

/// Current time formatted with [`TIMESTAMP_FORMAT`].
pub fn now_stamp() -> FilterValue {
    FilterValue::String(chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string())
}

/// Static declaration of a persistent entity type.
pub trait Model: Sized + Send + Sync + 'static {
    /// Human-readable model name, also stored in polymorphic type columns.
    const MODEL_NAME: &'static str;
    /// Backing table.
    const TABLE_NAME: &'static str;
    /// Primary key column.
    const PRIMARY_KEY: &'static str = "id";
    /// Columns accepted by `create`/`fill`. Empty accepts every column.
    const FILLABLE: &'static [&'static str] = &[];
    /// Columns that keep blank values on create instead of dropping them.
    const NULLABLE: &'static [&'static str] = &[];
    /// `(field, "rule|rule:arg")` pairs checked before every write.
    const RULES: &'static [(&'static str, &'static str)] = &[];
    /// Stamp `created_at`/`updated_at`.
    const TIMESTAMPS: bool = true;
    /// Route `delete` through a `deleted_at` stamp.
    const SOFT_DELETES: bool = false;
    /// Column used by `find` for non-numeric keys.
    const SLUG_COLUMN: Option<&'static str> = None;

    /// The relation table.
    fn relations() -> Relations {
        Relations::new()
    }

    /// A custom validator, run after `RULES`.
    fn validator() -> Option<Arc<dyn Validator>> {
        None
    }

    /// Lifecycle hooks.
    fn hooks() -> Hooks {
        Hooks::new()
    }

    /// Type-erased description of this model.
    fn info() -> ModelInfo {
        ModelInfo {
            name: Self::MODEL_NAME,
            table: Self::TABLE_NAME,
            primary_key: Self::PRIMARY_KEY,
            fillable: Self::FILLABLE,
            nullable: Self::NULLABLE,
            rules: Self::RULES,
            timestamps: Self::TIMESTAMPS,
            soft_deletes: Self::SOFT_DELETES,
            slug_column: Self::SLUG_COLUMN,
            relations: Self::relations,
            validator: Self::validator,
            hooks: Self::hooks,
        }
    }

    /// Start a typed query with the default scope.
    fn query(engine: &Engine) -> ModelQuery<Self> {
        ModelQuery::new(engine.clone())
    }
}

/// Runtime copy of a [`Model`] declaration.
///
/// Relations and the cascade resolver work across model types, so they
/// carry this instead of a type parameter.
#[derive(Clone)]
pub struct ModelInfo {
    /// Model name.
    pub name: &'static str,
    /// Table name.
    pub table: &'static str,
    /// Primary key column.
    pub primary_key: &'static str,
    /// Fillable columns; empty means all.
    pub fillable: &'static [&'static str],
    /// Columns that keep blank values.
    pub nullable: &'static [&'static str],
    /// Validation rules.
    pub rules: &'static [(&'static str, &'static str)],
    /// Timestamps enabled.
    pub timestamps: bool,
    /// Soft deletes enabled.
    pub soft_deletes: bool,
    /// Slug column for `find`.
    pub slug_column: Option<&'static str>,
    relations: fn() -> Relations,
    validator: fn() -> Option<Arc<dyn Validator>>,
    hooks: fn() -> Hooks,
}

impl std::fmt::Debug for ModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInfo")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("timestamps", &self.timestamps)
            .field("soft_deletes", &self.soft_deletes)
            .finish_non_exhaustive()
    }
}

impl ModelInfo {
    /// The declared relations.
    pub fn relations(&self) -> Relations {
        (self.relations)()
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> QueryResult<RelationDescriptor> {
        self.relations()
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::unknown_relation(self.name, name))
    }

    /// The custom validator, if any.
    pub fn validator(&self) -> Option<Arc<dyn Validator>> {
        (self.validator)()
    }

    /// The hook registry.
    pub fn hooks(&self) -> Hooks {
        (self.hooks)()
    }

    /// Whether `column` may be mass-assigned.
    pub fn is_fillable(&self, column: &str) -> bool {
        self.fillable.is_empty() || self.fillable.contains(&column)
    }

    /// Whether `column` keeps blank values on create.
    pub fn is_nullable(&self, column: &str) -> bool {
        self.nullable.contains(&column)
    }

    /// `table.column`.
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }
}

/// How a `find` argument is interpreted.
///
/// Policy: integers, and non-empty strings made only of ASCII digits, are
/// primary keys. Any other string is a slug when the model declares a slug
/// column, and a primary key otherwise. A slug that is itself all digits
/// therefore cannot be reached through `find`; use `find_by_slug`.
#[derive(Debug, Clone, PartialEq)]
pub enum FindKey {
    /// Look up by primary key.
    PrimaryKey(FilterValue),
    /// Look up by slug column.
    Slug(String),
}

impl FindKey {
    /// Classify `value` for a model with the given slug column.
    pub fn classify(value: FilterValue, slug_column: Option<&str>) -> Self {
        match value {
            FilterValue::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                match s.parse::<i64>() {
                    Ok(n) => Self::PrimaryKey(FilterValue::Int(n)),
                    Err(_) => Self::PrimaryKey(FilterValue::String(s)),
                }
            }
            FilterValue::String(s) if slug_column.is_some() => Self::Slug(s),
            other => Self::PrimaryKey(other),
        }
    }
}
