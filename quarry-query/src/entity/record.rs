//! Typed entity handle.

use std::fmt;
use std::marker::PhantomData;

use crate::engine::Engine;
use crate::error::{QueryError, QueryResult};
use crate::filter::FilterValue;
use crate::relations::{EagerLoad, Pivot, load_relations};
use crate::row::{Attributes, FromColumn, Row};

use super::state::{EntityState, RelationValue};
use super::{DELETED_AT, Model, lifecycle};

/// One row of model `M`.
///
/// Attributes live in a single typed map; there are no per-column
/// accessors. Writes go through an explicit [`Engine`].
pub struct Record<M: Model> {
    state: EntityState,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("model", &M::MODEL_NAME)
            .field("state", &self.state)
            .finish()
    }
}

impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self::from_state(self.state.clone())
    }
}

impl<M: Model> PartialEq for Record<M> {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

impl<M: Model> Default for Record<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> From<Row> for Record<M> {
    fn from(row: Row) -> Self {
        Self::from_state(EntityState::from_row(row))
    }
}

impl<M: Model> Record<M> {
    /// A new, unsaved record.
    pub fn new() -> Self {
        Self::from_state(EntityState::new())
    }

    /// Wrap an existing state.
    pub fn from_state(state: EntityState) -> Self {
        Self {
            state,
            _model: PhantomData,
        }
    }

    /// The underlying state.
    pub fn state(&self) -> &EntityState {
        &self.state
    }

    /// Unwrap into the underlying state.
    pub fn into_state(self) -> EntityState {
        self.state
    }

    /// Get an attribute.
    pub fn get(&self, column: &str) -> Option<&FilterValue> {
        self.state.get(column)
    }

    /// Get an attribute converted to `T`.
    pub fn try_get<T: FromColumn>(&self, column: &str) -> QueryResult<T> {
        T::from_column(self.state.get(column), column).map_err(|e| e.with_model(M::MODEL_NAME))
    }

    /// Set an attribute.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.state.set(column, value);
        self
    }

    /// Mass-assign fillable attributes; others are ignored.
    pub fn fill(&mut self, values: Attributes) -> &mut Self {
        for (column, value) in lifecycle::fillable(&M::info(), values) {
            self.state.set(column, value);
        }
        self
    }

    /// The primary key value, if set.
    pub fn key(&self) -> Option<&FilterValue> {
        self.state.get(M::PRIMARY_KEY).filter(|v| !v.is_null())
    }

    /// Whether the record has a row.
    pub fn exists(&self) -> bool {
        self.state.exists()
    }

    /// Whether any attribute changed since the last write.
    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    /// Changed attributes.
    pub fn dirty(&self) -> Attributes {
        self.state.dirty()
    }

    /// Whether the soft-delete stamp is set.
    pub fn is_trashed(&self) -> bool {
        M::SOFT_DELETES && self.state.get(DELETED_AT).is_some_and(|v| !v.is_null())
    }

    /// Insert a new record from `input`.
    ///
    /// Blank values are dropped unless the column is nullable, non-fillable
    /// columns are ignored and an empty payload is rejected.
    pub async fn create(engine: &Engine, input: Attributes) -> QueryResult<Self> {
        lifecycle::create(engine, &M::info(), input).await.map(Self::from_state)
    }

    /// Insert or update. Returns whether a statement was issued.
    pub async fn save(&mut self, engine: &Engine) -> QueryResult<bool> {
        lifecycle::save(engine, &M::info(), &mut self.state).await
    }

    /// Soft-delete, or hard-delete when the model has no soft deletes.
    pub async fn delete(&mut self, engine: &Engine) -> QueryResult<()> {
        lifecycle::delete(engine, &M::info(), &mut self.state).await
    }

    /// Hard-delete, applying relation delete rules.
    pub async fn force_delete(&mut self, engine: &Engine) -> QueryResult<()> {
        lifecycle::force_delete(engine, &M::info(), &mut self.state).await
    }

    /// Clear the soft-delete stamp.
    pub async fn restore(&mut self, engine: &Engine) -> QueryResult<()> {
        lifecycle::restore(engine, &M::info(), &mut self.state).await
    }

    /// Reload from the database.
    pub async fn refresh(&mut self, engine: &Engine) -> QueryResult<()> {
        lifecycle::refresh(engine, &M::info(), &mut self.state).await
    }

    /// Add `amount` to a numeric column.
    pub async fn increment(&mut self, engine: &Engine, column: &str, amount: i64) -> QueryResult<()> {
        lifecycle::increment(engine, &M::info(), &mut self.state, column, amount).await
    }

    /// Subtract `amount` from a numeric column.
    pub async fn decrement(&mut self, engine: &Engine, column: &str, amount: i64) -> QueryResult<()> {
        lifecycle::increment(engine, &M::info(), &mut self.state, column, -amount).await
    }

    /// Eager-load relations onto this record.
    pub async fn load<I, L>(&mut self, engine: &Engine, relations: I) -> QueryResult<()>
    where
        I: IntoIterator<Item = L>,
        L: Into<EagerLoad>,
    {
        let loads: Vec<EagerLoad> = relations.into_iter().map(Into::into).collect();
        load_relations(engine, &M::info(), std::slice::from_mut(&mut self.state), &loads).await
    }

    /// A loaded relation, untyped.
    pub fn related(&self, name: &str) -> Option<&RelationValue> {
        self.state.relation(name)
    }

    /// A loaded relation as records of `R`.
    ///
    /// Fails when the relation was not loaded.
    pub fn related_as<R: Model>(&self, name: &str) -> QueryResult<Vec<Record<R>>> {
        let value = self.state.relation(name).ok_or_else(|| {
            QueryError::invalid_relation(name, "relation is not loaded")
                .with_model(M::MODEL_NAME)
                .with_suggestion(format!("Load it first with `.with([\"{}\"])` or `load`", name))
        })?;
        Ok(value
            .states()
            .into_iter()
            .map(|s| Record::from_state(s.clone()))
            .collect())
    }

    /// A loaded to-one relation as a record of `R`.
    pub fn related_one<R: Model>(&self, name: &str) -> QueryResult<Option<Record<R>>> {
        Ok(self.related_as::<R>(name)?.into_iter().next())
    }

    /// Pivot maintenance for a many-to-many relation of this record.
    pub fn pivot<'a>(&self, engine: &'a Engine, name: &str) -> QueryResult<Pivot<'a>> {
        let relation = M::info().relation(name)?;
        let key = self
            .state
            .get(relation.parent_key())
            .cloned()
            .unwrap_or(FilterValue::Null);
        Pivot::new(engine, relation, key)
    }

    /// Pivot columns, for a record loaded through a pivot relation.
    pub fn pivot_attributes(&self) -> Option<&Attributes> {
        self.state.pivot()
    }

    /// Attributes and loaded relations as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.state.to_json()
    }
}
