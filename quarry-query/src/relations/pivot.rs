//! Pivot-table maintenance for many-to-many relations.

use std::collections::HashSet;

use tracing::debug;

use crate::engine::Engine;
use crate::error::{QueryError, QueryResult};
use crate::filter::{FilterValue, LookupKey};
use crate::query::QueryBuilder;
use crate::row::Attributes;

use super::descriptor::{PivotSpec, RelationDescriptor};

/// Keys attached and detached by [`Pivot::sync`] or [`Pivot::toggle`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    /// Newly attached related keys.
    pub attached: Vec<FilterValue>,
    /// Removed related keys.
    pub detached: Vec<FilterValue>,
}

/// Pivot rows of one owner under one relation.
#[derive(Debug, Clone)]
pub struct Pivot<'a> {
    engine: &'a Engine,
    relation: RelationDescriptor,
    parent_key: FilterValue,
}

impl<'a> Pivot<'a> {
    /// Bind `relation` for the owner whose key is `parent_key`.
    ///
    /// Fails when the relation has no pivot table.
    pub fn new(
        engine: &'a Engine,
        relation: RelationDescriptor,
        parent_key: FilterValue,
    ) -> QueryResult<Self> {
        if relation.pivot.is_none() {
            return Err(QueryError::invalid_relation(
                relation.name.clone(),
                "relation has no pivot table",
            ));
        }
        if parent_key.is_null() {
            return Err(QueryError::invalid_input(
                relation.local_key.clone(),
                "owner has no key; save it before touching its pivot rows",
            ));
        }
        Ok(Self {
            engine,
            relation,
            parent_key,
        })
    }

    fn table_spec(&self) -> QueryResult<&PivotSpec> {
        self.relation.pivot.as_ref().ok_or_else(|| {
            QueryError::invalid_relation(self.relation.name.clone(), "relation has no pivot table")
        })
    }

    /// Pivot rows of this owner.
    fn scope(&self) -> QueryResult<QueryBuilder> {
        let pivot = self.table_spec()?;
        let mut query =
            QueryBuilder::table(pivot.table.clone()).r#where(pivot.foreign_pivot_key.clone(), self.parent_key.clone());
        if let (Some(column), Some(class)) = (&self.relation.morph_type, &self.relation.morph_class) {
            query = query.r#where(column.clone(), class.as_str());
        }
        Ok(query)
    }

    /// Related keys currently attached.
    pub async fn current(&self) -> QueryResult<Vec<FilterValue>> {
        let pivot = self.table_spec()?;
        let query = self.scope()?.select([pivot.related_pivot_key.clone()]);
        let rows = self.engine.get(&query).await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(&pivot.related_pivot_key))
            .collect())
    }

    /// Insert one pivot row per id, each carrying `extra`.
    pub async fn attach<I, V>(&self, ids: I, extra: &Attributes) -> QueryResult<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let pivot = self.table_spec()?;
        let rows: Vec<Attributes> = ids
            .into_iter()
            .map(|id| {
                let mut row = Attributes::new();
                row.insert(pivot.foreign_pivot_key.clone(), self.parent_key.clone());
                row.insert(pivot.related_pivot_key.clone(), id.into());
                if let (Some(column), Some(class)) =
                    (&self.relation.morph_type, &self.relation.morph_class)
                {
                    row.insert(column.clone(), FilterValue::String(class.clone()));
                }
                for (column, value) in extra {
                    row.insert(column.clone(), value.clone());
                }
                row
            })
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        self.engine.insert_batch(&pivot.table, &rows).await?;
        Ok(rows.len() as u64)
    }

    /// Remove pivot rows for `ids`, or every pivot row of the owner.
    pub async fn detach(&self, ids: Option<Vec<FilterValue>>) -> QueryResult<u64> {
        let pivot = self.table_spec()?;
        let query = match ids {
            Some(ids) if ids.is_empty() => return Ok(0),
            Some(ids) => self.scope()?.where_in(pivot.related_pivot_key.clone(), ids),
            None => self.scope()?,
        };
        self.engine.delete(&query).await
    }

    /// Make the attached set exactly `ids`, in one transaction.
    pub async fn sync<I, V>(&self, ids: I) -> QueryResult<SyncResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let desired: Vec<FilterValue> = dedupe(ids.into_iter().map(Into::into));
        let relation = self.relation.clone();
        let parent_key = self.parent_key.clone();

        self.engine
            .transaction(|tx| async move {
                let pivot = Pivot::new(&tx, relation, parent_key)?;
                let current = pivot.current().await?;
                let current_keys = key_set(&current);
                let desired_keys = key_set(&desired);

                let detached: Vec<FilterValue> = current
                    .into_iter()
                    .filter(|v| v.lookup_key().is_none_or(|k| !desired_keys.contains(&k)))
                    .collect();
                let attached: Vec<FilterValue> = desired
                    .into_iter()
                    .filter(|v| v.lookup_key().is_some_and(|k| !current_keys.contains(&k)))
                    .collect();

                pivot.detach(Some(detached.clone())).await?;
                pivot.attach(attached.clone(), &Attributes::new()).await?;
                debug!(
                    relation = %pivot.relation.name,
                    attached = attached.len(),
                    detached = detached.len(),
                    "Pivot synced"
                );
                Ok(SyncResult { attached, detached })
            })
            .await
    }

    /// Detach ids that are attached and attach those that are not, in one
    /// transaction.
    pub async fn toggle<I, V>(&self, ids: I) -> QueryResult<SyncResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let requested: Vec<FilterValue> = dedupe(ids.into_iter().map(Into::into));
        let relation = self.relation.clone();
        let parent_key = self.parent_key.clone();

        self.engine
            .transaction(|tx| async move {
                let pivot = Pivot::new(&tx, relation, parent_key)?;
                let current_keys = key_set(&pivot.current().await?);

                let (detached, attached): (Vec<_>, Vec<_>) = requested
                    .into_iter()
                    .partition(|v| v.lookup_key().is_some_and(|k| current_keys.contains(&k)));

                pivot.detach(Some(detached.clone())).await?;
                pivot.attach(attached.clone(), &Attributes::new()).await?;
                debug!(
                    relation = %pivot.relation.name,
                    attached = attached.len(),
                    detached = detached.len(),
                    "Pivot toggled"
                );
                Ok(SyncResult { attached, detached })
            })
            .await
    }
}

fn key_set(values: &[FilterValue]) -> HashSet<LookupKey> {
    values.iter().filter_map(FilterValue::lookup_key).collect()
}

fn dedupe(values: impl Iterator<Item = FilterValue>) -> Vec<FilterValue> {
    let mut seen = HashSet::new();
    values
        .filter(|v| v.lookup_key().is_some_and(|k| seen.insert(k)))
        .collect()
}
