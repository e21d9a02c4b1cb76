//! Relation delete rules, applied before a hard delete.
//!
//! Every `Restrict` relation is checked first, so a refused delete has
//! touched nothing. Then, in declaration order, `Detach` removes pivot rows
//! and `Cascade` deletes each related entity through its own lifecycle.

use tracing::debug;

use crate::engine::Engine;
use crate::error::{QueryError, QueryResult};
use crate::relations::{OnDelete, Pivot, RelationDescriptor};
use crate::traits::BoxFuture;

use super::state::EntityState;
use super::{ModelInfo, lifecycle};

/// Apply the delete rules of every relation of `info` for `state`.
///
/// Runs on the engine of the enclosing delete transaction.
pub fn resolve<'a>(
    engine: &'a Engine,
    info: &'a ModelInfo,
    state: &'a EntityState,
) -> BoxFuture<'a, QueryResult<()>> {
    Box::pin(async move {
        let relations = info.relations();

        for relation in relations.iter().filter(|r| r.on_delete == OnDelete::Restrict) {
            if engine.exists(&relation.query_for(state)).await? {
                return Err(QueryError::delete_restricted(info.name, relation.name.clone()));
            }
        }

        for relation in relations.iter() {
            match relation.on_delete {
                OnDelete::Ignore | OnDelete::Restrict => {}
                OnDelete::Detach => detach(engine, relation, state).await?,
                OnDelete::Cascade => cascade(engine, relation, state).await?,
            }
        }
        Ok(())
    })
}

async fn detach(engine: &Engine, relation: &RelationDescriptor, state: &EntityState) -> QueryResult<()> {
    if !relation.kind.uses_pivot() {
        return Err(QueryError::invalid_relation(
            relation.name.clone(),
            "detach on delete needs a pivot relation",
        ));
    }
    let Some(key) = state.get(relation.parent_key()).filter(|v| !v.is_null()).cloned() else {
        return Ok(());
    };
    let removed = Pivot::new(engine, relation.clone(), key)?.detach(None).await?;
    debug!(relation = %relation.name, removed, "Detached pivot rows");
    Ok(())
}

async fn cascade(engine: &Engine, relation: &RelationDescriptor, state: &EntityState) -> QueryResult<()> {
    let rows = engine.get(&relation.query_for(state)).await?;
    let pivot_columns = relation.pivot_aliases();

    if relation.kind.uses_pivot() {
        if let Some(key) = state.get(relation.parent_key()).filter(|v| !v.is_null()).cloned() {
            Pivot::new(engine, relation.clone(), key)?.detach(None).await?;
        }
    }

    let count = rows.len();
    for row in rows {
        let mut child = EntityState::from_row(row);
        if !pivot_columns.is_empty() {
            child.split_pivot(&pivot_columns);
        }
        lifecycle::delete(engine, &relation.related, &mut child)
            .await
            .map_err(|e| e.with_context(format!("cascade '{}'", relation.name)))?;
    }
    debug!(relation = %relation.name, count, "Cascaded delete");
    Ok(())
}
