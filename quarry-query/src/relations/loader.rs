//! Batched eager loading.
//!
//! For a batch of parents and a relation, the loader collects the distinct
//! parent keys, runs exactly one query for the relation, groups the result by
//! the matching column and hands each parent its slice. Nested paths
//! (`posts.comments`) load the next level over the flattened children before
//! they are distributed, so `K` relation paths always cost `K` queries no
//! matter how many parents there are.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::engine::Engine;
use crate::entity::ModelInfo;
use crate::entity::state::{EntityState, RelationValue};
use crate::error::QueryResult;
use crate::filter::{FilterValue, LookupKey};
use crate::query::QueryBuilder;
use crate::traits::BoxFuture;

use super::descriptor::RelationDescriptor;

/// Extra constraint applied to an eager query.
pub type Constraint = Arc<dyn Fn(QueryBuilder) -> QueryBuilder + Send + Sync>;

/// One requested relation path, optionally constrained.
///
/// A constraint applies to the last segment of the path.
#[derive(Clone)]
pub struct EagerLoad {
    /// Dotted relation path.
    pub path: String,
    /// Constraint for the last segment.
    pub constraint: Option<Constraint>,
}

impl fmt::Debug for EagerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerLoad")
            .field("path", &self.path)
            .field("constrained", &self.constraint.is_some())
            .finish()
    }
}

impl EagerLoad {
    /// Load `path` unconstrained.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            constraint: None,
        }
    }

    /// Load `path`, passing its query through `constraint`.
    pub fn constrained<F>(path: impl Into<String>, constraint: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            constraint: Some(Arc::new(constraint)),
        }
    }
}

impl From<&str> for EagerLoad {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for EagerLoad {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

#[derive(Default)]
struct LoadNode {
    constraint: Option<Constraint>,
    children: Vec<EagerLoad>,
}

/// Group requested paths by their first segment, keeping request order.
fn plan(loads: &[EagerLoad]) -> IndexMap<String, LoadNode> {
    let mut nodes: IndexMap<String, LoadNode> = IndexMap::new();
    for load in loads {
        match load.path.split_once('.') {
            None => {
                let node = nodes.entry(load.path.clone()).or_default();
                if load.constraint.is_some() {
                    node.constraint = load.constraint.clone();
                }
            }
            Some((head, rest)) => {
                nodes.entry(head.to_string()).or_default().children.push(EagerLoad {
                    path: rest.to_string(),
                    constraint: load.constraint.clone(),
                });
            }
        }
    }
    nodes
}

/// Distinct, non-null values of `column` across `parents`.
fn collect_keys(parents: &[EntityState], column: &str) -> Vec<FilterValue> {
    let mut seen = HashSet::new();
    parents
        .iter()
        .filter_map(|p| p.get(column))
        .filter_map(|v| v.lookup_key().map(|k| (k, v)))
        .filter(|(k, _)| seen.insert(k.clone()))
        .map(|(_, v)| v.clone())
        .collect()
}

/// Load `loads` onto every state in `parents`.
///
/// Every parent receives every requested relation: an empty list or `None`
/// when nothing matched.
pub fn load_relations<'a>(
    engine: &'a Engine,
    owner: &'a ModelInfo,
    parents: &'a mut [EntityState],
    loads: &'a [EagerLoad],
) -> BoxFuture<'a, QueryResult<()>> {
    Box::pin(async move {
        for (name, node) in plan(loads) {
            let relation = owner.relation(&name)?;
            load_one(engine, &relation, &node, parents).await?;
        }
        Ok(())
    })
}

async fn load_one(
    engine: &Engine,
    relation: &RelationDescriptor,
    node: &LoadNode,
    parents: &mut [EntityState],
) -> QueryResult<()> {
    let keys = collect_keys(parents, relation.parent_key());
    let mut query = relation.eager_query(keys);
    if let Some(constraint) = &node.constraint {
        query = constraint(query);
    }

    let rows = engine
        .get(&query)
        .await
        .map_err(|e| e.with_context(format!("eager load '{}'", relation.name)))?;

    let match_column = relation.match_column();
    let pivot_columns = relation.pivot_aliases();
    let mut keys = Vec::with_capacity(rows.len());
    let mut children = Vec::with_capacity(rows.len());
    for row in rows {
        let mut child = EntityState::from_row(row);
        keys.push(child.get(&match_column).and_then(FilterValue::lookup_key));
        if !pivot_columns.is_empty() {
            child.split_pivot(&pivot_columns);
        }
        children.push(child);
    }

    if !node.children.is_empty() {
        load_relations(engine, &relation.related, &mut children, &node.children).await?;
    }

    debug!(
        relation = %relation.name,
        parents = parents.len(),
        rows = children.len(),
        "Eager loaded relation"
    );

    let mut grouped: HashMap<LookupKey, Vec<EntityState>> = HashMap::new();
    for (key, child) in keys.into_iter().zip(children) {
        if let Some(key) = key {
            grouped.entry(key).or_default().push(child);
        }
    }

    for parent in parents.iter_mut() {
        let matched = parent
            .get(relation.parent_key())
            .and_then(FilterValue::lookup_key)
            .and_then(|k| grouped.get(&k))
            .cloned()
            .unwrap_or_default();
        parent.set_relation(
            relation.name.clone(),
            RelationValue::from_states(relation.is_many(), matched),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Model;
    use crate::mock::MockRowSource;
    use crate::relations::{RelationDescriptor, Relations};
    use crate::row::Row;
    use crate::sql::Dialect;
    use pretty_assertions::assert_eq;

    struct User;
    struct Post;
    struct Comment;
    struct Role;

    impl Model for User {
        const MODEL_NAME: &'static str = "User";
        const TABLE_NAME: &'static str = "users";

        fn relations() -> Relations {
            Relations::new()
                .with(RelationDescriptor::has_many::<User, Post>("posts"))
                .with(RelationDescriptor::belongs_to_many::<User, Role>("roles"))
        }
    }

    impl Model for Post {
        const MODEL_NAME: &'static str = "Post";
        const TABLE_NAME: &'static str = "posts";

        fn relations() -> Relations {
            Relations::new()
                .with(RelationDescriptor::belongs_to::<Post, User>("author"))
                .with(RelationDescriptor::has_many::<Post, Comment>("comments"))
        }
    }

    impl Model for Comment {
        const MODEL_NAME: &'static str = "Comment";
        const TABLE_NAME: &'static str = "comments";
    }

    impl Model for Role {
        const MODEL_NAME: &'static str = "Role";
        const TABLE_NAME: &'static str = "roles";
    }

    fn users(ids: &[i64]) -> Vec<EntityState> {
        ids.iter()
            .map(|id| EntityState::from_row(Row::from_pairs([("id", *id)])))
            .collect()
    }

    fn post(id: i64, user_id: i64) -> Row {
        Row::from_pairs([("id", id), ("user_id", user_id)])
    }

    #[tokio::test]
    async fn test_one_query_per_relation() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("FROM \"posts\"", vec![post(10, 1), post(11, 1), post(12, 2)]);
        let engine = Engine::new(mock.shared());
        let mut parents = users(&[1, 2, 3]);

        load_relations(&engine, &User::info(), &mut parents, &["posts".into()])
            .await
            .unwrap();

        assert_eq!(mock.statement_count(), 1);
        let statement = &mock.statements()[0];
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"posts\" WHERE \"posts\".\"user_id\" IN (?, ?, ?)"
        );
        let counts: Vec<usize> = parents
            .iter()
            .map(|p| p.relation("posts").unwrap().len())
            .collect();
        assert_eq!(counts, vec![2, 1, 0]);
        assert_eq!(
            parents[2].relation("posts"),
            Some(&RelationValue::Many(Vec::new()))
        );
    }

    #[tokio::test]
    async fn test_empty_batch_still_one_query() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());
        let mut parents = Vec::new();

        load_relations(&engine, &User::info(), &mut parents, &["posts".into()])
            .await
            .unwrap();
        assert_eq!(mock.sql_log(), vec!["SELECT * FROM \"posts\" WHERE 1 = 0"]);
    }

    #[tokio::test]
    async fn test_belongs_to_dedupes_keys() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("FROM \"users\"", vec![Row::from_pairs([("id", 1)])]);
        let engine = Engine::new(mock.shared());
        let mut posts: Vec<EntityState> = [post(10, 1), post(11, 1), post(12, 9)]
            .into_iter()
            .map(EntityState::from_row)
            .collect();

        load_relations(&engine, &Post::info(), &mut posts, &["author".into()])
            .await
            .unwrap();

        assert_eq!(mock.statements()[0].params, vec![FilterValue::Int(1), FilterValue::Int(9)]);
        assert_eq!(posts[0].relation("author").unwrap().len(), 1);
        assert_eq!(posts[2].relation("author"), Some(&RelationValue::One(None)));
    }

    #[tokio::test]
    async fn test_nested_paths() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("FROM \"posts\"", vec![post(10, 1), post(11, 2)])
            .on_query(
                "FROM \"comments\"",
                vec![Row::from_pairs([("id", 100), ("post_id", 11)])],
            );
        let engine = Engine::new(mock.shared());
        let mut parents = users(&[1, 2]);

        load_relations(&engine, &User::info(), &mut parents, &["posts.comments".into()])
            .await
            .unwrap();

        assert_eq!(mock.statement_count(), 2);
        let second = parents[1].relation("posts").unwrap().states()[0];
        assert_eq!(second.relation("comments").unwrap().len(), 1);
        let first = parents[0].relation("posts").unwrap().states()[0];
        assert!(first.relation("comments").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_constraint_applies_to_query() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());
        let mut parents = users(&[1]);
        let loads = [EagerLoad::constrained("posts", |q| q.r#where("published", true))];

        load_relations(&engine, &User::info(), &mut parents, &loads)
            .await
            .unwrap();
        assert_eq!(
            mock.sql_log()[0],
            "SELECT * FROM \"posts\" WHERE \"posts\".\"user_id\" IN (?) AND \"published\" = ?"
        );
    }

    #[tokio::test]
    async fn test_pivot_columns_split() {
        let mock = MockRowSource::new(Dialect::Sqlite).on_query(
            "FROM \"roles\"",
            vec![Row::from_pairs([
                ("id", 5),
                ("pivot_user_id", 1),
                ("pivot_role_id", 5),
            ])],
        );
        let engine = Engine::new(mock.shared());
        let mut parents = users(&[1]);

        load_relations(&engine, &User::info(), &mut parents, &["roles".into()])
            .await
            .unwrap();

        let roles = parents[0].relation("roles").unwrap().states();
        assert_eq!(roles.len(), 1);
        assert!(roles[0].get("pivot_user_id").is_none());
        assert_eq!(roles[0].pivot().unwrap().get("role_id"), Some(&FilterValue::Int(5)));
    }

    #[tokio::test]
    async fn test_unknown_relation() {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());
        let mut parents = users(&[1]);

        let err = load_relations(&engine, &User::info(), &mut parents, &["friends".into()])
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(mock.statement_count(), 0);
    }
}
