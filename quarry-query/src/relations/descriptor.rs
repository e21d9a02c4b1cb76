//! Relation descriptors and the per-model relation table.

use indexmap::IndexMap;

use crate::entity::state::EntityState;
use crate::entity::{DELETED_AT, Model, ModelInfo};
use crate::filter::FilterValue;
use crate::inflect::{foreign_key_for, pivot_table_for};
use crate::query::QueryBuilder;

/// Kind of relation between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The related table holds a key to this one; at most one row.
    HasOne,
    /// The related table holds a key to this one; any number of rows.
    HasMany,
    /// This table holds a key to the related one.
    BelongsTo,
    /// Linked through a pivot table.
    BelongsToMany,
    /// Like `HasOne`, with a type column naming the owner model.
    MorphOne,
    /// Like `HasMany`, with a type column naming the owner model.
    MorphMany,
    /// Linked through a pivot table that also stores the owner's type.
    MorphToMany,
}

impl RelationKind {
    /// Whether the relation yields a list.
    pub fn is_many(&self) -> bool {
        matches!(
            self,
            Self::HasMany | Self::BelongsToMany | Self::MorphMany | Self::MorphToMany
        )
    }

    /// Whether the relation is backed by a pivot table.
    pub fn uses_pivot(&self) -> bool {
        matches!(self, Self::BelongsToMany | Self::MorphToMany)
    }

    /// Whether the relation filters on a polymorphic type column.
    pub fn is_polymorphic(&self) -> bool {
        matches!(self, Self::MorphOne | Self::MorphMany | Self::MorphToMany)
    }
}

/// What happens to related rows when the owner is hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    /// Leave related rows alone.
    #[default]
    Ignore,
    /// Refuse to delete while related rows exist.
    Restrict,
    /// Remove pivot rows only. Pivot-backed relations only.
    Detach,
    /// Delete every related entity, running its own lifecycle.
    Cascade,
}

/// Pivot table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotSpec {
    /// Pivot table name.
    pub table: String,
    /// Pivot column holding the owner's key.
    pub foreign_pivot_key: String,
    /// Pivot column holding the related key.
    pub related_pivot_key: String,
    /// Extra pivot columns loaded alongside related rows.
    pub columns: Vec<String>,
}

/// Typed metadata for one relation.
///
/// Key columns, by kind:
///
/// | kind | `foreign_key` | `local_key` |
/// |------|---------------|-------------|
/// | `HasOne`/`HasMany`/`MorphOne`/`MorphMany` | on the related table | on the owner |
/// | `BelongsTo` | on the owner | on the related table |
/// | `BelongsToMany`/`MorphToMany` | unused, see [`PivotSpec`] | on the owner |
#[derive(Debug, Clone)]
pub struct RelationDescriptor {
    /// Relation name, used by `with` and `load`.
    pub name: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// The declaring model.
    pub owner: ModelInfo,
    /// The target model.
    pub related: ModelInfo,
    /// Foreign key column.
    pub foreign_key: String,
    /// Local/owner key column.
    pub local_key: String,
    /// Related column matched against the pivot (pivot kinds).
    pub related_key: String,
    /// Pivot table (pivot kinds).
    pub pivot: Option<PivotSpec>,
    /// Polymorphic type column.
    pub morph_type: Option<String>,
    /// Value stored in the type column for this owner.
    pub morph_class: Option<String>,
    /// Behaviour on hard delete of the owner.
    pub on_delete: OnDelete,
}

impl RelationDescriptor {
    fn base<O: Model, R: Model>(name: impl Into<String>, kind: RelationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            owner: O::info(),
            related: R::info(),
            foreign_key: foreign_key_for(O::TABLE_NAME),
            local_key: O::PRIMARY_KEY.to_string(),
            related_key: R::PRIMARY_KEY.to_string(),
            pivot: None,
            morph_type: None,
            morph_class: None,
            on_delete: OnDelete::Ignore,
        }
    }

    /// `O` has one `R`; `R` holds `singular(O table)_id`.
    pub fn has_one<O: Model, R: Model>(name: impl Into<String>) -> Self {
        Self::base::<O, R>(name, RelationKind::HasOne)
    }

    /// `O` has many `R`; `R` holds `singular(O table)_id`.
    pub fn has_many<O: Model, R: Model>(name: impl Into<String>) -> Self {
        Self::base::<O, R>(name, RelationKind::HasMany)
    }

    /// `O` belongs to `R`; `O` holds `singular(R table)_id`.
    pub fn belongs_to<O: Model, R: Model>(name: impl Into<String>) -> Self {
        Self {
            foreign_key: foreign_key_for(R::TABLE_NAME),
            local_key: R::PRIMARY_KEY.to_string(),
            ..Self::base::<O, R>(name, RelationKind::BelongsTo)
        }
    }

    /// `O` and `R` linked through a pivot named after both singular tables.
    pub fn belongs_to_many<O: Model, R: Model>(name: impl Into<String>) -> Self {
        Self {
            pivot: Some(PivotSpec {
                table: pivot_table_for(O::TABLE_NAME, R::TABLE_NAME),
                foreign_pivot_key: foreign_key_for(O::TABLE_NAME),
                related_pivot_key: foreign_key_for(R::TABLE_NAME),
                columns: Vec::new(),
            }),
            ..Self::base::<O, R>(name, RelationKind::BelongsToMany)
        }
    }

    /// `O` has one `R` through `{morph}_id` and `{morph}_type` on `R`.
    pub fn morph_one<O: Model, R: Model>(name: impl Into<String>, morph: &str) -> Self {
        Self::morph_base::<O, R>(name, morph, RelationKind::MorphOne)
    }

    /// `O` has many `R` through `{morph}_id` and `{morph}_type` on `R`.
    pub fn morph_many<O: Model, R: Model>(name: impl Into<String>, morph: &str) -> Self {
        Self::morph_base::<O, R>(name, morph, RelationKind::MorphMany)
    }

    /// `O` and `R` linked through a `{morph}s` pivot carrying
    /// `{morph}_id`, `{morph}_type` and `singular(R table)_id`.
    pub fn morph_to_many<O: Model, R: Model>(name: impl Into<String>, morph: &str) -> Self {
        Self {
            pivot: Some(PivotSpec {
                table: format!("{}s", morph),
                foreign_pivot_key: format!("{}_id", morph),
                related_pivot_key: foreign_key_for(R::TABLE_NAME),
                columns: Vec::new(),
            }),
            ..Self::morph_base::<O, R>(name, morph, RelationKind::MorphToMany)
        }
    }

    fn morph_base<O: Model, R: Model>(name: impl Into<String>, morph: &str, kind: RelationKind) -> Self {
        Self {
            foreign_key: format!("{}_id", morph),
            morph_type: Some(format!("{}_type", morph)),
            morph_class: Some(O::MODEL_NAME.to_string()),
            ..Self::base::<O, R>(name, kind)
        }
    }

    /// Override the foreign key.
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = column.into();
        self
    }

    /// Override the local/owner key.
    pub fn local_key(mut self, column: impl Into<String>) -> Self {
        self.local_key = column.into();
        self
    }

    /// Override the related key matched against the pivot.
    pub fn related_key(mut self, column: impl Into<String>) -> Self {
        self.related_key = column.into();
        self
    }

    /// Override the pivot table name.
    pub fn pivot_table(mut self, table: impl Into<String>) -> Self {
        if let Some(pivot) = self.pivot.as_mut() {
            pivot.table = table.into();
        }
        self
    }

    /// Override both pivot key columns.
    pub fn pivot_keys(mut self, foreign: impl Into<String>, related: impl Into<String>) -> Self {
        if let Some(pivot) = self.pivot.as_mut() {
            pivot.foreign_pivot_key = foreign.into();
            pivot.related_pivot_key = related.into();
        }
        self
    }

    /// Load extra pivot columns with each related row.
    pub fn with_pivot<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(pivot) = self.pivot.as_mut() {
            pivot.columns.extend(columns.into_iter().map(Into::into));
        }
        self
    }

    /// Set the on-delete behaviour.
    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }

    /// Whether the relation yields a list.
    pub fn is_many(&self) -> bool {
        self.kind.is_many()
    }

    /// Column on the owner whose value links to related rows.
    pub fn parent_key(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.foreign_key,
            _ => &self.local_key,
        }
    }

    /// Column in the eager query's result that holds the owner's key.
    pub fn match_column(&self) -> String {
        match (&self.kind, &self.pivot) {
            (RelationKind::BelongsTo, _) => self.local_key.clone(),
            (_, Some(pivot)) => format!("pivot_{}", pivot.foreign_pivot_key),
            _ => self.foreign_key.clone(),
        }
    }

    /// Aliased pivot columns present in eager query results.
    pub fn pivot_aliases(&self) -> Vec<String> {
        match &self.pivot {
            Some(pivot) => std::iter::once(&pivot.foreign_pivot_key)
                .chain(std::iter::once(&pivot.related_pivot_key))
                .chain(pivot.columns.iter())
                .map(|c| format!("pivot_{}", c))
                .collect(),
            None => Vec::new(),
        }
    }

    /// One query returning the related rows of every owner key in `keys`.
    ///
    /// Pivot relations join the pivot table and alias its columns as
    /// `pivot_<column>`. Soft-deleted related rows are excluded.
    pub fn eager_query(&self, keys: Vec<FilterValue>) -> QueryBuilder {
        let table = self.related.table;
        let mut query = QueryBuilder::table(table);

        match (&self.kind, &self.pivot) {
            (RelationKind::BelongsTo, _) => {
                query = query.where_in(self.related.qualified(&self.local_key), keys);
            }
            (_, Some(pivot)) => {
                let pt = &pivot.table;
                let mut select = vec![format!("{}.*", table)];
                for column in std::iter::once(&pivot.foreign_pivot_key)
                    .chain(std::iter::once(&pivot.related_pivot_key))
                    .chain(pivot.columns.iter())
                {
                    select.push(format!("{}.{} as pivot_{}", pt, column, column));
                }
                query = query
                    .select(select)
                    .join(
                        pt.clone(),
                        format!("{}.{}", pt, pivot.related_pivot_key),
                        "=",
                        self.related.qualified(&self.related_key),
                    )
                    .where_in(format!("{}.{}", pt, pivot.foreign_pivot_key), keys);
                if let (Some(column), Some(class)) = (&self.morph_type, &self.morph_class) {
                    query = query.r#where(format!("{}.{}", pt, column), class.as_str());
                }
            }
            _ => {
                if let (Some(column), Some(class)) = (&self.morph_type, &self.morph_class) {
                    query = query.r#where(self.related.qualified(column), class.as_str());
                }
                query = query.where_in(self.related.qualified(&self.foreign_key), keys);
            }
        }

        if self.related.soft_deletes {
            query = query.where_null(self.related.qualified(DELETED_AT));
        }
        query
    }

    /// The related rows of a single owner.
    pub fn query_for(&self, parent: &EntityState) -> QueryBuilder {
        let keys = parent
            .get(self.parent_key())
            .filter(|v| !v.is_null())
            .cloned()
            .into_iter()
            .collect();
        self.eager_query(keys)
    }
}

/// Statically declared relation table of one model, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    entries: IndexMap<String, RelationDescriptor>,
}

impl Relations {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a relation.
    pub fn with(mut self, relation: RelationDescriptor) -> Self {
        self.entries.insert(relation.name.clone(), relation);
        self
    }

    /// Look up a relation.
    pub fn get(&self, name: &str) -> Option<&RelationDescriptor> {
        self.entries.get(name)
    }

    /// All relations, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationDescriptor> {
        self.entries.values()
    }

    /// Number of relations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no relation is declared.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Dialect;
    use pretty_assertions::assert_eq;

    struct User;
    struct Post;
    struct Role;
    struct Comment;

    impl Model for User {
        const MODEL_NAME: &'static str = "User";
        const TABLE_NAME: &'static str = "users";
    }

    impl Model for Post {
        const MODEL_NAME: &'static str = "Post";
        const TABLE_NAME: &'static str = "posts";
        const SOFT_DELETES: bool = true;
    }

    impl Model for Role {
        const MODEL_NAME: &'static str = "Role";
        const TABLE_NAME: &'static str = "roles";
    }

    impl Model for Comment {
        const MODEL_NAME: &'static str = "Comment";
        const TABLE_NAME: &'static str = "comments";
    }

    fn sql(query: &QueryBuilder) -> String {
        query.to_sql(Dialect::Sqlite).unwrap().sql
    }

    #[test]
    fn test_default_keys() {
        let posts = RelationDescriptor::has_many::<User, Post>("posts");
        assert_eq!(posts.foreign_key, "user_id");
        assert_eq!(posts.local_key, "id");
        assert_eq!(posts.parent_key(), "id");
        assert_eq!(posts.match_column(), "user_id");

        let author = RelationDescriptor::belongs_to::<Post, User>("author");
        assert_eq!(author.foreign_key, "user_id");
        assert_eq!(author.parent_key(), "user_id");
        assert_eq!(author.match_column(), "id");

        let roles = RelationDescriptor::belongs_to_many::<User, Role>("roles");
        let pivot = roles.pivot.as_ref().unwrap();
        assert_eq!(pivot.table, "role_user");
        assert_eq!(pivot.foreign_pivot_key, "user_id");
        assert_eq!(pivot.related_pivot_key, "role_id");
        assert_eq!(roles.match_column(), "pivot_user_id");
    }

    #[test]
    fn test_has_many_query_scopes_soft_deletes() {
        let posts = RelationDescriptor::has_many::<User, Post>("posts");
        assert_eq!(
            sql(&posts.eager_query(vec![1.into(), 2.into()])),
            "SELECT * FROM \"posts\" WHERE \"posts\".\"user_id\" IN (?, ?) AND \"posts\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_pivot_query() {
        let roles = RelationDescriptor::belongs_to_many::<User, Role>("roles").with_pivot(["granted_at"]);
        assert_eq!(
            sql(&roles.eager_query(vec![1.into()])),
            "SELECT \"roles\".*, \"role_user\".\"user_id\" AS pivot_user_id, \
             \"role_user\".\"role_id\" AS pivot_role_id, \
             \"role_user\".\"granted_at\" AS pivot_granted_at \
             FROM \"roles\" INNER JOIN \"role_user\" ON \"role_user\".\"role_id\" = \"roles\".\"id\" \
             WHERE \"role_user\".\"user_id\" IN (?)"
        );
        assert_eq!(
            roles.pivot_aliases(),
            vec!["pivot_user_id", "pivot_role_id", "pivot_granted_at"]
        );
    }

    #[test]
    fn test_morph_many_query() {
        let comments = RelationDescriptor::morph_many::<Post, Comment>("comments", "commentable");
        let compiled = comments.eager_query(vec![5.into()]).to_sql(Dialect::Sqlite).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT * FROM \"comments\" WHERE \"comments\".\"commentable_type\" = ? \
             AND \"comments\".\"commentable_id\" IN (?)"
        );
        assert_eq!(compiled.params, vec![FilterValue::from("Post"), FilterValue::Int(5)]);
    }

    #[test]
    fn test_morph_to_many_defaults() {
        let tags = RelationDescriptor::morph_to_many::<Post, Role>("tags", "taggable");
        let pivot = tags.pivot.as_ref().unwrap();
        assert_eq!(pivot.table, "taggables");
        assert_eq!(pivot.foreign_pivot_key, "taggable_id");
        assert_eq!(tags.morph_type.as_deref(), Some("taggable_type"));
        assert!(tags.is_many());
        assert!(tags.kind.is_polymorphic());
    }

    #[test]
    fn test_query_for_null_key_matches_nothing() {
        let author = RelationDescriptor::belongs_to::<Post, User>("author");
        let orphan = EntityState::hydrate([("user_id".to_string(), FilterValue::Null)].into_iter().collect());
        assert_eq!(
            sql(&author.query_for(&orphan)),
            "SELECT * FROM \"users\" WHERE 1 = 0"
        );
    }

    #[test]
    fn test_relations_table() {
        let relations = Relations::new()
            .with(RelationDescriptor::has_many::<User, Post>("posts"))
            .with(RelationDescriptor::belongs_to_many::<User, Role>("roles").on_delete(OnDelete::Detach));
        assert_eq!(relations.len(), 2);
        assert_eq!(relations.get("roles").unwrap().on_delete, OnDelete::Detach);
        assert!(relations.get("missing").is_none());
    }
}
