//! Typed model queries with the soft-delete scope and eager loads.

use std::fmt;
use std::marker::PhantomData;

use crate::compiler::CompiledQuery;
use crate::engine::Engine;
use crate::error::{QueryError, QueryResult};
use crate::filter::{Connector, FilterValue, IntoOperator, Predicate, PredicateNode};
use crate::pagination::Page;
use crate::query::QueryBuilder;
use crate::relations::{EagerLoad, load_relations};
use crate::types::SortOrder;

use super::record::Record;
use super::state::EntityState;
use super::{DELETED_AT, FindKey, Model};

/// Which rows a soft-deleting model's query sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedScope {
    /// Only rows whose `deleted_at` is null.
    #[default]
    Default,
    /// Every row.
    With,
    /// Only soft-deleted rows.
    Only,
}

/// A query over model `M`.
///
/// Builds like a [`QueryBuilder`]; terminals return [`Record<M>`]s with any
/// requested relations loaded.
pub struct ModelQuery<M: Model> {
    engine: Engine,
    builder: QueryBuilder,
    scope: TrashedScope,
    eager: Vec<EagerLoad>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> fmt::Debug for ModelQuery<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &M::MODEL_NAME)
            .field("builder", &self.builder)
            .field("scope", &self.scope)
            .field("eager", &self.eager)
            .finish()
    }
}

impl<M: Model> Clone for ModelQuery<M> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            builder: self.builder.clone(),
            scope: self.scope,
            eager: self.eager.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> ModelQuery<M> {
    /// A query over `M`'s table with the default scope.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            builder: QueryBuilder::table(M::TABLE_NAME),
            scope: TrashedScope::Default,
            eager: Vec::new(),
            _model: PhantomData,
        }
    }

    /// Include soft-deleted rows.
    pub fn with_trashed(mut self) -> Self {
        self.scope = TrashedScope::With;
        self
    }

    /// Only soft-deleted rows.
    pub fn only_trashed(mut self) -> Self {
        self.scope = TrashedScope::Only;
        self
    }

    /// Eager-load relation paths (`"posts"`, `"posts.comments"`).
    pub fn with<I, L>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<EagerLoad>,
    {
        self.eager.extend(relations.into_iter().map(Into::into));
        self
    }

    /// Eager-load one path with a constraint on its query.
    pub fn with_constrained<F>(mut self, path: impl Into<String>, constraint: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.eager.push(EagerLoad::constrained(path, constraint));
        self
    }

    /// Apply arbitrary builder steps.
    pub fn tap<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.builder = build(self.builder);
        self
    }

    delegate_builder! {
        /// `column = value`.
        r#where(column: impl Into<String>, value: impl Into<FilterValue>);
        /// `column <op> value`.
        where_op(column: impl Into<String>, op: impl IntoOperator, value: impl Into<FilterValue>);
        /// `OR column = value`.
        or_where(column: impl Into<String>, value: impl Into<FilterValue>);
        /// `column IN (...)`.
        where_in(column: impl Into<String>, values: Vec<FilterValue>);
        /// `column NOT IN (...)`.
        where_not_in(column: impl Into<String>, values: Vec<FilterValue>);
        /// `column IS NULL`.
        where_null(column: impl Into<String>);
        /// `column IS NOT NULL`.
        where_not_null(column: impl Into<String>);
        /// `column BETWEEN low AND high`.
        where_between(column: impl Into<String>, low: impl Into<FilterValue>, high: impl Into<FilterValue>);
        /// Raw fragment with bindings.
        where_raw(sql: impl Into<String>, bindings: Vec<FilterValue>);
        /// A prepared predicate.
        where_predicate(predicate: Predicate);
        /// Order by a column.
        order_by(column: impl Into<String>, order: SortOrder);
        /// Order by a column, descending.
        order_by_desc(column: impl Into<String>);
        /// Newest first by `column`.
        latest(column: impl Into<String>);
        /// Oldest first by `column`.
        oldest(column: impl Into<String>);
        /// `LIMIT`.
        limit(limit: u64);
        /// `OFFSET`.
        offset(offset: u64);
        /// Alias for `limit`.
        take(n: u64);
        /// Alias for `offset`.
        skip(n: u64);
        /// Lock matching rows.
        for_update();
    }

    /// Parenthesised group.
    pub fn where_nested<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.builder = self.builder.where_nested(build);
        self
    }

    /// The unscoped builder.
    pub fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// The trashed scope.
    pub fn scope(&self) -> TrashedScope {
        self.scope
    }

    /// The builder with the trashed scope applied.
    ///
    /// User predicates joined by `OR` are grouped first, so the scope
    /// constrains all of them.
    pub fn to_builder(&self) -> QueryBuilder {
        let mut query = self.builder.clone();
        if !M::SOFT_DELETES || self.scope == TrashedScope::With {
            return query;
        }
        if query.wheres.iter().any(|p| p.connector == Connector::Or) {
            let grouped = std::mem::take(&mut query.wheres);
            query.wheres.push(Predicate::and(PredicateNode::Nested(grouped)));
        }
        let column = M::info().qualified(DELETED_AT);
        match self.scope {
            TrashedScope::Only => query.where_not_null(column),
            _ => query.where_null(column),
        }
    }

    /// Compile the scoped query for the engine's dialect.
    pub fn to_sql(&self) -> QueryResult<CompiledQuery> {
        self.to_builder().to_sql(self.engine.dialect())
    }

    async fn hydrate(&self, states: &mut [EntityState]) -> QueryResult<()> {
        if self.eager.is_empty() {
            return Ok(());
        }
        load_relations(&self.engine, &M::info(), states, &self.eager).await
    }

    /// Every matching record.
    pub async fn get(&self) -> QueryResult<Vec<Record<M>>> {
        let rows = self.engine.get(&self.to_builder()).await?;
        let mut states: Vec<EntityState> = rows.into_iter().map(EntityState::from_row).collect();
        self.hydrate(&mut states).await?;
        Ok(states.into_iter().map(Record::from_state).collect())
    }

    /// The first matching record.
    pub async fn first(&self) -> QueryResult<Option<Record<M>>> {
        Ok(self.clone().limit(1).get().await?.into_iter().next())
    }

    /// The first matching record, or `RecordNotFound`.
    pub async fn first_or_fail(&self) -> QueryResult<Record<M>> {
        self.first()
            .await?
            .ok_or_else(|| QueryError::not_found(M::MODEL_NAME))
    }

    /// Find by primary key or slug; see [`FindKey`] for how `key` is read.
    pub async fn find(&self, key: impl Into<FilterValue>) -> QueryResult<Option<Record<M>>> {
        match FindKey::classify(key.into(), M::SLUG_COLUMN) {
            FindKey::PrimaryKey(value) => self.find_by_key(value).await,
            FindKey::Slug(slug) => self.find_by_slug(slug).await,
        }
    }

    /// [`find`](Self::find), or `RecordNotFound`.
    pub async fn find_or_fail(&self, key: impl Into<FilterValue>) -> QueryResult<Record<M>> {
        let key = key.into();
        self.find(key.clone()).await?.ok_or_else(|| {
            QueryError::not_found(M::MODEL_NAME).with_context(format!("find {}", key))
        })
    }

    /// Find by primary key, without the slug heuristic.
    pub async fn find_by_key(&self, key: impl Into<FilterValue>) -> QueryResult<Option<Record<M>>> {
        let column = M::info().qualified(M::PRIMARY_KEY);
        self.clone().r#where(column, key).first().await
    }

    /// Find by the slug column.
    pub async fn find_by_slug(&self, slug: impl Into<String>) -> QueryResult<Option<Record<M>>> {
        let column = M::SLUG_COLUMN.ok_or_else(|| {
            QueryError::configuration(format!("model '{}' has no slug column", M::MODEL_NAME))
        })?;
        self.clone()
            .r#where(M::info().qualified(column), slug.into())
            .first()
            .await
    }

    /// Every record whose primary key is in `keys`.
    pub async fn find_many<I, V>(&self, keys: I) -> QueryResult<Vec<Record<M>>>
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let keys: Vec<FilterValue> = keys.into_iter().map(Into::into).collect();
        self.clone()
            .where_in(M::info().qualified(M::PRIMARY_KEY), keys)
            .get()
            .await
    }

    /// Number of matching rows.
    pub async fn count(&self) -> QueryResult<u64> {
        self.engine.count(&self.to_builder()).await
    }

    /// Whether any row matches.
    pub async fn exists(&self) -> QueryResult<bool> {
        self.engine.exists(&self.to_builder()).await
    }

    /// One page of records plus the total count.
    pub async fn paginate(&self, page: u64, per_page: u64) -> QueryResult<Page<Record<M>>> {
        let mut page = self
            .engine
            .paginate(&self.to_builder(), page, per_page)
            .await?
            .map(EntityState::from_row);
        self.hydrate(&mut page.data).await?;
        Ok(page.map(Record::from_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRowSource;
    use crate::predicate;
    use crate::relations::{RelationDescriptor, Relations};
    use crate::row::Row;
    use crate::sql::Dialect;
    use pretty_assertions::assert_eq;

    struct Article;
    struct Note;

    impl Model for Article {
        const MODEL_NAME: &'static str = "Article";
        const TABLE_NAME: &'static str = "articles";
        const SOFT_DELETES: bool = true;
        const SLUG_COLUMN: Option<&'static str> = Some("slug");

        fn relations() -> Relations {
            Relations::new().with(RelationDescriptor::has_many::<Article, Note>("notes"))
        }
    }

    impl Model for Note {
        const MODEL_NAME: &'static str = "Note";
        const TABLE_NAME: &'static str = "notes";
    }

    fn setup() -> (MockRowSource, Engine) {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());
        (mock, engine)
    }

    #[test]
    fn test_default_scope() {
        let (_mock, engine) = setup();
        let sql = Article::query(&engine).r#where("published", true).to_sql().unwrap().sql;
        assert_eq!(
            sql,
            "SELECT * FROM \"articles\" WHERE \"published\" = ? AND \"articles\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_scope_wraps_or_groups() {
        let (_mock, engine) = setup();
        let sql = Article::query(&engine)
            .r#where("status", "draft")
            .or_where("status", "review")
            .to_sql()
            .unwrap()
            .sql;
        assert_eq!(
            sql,
            "SELECT * FROM \"articles\" WHERE (\"status\" = ? OR \"status\" = ?) \
             AND \"articles\".\"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn test_trashed_scopes() {
        let (_mock, engine) = setup();
        let with = Article::query(&engine).with_trashed().to_sql().unwrap().sql;
        assert_eq!(with, "SELECT * FROM \"articles\"");

        let only = Article::query(&engine).only_trashed().to_sql().unwrap().sql;
        assert_eq!(
            only,
            "SELECT * FROM \"articles\" WHERE \"articles\".\"deleted_at\" IS NOT NULL"
        );

        let notes = Note::query(&engine).to_sql().unwrap().sql;
        assert_eq!(notes, "SELECT * FROM \"notes\"");
    }

    #[tokio::test]
    async fn test_find_uses_key_or_slug() {
        let (mock, engine) = setup();
        Article::query(&engine).find("42").await.unwrap();
        Article::query(&engine).find("hello-world").await.unwrap();

        let statements = mock.statements();
        assert!(statements[0].sql.contains("\"articles\".\"id\" = ?"));
        assert_eq!(statements[0].params[0], FilterValue::Int(42));
        assert!(statements[1].sql.contains("\"articles\".\"slug\" = ?"));
    }

    #[tokio::test]
    async fn test_find_or_fail() {
        let (_mock, engine) = setup();
        let err = Article::query(&engine).find_or_fail(7).await.unwrap_err();
        assert!(err.is_not_found());

        let err = Note::query(&engine).find_by_slug("x").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_get_with_eager_load() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("FROM \"articles\"", vec![Row::from_pairs([("id", 1)]), Row::from_pairs([("id", 2)])])
            .on_query("FROM \"notes\"", vec![Row::from_pairs([("id", 9), ("article_id", 2)])]);
        let engine = Engine::new(mock.shared());

        let articles = Article::query(&engine).with(["notes"]).get().await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(mock.statement_count(), 2);
        assert_eq!(articles[0].related("notes").unwrap().len(), 0);
        assert_eq!(articles[1].related_as::<Note>("notes").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_paginate_with_eager_load() {
        let mock = MockRowSource::new(Dialect::Sqlite)
            .on_query("FROM \"articles\"", vec![Row::from_pairs([("id", 1)])])
            .on_query("COUNT(*)", vec![Row::from_pairs([("aggregate", 3)])]);
        let engine = Engine::new(mock.shared());

        let page = Article::query(&engine)
            .with(["notes"])
            .where_predicate(predicate!(views > 10))
            .paginate(1, 1)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.last_page, 3);
        assert!(page.has_more());
        assert_eq!(page.data.len(), 1);
        assert_eq!(mock.statement_count(), 3);
    }
}
