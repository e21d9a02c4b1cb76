//! Shared fixtures: an in-memory SQLite database, a statement recorder and
//! a small blog schema.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use quarry_orm::prelude::*;
use quarry_orm::sqlite::SqliteRowSource;
use quarry_orm::{BoxFuture, FilterValue};

/// Wraps a row source and records every statement it sees.
#[derive(Clone)]
pub struct Recording {
    inner: Arc<dyn RowSource>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    pub fn new(inner: Arc<dyn RowSource>) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|s| s.starts_with(prefix)).count()
    }

    /// `SELECT` statements reading from `table`.
    pub fn selects_from(&self, table: &str) -> usize {
        let needle = format!("FROM \"{}\"", table);
        self.log
            .lock()
            .iter()
            .filter(|s| s.starts_with("SELECT") && s.contains(&needle))
            .count()
    }
}

impl RowSource for Recording {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn query<'a>(&'a self, sql: &'a str, params: Vec<FilterValue>) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        self.log.lock().push(sql.to_string());
        self.inner.query(sql, params)
    }

    fn execute<'a>(&'a self, sql: &'a str, params: Vec<FilterValue>) -> BoxFuture<'a, QueryResult<ExecResult>> {
        self.log.lock().push(sql.to_string());
        self.inner.execute(sql, params)
    }

    fn begin<'a>(&'a self, config: &'a TransactionConfig) -> BoxFuture<'a, QueryResult<Arc<dyn RowSource>>> {
        Box::pin(async move {
            self.log.lock().push("BEGIN".to_string());
            let bound = self.inner.begin(config).await?;
            Ok(Arc::new(Recording {
                inner: bound,
                log: Arc::clone(&self.log),
            }) as Arc<dyn RowSource>)
        })
    }

    fn commit(&self) -> BoxFuture<'_, QueryResult<()>> {
        self.log.lock().push("COMMIT".to_string());
        self.inner.commit()
    }

    fn rollback(&self) -> BoxFuture<'_, QueryResult<()>> {
        self.log.lock().push("ROLLBACK".to_string());
        self.inner.rollback()
    }
}

pub struct User;
pub struct Post;
pub struct Comment;
pub struct Role;

impl Model for User {
    const MODEL_NAME: &'static str = "User";
    const TABLE_NAME: &'static str = "users";
    const FILLABLE: &'static [&'static str] = &["email", "name", "visits"];
    const RULES: &'static [(&'static str, &'static str)] = &[("email", "required|email")];
    const SOFT_DELETES: bool = true;

    fn relations() -> Relations {
        Relations::new()
            .with(RelationDescriptor::has_many::<User, Post>("posts").on_delete(OnDelete::Restrict))
            .with(RelationDescriptor::belongs_to_many::<User, Role>("roles").on_delete(OnDelete::Detach))
    }
}

impl Model for Post {
    const MODEL_NAME: &'static str = "Post";
    const TABLE_NAME: &'static str = "posts";
    const FILLABLE: &'static [&'static str] = &["user_id", "title"];

    fn relations() -> Relations {
        Relations::new()
            .with(RelationDescriptor::belongs_to::<Post, User>("author"))
            .with(RelationDescriptor::has_many::<Post, Comment>("comments").on_delete(OnDelete::Cascade))
    }
}

impl Model for Comment {
    const MODEL_NAME: &'static str = "Comment";
    const TABLE_NAME: &'static str = "comments";
    const FILLABLE: &'static [&'static str] = &["post_id", "body"];
}

impl Model for Role {
    const MODEL_NAME: &'static str = "Role";
    const TABLE_NAME: &'static str = "roles";
    const FILLABLE: &'static [&'static str] = &["name"];
}

/// Engine over a fresh in-memory database with the blog schema.
pub async fn setup() -> (Engine, Recording) {
    let source = SqliteRowSource::open_in_memory()
        .await
        .expect("open in-memory database");
    let recording = Recording::new(source.shared());
    let engine = Engine::new(Arc::new(recording.clone()));

    let tables = [
        Blueprint::new("users")
            .increments("id")
            .string("email", 255)
            .unique()
            .string("name", 255)
            .nullable()
            .integer("visits")
            .default(0)
            .timestamps()
            .soft_deletes(),
        Blueprint::new("posts")
            .increments("id")
            .integer("user_id")
            .string("title", 255)
            .timestamps(),
        Blueprint::new("comments")
            .increments("id")
            .integer("post_id")
            .text("body")
            .timestamps(),
        Blueprint::new("roles").increments("id").string("name", 64).timestamps(),
        Blueprint::new("role_user").integer("user_id").integer("role_id"),
    ];
    for table in &tables {
        engine.create_table(table).await.expect("create table");
    }

    recording.clear();
    (engine, recording)
}

pub async fn user(engine: &Engine, email: &str) -> Record<User> {
    Record::<User>::create(engine, attrs! { "email" => email })
        .await
        .expect("create user")
}

pub async fn post(engine: &Engine, user_id: i64, title: &str) -> Record<Post> {
    Record::<Post>::create(engine, attrs! { "user_id" => user_id, "title" => title })
        .await
        .expect("create post")
}
