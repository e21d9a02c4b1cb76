//! Entity lifecycle against a real SQLite database.

mod common;

use common::{User, post, setup, user};
use pretty_assertions::assert_eq;
use quarry_orm::prelude::*;

/// Columns assigned by an `UPDATE ... SET ... WHERE` statement, sorted.
fn set_columns(update: &str) -> Vec<&str> {
    let start = update.find(" SET ").map_or(0, |i| i + 5);
    let end = update.find(" WHERE ").unwrap_or(update.len());
    let mut columns: Vec<&str> = update[start..end]
        .split(", ")
        .map(|assignment| assignment.trim_end_matches(" = ?"))
        .collect();
    columns.sort_unstable();
    columns
}

#[tokio::test]
async fn test_create_assigns_key_and_timestamps() {
    let (engine, _log) = setup().await;

    let ada = user(&engine, "ada@example.com").await;
    assert!(ada.exists());
    assert_eq!(ada.key(), Some(&FilterValue::Int(1)));
    assert!(!ada.is_dirty());
    assert!(ada.get("created_at").is_some_and(|v| !v.is_null()));

    let found = User::query(&engine).find_or_fail(1).await.unwrap();
    assert_eq!(found.try_get::<String>("email").unwrap(), "ada@example.com");
    assert_eq!(found.try_get::<i64>("visits").unwrap(), 0);
}

#[tokio::test]
async fn test_create_rejects_invalid_and_empty_input() {
    let (engine, log) = setup().await;

    let err = Record::<User>::create(&engine, attrs! { "email" => "not-an-email" })
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.validation_errors().is_some_and(|e| e.has("email")));

    let err = Record::<User>::create(&engine, attrs! { "email" => "  ", "role" => "admin" })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RequiredFieldMissing);

    assert_eq!(log.count_starting_with("INSERT"), 0);
}

#[tokio::test]
async fn test_dirty_save_updates_only_changed_columns() {
    let (engine, log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;
    log.clear();

    assert!(!ada.save(&engine).await.unwrap());
    assert!(log.statements().is_empty());

    ada.set("name", "Ada");
    assert!(ada.save(&engine).await.unwrap());

    let statements = log.statements();
    assert_eq!(statements.len(), 1);
    let update = &statements[0];
    assert!(update.starts_with("UPDATE \"users\" SET "));
    assert!(update.ends_with(" WHERE \"id\" = ?"));
    assert_eq!(set_columns(update), vec!["\"name\"", "\"updated_at\""]);
    assert!(!ada.is_dirty());

    let mut reloaded = User::query(&engine).find_or_fail(1).await.unwrap();
    assert_eq!(reloaded.try_get::<String>("name").unwrap(), "Ada");
    reloaded.refresh(&engine).await.unwrap();
    assert_eq!(reloaded.get("email"), ada.get("email"));
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let (engine, _log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;
    user(&engine, "grace@example.com").await;

    ada.delete(&engine).await.unwrap();
    assert!(ada.is_trashed());

    assert_eq!(User::query(&engine).count().await.unwrap(), 1);
    assert_eq!(User::query(&engine).with_trashed().count().await.unwrap(), 2);
    let trashed = User::query(&engine).only_trashed().get().await.unwrap();
    assert_eq!(trashed.len(), 1);
    assert_eq!(trashed[0].key(), Some(&FilterValue::Int(1)));
    assert!(User::query(&engine).find(1).await.unwrap().is_none());

    // The row is still there.
    let raw = engine.count(&engine.table("users")).await.unwrap();
    assert_eq!(raw, 2);

    ada.restore(&engine).await.unwrap();
    assert!(!ada.is_trashed());
    assert_eq!(User::query(&engine).count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_soft_delete_writes_only_the_stamp() {
    let (engine, log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;
    log.clear();

    ada.delete(&engine).await.unwrap();
    let statements = log.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(set_columns(&statements[0]), vec!["\"deleted_at\"", "\"updated_at\""]);
}

#[tokio::test]
async fn test_failed_soft_delete_leaves_record_unchanged() {
    let (engine, _log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;
    engine.drop_table_if_exists("users").await.unwrap();

    let err = ada.delete(&engine).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DatabaseError);
    assert!(!ada.is_trashed());
    assert!(!ada.is_dirty());
}

#[tokio::test]
async fn test_scope_covers_or_groups() {
    let (engine, _log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;
    user(&engine, "grace@example.com").await;
    ada.delete(&engine).await.unwrap();

    let found = User::query(&engine)
        .r#where("email", "ada@example.com")
        .or_where("email", "grace@example.com")
        .get()
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].try_get::<String>("email").unwrap(), "grace@example.com");
}

#[tokio::test]
async fn test_force_delete_restricted_by_posts() {
    let (engine, log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;
    post(&engine, 1, "Notes").await;
    log.clear();

    let err = ada.force_delete(&engine).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DeleteRestricted);
    assert_eq!(log.count_starting_with("DELETE"), 0);
    assert_eq!(log.count_starting_with("ROLLBACK"), 1);
    assert_eq!(User::query(&engine).count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_increment_and_decrement() {
    let (engine, _log) = setup().await;
    let mut ada = user(&engine, "ada@example.com").await;

    ada.increment(&engine, "visits", 3).await.unwrap();
    ada.decrement(&engine, "visits", 1).await.unwrap();
    assert_eq!(ada.try_get::<i64>("visits").unwrap(), 2);
    assert!(!ada.is_dirty());

    let stored = User::query(&engine).find_or_fail(1).await.unwrap();
    assert_eq!(stored.try_get::<i64>("visits").unwrap(), 2);
}

#[tokio::test]
async fn test_paginate_records() {
    let (engine, _log) = setup().await;
    for i in 0..5 {
        user(&engine, &format!("user{}@example.com", i)).await;
    }

    let page = User::query(&engine).oldest("id").paginate(2, 2).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.last_page, 3);
    let keys: Vec<i64> = page.data.iter().map(|u| u.try_get::<i64>("id").unwrap()).collect();
    assert_eq!(keys, vec![3, 4]);
}
