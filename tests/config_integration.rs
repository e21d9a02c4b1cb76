//! Wiring an engine from `quarry.toml` settings.

use quarry_orm::config::QuarryConfig;
use quarry_orm::prelude::*;
use quarry_orm::sqlite::SqliteRowSource;

const CONFIG: &str = r#"
    [database]
    dialect = "sqlite"
    url = "sqlite://./quarry.db"

    [retry]
    max_retries = 2

    [environments.test.database]
    url = "sqlite::memory:"
"#;

#[tokio::test]
async fn test_engine_from_config() {
    let config: QuarryConfig = CONFIG.parse().unwrap();
    let config = config.with_environment("test");
    let url = config.database_url().unwrap();
    assert_eq!(url, "sqlite::memory:");

    let source = SqliteRowSource::open_url(url).await.unwrap();
    let engine = Engine::from_config(source.shared(), &config).unwrap();
    engine
        .create_table(&Blueprint::new("events").increments("id").string("name", 64))
        .await
        .unwrap();
    engine
        .insert("events", &attrs! { "name" => "boot" })
        .await
        .unwrap();
    assert_eq!(engine.count(&engine.table("events")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_dialect_mismatch_is_rejected() {
    let config: QuarryConfig = r#"
        [database]
        dialect = "postgres"
    "#
    .parse()
    .unwrap();

    let source = SqliteRowSource::open_in_memory().await.unwrap();
    let err = Engine::from_config(source.shared(), &config).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_unknown_keys_are_rejected() {
    let err = "[database]\nflavour = \"sqlite\"".parse::<QuarryConfig>().unwrap_err();
    assert!(err.is_configuration());
}
