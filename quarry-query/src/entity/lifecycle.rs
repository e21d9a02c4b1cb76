//! Persistence lifecycle over type-erased entity state.
//!
//! Order on every write: validate, pre-hooks, stamp timestamps, write, sync
//! the original snapshot, post-hooks.

use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{QueryError, QueryResult, ValidationErrors};
use crate::filter::FilterValue;
use crate::query::QueryBuilder;
use crate::row::Attributes;

use super::hooks::HookEvent;
use super::state::EntityState;
use super::validation::{RuleRegistry, RuleSet, Validator};
use super::{CREATED_AT, DELETED_AT, ModelInfo, UPDATED_AT, cascade, now_stamp};

/// Drop blank values unless the column is nullable.
pub fn sanitize(info: &ModelInfo, input: Attributes) -> Attributes {
    input
        .into_iter()
        .filter(|(column, value)| !value.is_blank() || info.is_nullable(column))
        .collect()
}

/// Keep only fillable columns.
pub fn fillable(info: &ModelInfo, input: Attributes) -> Attributes {
    input
        .into_iter()
        .filter(|(column, _)| info.is_fillable(column))
        .collect()
}

/// Run the declared rules, then the custom validator.
pub fn validate(
    info: &ModelInfo,
    attributes: &Attributes,
    ignore_id: Option<&FilterValue>,
) -> QueryResult<()> {
    let mut errors = ValidationErrors::new();
    if !info.rules.is_empty() {
        let rules = RuleSet::parse(&RuleRegistry::default(), info.rules)
            .map_err(|e| e.with_model(info.name))?;
        if let Err(bag) = rules.validate(attributes, ignore_id) {
            errors.merge(bag);
        }
    }
    if let Some(validator) = info.validator() {
        if let Err(bag) = validator.validate(attributes, ignore_id) {
            errors.merge(bag);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(QueryError::validation(errors).with_model(info.name))
    }
}

/// The primary key of a persisted entity.
pub fn key_of(info: &ModelInfo, state: &EntityState) -> QueryResult<FilterValue> {
    state
        .get(info.primary_key)
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| {
            QueryError::invalid_input(info.primary_key, "entity has no primary key")
                .with_model(info.name)
        })
}

fn by_key(info: &ModelInfo, key: FilterValue) -> QueryBuilder {
    QueryBuilder::table(info.table).r#where(info.primary_key, key)
}

/// Sanitize, filter and insert `input` as a new entity.
pub async fn create(engine: &Engine, info: &ModelInfo, input: Attributes) -> QueryResult<EntityState> {
    let attributes = fillable(info, sanitize(info, input));
    if attributes.is_empty() {
        return Err(QueryError::empty_payload(info.name));
    }
    let mut state = EntityState::new();
    for (column, value) in attributes {
        state.set(column, value);
    }
    insert(engine, info, &mut state).await?;
    Ok(state)
}

/// Insert a new entity or update the dirty columns of a persisted one.
///
/// Returns whether a statement was issued.
pub async fn save(engine: &Engine, info: &ModelInfo, state: &mut EntityState) -> QueryResult<bool> {
    if state.exists() {
        update(engine, info, state, &[]).await
    } else {
        insert(engine, info, state).await?;
        Ok(true)
    }
}

async fn insert(engine: &Engine, info: &ModelInfo, state: &mut EntityState) -> QueryResult<()> {
    validate(info, state.attributes(), None)?;

    let hooks = info.hooks();
    let mut draft = state.clone();
    hooks.fire(HookEvent::Saving, &mut draft)?;
    hooks.fire(HookEvent::Creating, &mut draft)?;

    if info.timestamps {
        let now = now_stamp();
        if draft.get(CREATED_AT).is_none_or(FilterValue::is_null) {
            draft.set(CREATED_AT, now.clone());
        }
        draft.set(UPDATED_AT, now);
    }

    match draft.get(info.primary_key).filter(|v| !v.is_null()) {
        Some(_) => {
            engine.insert(info.table, draft.attributes()).await?;
        }
        None => {
            let mut values = draft.attributes().clone();
            values.shift_remove(info.primary_key);
            let id = engine.insert_get_id(info.table, &values, info.primary_key).await?;
            draft.set(info.primary_key, id);
        }
    }

    *state = draft;
    state.set_exists(true);
    state.sync_original();
    debug!(model = info.name, "Entity inserted");

    hooks.fire(HookEvent::Created, state)?;
    hooks.fire(HookEvent::Saved, state)?;
    Ok(())
}

/// Persist the dirty columns plus `forced`. The soft-delete column is
/// written only when forced.
///
/// Work happens on a copy; `state` changes only once the row is written.
async fn update(
    engine: &Engine,
    info: &ModelInfo,
    state: &mut EntityState,
    forced: &[(&str, FilterValue)],
) -> QueryResult<bool> {
    let mut draft = state.clone();
    for (column, value) in forced {
        draft.set(*column, value.clone());
    }
    let changes = |draft: &EntityState| {
        let mut changes = draft.dirty_except(&[DELETED_AT]);
        for (column, _) in forced {
            if let Some(value) = draft.get(column) {
                changes.insert((*column).to_string(), value.clone());
            }
        }
        changes
    };

    if changes(&draft).is_empty() {
        return Ok(false);
    }

    let key = key_of(info, &draft)?;
    if info.timestamps {
        draft.set(UPDATED_AT, now_stamp());
    }
    validate(info, draft.attributes(), Some(&key))?;

    let hooks = info.hooks();
    hooks.fire(HookEvent::Saving, &mut draft)?;
    hooks.fire(HookEvent::Updating, &mut draft)?;

    let values = changes(&draft);
    engine.update(&by_key(info, key), &values).await?;

    *state = draft;
    let columns: Vec<&str> = values.keys().map(String::as_str).collect();
    state.sync_original_columns(&columns);
    debug!(model = info.name, columns = ?columns, "Entity updated");

    hooks.fire(HookEvent::Updated, state)?;
    hooks.fire(HookEvent::Saved, state)?;
    Ok(true)
}

/// Soft-delete when the model supports it, otherwise hard-delete.
pub async fn delete(engine: &Engine, info: &ModelInfo, state: &mut EntityState) -> QueryResult<()> {
    if !info.soft_deletes {
        return force_delete(engine, info, state).await;
    }
    key_of(info, state)?;

    let hooks = info.hooks();
    hooks.fire(HookEvent::Deleting, state)?;
    update(engine, info, state, &[(DELETED_AT, now_stamp())]).await?;
    hooks.fire(HookEvent::Deleted, state)?;
    info!(model = info.name, "Entity soft-deleted");
    Ok(())
}

/// Resolve relation delete rules and remove the row, in one transaction.
pub async fn force_delete(
    engine: &Engine,
    info: &ModelInfo,
    state: &mut EntityState,
) -> QueryResult<()> {
    let key = key_of(info, state)?;

    let hooks = info.hooks();
    hooks.fire(HookEvent::Deleting, state)?;

    let snapshot = state.clone();
    engine
        .transaction(|tx| async move {
            cascade::resolve(&tx, info, &snapshot).await?;
            tx.delete(&by_key(info, key)).await
        })
        .await?;

    state.set_exists(false);
    hooks.fire(HookEvent::Deleted, state)?;
    info!(model = info.name, "Entity deleted");
    Ok(())
}

/// Clear the soft-delete stamp.
pub async fn restore(engine: &Engine, info: &ModelInfo, state: &mut EntityState) -> QueryResult<()> {
    if !info.soft_deletes {
        return Err(QueryError::configuration(format!(
            "model '{}' does not use soft deletes",
            info.name
        )));
    }

    let hooks = info.hooks();
    hooks.fire(HookEvent::Restoring, state)?;
    update(engine, info, state, &[(DELETED_AT, FilterValue::Null)]).await?;
    hooks.fire(HookEvent::Restored, state)?;
    Ok(())
}

/// Reload attributes from the row, trashed or not. Loaded relations are
/// dropped.
pub async fn refresh(engine: &Engine, info: &ModelInfo, state: &mut EntityState) -> QueryResult<()> {
    let key = key_of(info, state)?;
    let row = engine
        .first(&by_key(info, key))
        .await?
        .ok_or_else(|| QueryError::not_found(info.name))?;
    state.replace(row.into_attributes());
    Ok(())
}

/// Add `amount` to `column` in the row and in `state`.
pub async fn increment(
    engine: &Engine,
    info: &ModelInfo,
    state: &mut EntityState,
    column: &str,
    amount: i64,
) -> QueryResult<()> {
    let key = key_of(info, state)?;
    let overflow = || {
        QueryError::invalid_input(column, format!("adding {} overflows the counter", amount))
            .with_model(info.name)
    };
    let next = match state.get(column) {
        Some(FilterValue::Int(n)) => FilterValue::Int(n.checked_add(amount).ok_or_else(overflow)?),
        None | Some(FilterValue::Null) => FilterValue::Int(amount),
        Some(other) => FilterValue::Float(other.as_f64().unwrap_or(0.0) + amount as f64),
    };

    let mut extra = Attributes::new();
    if info.timestamps {
        extra.insert(UPDATED_AT.to_string(), now_stamp());
    }

    if amount >= 0 {
        engine
            .increment_with(&by_key(info, key), column, amount, &extra)
            .await?;
    } else {
        let magnitude = amount.checked_neg().ok_or_else(overflow)?;
        engine
            .decrement_with(&by_key(info, key), column, magnitude, &extra)
            .await?;
    }

    state.set(column, next);
    let mut columns = vec![column];
    for (name, value) in &extra {
        state.set(name.clone(), value.clone());
        columns.push(name.as_str());
    }
    state.sync_original_columns(&columns);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Model;
    use crate::entity::hooks::Hooks;
    use crate::mock::MockRowSource;
    use crate::row::Row;
    use crate::sql::Dialect;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::LazyLock;

    static EVENTS: LazyLock<Mutex<Vec<HookEvent>>> = LazyLock::new(|| Mutex::new(Vec::new()));

    struct Account;

    impl Model for Account {
        const MODEL_NAME: &'static str = "Account";
        const TABLE_NAME: &'static str = "accounts";
        const FILLABLE: &'static [&'static str] = &["email", "name", "bio"];
        const NULLABLE: &'static [&'static str] = &["bio"];
        const RULES: &'static [(&'static str, &'static str)] = &[("email", "required|email")];
        const TIMESTAMPS: bool = false;
        const SOFT_DELETES: bool = true;
    }

    struct Stamped;

    impl Model for Stamped {
        const MODEL_NAME: &'static str = "Stamped";
        const TABLE_NAME: &'static str = "stamped";
    }

    struct Audited;

    impl Model for Audited {
        const MODEL_NAME: &'static str = "Audited";
        const TABLE_NAME: &'static str = "audited";

        fn hooks() -> Hooks {
            Hooks::new()
                .on(HookEvent::Saving, |_| {
                    EVENTS.lock().push(HookEvent::Saving);
                    Ok(())
                })
                .on(HookEvent::Creating, |_| {
                    EVENTS.lock().push(HookEvent::Creating);
                    Ok(())
                })
                .on(HookEvent::Created, |_| {
                    EVENTS.lock().push(HookEvent::Created);
                    Ok(())
                })
                .on(HookEvent::Saved, |_| {
                    EVENTS.lock().push(HookEvent::Saved);
                    Ok(())
                })
        }
    }

    fn engine() -> (MockRowSource, Engine) {
        let mock = MockRowSource::new(Dialect::Sqlite);
        let engine = Engine::new(mock.shared());
        (mock, engine)
    }

    fn input(pairs: &[(&str, FilterValue)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn persisted() -> EntityState {
        EntityState::from_row(Row::from_pairs([
            ("id", FilterValue::Int(4)),
            ("email", "a@x.io".into()),
            ("name", "Ada".into()),
            ("deleted_at", FilterValue::Null),
        ]))
    }

    #[test]
    fn test_sanitize_and_fillable() {
        let info = Account::info();
        let cleaned = fillable(
            &info,
            sanitize(
                &info,
                input(&[
                    ("email", "a@x.io".into()),
                    ("name", "".into()),
                    ("bio", FilterValue::Null),
                    ("is_admin", true.into()),
                ]),
            ),
        );
        let columns: Vec<&str> = cleaned.keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["email", "bio"]);
    }

    #[tokio::test]
    async fn test_create_inserts_and_captures_key() {
        let (mock, engine) = engine();
        let state = create(&engine, &Account::info(), input(&[("email", "a@x.io".into())]))
            .await
            .unwrap();

        assert!(state.exists());
        assert!(!state.is_dirty());
        assert_eq!(state.get("id"), Some(&FilterValue::Int(1)));
        assert_eq!(mock.sql_log(), vec!["INSERT INTO \"accounts\" (\"email\") VALUES (?)"]);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_invalid() {
        let (mock, engine) = engine();

        let err = create(&engine, &Account::info(), input(&[("is_admin", true.into())]))
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RequiredFieldMissing);

        let err = create(&engine, &Account::info(), input(&[("email", "nope".into())]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.validation_errors().unwrap().has("email"));
        assert_eq!(mock.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_create_hook_order() {
        let (_mock, engine) = engine();
        create(&engine, &Audited::info(), input(&[("name", "x".into())]))
            .await
            .unwrap();
        assert_eq!(
            *EVENTS.lock(),
            vec![
                HookEvent::Saving,
                HookEvent::Creating,
                HookEvent::Created,
                HookEvent::Saved
            ]
        );
    }

    #[tokio::test]
    async fn test_clean_save_is_noop() {
        let (mock, engine) = engine();
        let mut state = persisted();
        assert!(!save(&engine, &Account::info(), &mut state).await.unwrap());
        assert_eq!(mock.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_save_updates_only_dirty_columns() {
        let (mock, engine) = engine();
        let mut state = persisted();
        state.set("email", "b@x.io");

        assert!(save(&engine, &Account::info(), &mut state).await.unwrap());
        let statement = &mock.statements()[0];
        assert_eq!(statement.sql, "UPDATE \"accounts\" SET \"email\" = ? WHERE \"id\" = ?");
        assert_eq!(statement.params, vec![FilterValue::from("b@x.io"), FilterValue::Int(4)]);
        assert!(!state.is_dirty());
    }

    #[tokio::test]
    async fn test_save_ignores_manual_deleted_at() {
        let (mock, engine) = engine();
        let mut state = persisted();
        state.set("deleted_at", "2020-01-01 00:00:00");

        assert!(!save(&engine, &Account::info(), &mut state).await.unwrap());
        assert_eq!(mock.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_soft_delete_and_restore() {
        let (mock, engine) = engine();
        let info = Account::info();
        let mut state = persisted();

        delete(&engine, &info, &mut state).await.unwrap();
        assert!(state.exists());
        assert!(!state.get("deleted_at").unwrap().is_null());

        restore(&engine, &info, &mut state).await.unwrap();
        assert!(state.get("deleted_at").unwrap().is_null());

        assert_eq!(
            mock.sql_log(),
            vec![
                "UPDATE \"accounts\" SET \"deleted_at\" = ? WHERE \"id\" = ?",
                "UPDATE \"accounts\" SET \"deleted_at\" = ? WHERE \"id\" = ?",
            ]
        );
        assert_eq!(mock.statements()[1].params[0], FilterValue::Null);
    }

    #[tokio::test]
    async fn test_force_delete_runs_in_transaction() {
        let (mock, engine) = engine();
        let mut state = persisted();

        force_delete(&engine, &Account::info(), &mut state).await.unwrap();
        assert!(!state.exists());
        assert_eq!(
            mock.sql_log(),
            vec!["BEGIN", "DELETE FROM \"accounts\" WHERE \"id\" = ?", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn test_failed_soft_delete_leaves_state_untouched() {
        let (mock, engine) = engine();
        let info = Account::info();
        let mut state = persisted();
        let before = state.clone();

        mock.fail_next(QueryError::database("no such table: accounts"));
        let err = delete(&engine, &info, &mut state).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DatabaseError);
        assert_eq!(state, before);
        assert!(state.get("deleted_at").unwrap().is_null());
        assert!(!state.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_stamp() {
        let (mock, engine) = engine();
        let info = Account::info();
        let mut state = persisted();
        delete(&engine, &info, &mut state).await.unwrap();
        let stamp = state.get("deleted_at").cloned();

        mock.fail_next(QueryError::database("disk I/O error"));
        restore(&engine, &info, &mut state).await.unwrap_err();
        assert_eq!(state.get("deleted_at").cloned(), stamp);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_changes_dirty() {
        let (mock, engine) = engine();
        let info = Stamped::info();
        let mut state = persisted();
        state.set("name", "Grace");

        mock.fail_next(QueryError::database("database is locked"));
        save(&engine, &info, &mut state).await.unwrap_err();
        assert!(state.is_dirty_column("name"));
        assert!(state.get("updated_at").is_none());

        save(&engine, &info, &mut state).await.unwrap();
        assert!(!state.is_dirty());
        assert!(state.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn test_refresh_missing_row() {
        let (_mock, engine) = engine();
        let mut state = persisted();
        let err = refresh(&engine, &Account::info(), &mut state).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_increment_updates_state() {
        let (mock, engine) = engine();
        let mut state = EntityState::from_row(Row::from_pairs([("id", 1), ("views", 10)]));

        increment(&engine, &Account::info(), &mut state, "views", 5).await.unwrap();
        assert_eq!(state.get("views"), Some(&FilterValue::Int(15)));
        increment(&engine, &Account::info(), &mut state, "views", -3).await.unwrap();
        assert_eq!(state.get("views"), Some(&FilterValue::Int(12)));
        assert!(!state.is_dirty());
        assert!(mock.sql_log()[1].contains("\"views\" = \"views\" - ?"));
    }

    #[tokio::test]
    async fn test_increment_overflow_is_rejected() {
        let (mock, engine) = engine();
        let info = Account::info();
        let mut state = EntityState::from_row(Row::from_pairs([("id", 1), ("views", i64::MAX - 1)]));

        let err = increment(&engine, &info, &mut state, "views", 5).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidParameter);

        let mut fresh = EntityState::from_row(Row::from_pairs([("id", 1), ("views", 0)]));
        let err = increment(&engine, &info, &mut fresh, "views", i64::MIN).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidParameter);

        assert_eq!(state.get("views"), Some(&FilterValue::Int(i64::MAX - 1)));
        assert_eq!(mock.statement_count(), 0);
    }
}
