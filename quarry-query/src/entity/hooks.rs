//! Lifecycle hooks.
//!
//! Hooks are registered explicitly on a [`Hooks`] registry returned by
//! [`Model::hooks`](super::Model::hooks): plain closures for one event, or a
//! [`Hook`] observer that sees every event. Handlers run in registration
//! order; the first `Err` stops the chain. An `Err` from a `*ing` event
//! aborts the write, one from a `*ed` event is returned after it.
//!
//! ```rust
//! use quarry_query::entity::hooks::{HookEvent, Hooks};
//! use quarry_query::entity::state::EntityState;
//!
//! let hooks = Hooks::new().on(HookEvent::Saving, |state| {
//!     if let Some(email) = state.get("email").and_then(|v| v.as_str()).map(str::to_lowercase) {
//!         state.set("email", email);
//!     }
//!     Ok(())
//! });
//!
//! let mut state = EntityState::new();
//! state.set("email", "Ada@Example.COM");
//! hooks.fire(HookEvent::Saving, &mut state).unwrap();
//! assert_eq!(state.get("email").unwrap().as_str(), Some("ada@example.com"));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::QueryResult;

use super::state::EntityState;

/// Points in the entity lifecycle where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Before an insert.
    Creating,
    /// After an insert.
    Created,
    /// Before an update of an existing row.
    Updating,
    /// After an update.
    Updated,
    /// Before any insert or update.
    Saving,
    /// After any insert or update.
    Saved,
    /// Before a soft or hard delete.
    Deleting,
    /// After a delete.
    Deleted,
    /// Before a soft-deleted row is restored.
    Restoring,
    /// After a restore.
    Restored,
}

impl HookEvent {
    /// Whether the event fires before the write.
    pub fn is_before(&self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Updating | Self::Saving | Self::Deleting | Self::Restoring
        )
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An observer notified of every lifecycle event.
pub trait Hook: Send + Sync {
    /// Handle `event` for `state`.
    fn handle(&self, event: HookEvent, state: &mut EntityState) -> QueryResult<()>;
}

type HookFn = Arc<dyn Fn(&mut EntityState) -> QueryResult<()> + Send + Sync>;

enum Handler {
    Event(HookEvent, HookFn),
    Observer(Arc<dyn Hook>),
}

impl Clone for Handler {
    fn clone(&self) -> Self {
        match self {
            Self::Event(event, f) => Self::Event(*event, Arc::clone(f)),
            Self::Observer(o) => Self::Observer(Arc::clone(o)),
        }
    }
}

/// Ordered hook registry for one model.
#[derive(Clone, Default)]
pub struct Hooks {
    handlers: Vec<Handler>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Hooks {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` on `event`.
    pub fn on<F>(mut self, event: HookEvent, f: F) -> Self
    where
        F: Fn(&mut EntityState) -> QueryResult<()> + Send + Sync + 'static,
    {
        self.handlers.push(Handler::Event(event, Arc::new(f)));
        self
    }

    /// Register an observer for every event.
    pub fn observe(mut self, hook: Arc<dyn Hook>) -> Self {
        self.handlers.push(Handler::Observer(hook));
        self
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler for `event`.
    pub fn fire(&self, event: HookEvent, state: &mut EntityState) -> QueryResult<()> {
        for handler in &self.handlers {
            match handler {
                Handler::Event(on, f) if *on == event => {
                    f(state).map_err(|e| e.with_context(format!("{} hook", event)))?
                }
                Handler::Event(..) => {}
                Handler::Observer(hook) => hook
                    .handle(event, state)
                    .map_err(|e| e.with_context(format!("{} hook", event)))?,
            }
        }
        Ok(())
    }
}
