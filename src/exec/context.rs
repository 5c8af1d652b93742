//! Per-command execution state.
//!
//! A [`CommandContext`] carries the session handle and the variable scope a
//! plan executes under. Contexts form a parent chain: subquery plans run in
//! a child context whose variable lookups fall back to the parent, so a
//! nested plan sees outer bindings without being able to shadow them
//! permanently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::row::Row;
use crate::session::DatabaseSession;
use crate::value::Value;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The state a command executes under: session, variables, parent scope.
pub struct CommandContext {
    id: u64,
    session: Arc<dyn DatabaseSession>,
    variables: RwLock<HashMap<String, Value>>,
    parent: Option<Arc<CommandContext>>,
}

impl CommandContext {
    /// Creates a root context over the session.
    #[must_use]
    pub fn new(session: Arc<dyn DatabaseSession>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            session,
            variables: RwLock::new(HashMap::new()),
            parent: None,
        })
    }

    /// Creates a child context sharing the session, with this context as
    /// the variable-lookup fallback.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            session: Arc::clone(&self.session),
            variables: RwLock::new(HashMap::new()),
            parent: Some(Arc::clone(self)),
        })
    }

    /// A process-unique identifier for this context. Two handles compare
    /// as the same context iff their ids match.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The session this command runs against.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn DatabaseSession> {
        &self.session
    }

    /// Binds a variable in this context's own scope.
    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.into(), value);
    }

    /// Looks up a variable, falling back to the parent chain.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Value> {
        let own = self
            .variables
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned();
        match own {
            Some(value) => Some(value),
            None => self.parent.as_ref().and_then(|p| p.variable(name)),
        }
    }

    /// Binds `$current` to a snapshot of the given row.
    pub fn set_current(&self, row: &Row) {
        let snapshot = row.clone().into_projection();
        self.set_variable("$current", Value::Record(Box::new(snapshot)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySession;

    fn ctx() -> Arc<CommandContext> {
        CommandContext::new(Arc::new(MemorySession::new()))
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ctx().id(), ctx().id());
    }

    #[test]
    fn child_falls_back_to_parent() {
        let parent = ctx();
        parent.set_variable("depth", Value::Int(1));

        let child = parent.child();
        assert_eq!(child.variable("depth"), Some(Value::Int(1)));

        child.set_variable("depth", Value::Int(2));
        assert_eq!(child.variable("depth"), Some(Value::Int(2)));
        assert_eq!(parent.variable("depth"), Some(Value::Int(1)));
    }

    #[test]
    fn set_current_snapshots_the_row() {
        let ctx = ctx();
        let row = Row::projection(vec![("name".to_string(), Value::from("Alice"))]);
        ctx.set_current(&row);

        match ctx.variable("$current") {
            Some(Value::Record(record)) => {
                assert_eq!(record.get("name"), Some(&Value::from("Alice")));
            }
            other => panic!("unexpected binding: {other:?}"),
        }
    }
}
