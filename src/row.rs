//! Result rows produced by execution steps.
//!
//! A row is either a projection (a detached set of named values, possibly
//! remembering which record it was derived from) or a live view over a
//! stored entity. Live rows observe in-transaction mutation until they are
//! snapshotted by the projection-conversion step at the top of a plan.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::value::{Entity, RecordId, Value};

fn read_entity(entity: &RwLock<Entity>) -> std::sync::RwLockReadGuard<'_, Entity> {
    entity.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_entity(entity: &RwLock<Entity>) -> std::sync::RwLockWriteGuard<'_, Entity> {
    entity.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A detached row: named values in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    properties: Vec<(String, Value)>,
    rid: Option<RecordId>,
}

impl ProjectionRow {
    /// Creates an empty projection row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty projection row derived from the given record.
    #[must_use]
    pub fn with_rid(rid: RecordId) -> Self {
        Self { properties: Vec::new(), rid: Some(rid) }
    }

    /// The record this row was derived from, if any.
    #[must_use]
    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    /// Gets a property value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Sets a property. Re-setting an existing name replaces its value in
    /// place, keeping the original position.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    /// Property names in insertion order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.properties.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Property name/value pairs in insertion order.
    #[must_use]
    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// True when the row carries no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// A row backed by a stored entity. Reads go through the shared lock so
/// mutations made after the row was produced are still visible.
#[derive(Debug, Clone)]
pub struct LiveRow {
    entity: Arc<RwLock<Entity>>,
}

impl LiveRow {
    /// Wraps a shared entity as a live row.
    #[must_use]
    pub fn new(entity: Arc<RwLock<Entity>>) -> Self {
        Self { entity }
    }

    /// The identity of the backing record.
    #[must_use]
    pub fn rid(&self) -> RecordId {
        read_entity(&self.entity).rid
    }

    /// The class of the backing record.
    #[must_use]
    pub fn class_name(&self) -> String {
        read_entity(&self.entity).class_name.clone()
    }

    /// Gets a property value by name, cloning out of the shared entity.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        read_entity(&self.entity).get(name).cloned()
    }

    /// Sets a property on the backing entity.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        write_entity(&self.entity).set(name, value);
    }

    /// Copies the entity's current state into a detached projection row,
    /// including the record identity.
    #[must_use]
    pub fn take_snapshot(&self) -> ProjectionRow {
        let entity = read_entity(&self.entity);
        let mut row = ProjectionRow::with_rid(entity.rid);
        for (name, value) in &entity.properties {
            row.set(name.clone(), value.clone());
        }
        row
    }

    /// The shared entity handle.
    #[must_use]
    pub fn entity(&self) -> Arc<RwLock<Entity>> {
        Arc::clone(&self.entity)
    }
}

/// A row flowing between steps.
#[derive(Debug, Clone)]
pub enum Row {
    /// A detached projection row.
    Projection(ProjectionRow),
    /// A live view over a stored entity.
    Live(LiveRow),
}

impl Row {
    /// Builds a projection row from name/value pairs.
    #[must_use]
    pub fn projection(pairs: Vec<(String, Value)>) -> Self {
        let mut row = ProjectionRow::new();
        for (name, value) in pairs {
            row.set(name, value);
        }
        Self::Projection(row)
    }

    /// True for entity-backed rows.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    /// The record this row is backed by or was derived from, if any.
    #[must_use]
    pub fn rid(&self) -> Option<RecordId> {
        match self {
            Self::Projection(p) => p.rid(),
            Self::Live(l) => Some(l.rid()),
        }
    }

    /// Gets a property value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Self::Projection(p) => p.get(name).cloned(),
            Self::Live(l) => l.get(name),
        }
    }

    /// Sets a property. On live rows this writes through to the entity.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        match self {
            Self::Projection(p) => p.set(name, value),
            Self::Live(l) => l.set(name, value),
        }
    }

    /// Property names in insertion order.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        match self {
            Self::Projection(p) => p.property_names(),
            Self::Live(l) => {
                let entity = l.entity();
                let guard = read_entity(&entity);
                guard.properties.iter().map(|(n, _)| n.clone()).collect()
            }
        }
    }

    /// Detaches this row into a projection row. Projection rows pass
    /// through unchanged; live rows are snapshotted.
    #[must_use]
    pub fn into_projection(self) -> ProjectionRow {
        match self {
            Self::Projection(p) => p,
            Self::Live(l) => l.take_snapshot(),
        }
    }
}
