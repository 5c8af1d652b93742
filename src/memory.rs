//! An in-memory [`DatabaseSession`] backend.
//!
//! Backs the test suite and serves as the reference implementation of the
//! session contract: class hierarchy, per-property indexes, a simple
//! transaction journal with rollback, and injectable commit conflicts for
//! exercising retry paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ast::{IndexLookupKind, IndexedFunctionCondition};
use crate::error::{ExecResult, ExecutionError};
use crate::session::{DatabaseSession, IndexEntry};
use crate::value::{Entity, RecordId, Value};

type SharedEntity = Arc<RwLock<Entity>>;

/// Resolves an indexed-function condition against a class. Registered on
/// the session by name.
pub type IndexedFunctionResolver =
    dyn Fn(&IndexedFunctionCondition, &[SharedEntity]) -> ExecResult<Vec<RecordId>> + Send + Sync;

#[derive(Default)]
struct ClassDef {
    superclass: Option<String>,
}

#[derive(Default)]
struct IndexDef {
    class_name: String,
    property: String,
    entries: Vec<IndexEntry>,
}

#[derive(Default)]
struct Journal {
    active: bool,
    created: Vec<RecordId>,
    deleted: Vec<(RecordId, Entity)>,
}

#[derive(Default)]
struct Store {
    classes: HashMap<String, ClassDef>,
    records: HashMap<RecordId, SharedEntity>,
    indexes: HashMap<String, IndexDef>,
    journal: Journal,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// In-memory session. Cheap to clone via `Arc`; all interior state is
/// behind locks so a session can be shared across contexts.
pub struct MemorySession {
    store: RwLock<Store>,
    functions: RwLock<HashMap<String, Arc<IndexedFunctionResolver>>>,
    next_position: AtomicU64,
    pending_conflicts: AtomicU32,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            functions: RwLock::new(HashMap::new()),
            next_position: AtomicU64::new(1),
            pending_conflicts: AtomicU32::new(0),
        }
    }

    /// Arranges for the next `n` commits to fail with a conflict before
    /// one succeeds. Used to exercise retry handling.
    pub fn inject_commit_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Registers an indexed function by name.
    pub fn register_indexed_function(
        &self,
        name: impl Into<String>,
        resolver: Arc<IndexedFunctionResolver>,
    ) {
        write_lock(&self.functions).insert(name.into(), resolver);
    }

    /// Creates an index over `class_name.property`. Existing records of
    /// the class are indexed immediately.
    pub fn create_index(&self, index_name: &str, class_name: &str, property: &str) {
        let mut store = write_lock(&self.store);
        let mut entries = Vec::new();
        for entity in store.records.values() {
            let guard = read_lock(entity);
            if guard.class_name == class_name {
                if let Some(value) = guard.get(property) {
                    entries.push(IndexEntry { key: value.clone(), rid: guard.rid });
                }
            }
        }
        store.indexes.insert(
            index_name.to_string(),
            IndexDef {
                class_name: class_name.to_string(),
                property: property.to_string(),
                entries,
            },
        );
    }

    /// Appends a raw index entry without touching any record. Lets tests
    /// simulate duplicate or dangling entries.
    pub fn index_put(&self, index_name: &str, key: Value, rid: RecordId) {
        let mut store = write_lock(&self.store);
        if let Some(index) = store.indexes.get_mut(index_name) {
            index.entries.push(IndexEntry { key, rid });
        }
    }

    fn class_chain_matches(store: &Store, class_name: &str, base: &str) -> bool {
        let mut current = Some(class_name.to_string());
        while let Some(name) = current {
            if name == base {
                return true;
            }
            current = store.classes.get(&name).and_then(|c| c.superclass.clone());
        }
        false
    }

    fn require_class<'a>(store: &'a Store, class_name: &str) -> ExecResult<&'a ClassDef> {
        store
            .classes
            .get(class_name)
            .ok_or_else(|| ExecutionError::Command(format!("class not found: {class_name}")))
    }
}

impl DatabaseSession for MemorySession {
    fn class_exists(&self, class_name: &str) -> bool {
        read_lock(&self.store).classes.contains_key(class_name)
    }

    fn create_class(&self, class_name: &str, superclass: Option<&str>) -> ExecResult<()> {
        let mut store = write_lock(&self.store);
        if let Some(base) = superclass {
            Self::require_class(&store, base)?;
        }
        store.classes.insert(
            class_name.to_string(),
            ClassDef { superclass: superclass.map(str::to_string) },
        );
        Ok(())
    }

    fn record_count(&self, class_name: &str) -> ExecResult<u64> {
        let store = read_lock(&self.store);
        Self::require_class(&store, class_name)?;
        let count = store
            .records
            .values()
            .filter(|e| Self::class_chain_matches(&store, &read_lock(e).class_name, class_name))
            .count();
        Ok(count as u64)
    }

    fn is_subclass_of(&self, class_name: &str, base: &str) -> ExecResult<bool> {
        let store = read_lock(&self.store);
        Self::require_class(&store, class_name)?;
        Ok(Self::class_chain_matches(&store, class_name, base))
    }

    fn index_entry_count(&self, index_name: &str, _kind: IndexLookupKind) -> ExecResult<u64> {
        let store = read_lock(&self.store);
        let index = store
            .indexes
            .get(index_name)
            .ok_or_else(|| ExecutionError::Command(format!("index not found: {index_name}")))?;
        Ok(index.entries.len() as u64)
    }

    fn index_lookup(&self, index_name: &str, key: &Value) -> ExecResult<Vec<IndexEntry>> {
        let store = read_lock(&self.store);
        let index = store
            .indexes
            .get(index_name)
            .ok_or_else(|| ExecutionError::Command(format!("index not found: {index_name}")))?;
        Ok(index.entries.iter().filter(|e| &e.key == key).cloned().collect())
    }

    fn index_for_property(&self, class_name: &str, property: &str) -> Option<String> {
        let store = read_lock(&self.store);
        store
            .indexes
            .iter()
            .find(|(_, def)| def.class_name == class_name && def.property == property)
            .map(|(name, _)| name.clone())
    }

    fn evaluate_indexed_function(
        &self,
        condition: &IndexedFunctionCondition,
        target_class: &str,
    ) -> ExecResult<Vec<RecordId>> {
        let resolver = read_lock(&self.functions)
            .get(&condition.call.function)
            .cloned()
            .ok_or_else(|| {
                ExecutionError::Command(format!(
                    "no index backs function: {}",
                    condition.call.function
                ))
            })?;
        let candidates = self.scan_class(target_class)?;
        resolver(condition, &candidates)
    }

    fn load_record(&self, rid: RecordId) -> ExecResult<SharedEntity> {
        read_lock(&self.store)
            .records
            .get(&rid)
            .cloned()
            .ok_or(ExecutionError::RecordNotFound(rid))
    }

    fn create_record(
        &self,
        class_name: &str,
        properties: Vec<(String, Value)>,
    ) -> ExecResult<SharedEntity> {
        let mut store = write_lock(&self.store);
        Self::require_class(&store, class_name)?;

        let rid = RecordId::new(1, self.next_position.fetch_add(1, Ordering::SeqCst));
        let mut entity = Entity::new(rid, class_name);
        for (name, value) in properties {
            entity.set(name, value);
        }

        for index in store.indexes.values_mut() {
            if index.class_name == class_name {
                if let Some(value) = entity.get(&index.property) {
                    index.entries.push(IndexEntry { key: value.clone(), rid });
                }
            }
        }

        let shared = Arc::new(RwLock::new(entity));
        store.records.insert(rid, Arc::clone(&shared));
        if store.journal.active {
            store.journal.created.push(rid);
        }
        Ok(shared)
    }

    fn delete_record(&self, rid: RecordId) -> ExecResult<()> {
        let mut store = write_lock(&self.store);
        let entity = store
            .records
            .remove(&rid)
            .ok_or(ExecutionError::RecordNotFound(rid))?;
        for index in store.indexes.values_mut() {
            index.entries.retain(|e| e.rid != rid);
        }
        if store.journal.active {
            let snapshot = read_lock(&entity).clone();
            store.journal.deleted.push((rid, snapshot));
        }
        Ok(())
    }

    fn scan_class(&self, class_name: &str) -> ExecResult<Vec<SharedEntity>> {
        let store = read_lock(&self.store);
        Self::require_class(&store, class_name)?;
        let mut matches: Vec<SharedEntity> = store
            .records
            .values()
            .filter(|e| Self::class_chain_matches(&store, &read_lock(e).class_name, class_name))
            .cloned()
            .collect();
        matches.sort_by_key(|e| read_lock(e).rid);
        Ok(matches)
    }

    fn begin(&self) -> ExecResult<()> {
        let mut store = write_lock(&self.store);
        if store.journal.active {
            return Err(ExecutionError::IllegalState(
                "a transaction is already open".to_string(),
            ));
        }
        store.journal = Journal { active: true, created: Vec::new(), deleted: Vec::new() };
        Ok(())
    }

    fn commit(&self) -> ExecResult<()> {
        {
            let store = read_lock(&self.store);
            if !store.journal.active {
                return Err(ExecutionError::IllegalState(
                    "no transaction is open".to_string(),
                ));
            }
        }
        let remaining = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if remaining {
            // A failed commit leaves no transaction behind; pending
            // changes are discarded before the conflict surfaces.
            self.rollback()?;
            return Err(ExecutionError::Conflict(
                "record version changed during commit".to_string(),
            ));
        }
        let mut store = write_lock(&self.store);
        store.journal = Journal::default();
        Ok(())
    }

    fn rollback(&self) -> ExecResult<()> {
        let mut store = write_lock(&self.store);
        if !store.journal.active {
            return Err(ExecutionError::IllegalState(
                "no transaction is open".to_string(),
            ));
        }
        let journal = std::mem::take(&mut store.journal);
        for rid in journal.created {
            store.records.remove(&rid);
            for index in store.indexes.values_mut() {
                index.entries.retain(|e| e.rid != rid);
            }
        }
        for (rid, entity) in journal.deleted {
            let class_name = entity.class_name.clone();
            let restored = Arc::new(RwLock::new(entity));
            for index in store.indexes.values_mut() {
                if index.class_name == class_name {
                    if let Some(value) = read_lock(&restored).get(&index.property) {
                        index.entries.push(IndexEntry { key: value.clone(), rid });
                    }
                }
            }
            store.records.insert(rid, restored);
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        read_lock(&self.store).journal.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemorySession {
        let session = MemorySession::new();
        session.create_class("Person", None).unwrap();
        session.create_class("Employee", Some("Person")).unwrap();
        session
            .create_record("Person", vec![("name".to_string(), Value::from("Alice"))])
            .unwrap();
        session
            .create_record("Employee", vec![("name".to_string(), Value::from("Bob"))])
            .unwrap();
        session
    }

    #[test]
    fn record_count_includes_subclasses() {
        let session = seeded();
        assert_eq!(session.record_count("Person").unwrap(), 2);
        assert_eq!(session.record_count("Employee").unwrap(), 1);
    }

    #[test]
    fn subclass_check_walks_the_chain() {
        let session = seeded();
        assert!(session.is_subclass_of("Employee", "Person").unwrap());
        assert!(!session.is_subclass_of("Person", "Employee").unwrap());
    }

    #[test]
    fn load_missing_record_is_an_error() {
        let session = seeded();
        let err = session.load_record(RecordId::new(9, 9)).unwrap_err();
        assert!(matches!(err, ExecutionError::RecordNotFound(_)));
    }

    #[test]
    fn rollback_discards_created_records() {
        let session = seeded();
        session.begin().unwrap();
        session
            .create_record("Person", vec![("name".to_string(), Value::from("Eve"))])
            .unwrap();
        assert_eq!(session.record_count("Person").unwrap(), 3);

        session.rollback().unwrap();
        assert_eq!(session.record_count("Person").unwrap(), 2);
    }

    #[test]
    fn rollback_restores_deleted_records() {
        let session = seeded();
        let rid = read_lock(&session.scan_class("Employee").unwrap()[0]).rid;

        session.begin().unwrap();
        session.delete_record(rid).unwrap();
        assert_eq!(session.record_count("Person").unwrap(), 1);

        session.rollback().unwrap();
        assert_eq!(session.record_count("Person").unwrap(), 2);
        assert!(session.load_record(rid).is_ok());
    }

    #[test]
    fn injected_conflicts_drain_then_commit_succeeds() {
        let session = seeded();
        session.inject_commit_conflicts(2);

        for _ in 0..2 {
            session.begin().unwrap();
            let err = session.commit().unwrap_err();
            assert!(matches!(err, ExecutionError::Conflict(_)));
            assert!(!session.in_transaction());
        }

        session.begin().unwrap();
        session.commit().unwrap();
    }

    #[test]
    fn failed_commit_rolls_back_pending_changes() {
        let session = seeded();
        session.inject_commit_conflicts(1);

        session.begin().unwrap();
        session
            .create_record("Person", vec![("name".to_string(), Value::from("Eve"))])
            .unwrap();

        let err = session.commit().unwrap_err();
        assert!(matches!(err, ExecutionError::Conflict(_)));
        assert!(!session.in_transaction());
        assert_eq!(session.record_count("Person").unwrap(), 2);
    }

    #[test]
    fn index_tracks_inserts_and_deletes() {
        let session = seeded();
        session.create_index("Person.name", "Person", "name");
        assert_eq!(
            session
                .index_entry_count("Person.name", IndexLookupKind::Plain)
                .unwrap(),
            1
        );

        let created = session
            .create_record("Person", vec![("name".to_string(), Value::from("Alice"))])
            .unwrap();
        let hits = session
            .index_lookup("Person.name", &Value::from("Alice"))
            .unwrap();
        assert_eq!(hits.len(), 2);

        let rid = read_lock(&created).rid;
        session.delete_record(rid).unwrap();
        let hits = session
            .index_lookup("Person.name", &Value::from("Alice"))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
