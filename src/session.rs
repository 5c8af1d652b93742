//! The storage-facing session abstraction.
//!
//! Execution steps never talk to storage directly; they go through a
//! [`DatabaseSession`] handle held by the command context. This keeps the
//! pipeline testable against [`crate::memory::MemorySession`] and lets a
//! real storage backend slot in behind the same seam.

use std::sync::{Arc, RwLock};

use crate::ast::{IndexLookupKind, IndexedFunctionCondition};
use crate::error::ExecResult;
use crate::value::{Entity, RecordId, Value};

/// One entry of an index: the indexed key and the record it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub key: Value,
    pub rid: RecordId,
}

/// A connection-scoped view over the database: schema, records, indexes
/// and the transaction lifecycle.
pub trait DatabaseSession: Send + Sync {
    /// True when the class exists in the schema.
    fn class_exists(&self, class_name: &str) -> bool;

    /// Creates a class, optionally under a superclass.
    fn create_class(&self, class_name: &str, superclass: Option<&str>) -> ExecResult<()>;

    /// Number of records in the class, including subclasses.
    fn record_count(&self, class_name: &str) -> ExecResult<u64>;

    /// True when `class_name` is `base` or inherits from it.
    fn is_subclass_of(&self, class_name: &str, base: &str) -> ExecResult<bool>;

    /// Number of entries in the index, counted the way the given lookup
    /// kind would walk it. Duplicate keys contribute one entry each.
    fn index_entry_count(&self, index_name: &str, kind: IndexLookupKind) -> ExecResult<u64>;

    /// All entries under the given key.
    fn index_lookup(&self, index_name: &str, key: &Value) -> ExecResult<Vec<IndexEntry>>;

    /// The index covering `class_name.property`, if one exists.
    fn index_for_property(&self, class_name: &str, property: &str) -> Option<String>;

    /// Answers an indexed-function condition against the target class,
    /// returning the matching records.
    fn evaluate_indexed_function(
        &self,
        condition: &IndexedFunctionCondition,
        target_class: &str,
    ) -> ExecResult<Vec<RecordId>>;

    /// Loads a record. Missing records are an error, not `None`.
    fn load_record(&self, rid: RecordId) -> ExecResult<Arc<RwLock<Entity>>>;

    /// Creates a record in the class with the given properties.
    fn create_record(
        &self,
        class_name: &str,
        properties: Vec<(String, Value)>,
    ) -> ExecResult<Arc<RwLock<Entity>>>;

    /// Deletes a record.
    fn delete_record(&self, rid: RecordId) -> ExecResult<()>;

    /// All records of the class, including subclasses, in storage order.
    fn scan_class(&self, class_name: &str) -> ExecResult<Vec<Arc<RwLock<Entity>>>>;

    /// Opens a transaction.
    fn begin(&self) -> ExecResult<()>;

    /// Commits the open transaction. May fail with a conflict, which the
    /// script layer treats as retryable.
    fn commit(&self) -> ExecResult<()>;

    /// Rolls back the open transaction, discarding its changes.
    fn rollback(&self) -> ExecResult<()>;

    /// True while a transaction is open.
    fn in_transaction(&self) -> bool;
}
