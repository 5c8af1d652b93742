//! Property values flowing through the execution pipeline.
//!
//! This module provides the [`Value`] enum, the closed set of runtime value
//! shapes the engine dispatches on, plus [`RecordId`] (storage identity) and
//! [`Entity`] (the live record type held by the storage layer).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::row::ProjectionRow;

/// The storage identity of a record: the bucket it lives in and its
/// position inside that bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    /// The bucket (physical collection) holding the record.
    pub bucket: u32,
    /// The record's position within the bucket.
    pub position: u64,
}

impl RecordId {
    /// Creates a new record identifier.
    #[must_use]
    pub const fn new(bucket: u32, position: u64) -> Self {
        Self { bucket, position }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.bucket, self.position)
    }
}

/// A value that can be stored on an entity or carried by a row.
///
/// The variant set is closed on purpose: operators that dispatch on runtime
/// value shape (notably expand) match it exhaustively instead of probing
/// with downcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null/missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Reference to a stored entity.
    Link(RecordId),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Key/value mapping.
    Map(BTreeMap<String, Value>),
    /// An embedded row (e.g. a nested projection result).
    Record(Box<ProjectionRow>),
}

impl Value {
    /// Returns the integer value, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a `String`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the record identifier, if this is a `Link`.
    #[must_use]
    pub fn as_link(&self) -> Option<RecordId> {
        match self {
            Self::Link(rid) => Some(*rid),
            _ => None,
        }
    }

    /// Returns true if this value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truthiness for control-flow conditions: `Bool` is itself, `Null` is
    /// false, non-zero numbers are true, everything else is true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            _ => true,
        }
    }

    /// A stable textual key for value-tuple deduplication. Distinct from
    /// `Display`: it encodes the variant so `Int(1)` and `String("1")`
    /// never collide.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{self:?}")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<RecordId> for Value {
    fn from(rid: RecordId) -> Self {
        Self::Link(rid)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::List(values)
    }
}

/// A live record: class membership plus an insertion-ordered property set.
///
/// The storage layer hands entities out behind `Arc<RwLock<..>>` so that
/// live rows observe in-transaction mutation until they are snapshotted.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// The record's storage identity.
    pub rid: RecordId,
    /// The schema class this record belongs to.
    pub class_name: String,
    /// Property name/value pairs in insertion order.
    pub properties: Vec<(String, Value)>,
}

impl Entity {
    /// Creates a new entity.
    #[must_use]
    pub fn new(rid: RecordId, class_name: impl Into<String>) -> Self {
        Self { rid, class_name: class_name.into(), properties: Vec::new() }
    }

    /// Gets a property value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Sets a property, replacing any existing value under the same name
    /// while preserving its original position.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
    }
}
