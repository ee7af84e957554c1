//! Domain types for searchsync.
//!
//! Records are opaque JSON objects; the only field the engine interprets is
//! the object identifier (`objectID`).

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Name of the mandatory identifier field on every record.
pub const OBJECT_ID_FIELD: &str = "objectID";

/// Suffix appended to a live index name to form its shadow index.
pub const SHADOW_SUFFIX: &str = "_tmp";

/// Batch size used when a job does not set `chunk_size`.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a remote search index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexName(pub String);

impl IndexName {
    /// The scratch index a full rebuild is staged into.
    pub fn shadow(&self) -> IndexName {
        IndexName(format!("{}{SHADOW_SUFFIX}", self.0))
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for IndexName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IndexName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A record's object identifier, unique within its destination index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A single indexable document.
///
/// Serializes as the bare JSON object it wraps. `serde_json::Map` keeps keys
/// sorted, so the serialized form is canonical.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    /// Wrap a JSON value; returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The record's identifier, if present as a non-empty string.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self.0.get(OBJECT_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => Some(ObjectId(id.clone())),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A copy holding only the identifier and `fields`.
    pub fn project(&self, fields: &[String]) -> Record {
        let mut out = Map::new();
        if let Some(id) = self.0.get(OBJECT_ID_FIELD) {
            out.insert(OBJECT_ID_FIELD.to_string(), id.clone());
        }
        for field in fields {
            if let Some(value) = self.0.get(field) {
                out.insert(field.clone(), value.clone());
            }
        }
        Record(out)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// Source and mode
// ---------------------------------------------------------------------------

/// One logical producer of records, bound to a single destination index.
///
/// A source's cache identity is `(index, ordinal)` where the ordinal is its
/// position in the job's source list.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub index: IndexName,
    pub records: Vec<Record>,
    /// Fields compared against the remote snapshot in live-diff mode.
    pub match_fields: Vec<String>,
    /// Index settings applied to the write target once all batches landed.
    pub settings: Option<Value>,
}

/// Which change detector a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStrategy {
    /// Upload everything; stage into a shadow index when the live one has data.
    FullRebuild,
    /// Compare against the remote index's current match fields.
    LiveDiff,
    /// Compare against content hashes persisted by the previous run.
    HashCache,
}

impl fmt::Display for DiffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffStrategy::FullRebuild => write!(f, "full-rebuild"),
            DiffStrategy::LiveDiff => write!(f, "live-diff"),
            DiffStrategy::HashCache => write!(f, "hash-cache"),
        }
    }
}

/// Run-wide engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncMode {
    pub enable_partial_updates: bool,
    pub enable_hash_cache: bool,
    pub chunk_size: NonZeroUsize,
}

impl SyncMode {
    pub fn new(
        enable_partial_updates: bool,
        enable_hash_cache: bool,
        chunk_size: usize,
    ) -> Result<Self, ConfigError> {
        let chunk_size = NonZeroUsize::new(chunk_size).ok_or(ConfigError::ZeroChunkSize)?;
        let mode = Self {
            enable_partial_updates,
            enable_hash_cache,
            chunk_size,
        };
        mode.strategy()?;
        Ok(mode)
    }

    pub fn strategy(&self) -> Result<DiffStrategy, ConfigError> {
        match (self.enable_partial_updates, self.enable_hash_cache) {
            (true, true) => Err(ConfigError::ConflictingStrategies),
            (true, false) => Ok(DiffStrategy::LiveDiff),
            (false, true) => Ok(DiffStrategy::HashCache),
            (false, false) => Ok(DiffStrategy::FullRebuild),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
