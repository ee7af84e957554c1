//! Hash store — SHA-256 content hashes persisted between runs.
//!
//! Persists a `HashStoreFile` JSON document at
//! `<home>/.searchsync/hashes/<job_name>.json`, one entry per source keyed
//! by `(index, source ordinal)`.
//! Writes use the atomic `.tmp` + rename pattern.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use searchsync_core::types::{IndexName, ObjectId};

use crate::error::{io_err, SyncError};

/// Object identifier → last uploaded SHA-256 hex digest, for one source.
pub type HashStore = BTreeMap<ObjectId, String>;

/// Source ordinal → that source's hashes, for one index.
pub type IndexHashes = BTreeMap<usize, HashStore>;

/// On-disk hash store payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashStoreFile {
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub indexes: BTreeMap<IndexName, IndexHashes>,
}

impl Default for HashStoreFile {
    fn default() -> Self {
        Self {
            synced_at: Utc::now(),
            indexes: BTreeMap::new(),
        }
    }
}

impl HashStoreFile {
    pub fn source(&self, index: &IndexName, ordinal: usize) -> Option<&HashStore> {
        self.indexes.get(index).and_then(|sources| sources.get(&ordinal))
    }

    /// Every identifier tracked for `index`, across all of its sources.
    pub fn tracked_ids(&self, index: &IndexName) -> BTreeSet<ObjectId> {
        self.indexes
            .get(index)
            .map(|sources| sources.values().flat_map(|s| s.keys().cloned()).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.values().all(|sources| sources.values().all(|s| s.is_empty()))
    }
}

/// Load/save collaborator for the hash cache.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<HashStoreFile, SyncError>;
    fn save(&self, store: &HashStoreFile) -> Result<(), SyncError>;
}

/// [`SnapshotStore`] backed by a single JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The store for `job_name` under `home`.
    pub fn at(home: &Path, job_name: &str) -> Self {
        Self::new(store_path_at(home, job_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<HashStoreFile, SyncError> {
        load_from(&self.path)
    }

    fn save(&self, store: &HashStoreFile) -> Result<(), SyncError> {
        save_to(&self.path, store)
    }
}

/// Path to the hash store JSON for a given job, rooted at `home`.
///
/// `~/.searchsync/hashes/<job_name>.json`
pub fn store_path_at(home: &Path, job_name: &str) -> PathBuf {
    home.join(".searchsync")
        .join("hashes")
        .join(format!("{job_name}.json"))
}

/// Load the hash store at `path`.
///
/// Returns an empty store if the file does not yet exist.
pub fn load_from(path: &Path) -> Result<HashStoreFile, SyncError> {
    if !path.exists() {
        return Ok(HashStoreFile::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Save the hash store atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_to(path: &Path, store: &HashStoreFile) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid hash store path"),
        ));
    };

    // Ensure the hashes directory exists.
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(store)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// `load_from(store_path_at(home, job_name))`.
pub fn load_at(home: &Path, job_name: &str) -> Result<HashStoreFile, SyncError> {
    load_from(&store_path_at(home, job_name))
}

/// `save_to(store_path_at(home, job_name), store)`.
pub fn save_at(home: &Path, job_name: &str, store: &HashStoreFile) -> Result<(), SyncError> {
    save_to(&store_path_at(home, job_name), store)
}
