//! Change detection.
//!
//! Classifies each record of one source as changed or unchanged, using one of
//! three detectors:
//!
//! | strategy     | changed when                                                     |
//! |--------------|------------------------------------------------------------------|
//! | full rebuild | always                                                           |
//! | hash cache   | no stored hash for the id, or the stored hash differs            |
//! | live diff    | id absent remotely, or any match field differs from the remote   |
//!
//! Every detector also returns the set of identifiers the source affirmed;
//! removal sets are derived from those once all sources of an index are done.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use searchsync_core::types::{IndexName, ObjectId, Record};

use crate::error::SyncError;
use crate::hash_store::HashStore;
use crate::remote::RemoteSnapshot;

/// Outcome of running a detector over one source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    /// Records to upload, in source order.
    pub changed: Vec<Record>,
    /// Every identifier the source currently owns.
    pub seen: HashSet<ObjectId>,
    /// Fresh hashes for every record (hash-cache mode only).
    pub hashes: Option<HashStore>,
}

/// SHA-256 hex digest of the record's canonical JSON form.
pub fn content_hash(record: &Record) -> Result<String, SyncError> {
    let json = serde_json::to_vec(record)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(hex::encode(hasher.finalize()))
}

/// Extract every identifier, failing on the first record without one.
///
/// Runs before any diffing so malformed data never reaches the upload stage.
pub fn identifiers(
    index: &IndexName,
    source_ordinal: usize,
    records: &[Record],
) -> Result<Vec<ObjectId>, SyncError> {
    records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            record.object_id().ok_or_else(|| SyncError::MissingIdentifier {
                index: index.clone(),
                source_ordinal,
                position,
            })
        })
        .collect()
}

/// Full rebuild: every record is uploaded.
pub fn detect_all(records: &[Record], ids: &[ObjectId]) -> ChangeSet {
    ChangeSet {
        changed: records.to_vec(),
        seen: ids.iter().cloned().collect(),
        hashes: None,
    }
}

/// Hash cache: compare against the hashes persisted by the previous run.
pub fn detect_with_hashes(
    records: &[Record],
    ids: &[ObjectId],
    prior: Option<&HashStore>,
) -> Result<ChangeSet, SyncError> {
    let mut set = ChangeSet::default();
    let mut hashes = HashStore::new();
    for (record, id) in records.iter().zip(ids) {
        let digest = content_hash(record)?;
        let unchanged = prior
            .and_then(|p| p.get(id))
            .is_some_and(|stored| *stored == digest);
        if !unchanged {
            set.changed.push(record.clone());
        }
        set.seen.insert(id.clone());
        hashes.insert(id.clone(), digest);
    }
    set.hashes = Some(hashes);
    Ok(set)
}

/// Live diff: compare `match_fields` against the remote snapshot.
pub fn detect_with_snapshot(
    records: &[Record],
    ids: &[ObjectId],
    remote: &RemoteSnapshot,
    match_fields: &[String],
) -> ChangeSet {
    let mut set = ChangeSet::default();
    for (record, id) in records.iter().zip(ids) {
        let changed = match remote.get(id) {
            None => true,
            Some(existing) => match_fields
                .iter()
                .any(|field| existing.get(field) != record.get(field)),
        };
        if changed {
            set.changed.push(record.clone());
        }
        set.seen.insert(id.clone());
    }
    set
}
