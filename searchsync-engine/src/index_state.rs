//! Per-index shared state for one run.
//!
//! An [`IndexRegistry`] is built once per run and handed by reference to
//! every source task. Each destination index gets one [`IndexState`],
//! created on first reference. Entries for different indexes share nothing.
//!
//! Both the write-target decision and the remote snapshot fetch are
//! single-flight: they live in a `tokio::sync::OnceCell`, so the first caller
//! does the work while concurrent callers wait for, and then share, its
//! result. A failed attempt leaves the cell empty.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;

use searchsync_core::types::{IndexName, ObjectId};

use crate::error::RemoteError;
use crate::remote::{IndexService, RemoteSnapshot};
use crate::swap::{self, WriteTarget};

#[derive(Debug)]
pub struct IndexState {
    name: IndexName,
    fetch_fields: Mutex<BTreeSet<String>>,
    target: OnceCell<WriteTarget>,
    snapshot: OnceCell<Arc<RemoteSnapshot>>,
    seen: Mutex<HashSet<ObjectId>>,
    failed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl IndexState {
    fn new(name: IndexName) -> Self {
        Self {
            name,
            fetch_fields: Mutex::new(BTreeSet::new()),
            target: OnceCell::new(),
            snapshot: OnceCell::new(),
            seen: Mutex::new(HashSet::new()),
            failed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &IndexName {
        &self.name
    }

    /// Fields requested by the shared snapshot fetch.
    pub fn fetch_fields(&self) -> Vec<String> {
        lock(&self.fetch_fields).iter().cloned().collect()
    }

    /// The write target, decided once per run.
    ///
    /// A failed decision (probe or settings copy) leaves the cell empty and
    /// is retried by the next caller.
    pub async fn write_target(
        &self,
        service: &dyn IndexService,
        rebuild: bool,
        dry_run: bool,
    ) -> Result<WriteTarget, RemoteError> {
        self.target
            .get_or_try_init(|| swap::prepare(service, &self.name, rebuild, dry_run))
            .await
            .cloned()
    }

    /// The decided write target, if any source has asked for it yet.
    pub fn decided_target(&self) -> Option<&WriteTarget> {
        self.target.get()
    }

    /// The live index's current records, fetched at most once per run.
    pub async fn remote_snapshot(
        &self,
        service: &dyn IndexService,
    ) -> Result<Arc<RemoteSnapshot>, RemoteError> {
        self.snapshot
            .get_or_try_init(|| async {
                let fields = self.fetch_fields();
                tracing::debug!(index = %self.name, ?fields, "fetching remote snapshot");
                service.fetch_all(&self.name, &fields).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    /// The snapshot, if one was fetched.
    pub fn fetched_snapshot(&self) -> Option<Arc<RemoteSnapshot>> {
        self.snapshot.get().cloned()
    }

    /// Record the identifiers a source affirmed.
    pub fn merge_seen(&self, ids: impl IntoIterator<Item = ObjectId>) {
        lock(&self.seen).extend(ids);
    }

    pub fn seen(&self) -> HashSet<ObjectId> {
        lock(&self.seen).clone()
    }

    /// Flag that some source for this index failed; cleanup must be skipped.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Per-run registry of [`IndexState`]s, keyed by index name.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    entries: Mutex<HashMap<IndexName, Arc<IndexState>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state for `index`, created on first reference.
    pub fn entry(&self, index: &IndexName) -> Arc<IndexState> {
        lock(&self.entries)
            .entry(index.clone())
            .or_insert_with(|| Arc::new(IndexState::new(index.clone())))
            .clone()
    }

    /// Register a source's match fields for the index's shared fetch.
    pub fn declare(&self, index: &IndexName, match_fields: &[String]) -> Arc<IndexState> {
        let state = self.entry(index);
        lock(&state.fetch_fields).extend(match_fields.iter().cloned());
        state
    }

    pub fn names(&self) -> Vec<IndexName> {
        let mut names: Vec<_> = lock(&self.entries).keys().cloned().collect();
        names.sort();
        names
    }
}
