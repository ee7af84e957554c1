//! Sync pipeline entrypoint.
//!
//! One run:
//!
//! 1. Resolve the diff strategy and validate sources (no remote call yet).
//! 2. Load the hash cache (hash-cache mode only).
//! 3. For every destination index, concurrently: run each of its sources
//!    (identifier check → write target → detect changes → upload batches →
//!    apply settings), then, once all of them finished, delete stale records
//!    and finish the swap protocol.
//! 4. If every source succeeded, persist the new hash cache.
//!
//! A failing source never stops its siblings. It does stop cleanup and
//! cutover for its own index, and it makes the whole run fail without
//! touching the persisted hash cache. Per-source and per-index failures are
//! narrated as status lines; the run's error is reported once, at the top.

use std::collections::HashMap;

use chrono::Utc;
use futures::future::join_all;

use searchsync_core::error::ConfigError;
use searchsync_core::types::{DiffStrategy, IndexName, ObjectId, Source, SyncMode};

use crate::activity::ActivityReporter;
use crate::detector::{self, ChangeSet};
use crate::error::SyncError;
use crate::hash_store::{HashStore, HashStoreFile, IndexHashes, SnapshotStore};
use crate::index_state::{IndexRegistry, IndexState};
use crate::reconcile;
use crate::remote::IndexService;
use crate::scheduler;
use crate::swap::{self, SwapPhase, WriteTarget};

/// Collaborators and settings for a run.
pub struct SyncContext<'a> {
    service: &'a dyn IndexService,
    activity: &'a dyn ActivityReporter,
    hash_store: Option<&'a dyn SnapshotStore>,
    mode: SyncMode,
    dry_run: bool,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        service: &'a dyn IndexService,
        activity: &'a dyn ActivityReporter,
        mode: SyncMode,
    ) -> Self {
        Self {
            service,
            activity,
            hash_store: None,
            mode,
            dry_run: false,
        }
    }

    /// Required in hash-cache mode.
    pub fn with_hash_store(mut self, store: &'a dyn SnapshotStore) -> Self {
        self.hash_store = Some(store);
        self
    }

    /// Compute the full plan without issuing any write or persisting hashes.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Per-source result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub ordinal: usize,
    pub index: IndexName,
    pub records: usize,
    pub changed: usize,
    pub batches: usize,
}

/// Per-index result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOutcome {
    pub index: IndexName,
    pub target: Option<WriteTarget>,
    pub phase: SwapPhase,
    pub sources: Vec<SourceOutcome>,
    pub deleted: Vec<ObjectId>,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub strategy: DiffStrategy,
    pub dry_run: bool,
    pub indexes: Vec<IndexOutcome>,
    pub hash_cache_saved: bool,
}

impl SyncReport {
    pub fn changed(&self) -> usize {
        self.indexes
            .iter()
            .flat_map(|i| &i.sources)
            .map(|s| s.changed)
            .sum()
    }

    pub fn deleted(&self) -> usize {
        self.indexes.iter().map(|i| i.deleted.len()).sum()
    }
}

struct SourceRun {
    outcome: SourceOutcome,
    hashes: Option<HashStore>,
}

struct IndexRun {
    outcome: IndexOutcome,
    hashes: IndexHashes,
    error: Option<SyncError>,
}

/// Run the engine over `sources`.
pub async fn run(ctx: &SyncContext<'_>, sources: Vec<Source>) -> Result<SyncReport, SyncError> {
    let started_at = Utc::now();
    let strategy = ctx.mode.strategy()?;
    validate(strategy, &sources)?;

    let prior = match (strategy, ctx.hash_store) {
        (DiffStrategy::HashCache, Some(store)) => store.load()?,
        (DiffStrategy::HashCache, None) => return Err(SyncError::MissingHashStore),
        _ => HashStoreFile::default(),
    };

    ctx.activity.report(&format!(
        "{} sources to index ({strategy}{})",
        sources.len(),
        if ctx.dry_run { ", dry run" } else { "" }
    ));

    let registry = IndexRegistry::new();
    let groups = group_by_index(sources);
    for (index, members) in &groups {
        for (_, source) in members {
            registry.declare(index, &source.match_fields);
        }
    }

    let runs = join_all(groups.iter().map(|(index, members)| {
        sync_index(ctx, strategy, &registry, &prior, index, members)
    }))
    .await;

    let mut indexes = Vec::with_capacity(runs.len());
    let mut fresh = Vec::with_capacity(runs.len());
    let mut first_error = None;
    for run in runs {
        if first_error.is_none() {
            first_error = run.error;
        }
        fresh.push((run.outcome.index.clone(), run.hashes));
        indexes.push(run.outcome);
    }

    if let Some(err) = first_error {
        ctx.activity.error("failed to index", &err);
        return Err(err);
    }

    let mut hash_cache_saved = false;
    if let (DiffStrategy::HashCache, Some(store), false) = (strategy, ctx.hash_store, ctx.dry_run) {
        let mut next = prior;
        for (index, hashes) in fresh {
            next.indexes.insert(index, hashes);
        }
        next.synced_at = started_at;
        store.save(&next)?;
        hash_cache_saved = true;
    }

    Ok(SyncReport {
        strategy,
        dry_run: ctx.dry_run,
        indexes,
        hash_cache_saved,
    })
}

fn validate(strategy: DiffStrategy, sources: &[Source]) -> Result<(), ConfigError> {
    for (ordinal, source) in sources.iter().enumerate() {
        if source.index.0.is_empty() {
            return Err(ConfigError::MissingIndex { ordinal });
        }
        let fields_ok = !source.match_fields.is_empty()
            && source.match_fields.iter().all(|f| !f.trim().is_empty());
        if strategy == DiffStrategy::LiveDiff && !fields_ok {
            return Err(ConfigError::InvalidMatchFields { ordinal });
        }
    }
    Ok(())
}

/// Group sources by destination, keeping first-appearance order of indexes
/// and each source's ordinal in the job.
fn group_by_index(sources: Vec<Source>) -> Vec<(IndexName, Vec<(usize, Source)>)> {
    let mut groups: Vec<(IndexName, Vec<(usize, Source)>)> = Vec::new();
    let mut positions: HashMap<IndexName, usize> = HashMap::new();
    for (ordinal, source) in sources.into_iter().enumerate() {
        let pos = *positions.entry(source.index.clone()).or_insert_with(|| {
            groups.push((source.index.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[pos].1.push((ordinal, source));
    }
    groups
}

async fn sync_index(
    ctx: &SyncContext<'_>,
    strategy: DiffStrategy,
    registry: &IndexRegistry,
    prior: &HashStoreFile,
    index: &IndexName,
    members: &[(usize, Source)],
) -> IndexRun {
    let state = registry.entry(index);

    let results = join_all(
        members
            .iter()
            .map(|(ordinal, source)| sync_source(ctx, strategy, &state, prior, *ordinal, source)),
    )
    .await;

    let mut outcome = IndexOutcome {
        index: index.clone(),
        target: state.decided_target().cloned(),
        phase: SwapPhase::Init,
        sources: Vec::with_capacity(members.len()),
        deleted: Vec::new(),
    };
    let mut hashes = IndexHashes::new();
    let mut error = None;
    for result in results {
        match result {
            Ok(run) => {
                if let Some(h) = run.hashes {
                    hashes.insert(run.outcome.ordinal, h);
                }
                outcome.sources.push(run.outcome);
            }
            Err(err) => {
                if error.is_none() {
                    error = Some(err);
                }
            }
        }
    }

    if state.has_failed() {
        if outcome.target.as_ref().is_some_and(WriteTarget::is_shadow) {
            outcome.phase = SwapPhase::Staging;
        }
        ctx.activity.report(&format!(
            "{index}: a source failed; skipping stale record cleanup and cutover"
        ));
        return IndexRun {
            outcome,
            hashes,
            error,
        };
    }

    match finish_index(ctx, strategy, &state, prior, &mut outcome).await {
        Ok(()) => IndexRun {
            outcome,
            hashes,
            error: None,
        },
        Err(err) => {
            ctx.activity
                .report(&format!("{index}: stale record cleanup or cutover failed: {err}"));
            IndexRun {
                outcome,
                hashes,
                error: Some(err),
            }
        }
    }
}

/// Stale record cleanup followed by the end of the swap protocol.
async fn finish_index(
    ctx: &SyncContext<'_>,
    strategy: DiffStrategy,
    state: &IndexState,
    prior: &HashStoreFile,
    outcome: &mut IndexOutcome,
) -> Result<(), SyncError> {
    let index = state.name();
    let target = outcome
        .target
        .clone()
        .unwrap_or_else(|| WriteTarget::Direct(index.clone()));

    let baseline: Vec<ObjectId> = match strategy {
        DiffStrategy::FullRebuild => Vec::new(),
        DiffStrategy::LiveDiff => state
            .fetched_snapshot()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default(),
        DiffStrategy::HashCache => prior.tracked_ids(index).into_iter().collect(),
    };
    let stale = reconcile::removal_set(baseline, &state.seen());
    if !stale.is_empty() {
        ctx.activity.report(&format!(
            "deleting {} objects from {} index",
            stale.len(),
            target.index()
        ));
        reconcile::delete_stale(ctx.service, target.index(), &stale, ctx.dry_run).await?;
    }
    outcome.deleted = stale;

    if target.is_shadow() {
        ctx.activity
            .report(&format!("{index}: moving copied index to main index"));
    }
    outcome.phase = swap::finalize(ctx.service, &target, ctx.dry_run).await?;
    outcome.target = Some(target);
    Ok(())
}

async fn sync_source(
    ctx: &SyncContext<'_>,
    strategy: DiffStrategy,
    state: &IndexState,
    prior: &HashStoreFile,
    ordinal: usize,
    source: &Source,
) -> Result<SourceRun, SyncError> {
    let result = run_source(ctx, strategy, state, prior, ordinal, source).await;
    if let Err(err) = &result {
        state.mark_failed();
        ctx.activity
            .report(&format!("source {ordinal}: failed to index: {err}"));
    }
    result
}

async fn run_source(
    ctx: &SyncContext<'_>,
    strategy: DiffStrategy,
    state: &IndexState,
    prior: &HashStoreFile,
    ordinal: usize,
    source: &Source,
) -> Result<SourceRun, SyncError> {
    let index = state.name();
    let ids = detector::identifiers(index, ordinal, &source.records)?;
    ctx.activity.report(&format!(
        "source {ordinal}: {} records for {index}",
        source.records.len()
    ));

    let rebuild = strategy == DiffStrategy::FullRebuild;
    let target = state.write_target(ctx.service, rebuild, ctx.dry_run).await?;

    let changes: ChangeSet = match strategy {
        DiffStrategy::FullRebuild => detector::detect_all(&source.records, &ids),
        DiffStrategy::HashCache => detector::detect_with_hashes(
            &source.records,
            &ids,
            prior.source(index, ordinal),
        )?,
        DiffStrategy::LiveDiff => {
            let remote = state.remote_snapshot(ctx.service).await?;
            ctx.activity.report(&format!(
                "source {ordinal}: found {} existing records",
                remote.len()
            ));
            detector::detect_with_snapshot(&source.records, &ids, &remote, &source.match_fields)
        }
    };
    state.merge_seen(changes.seen.iter().cloned());

    if strategy != DiffStrategy::FullRebuild {
        ctx.activity.report(&format!(
            "source {ordinal}: partial updates [insert/update: {}, total: {}]",
            changes.changed.len(),
            source.records.len()
        ));
    }

    let summary = scheduler::upload(
        ctx.service,
        target.index(),
        &changes.changed,
        ctx.mode.chunk_size,
        ctx.dry_run,
    )
    .await?;
    ctx.activity.report(&format!(
        "source {ordinal}: {} {} in {} batches to {target}",
        if ctx.dry_run { "would upload" } else { "uploaded" },
        summary.records,
        summary.batches
    ));

    if let Some(settings) = &source.settings {
        scheduler::apply_settings(ctx.service, target.index(), settings, ctx.dry_run).await?;
    }

    Ok(SourceRun {
        outcome: SourceOutcome {
            ordinal,
            index: index.clone(),
            records: source.records.len(),
            changed: summary.records,
            batches: summary.batches,
        },
        hashes: changes.hashes,
    })
}
