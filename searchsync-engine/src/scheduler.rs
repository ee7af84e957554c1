//! Chunked upload scheduling.
//!
//! A source's changed records are cut into contiguous batches of at most
//! `chunk_size` records. All batches are issued concurrently; each one is
//! done only when its remote task reports completion, and the upload is done
//! only when every batch is. Batches that landed before a sibling failed stay
//! applied remotely.

use std::num::NonZeroUsize;

use futures::future::join_all;
use serde_json::Value;

use searchsync_core::types::{IndexName, Record};

use crate::error::RemoteError;
use crate::remote::IndexService;

/// What an upload did (or, in a dry run, would do).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadSummary {
    pub batches: usize,
    pub records: usize,
}

/// Split `records` into ordered batches of at most `chunk_size`.
pub fn batches(records: &[Record], chunk_size: NonZeroUsize) -> Vec<&[Record]> {
    records.chunks(chunk_size.get()).collect()
}

/// Upload `records` to `target` in parallel batches and wait for all of them.
///
/// Every batch is driven to completion even when a sibling fails; the first
/// failure in batch order is returned.
pub async fn upload(
    service: &dyn IndexService,
    target: &IndexName,
    records: &[Record],
    chunk_size: NonZeroUsize,
    dry_run: bool,
) -> Result<UploadSummary, RemoteError> {
    let batches = batches(records, chunk_size);
    let summary = UploadSummary {
        batches: batches.len(),
        records: records.len(),
    };
    if dry_run || batches.is_empty() {
        return Ok(summary);
    }

    let results = join_all(batches.into_iter().enumerate().map(|(n, batch)| async move {
        let task = service.add_records(target, batch).await?;
        service.wait_task(target, task).await?;
        tracing::debug!(index = %target, batch = n, size = batch.len(), "batch applied");
        Ok::<(), RemoteError>(())
    }))
    .await;

    results.into_iter().collect::<Result<Vec<()>, _>>()?;
    Ok(summary)
}

/// Apply index settings to `target` and wait for them to land.
pub async fn apply_settings(
    service: &dyn IndexService,
    target: &IndexName,
    settings: &Value,
    dry_run: bool,
) -> Result<(), RemoteError> {
    if dry_run {
        return Ok(());
    }
    let task = service.set_settings(target, settings).await?;
    service.wait_task(target, task).await
}
