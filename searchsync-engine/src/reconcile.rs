//! Stale record reconciliation.
//!
//! Runs once per index after every source targeting it finished uploading.
//! The removal set is computed in one step, after that barrier:
//! `baseline − (union of ids seen by every source)`, where the baseline is
//! the remote snapshot (live diff) or the ids tracked by the hash cache.

use std::collections::HashSet;

use searchsync_core::types::{IndexName, ObjectId};

use crate::error::RemoteError;
use crate::remote::IndexService;

/// Identifiers in `baseline` that no source re-affirmed, sorted.
pub fn removal_set(
    baseline: impl IntoIterator<Item = ObjectId>,
    seen: &HashSet<ObjectId>,
) -> Vec<ObjectId> {
    let mut stale: Vec<ObjectId> = baseline
        .into_iter()
        .filter(|id| !seen.contains(id))
        .collect();
    stale.sort();
    stale.dedup();
    stale
}

/// Delete `stale` from `target` in a single request and wait for it.
///
/// Returns the number of identifiers deleted (or that would be, in a dry run).
pub async fn delete_stale(
    service: &dyn IndexService,
    target: &IndexName,
    stale: &[ObjectId],
    dry_run: bool,
) -> Result<usize, RemoteError> {
    if stale.is_empty() {
        return Ok(0);
    }
    if !dry_run {
        let task = service.delete_records(target, stale).await?;
        service.wait_task(target, task).await?;
    }
    Ok(stale.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryIndexService, Operation};
    use searchsync_core::types::Record;
    use serde_json::json;

    fn ids(raw: &[&str]) -> Vec<ObjectId> {
        raw.iter().map(|s| ObjectId::from(*s)).collect()
    }

    #[test]
    fn removal_set_is_baseline_minus_seen() {
        let seen: HashSet<_> = ids(&["1", "3"]).into_iter().collect();
        assert_eq!(removal_set(ids(&["3", "2", "1", "4"]), &seen), ids(&["2", "4"]));
    }

    #[test]
    fn nothing_to_remove_when_everything_was_seen() {
        let seen: HashSet<_> = ids(&["1", "2"]).into_iter().collect();
        assert!(removal_set(ids(&["1", "2"]), &seen).is_empty());
    }

    #[tokio::test]
    async fn deletes_in_one_request() {
        let service = MemoryIndexService::new();
        let docs = IndexName::from("docs");
        service.seed(
            &docs,
            ["1", "2", "3"]
                .into_iter()
                .map(|id| Record::from_value(json!({ "objectID": id })).unwrap()),
        );

        let deleted = delete_stale(&service, &docs, &ids(&["1", "3"]), false)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(service.ids(&docs), ids(&["2"]));
        assert_eq!(
            service.operations(),
            vec![Operation::Delete {
                index: docs,
                ids: ids(&["1", "3"])
            }]
        );
    }

    #[tokio::test]
    async fn empty_removal_set_issues_nothing() {
        let service = MemoryIndexService::new();
        let deleted = delete_stale(&service, &IndexName::from("docs"), &[], false)
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert!(service.operations().is_empty());
    }
}
