//! Index swap protocol.
//!
//! ```text
//! Init ──(rebuild && live has records)──▶ Staging ──▶ Cutover ──▶ SwappedLive
//!   └───────────────(otherwise)─────────▶ Direct
//! ```
//!
//! In `Staging` every write goes to the shadow index (`<live>_tmp`) after the
//! live index's settings, synonyms and rules were copied onto it. The single
//! `rename` in `Cutover` is the only call that changes what searchers see.
//! A failure before cutover leaves the live index untouched; the shadow index
//! is left behind and not cleaned up.

use std::fmt;

use searchsync_core::types::IndexName;

use crate::error::RemoteError;
use crate::remote::IndexService;

/// Where a source's batches are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// Straight into the live index.
    Direct(IndexName),
    /// Into `shadow`, to be renamed over `live` at cutover.
    Shadow { live: IndexName, shadow: IndexName },
}

impl WriteTarget {
    /// The index batches, settings and deletions are sent to.
    pub fn index(&self) -> &IndexName {
        match self {
            WriteTarget::Direct(live) => live,
            WriteTarget::Shadow { shadow, .. } => shadow,
        }
    }

    pub fn live(&self) -> &IndexName {
        match self {
            WriteTarget::Direct(live) => live,
            WriteTarget::Shadow { live, .. } => live,
        }
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self, WriteTarget::Shadow { .. })
    }
}

impl fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteTarget::Direct(live) => write!(f, "{live}"),
            WriteTarget::Shadow { live, shadow } => write!(f, "{shadow} (shadow of {live})"),
        }
    }
}

/// States of the swap protocol for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    Init,
    Direct,
    Staging,
    Cutover,
    SwappedLive,
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapPhase::Init => "init",
            SwapPhase::Direct => "direct",
            SwapPhase::Staging => "staging",
            SwapPhase::Cutover => "cutover",
            SwapPhase::SwappedLive => "swapped-live",
        };
        f.write_str(s)
    }
}

/// Existence probe. A failed probe counts as "no data yet".
pub async fn live_has_records(service: &dyn IndexService, live: &IndexName) -> bool {
    match service.has_records(live).await {
        Ok(has) => has,
        Err(err) => {
            tracing::debug!(index = %live, error = %err, "existence probe failed; treating index as new");
            false
        }
    }
}

/// `Init` → `Direct` | `Staging`.
///
/// When staging (and not a dry run), copies settings/synonyms/rules onto the
/// shadow index and waits for the copy to land before returning.
pub async fn prepare(
    service: &dyn IndexService,
    live: &IndexName,
    rebuild: bool,
    dry_run: bool,
) -> Result<WriteTarget, RemoteError> {
    if !rebuild || !live_has_records(service, live).await {
        tracing::debug!(index = %live, phase = %SwapPhase::Direct, "writing to live index");
        return Ok(WriteTarget::Direct(live.clone()));
    }

    let shadow = live.shadow();
    tracing::info!(index = %live, shadow = %shadow, phase = %SwapPhase::Staging, "staging rebuild");
    if !dry_run {
        let task = service.copy_settings(live, &shadow).await?;
        service.wait_task(&shadow, task).await?;
    }
    Ok(WriteTarget::Shadow {
        live: live.clone(),
        shadow,
    })
}

/// Finish the protocol once every source writing to `target` succeeded.
///
/// `Direct` is already terminal. `Staging` performs the cutover rename.
pub async fn finalize(
    service: &dyn IndexService,
    target: &WriteTarget,
    dry_run: bool,
) -> Result<SwapPhase, RemoteError> {
    let WriteTarget::Shadow { live, shadow } = target else {
        return Ok(SwapPhase::Direct);
    };
    tracing::info!(index = %live, shadow = %shadow, phase = %SwapPhase::Cutover, "moving shadow index over live index");
    if dry_run {
        return Ok(SwapPhase::Cutover);
    }
    let task = service.rename(shadow, live).await?;
    service.wait_task(live, task).await?;
    Ok(SwapPhase::SwappedLive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteOp;
    use crate::memory::{MemoryIndexService, Operation};
    use searchsync_core::types::Record;
    use serde_json::json;

    fn seeded(live: &IndexName) -> MemoryIndexService {
        let service = MemoryIndexService::new();
        service.seed(
            live,
            [Record::from_value(json!({"objectID": "old"})).unwrap()],
        );
        service.seed_settings(live, json!({"ranking": ["desc(date)"]}));
        service
    }

    #[tokio::test]
    async fn partial_mode_always_writes_direct() {
        let live = IndexName::from("docs");
        let service = seeded(&live);
        let target = prepare(&service, &live, false, false).await.unwrap();
        assert_eq!(target, WriteTarget::Direct(live.clone()));
        assert_eq!(finalize(&service, &target, false).await.unwrap(), SwapPhase::Direct);
    }

    #[tokio::test]
    async fn empty_live_index_is_written_directly() {
        let service = MemoryIndexService::new();
        let live = IndexName::from("docs");
        let target = prepare(&service, &live, true, false).await.unwrap();
        assert!(!target.is_shadow());
    }

    #[tokio::test]
    async fn failed_probe_counts_as_missing_index() {
        let live = IndexName::from("docs");
        let service = seeded(&live);
        service.fail_next(RemoteOp::Exists, &live);
        let target = prepare(&service, &live, true, false).await.unwrap();
        assert_eq!(target, WriteTarget::Direct(live));
    }

    #[tokio::test]
    async fn rebuild_stages_into_shadow_with_copied_settings() {
        let live = IndexName::from("docs");
        let service = seeded(&live);
        let target = prepare(&service, &live, true, false).await.unwrap();
        assert_eq!(target.index(), &IndexName::from("docs_tmp"));
        assert_eq!(target.live(), &live);
        assert_eq!(
            service.index(&live.shadow()).unwrap().settings,
            json!({"ranking": ["desc(date)"]})
        );

        assert_eq!(
            finalize(&service, &target, false).await.unwrap(),
            SwapPhase::SwappedLive
        );
        assert!(service.index(&live.shadow()).is_none());
        assert!(service.ids(&live).is_empty(), "shadow had no records, so live is now empty");
    }

    #[tokio::test]
    async fn dry_run_issues_no_writes() {
        let live = IndexName::from("docs");
        let service = seeded(&live);
        let target = prepare(&service, &live, true, true).await.unwrap();
        assert!(target.is_shadow());
        assert_eq!(finalize(&service, &target, true).await.unwrap(), SwapPhase::Cutover);
        assert_eq!(
            service.operations(),
            vec![Operation::Exists { index: live.clone() }]
        );
    }
}
