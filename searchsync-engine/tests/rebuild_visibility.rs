//! Full rebuilds of a populated index stage into a shadow index and become
//! visible only through the final rename.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use searchsync_core::types::{IndexName, ObjectId, Record, Source, SyncMode};
use searchsync_engine::{
    memory::Operation,
    pipeline::{self, SyncContext},
    IndexService, MemoryIndexService, RecordingActivity, RemoteError, RemoteOp, RemoteSnapshot,
    SwapPhase, SyncError, TaskHandle, WriteTarget,
};

/// Delegates to a [`MemoryIndexService`] and records what the live index
/// held every time a batch was written anywhere.
struct Observer {
    inner: MemoryIndexService,
    live: IndexName,
    live_during_adds: Mutex<Vec<Vec<ObjectId>>>,
}

impl Observer {
    fn new(inner: MemoryIndexService, live: &str) -> Self {
        Self {
            inner,
            live: IndexName::from(live),
            live_during_adds: Mutex::new(Vec::new()),
        }
    }

    fn observed(&self) -> Vec<Vec<ObjectId>> {
        self.live_during_adds.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexService for Observer {
    async fn has_records(&self, index: &IndexName) -> Result<bool, RemoteError> {
        self.inner.has_records(index).await
    }

    async fn fetch_all(
        &self,
        index: &IndexName,
        fields: &[String],
    ) -> Result<RemoteSnapshot, RemoteError> {
        self.inner.fetch_all(index, fields).await
    }

    async fn add_records(
        &self,
        index: &IndexName,
        records: &[Record],
    ) -> Result<TaskHandle, RemoteError> {
        let task = self.inner.add_records(index, records).await?;
        self.live_during_adds
            .lock()
            .unwrap()
            .push(self.inner.ids(&self.live));
        Ok(task)
    }

    async fn delete_records(
        &self,
        index: &IndexName,
        ids: &[ObjectId],
    ) -> Result<TaskHandle, RemoteError> {
        self.inner.delete_records(index, ids).await
    }

    async fn set_settings(
        &self,
        index: &IndexName,
        settings: &Value,
    ) -> Result<TaskHandle, RemoteError> {
        self.inner.set_settings(index, settings).await
    }

    async fn copy_settings(
        &self,
        src: &IndexName,
        dst: &IndexName,
    ) -> Result<TaskHandle, RemoteError> {
        self.inner.copy_settings(src, dst).await
    }

    async fn rename(&self, src: &IndexName, dst: &IndexName) -> Result<TaskHandle, RemoteError> {
        self.inner.rename(src, dst).await
    }

    async fn wait_task(&self, index: &IndexName, task: TaskHandle) -> Result<(), RemoteError> {
        self.inner.wait_task(index, task).await
    }
}

fn record(value: Value) -> Record {
    Record::from_value(value).expect("object")
}

fn source(index: &str, ids: &[&str]) -> Source {
    Source {
        index: IndexName::from(index),
        records: ids
            .iter()
            .map(|id| record(json!({"objectID": id, "title": format!("new {id}")})))
            .collect(),
        match_fields: vec!["modified".to_string()],
        settings: None,
    }
}

fn rebuild_mode(chunk: usize) -> SyncMode {
    SyncMode::new(false, false, chunk).expect("mode")
}

fn populated(live: &IndexName) -> MemoryIndexService {
    let service = MemoryIndexService::new();
    service.set_task_polls(1);
    service.seed(
        live,
        [
            record(json!({"objectID": "old-1"})),
            record(json!({"objectID": "old-2"})),
        ],
    );
    service.seed_settings(live, json!({"searchableAttributes": ["title"]}));
    service
}

#[tokio::test]
async fn live_index_is_untouched_until_rename() {
    let docs = IndexName::from("docs");
    let observer = Observer::new(populated(&docs), "docs");
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&observer, &activity, rebuild_mode(1));

    let report = pipeline::run(
        &ctx,
        vec![source("docs", &["a", "b"]), source("docs", &["c"])],
    )
    .await
    .expect("run");

    let old = vec![ObjectId::from("old-1"), ObjectId::from("old-2")];
    let observed = observer.observed();
    assert_eq!(observed.len(), 3, "one add per batch");
    assert!(
        observed.iter().all(|ids| ids == &old),
        "searchers saw a partial rebuild: {observed:?}"
    );

    let ops = observer.inner.operations();
    assert_eq!(
        ops.last(),
        Some(&Operation::Rename {
            src: docs.shadow(),
            dst: docs.clone()
        })
    );
    assert_eq!(
        ops.iter()
            .filter(|op| matches!(op, Operation::Rename { .. }))
            .count(),
        1,
        "exactly one cutover per index"
    );
    assert!(ops.iter().all(|op| match op {
        Operation::Add { index, .. } => index == &docs.shadow(),
        _ => true,
    }));

    let outcome = &report.indexes[0];
    assert_eq!(outcome.phase, SwapPhase::SwappedLive);
    assert_eq!(
        outcome.target,
        Some(WriteTarget::Shadow {
            live: docs.clone(),
            shadow: docs.shadow()
        })
    );

    assert_eq!(
        observer.inner.ids(&docs),
        vec![ObjectId::from("a"), ObjectId::from("b"), ObjectId::from("c")]
    );
    assert!(observer.inner.index(&docs.shadow()).is_none());
}

#[tokio::test]
async fn rebuild_carries_live_settings_over() {
    let docs = IndexName::from("docs");
    let service = populated(&docs);
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(10));

    pipeline::run(&ctx, vec![source("docs", &["a"])])
        .await
        .expect("run");

    let ops = service.operations();
    let copy = ops
        .iter()
        .position(|op| matches!(op, Operation::CopySettings { .. }))
        .expect("settings copied");
    let first_add = ops
        .iter()
        .position(|op| matches!(op, Operation::Add { .. }))
        .expect("records added");
    assert!(copy < first_add, "settings land before any batch");
    assert_eq!(
        service.index(&docs).expect("live").settings,
        json!({"searchableAttributes": ["title"]})
    );
}

#[tokio::test]
async fn empty_live_index_is_written_directly() {
    let service = MemoryIndexService::new();
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(10));

    let report = pipeline::run(&ctx, vec![source("fresh", &["a"])])
        .await
        .expect("run");

    assert_eq!(report.indexes[0].phase, SwapPhase::Direct);
    assert!(service
        .operations()
        .iter()
        .all(|op| !matches!(op, Operation::Rename { .. } | Operation::CopySettings { .. })));
    assert_eq!(service.ids(&IndexName::from("fresh")), vec![ObjectId::from("a")]);
}

#[tokio::test]
async fn failed_existence_probe_counts_as_empty() {
    let docs = IndexName::from("docs");
    let service = populated(&docs);
    service.fail_next(RemoteOp::Exists, &docs);
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(10));

    let report = pipeline::run(&ctx, vec![source("docs", &["a"])])
        .await
        .expect("run");

    assert_eq!(report.indexes[0].phase, SwapPhase::Direct);
}

#[tokio::test]
async fn failed_staging_batch_leaves_live_index_and_skips_cutover() {
    let docs = IndexName::from("docs");
    let service = populated(&docs);
    service.fail_next(RemoteOp::Add, &docs.shadow());
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(1));

    let err = pipeline::run(&ctx, vec![source("docs", &["a", "b"])])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote(ref e) if e.op == RemoteOp::Add));
    assert_eq!(
        service.ids(&docs),
        vec![ObjectId::from("old-1"), ObjectId::from("old-2")]
    );
    assert!(service
        .operations()
        .iter()
        .all(|op| !matches!(op, Operation::Rename { .. })));
    // The shadow is left behind with whatever landed.
    assert!(service.index(&docs.shadow()).is_some());
}

#[tokio::test]
async fn failed_cutover_rename_leaves_live_index_and_shadow_in_place() {
    let docs = IndexName::from("docs");
    let service = populated(&docs);
    service.fail_next(RemoteOp::Rename, &docs.shadow());
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(10));

    let err = pipeline::run(&ctx, vec![source("docs", &["new"])])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Remote(ref e) if e.op == RemoteOp::Rename), "got {err}");
    assert_eq!(
        service.ids(&docs),
        vec![ObjectId::from("old-1"), ObjectId::from("old-2")]
    );
    assert_eq!(service.ids(&docs.shadow()), vec![ObjectId::from("new")]);
}

#[tokio::test]
async fn failed_settings_copy_leaves_live_index_untouched() {
    let docs = IndexName::from("docs");
    let service = populated(&docs);
    service.fail_next(RemoteOp::CopySettings, &docs);
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(10));

    let err = pipeline::run(&ctx, vec![source("docs", &["a"])])
        .await
        .unwrap_err();

    assert!(
        matches!(err, SyncError::Remote(ref e) if e.op == RemoteOp::CopySettings),
        "got {err}"
    );
    assert_eq!(
        service.ids(&docs),
        vec![ObjectId::from("old-1"), ObjectId::from("old-2")]
    );
    assert_eq!(
        service.index(&docs).expect("live").settings,
        json!({"searchableAttributes": ["title"]})
    );
    assert!(service
        .operations()
        .iter()
        .all(|op| !matches!(op, Operation::Add { .. } | Operation::Rename { .. })));
}

#[tokio::test]
async fn dry_run_rebuild_plans_cutover_without_writing() {
    let docs = IndexName::from("docs");
    let service = populated(&docs);
    let activity = RecordingActivity::default();
    let ctx = SyncContext::new(&service, &activity, rebuild_mode(10)).dry_run(true);

    let report = pipeline::run(&ctx, vec![source("docs", &["a"])])
        .await
        .expect("run");

    assert_eq!(report.indexes[0].phase, SwapPhase::Cutover);
    assert_eq!(
        service.operations(),
        vec![Operation::Exists { index: docs.clone() }]
    );
}
