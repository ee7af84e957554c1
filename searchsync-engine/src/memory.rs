//! Process-local [`IndexService`].
//!
//! Writes apply as soon as they are issued; a task handle resolves after a
//! configurable number of polls. Every call is recorded, which lets tests
//! assert on exactly what the engine sent.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use searchsync_core::types::{IndexName, ObjectId, Record};

use crate::error::{RemoteError, RemoteOp};
use crate::remote::{IndexService, RemoteSnapshot, TaskHandle};

/// One call made against the service, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Exists { index: IndexName },
    Fetch { index: IndexName, fields: Vec<String> },
    Add { index: IndexName, ids: Vec<ObjectId> },
    Delete { index: IndexName, ids: Vec<ObjectId> },
    SetSettings { index: IndexName },
    CopySettings { src: IndexName, dst: IndexName },
    Rename { src: IndexName, dst: IndexName },
}

/// Contents of one in-memory index.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryIndex {
    pub settings: Value,
    pub records: BTreeMap<ObjectId, Record>,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self {
            settings: Value::Object(Map::new()),
            records: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    indexes: HashMap<IndexName, MemoryIndex>,
    next_task: u64,
    pending: HashMap<TaskHandle, u32>,
    task_polls: u32,
    ops: Vec<Operation>,
    fetches: HashMap<IndexName, usize>,
    failures: Vec<(RemoteOp, IndexName)>,
}

#[derive(Debug, Default)]
pub struct MemoryIndexService {
    state: Mutex<State>,
}

impl MemoryIndexService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of `index` with `records`.
    pub fn seed(&self, index: &IndexName, records: impl IntoIterator<Item = Record>) {
        let mut state = self.state();
        let entry = state.indexes.entry(index.clone()).or_default();
        entry.records = records
            .into_iter()
            .filter_map(|r| r.object_id().map(|id| (id, r)))
            .collect();
    }

    pub fn seed_settings(&self, index: &IndexName, settings: Value) {
        self.state()
            .indexes
            .entry(index.clone())
            .or_default()
            .settings = settings;
    }

    /// Number of `wait_task` polls before a task reports completion.
    pub fn set_task_polls(&self, polls: u32) {
        self.state().task_polls = polls;
    }

    /// Make the next `op` against `index` fail.
    pub fn fail_next(&self, op: RemoteOp, index: &IndexName) {
        self.state().failures.push((op, index.clone()));
    }

    pub fn index(&self, index: &IndexName) -> Option<MemoryIndex> {
        self.state().indexes.get(index).cloned()
    }

    pub fn ids(&self, index: &IndexName) -> Vec<ObjectId> {
        self.state()
            .indexes
            .get(index)
            .map(|i| i.records.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn fetch_count(&self, index: &IndexName) -> usize {
        self.state().fetches.get(index).copied().unwrap_or(0)
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.state().ops.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn check(&mut self, op: RemoteOp, index: &IndexName) -> Result<(), RemoteError> {
        if let Some(pos) = self
            .failures
            .iter()
            .position(|(o, i)| *o == op && i == index)
        {
            self.failures.remove(pos);
            return Err(RemoteError::new(op, index, "injected failure"));
        }
        Ok(())
    }

    fn issue(&mut self) -> TaskHandle {
        self.next_task += 1;
        let handle = TaskHandle(self.next_task);
        self.pending.insert(handle, self.task_polls);
        handle
    }
}

fn merge_settings(target: &mut Value, update: &Value) {
    match (target, update) {
        (Value::Object(target), Value::Object(update)) => {
            for (k, v) in update {
                target.insert(k.clone(), v.clone());
            }
        }
        (target, update) => *target = update.clone(),
    }
}

#[async_trait]
impl IndexService for MemoryIndexService {
    async fn has_records(&self, index: &IndexName) -> Result<bool, RemoteError> {
        let mut state = self.state();
        state.ops.push(Operation::Exists {
            index: index.clone(),
        });
        state.check(RemoteOp::Exists, index)?;
        Ok(state
            .indexes
            .get(index)
            .is_some_and(|i| !i.records.is_empty()))
    }

    async fn fetch_all(
        &self,
        index: &IndexName,
        fields: &[String],
    ) -> Result<RemoteSnapshot, RemoteError> {
        // Let concurrent callers interleave with an in-flight fetch.
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.ops.push(Operation::Fetch {
            index: index.clone(),
            fields: fields.to_vec(),
        });
        *state.fetches.entry(index.clone()).or_default() += 1;
        state.check(RemoteOp::Fetch, index)?;
        Ok(state
            .indexes
            .get(index)
            .map(|i| {
                i.records
                    .iter()
                    .map(|(id, r)| (id.clone(), r.project(fields)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_records(
        &self,
        index: &IndexName,
        records: &[Record],
    ) -> Result<TaskHandle, RemoteError> {
        let mut state = self.state();
        let ids: Vec<ObjectId> = records.iter().filter_map(Record::object_id).collect();
        state.ops.push(Operation::Add {
            index: index.clone(),
            ids,
        });
        state.check(RemoteOp::Add, index)?;
        if records.iter().any(|r| r.object_id().is_none()) {
            return Err(RemoteError::new(RemoteOp::Add, index, "record without objectID"));
        }
        let entry = state.indexes.entry(index.clone()).or_default();
        for record in records {
            if let Some(id) = record.object_id() {
                entry.records.insert(id, record.clone());
            }
        }
        Ok(state.issue())
    }

    async fn delete_records(
        &self,
        index: &IndexName,
        ids: &[ObjectId],
    ) -> Result<TaskHandle, RemoteError> {
        let mut state = self.state();
        state.ops.push(Operation::Delete {
            index: index.clone(),
            ids: ids.to_vec(),
        });
        state.check(RemoteOp::Delete, index)?;
        if let Some(entry) = state.indexes.get_mut(index) {
            for id in ids {
                entry.records.remove(id);
            }
        }
        Ok(state.issue())
    }

    async fn set_settings(
        &self,
        index: &IndexName,
        settings: &Value,
    ) -> Result<TaskHandle, RemoteError> {
        let mut state = self.state();
        state.ops.push(Operation::SetSettings {
            index: index.clone(),
        });
        state.check(RemoteOp::SetSettings, index)?;
        let entry = state.indexes.entry(index.clone()).or_default();
        merge_settings(&mut entry.settings, settings);
        Ok(state.issue())
    }

    async fn copy_settings(
        &self,
        src: &IndexName,
        dst: &IndexName,
    ) -> Result<TaskHandle, RemoteError> {
        let mut state = self.state();
        state.ops.push(Operation::CopySettings {
            src: src.clone(),
            dst: dst.clone(),
        });
        state.check(RemoteOp::CopySettings, src)?;
        let Some(settings) = state.indexes.get(src).map(|i| i.settings.clone()) else {
            return Err(RemoteError::new(
                RemoteOp::CopySettings,
                src,
                "source index does not exist",
            ));
        };
        state.indexes.entry(dst.clone()).or_default().settings = settings;
        Ok(state.issue())
    }

    async fn rename(&self, src: &IndexName, dst: &IndexName) -> Result<TaskHandle, RemoteError> {
        let mut state = self.state();
        state.ops.push(Operation::Rename {
            src: src.clone(),
            dst: dst.clone(),
        });
        state.check(RemoteOp::Rename, src)?;
        let Some(moved) = state.indexes.remove(src) else {
            return Err(RemoteError::new(
                RemoteOp::Rename,
                src,
                "source index does not exist",
            ));
        };
        state.indexes.insert(dst.clone(), moved);
        Ok(state.issue())
    }

    async fn wait_task(&self, index: &IndexName, task: TaskHandle) -> Result<(), RemoteError> {
        loop {
            {
                let mut state = self.state();
                state.check(RemoteOp::WaitTask, index)?;
                match state.pending.get_mut(&task) {
                    None => {
                        return Err(RemoteError::new(
                            RemoteOp::WaitTask,
                            index,
                            format!("unknown task {}", task.0),
                        ))
                    }
                    Some(0) => {
                        state.pending.remove(&task);
                        return Ok(());
                    }
                    Some(remaining) => *remaining -= 1,
                }
            }
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn add_then_fetch_projects_fields() {
        let service = MemoryIndexService::new();
        let docs = IndexName::from("docs");
        let task = service
            .add_records(&docs, &[record(json!({"objectID": "1", "title": "x", "modified": 1}))])
            .await
            .unwrap();
        service.wait_task(&docs, task).await.unwrap();

        let snapshot = service
            .fetch_all(&docs, &["modified".to_string()])
            .await
            .unwrap();
        assert_eq!(
            snapshot.get(&ObjectId::from("1")).map(|r| Value::Object(r.0.clone())),
            Some(json!({"objectID": "1", "modified": 1}))
        );
        assert_eq!(service.fetch_count(&docs), 1);
    }

    #[tokio::test]
    async fn wait_task_polls_until_complete() {
        let service = MemoryIndexService::new();
        service.set_task_polls(3);
        let docs = IndexName::from("docs");
        let task = service.delete_records(&docs, &[]).await.unwrap();
        service.wait_task(&docs, task).await.unwrap();
        let err = service.wait_task(&docs, task).await.unwrap_err();
        assert_eq!(err.op, RemoteOp::WaitTask);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let service = MemoryIndexService::new();
        let docs = IndexName::from("docs");
        service.fail_next(RemoteOp::Add, &docs);
        assert!(service.add_records(&docs, &[]).await.is_err());
        assert!(service.add_records(&docs, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn rename_replaces_destination() {
        let service = MemoryIndexService::new();
        let live = IndexName::from("docs");
        let shadow = live.shadow();
        service.seed(&live, [record(json!({"objectID": "old"}))]);
        service.seed(&shadow, [record(json!({"objectID": "new"}))]);

        service.rename(&shadow, &live).await.unwrap();
        assert_eq!(service.ids(&live), vec![ObjectId::from("new")]);
        assert!(service.index(&shadow).is_none());
    }

    #[tokio::test]
    async fn set_settings_merges_keys() {
        let service = MemoryIndexService::new();
        let docs = IndexName::from("docs");
        service.seed_settings(&docs, json!({"a": 1, "b": 1}));
        service.set_settings(&docs, &json!({"b": 2})).await.unwrap();
        assert_eq!(service.index(&docs).unwrap().settings, json!({"a": 1, "b": 2}));
    }
}
