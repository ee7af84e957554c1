//! Directory-backed [`IndexService`].
//!
//! # Storage layout
//!
//! ```text
//! <root>/
//!   <index>.json        { "settings": {...}, "records": { "<objectID>": {...} } }
//! ```
//!
//! Every mutation rewrites the whole document through `<index>.json.tmp`
//! followed by `rename`, so readers only ever see a complete index and
//! [`IndexService::rename`] is a single atomic filesystem rename.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use searchsync_core::types::{IndexName, ObjectId, Record};

use crate::error::{RemoteError, RemoteOp};
use crate::remote::{IndexService, RemoteSnapshot, TaskHandle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(default = "empty_settings")]
    pub settings: Value,
    #[serde(default)]
    pub records: BTreeMap<ObjectId, Record>,
}

fn empty_settings() -> Value {
    Value::Object(Map::new())
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            settings: empty_settings(),
            records: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Tasks {
    next: u64,
    issued: HashSet<TaskHandle>,
}

impl Tasks {
    fn issue(&mut self) -> TaskHandle {
        self.next += 1;
        let handle = TaskHandle(self.next);
        self.issued.insert(handle);
        handle
    }
}

/// Index service persisting each index as one JSON file under `root`.
#[derive(Debug)]
pub struct LocalIndexService {
    root: PathBuf,
    // Serializes read-modify-write cycles across concurrent batches.
    tasks: Mutex<Tasks>,
}

impl LocalIndexService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<index>.json` — pure, no I/O.
    pub fn index_path(&self, index: &IndexName) -> PathBuf {
        self.root.join(format!("{}.json", index.0))
    }

    /// Load an index document; `None` if the index does not exist.
    pub async fn load(&self, index: &IndexName) -> Result<Option<IndexDocument>, RemoteError> {
        self.read(RemoteOp::Fetch, index).await
    }

    fn checked_path(&self, op: RemoteOp, index: &IndexName) -> Result<PathBuf, RemoteError> {
        let name = index.0.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(RemoteError::new(op, index, "invalid index name"));
        }
        Ok(self.index_path(index))
    }

    async fn read(
        &self,
        op: RemoteOp,
        index: &IndexName,
    ) -> Result<Option<IndexDocument>, RemoteError> {
        let path = self.checked_path(op, index)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| RemoteError::new(op, index, format!("{}: {e}", path.display()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(RemoteError::new(op, index, format!("{}: {err}", path.display()))),
        }
    }

    async fn write(
        &self,
        op: RemoteOp,
        index: &IndexName,
        doc: &IndexDocument,
    ) -> Result<(), RemoteError> {
        let path = self.checked_path(op, index)?;
        let fail = |e: &dyn std::fmt::Display| {
            RemoteError::new(op, index, format!("{}: {e}", path.display()))
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| fail(&e))?;
        let json = serde_json::to_string_pretty(doc).map_err(|e| fail(&e))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| fail(&e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(fail(&e));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexService for LocalIndexService {
    async fn has_records(&self, index: &IndexName) -> Result<bool, RemoteError> {
        let _guard = self.tasks.lock().await;
        Ok(self
            .read(RemoteOp::Exists, index)
            .await?
            .is_some_and(|doc| !doc.records.is_empty()))
    }

    async fn fetch_all(
        &self,
        index: &IndexName,
        fields: &[String],
    ) -> Result<RemoteSnapshot, RemoteError> {
        let _guard = self.tasks.lock().await;
        let doc = self.read(RemoteOp::Fetch, index).await?.unwrap_or_default();
        Ok(doc
            .records
            .into_iter()
            .map(|(id, record)| {
                let projected = record.project(fields);
                (id, projected)
            })
            .collect())
    }

    async fn add_records(
        &self,
        index: &IndexName,
        records: &[Record],
    ) -> Result<TaskHandle, RemoteError> {
        let mut tasks = self.tasks.lock().await;
        let mut doc = self.read(RemoteOp::Add, index).await?.unwrap_or_default();
        for record in records {
            let id = record
                .object_id()
                .ok_or_else(|| RemoteError::new(RemoteOp::Add, index, "record without objectID"))?;
            doc.records.insert(id, record.clone());
        }
        self.write(RemoteOp::Add, index, &doc).await?;
        Ok(tasks.issue())
    }

    async fn delete_records(
        &self,
        index: &IndexName,
        ids: &[ObjectId],
    ) -> Result<TaskHandle, RemoteError> {
        let mut tasks = self.tasks.lock().await;
        if let Some(mut doc) = self.read(RemoteOp::Delete, index).await? {
            for id in ids {
                doc.records.remove(id);
            }
            self.write(RemoteOp::Delete, index, &doc).await?;
        }
        Ok(tasks.issue())
    }

    async fn set_settings(
        &self,
        index: &IndexName,
        settings: &Value,
    ) -> Result<TaskHandle, RemoteError> {
        let mut tasks = self.tasks.lock().await;
        let mut doc = self
            .read(RemoteOp::SetSettings, index)
            .await?
            .unwrap_or_default();
        match (&mut doc.settings, settings) {
            (Value::Object(current), Value::Object(update)) => {
                for (k, v) in update {
                    current.insert(k.clone(), v.clone());
                }
            }
            (current, update) => *current = update.clone(),
        }
        self.write(RemoteOp::SetSettings, index, &doc).await?;
        Ok(tasks.issue())
    }

    async fn copy_settings(
        &self,
        src: &IndexName,
        dst: &IndexName,
    ) -> Result<TaskHandle, RemoteError> {
        let mut tasks = self.tasks.lock().await;
        let Some(source) = self.read(RemoteOp::CopySettings, src).await? else {
            return Err(RemoteError::new(
                RemoteOp::CopySettings,
                src,
                "source index does not exist",
            ));
        };
        let mut doc = self
            .read(RemoteOp::CopySettings, dst)
            .await?
            .unwrap_or_default();
        doc.settings = source.settings;
        self.write(RemoteOp::CopySettings, dst, &doc).await?;
        Ok(tasks.issue())
    }

    async fn rename(&self, src: &IndexName, dst: &IndexName) -> Result<TaskHandle, RemoteError> {
        let mut tasks = self.tasks.lock().await;
        let from = self.checked_path(RemoteOp::Rename, src)?;
        let to = self.checked_path(RemoteOp::Rename, dst)?;
        tokio::fs::rename(&from, &to).await.map_err(|e| {
            RemoteError::new(RemoteOp::Rename, src, format!("{} -> {}: {e}", from.display(), to.display()))
        })?;
        Ok(tasks.issue())
    }

    async fn wait_task(&self, index: &IndexName, task: TaskHandle) -> Result<(), RemoteError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.issued.remove(&task) {
            Ok(())
        } else {
            Err(RemoteError::new(
                RemoteOp::WaitTask,
                index,
                format!("unknown task {}", task.0),
            ))
        }
    }
}
