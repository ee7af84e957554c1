//! The remote index capability.
//!
//! The engine never talks to a search service directly; it drives an
//! [`IndexService`]. Mutating calls return a [`TaskHandle`] immediately and
//! become visible once [`IndexService::wait_task`] resolves. Retry and
//! timeout policy belong to the implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use searchsync_core::types::{IndexName, ObjectId, Record};

use crate::error::RemoteError;

/// Records currently held by a remote index, keyed by identifier.
///
/// Values only carry the fields requested from [`IndexService::fetch_all`].
pub type RemoteSnapshot = HashMap<ObjectId, Record>;

/// Identifies an asynchronous remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

#[async_trait]
pub trait IndexService: Send + Sync {
    /// True when `index` exists and holds at least one record.
    async fn has_records(&self, index: &IndexName) -> Result<bool, RemoteError>;

    /// Every record in `index`, projected onto `fields` plus the identifier.
    async fn fetch_all(
        &self,
        index: &IndexName,
        fields: &[String],
    ) -> Result<RemoteSnapshot, RemoteError>;

    /// Upsert `records` by identifier.
    async fn add_records(
        &self,
        index: &IndexName,
        records: &[Record],
    ) -> Result<TaskHandle, RemoteError>;

    async fn delete_records(
        &self,
        index: &IndexName,
        ids: &[ObjectId],
    ) -> Result<TaskHandle, RemoteError>;

    async fn set_settings(
        &self,
        index: &IndexName,
        settings: &Value,
    ) -> Result<TaskHandle, RemoteError>;

    /// Copy settings, synonyms and rules (never records) from `src` to `dst`.
    async fn copy_settings(
        &self,
        src: &IndexName,
        dst: &IndexName,
    ) -> Result<TaskHandle, RemoteError>;

    /// Replace `dst` with `src` in one step; `src` ceases to exist.
    async fn rename(&self, src: &IndexName, dst: &IndexName) -> Result<TaskHandle, RemoteError>;

    /// Resolve once `task` has been applied to `index`.
    async fn wait_task(&self, index: &IndexName, task: TaskHandle) -> Result<(), RemoteError>;
}
