//! Error types for searchsync-engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use searchsync_core::error::ConfigError;
use searchsync_core::types::IndexName;

/// The remote operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Exists,
    Fetch,
    Add,
    Delete,
    SetSettings,
    CopySettings,
    Rename,
    WaitTask,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteOp::Exists => "exists",
            RemoteOp::Fetch => "fetch",
            RemoteOp::Add => "add",
            RemoteOp::Delete => "delete",
            RemoteOp::SetSettings => "set-settings",
            RemoteOp::CopySettings => "copy-settings",
            RemoteOp::Rename => "rename",
            RemoteOp::WaitTask => "wait-task",
        };
        f.write_str(s)
    }
}

/// A failure reported by an index service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("remote {op} on '{index}' failed: {message}")]
pub struct RemoteError {
    pub op: RemoteOp,
    pub index: IndexName,
    pub message: String,
}

impl RemoteError {
    pub fn new(op: RemoteOp, index: &IndexName, message: impl Into<String>) -> Self {
        Self {
            op,
            index: index.clone(),
            message: message.into(),
        }
    }
}

/// All errors that can arise from a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid job configuration; raised before any remote call.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A record without an object identifier; aborts its source before upload.
    #[error("record {position} of source {source_ordinal} for index '{index}' has no objectID")]
    MissingIdentifier {
        index: IndexName,
        source_ordinal: usize,
        position: usize,
    },

    /// Hash-cache mode was selected but no hash store was supplied.
    #[error("hash-cache mode requires a hash store")]
    MissingHashStore,

    /// An error reported by the index service.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (hash cache, local index).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
