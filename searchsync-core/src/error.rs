//! Error types for searchsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating a sync job.
///
/// Every variant is raised before the engine issues a single remote call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse job config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A records file was not valid JSON.
    #[error("failed to parse records at {path}: {source}")]
    Records {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A records file parsed, but was not an array of JSON objects.
    #[error("records at {path} must be a JSON array of objects (offending entry: {position})")]
    RecordNotObject { path: PathBuf, position: usize },

    /// The config or records file did not exist.
    #[error("file not found at {path}")]
    NotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.searchsync/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("job '{job}' declares no sources")]
    NoSources { job: String },

    /// A source without a records definition (nothing to fetch from).
    #[error("source {ordinal} has no `records` definition")]
    MissingRecords { ordinal: usize },

    #[error("source {ordinal} has no destination index and the job has no default `index_name`")]
    MissingIndex { ordinal: usize },

    #[error("source {ordinal}: `match_fields` must be a non-empty list of field names")]
    InvalidMatchFields { ordinal: usize },

    #[error("`chunk_size` must be greater than zero")]
    ZeroChunkSize,

    /// Live-diff and hash-cache are mutually exclusive change detectors.
    #[error("`enable_partial_updates` and `enable_hash_cache` cannot both be enabled")]
    ConflictingStrategies,
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
