//! searchsync core library — domain types, job configuration, errors.
//!
//! - [`types`] — newtypes, records, sources, run mode
//! - [`config`] — job file load / validate / resolve
//! - [`records`] — record file loading
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod records;
pub mod types;

pub use config::{SourceConfig, SyncConfig};
pub use error::ConfigError;
pub use types::{
    DiffStrategy, IndexName, ObjectId, Record, Source, SyncMode, DEFAULT_CHUNK_SIZE,
    OBJECT_ID_FIELD,
};
