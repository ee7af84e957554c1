//! # searchsync-engine
//!
//! Incremental reconciliation of local record sets into remote search indexes.
//!
//! Call [`pipeline::run`] with a [`SyncContext`] and the job's sources. The
//! engine only talks to the outside world through an [`IndexService`]; two
//! are provided: [`MemoryIndexService`] and [`LocalIndexService`].

pub mod activity;
pub mod detector;
pub mod error;
pub mod hash_store;
pub mod index_state;
pub mod local;
pub mod memory;
pub mod pipeline;
pub mod reconcile;
pub mod remote;
pub mod scheduler;
pub mod swap;

pub use activity::{ActivityReporter, RecordingActivity, TracingActivity};
pub use error::{RemoteError, RemoteOp, SyncError};
pub use hash_store::{HashStoreFile, JsonSnapshotStore, SnapshotStore};
pub use local::LocalIndexService;
pub use memory::MemoryIndexService;
pub use pipeline::{IndexOutcome, SourceOutcome, SyncContext, SyncReport};
pub use remote::{IndexService, RemoteSnapshot, TaskHandle};
pub use swap::{SwapPhase, WriteTarget};
