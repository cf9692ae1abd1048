//! WARC artifact data store for warcstore
//!
//! This crate implements the append-only storage layer:
//! - Temp WARC pool with best-fit-last-block selection
//! - Deterministic storage paths (collections, AUs, sealed WARCs, journal)
//! - Per-AU repository metadata journal with last-write-wins replay
//! - The WARC data store: add/commit/delete/read, async commit copies
//!   through a bounded worker pool, seal-on-threshold, temp reload on
//!   restart, full index rebuild, and temp WARC garbage collection
//!
//! The store is authoritative: the index can always be reconstructed from
//! the WARC files and journals on disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit;
pub mod config;
pub mod gc;
pub mod journal;
pub mod paths;
pub mod pool;
pub mod recovery;
pub mod scheduler;
pub mod store;

pub use commit::CommitFuture;
pub use config::StoreConfig;
pub use gc::GcStats;
pub use pool::{PoolStats, WarcFile, WarcFilePool};
pub use store::WarcDataStore;

use std::sync::Arc;
use warcstore_core::{Artifact, ArtifactData, Result};
use warcstore_index::ArtifactIndex;

/// Filesystem usage across the store's base paths
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageInfo {
    /// Total capacity in bytes
    pub total: u64,
    /// Bytes in use
    pub used: u64,
    /// Bytes available
    pub available: u64,
    /// `used / total` as a percentage
    pub percent_used: f64,
}

/// The artifact byte-store capability set
///
/// The repository facade consumes the store through this trait; the
/// shipped implementation is [`WarcDataStore`]. All operations may fail
/// with `Io` for underlying disk problems; operation-specific failure
/// conditions are documented per method.
pub trait ArtifactDataStore: Send + Sync {
    /// Attach the artifact index the store keeps consistent
    ///
    /// Must be called before [`ArtifactDataStore::init`]: temp reload and
    /// commit copies both notify the index.
    fn set_artifact_index(&self, index: Arc<dyn ArtifactIndex>);

    /// Create directory scaffolding, reload temp WARCs, start GC
    ///
    /// # Errors
    /// `IllegalState` if no index has been attached.
    fn init(&self) -> Result<()>;

    /// Whether the store has initialized and is accepting operations
    fn is_ready(&self) -> bool;

    /// Write an uncommitted artifact record into a pooled temp WARC
    ///
    /// Consumes the payload once, deriving content length and digest, and
    /// returns a descriptor whose storage URL points at the temp record.
    fn add_artifact(&self, data: ArtifactData) -> Result<Artifact>;

    /// Open the artifact's record and return its data
    ///
    /// The payload is a single-consumption reader over the record's byte
    /// range.
    ///
    /// # Errors
    /// `InvalidArgument` for a malformed storage URL; `NotFound` if the
    /// URL does not resolve to an existing record.
    fn artifact_data(&self, artifact: &Artifact) -> Result<ArtifactData>;

    /// Commit an artifact: journal the state, schedule the copy to
    /// permanent storage, and return a future of the updated descriptor
    ///
    /// Re-committing is a no-op returning the current descriptor;
    /// committing a deleted artifact completes with `None` (deletion
    /// wins).
    fn commit_artifact(&self, artifact: &Artifact) -> Result<CommitFuture>;

    /// Tombstone an artifact in the journal
    ///
    /// The record bytes are not erased; they become unreachable and are
    /// reclaimed when their temp WARC is garbage-collected.
    fn delete_artifact(&self, artifact: &Artifact) -> Result<()>;

    /// Seal the AU's active WARC if it has content; idempotent otherwise
    fn seal_active_warc(&self, collection: &str, auid: &str) -> Result<()>;

    /// Re-populate an index from the WARC files and journals on disk
    fn rebuild_index(&self, index: &Arc<dyn ArtifactIndex>) -> Result<()>;

    /// Run one garbage-collection pass over idle temp WARCs
    fn gc_temp_warcs(&self) -> GcStats;

    /// Filesystem usage across the base paths
    fn storage_info(&self) -> Result<StorageInfo>;

    /// Stop background work and drain in-flight commit copies
    fn shutdown(&self);
}
