//! # warcstore
//!
//! A versioned web-archival repository in the LOCKSS model: captured HTTP
//! responses are ingested as artifacts, persisted in append-only WARC
//! container files, and indexed for lookup by collection, Archival Unit
//! (AU), URL, and version.
//!
//! Artifacts are written to pooled temporary WARC files on ingest and
//! promoted to per-AU permanent WARCs when committed. A per-AU WARC-format
//! journal records committed/deleted state so the repository can be rebuilt
//! from storage alone.
//!
//! # Quick Start
//!
//! ```no_run
//! use warcstore::{Repository, StoreConfig, ArtifactData, HttpResponseHead, Payload};
//! use warcstore::chrono::Utc;
//!
//! fn main() -> warcstore::Result<()> {
//!     let config = StoreConfig::new(["./repo-data"]);
//!     let repo = Repository::open(config)?;
//!
//!     let response = HttpResponseHead::ok()
//!         .with_header("Content-Type", "text/html");
//!     let data = ArtifactData::new(
//!         "journals",
//!         "au:volume-12",
//!         "http://publisher.example/vol12/toc",
//!         response,
//!         Payload::from_bytes(b"<html>...</html>".to_vec()),
//!         Utc::now(),
//!     );
//!
//!     let artifact = repo.add_artifact(data)?;
//!     let committed = repo.commit_artifact("journals", &artifact.id)?.wait()?;
//!     assert!(committed.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The [`Repository`] facade coordinates two pluggable capability sets:
//! an [`ArtifactIndex`] (lookup and enumeration over artifact descriptors)
//! and an [`ArtifactDataStore`] (the WARC-backed byte store). The shipped
//! implementations are [`VolatileArtifactIndex`] and [`WarcDataStore`].
//!
//! Internal crates (`warcstore-core`, `warcstore-warc`, `warcstore-index`,
//! `warcstore-storage`, `warcstore-repo`) are re-exported here; only this
//! surface is stable.

pub use warcstore_core::{
    Artifact, ArtifactData, ArtifactIdentifier, ArtifactState, Clock, HttpResponseHead,
    ManualClock, Payload, RepositoryArtifactMetadata, RepositoryError, Result, StorageUrl,
    SystemClock,
};
pub use warcstore_index::{ArtifactIndex, ArtifactIter, StringIter, VolatileArtifactIndex};
pub use warcstore_repo::Repository;
pub use warcstore_storage::{
    ArtifactDataStore, CommitFuture, StorageInfo, StoreConfig, WarcDataStore,
};

// Re-exported so embedding hosts can construct dates without pinning their
// own chrono version.
pub use warcstore_core::chrono;
