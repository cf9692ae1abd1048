//! Artifact index contract for warcstore
//!
//! The index maps artifact ids to descriptors and answers the
//! repository's enumeration queries: collections, AUs, latest or all
//! committed versions per URL, URL-prefix scans, and AU size accounting.
//! Implementations are pluggable; this crate ships the in-memory
//! [`VolatileArtifactIndex`]. The data store remains authoritative — a
//! lost index is rebuilt from the WARC files and journals.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod volatile;

pub use volatile::VolatileArtifactIndex;

use warcstore_core::{Artifact, Result, StorageUrl};

/// Lazy, finite, non-restartable sequence of artifact descriptors
pub type ArtifactIter = Box<dyn Iterator<Item = Artifact> + Send>;

/// Lazy, finite, non-restartable sequence of identifiers
pub type StringIter = Box<dyn Iterator<Item = String> + Send>;

/// Lookup and enumeration over artifact descriptors
///
/// # Ordering contract
///
/// Within an AU, enumerations are sorted by URL ascending, then version
/// descending. Across all AUs of a collection, they are sorted by URL
/// ascending, then collection date ascending, then AUID ascending, then
/// version descending.
///
/// # Consistency contract
///
/// Single-key operations are linearizable; enumerations observe a
/// snapshot. Enumerations skip uncommitted entries unless stated
/// otherwise.
pub trait ArtifactIndex: Send + Sync {
    /// Whether the index is ready to serve queries
    fn is_ready(&self) -> bool {
        true
    }

    /// Insert (or replace, keyed by id) an artifact descriptor
    ///
    /// # Errors
    /// `InvalidArgument` if the descriptor's id is empty or another id
    /// already holds the same `(collection, auid, uri, version)`.
    fn index_artifact(&self, artifact: Artifact) -> Result<Artifact>;

    /// Look up a descriptor by artifact id
    fn artifact(&self, artifact_id: &str) -> Result<Option<Artifact>>;

    /// Whether an artifact id exists in the index
    fn artifact_exists(&self, artifact_id: &str) -> Result<bool> {
        Ok(self.artifact(artifact_id)?.is_some())
    }

    /// Mark an artifact committed; `None` if the id is unknown
    fn commit_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>>;

    /// Remove an artifact; `false` if the id was unknown
    ///
    /// The per-`(collection, auid, uri)` version high-water mark survives
    /// deletion so version numbers are never reused.
    fn delete_artifact(&self, artifact_id: &str) -> Result<bool>;

    /// Update where an artifact's record bytes live
    ///
    /// # Errors
    /// `NotFound` if the id is unknown.
    fn update_storage_url(&self, artifact_id: &str, url: &StorageUrl) -> Result<Artifact>;

    /// Collection ids having at least one committed artifact, ascending
    fn collection_ids(&self) -> Result<StringIter>;

    /// AUIDs in a collection having at least one committed artifact,
    /// ascending
    fn au_ids(&self, collection: &str) -> Result<StringIter>;

    /// Latest committed version of every URL in an AU
    fn latest_artifacts(&self, collection: &str, auid: &str) -> Result<ArtifactIter>;

    /// All committed versions of one URL in an AU
    fn artifact_versions(&self, collection: &str, auid: &str, url: &str) -> Result<ArtifactIter>;

    /// Latest committed version of every URL matching a prefix in an AU
    fn latest_artifacts_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> Result<ArtifactIter>;

    /// All committed versions of every URL matching a prefix in an AU
    fn artifact_versions_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> Result<ArtifactIter>;

    /// Latest committed version per `(auid, url)` matching a prefix,
    /// across all AUs of a collection
    fn latest_artifacts_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<ArtifactIter>;

    /// All committed versions matching a prefix, across all AUs of a
    /// collection
    fn artifact_versions_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<ArtifactIter>;

    /// A specific version of a URL; uncommitted entries are visible only
    /// with `include_uncommitted`
    fn artifact_version(
        &self,
        collection: &str,
        auid: &str,
        url: &str,
        version: u32,
        include_uncommitted: bool,
    ) -> Result<Option<Artifact>>;

    /// Highest version ever indexed for `(collection, auid, url)`,
    /// surviving deletions
    fn max_version(&self, collection: &str, auid: &str, url: &str) -> Result<Option<u32>>;

    /// Sum of `content_length` over the latest committed version of each
    /// URL in the AU
    fn au_size(&self, collection: &str, auid: &str) -> Result<u64>;

    /// Number of URLs in the AU with a committed version
    fn au_artifact_count(&self, collection: &str, auid: &str) -> Result<u64>;
}
