//! The repository facade

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;
use warcstore_core::{Artifact, ArtifactData, RepositoryError, Result};
use warcstore_index::{ArtifactIndex, ArtifactIter, StringIter, VolatileArtifactIndex};
use warcstore_storage::{
    ArtifactDataStore, CommitFuture, GcStats, StorageInfo, StoreConfig, WarcDataStore,
};

// Readiness polling starts here and doubles up to the ceiling.
const READY_BACKOFF_START: Duration = Duration::from_millis(10);
const READY_BACKOFF_CEILING: Duration = Duration::from_secs(1);

/// A versioned web-archival repository over an index and a data store
pub struct Repository {
    index: Arc<dyn ArtifactIndex>,
    store: Arc<dyn ArtifactDataStore>,
}

impl Repository {
    /// Wire an index and a store together and initialize the store
    pub fn new(index: Arc<dyn ArtifactIndex>, store: Arc<dyn ArtifactDataStore>) -> Result<Self> {
        store.set_artifact_index(Arc::clone(&index));
        store.init()?;
        Ok(Repository { index, store })
    }

    /// A repository with the shipped components: a [`WarcDataStore`] over
    /// the configured base paths and a volatile index
    pub fn open(config: StoreConfig) -> Result<Self> {
        let index: Arc<dyn ArtifactIndex> = Arc::new(VolatileArtifactIndex::new());
        let store: Arc<dyn ArtifactDataStore> = Arc::new(WarcDataStore::new(config)?);
        Repository::new(index, store)
    }

    /// The repository's index
    pub fn index(&self) -> &Arc<dyn ArtifactIndex> {
        &self.index
    }

    /// The repository's data store
    pub fn store(&self) -> &Arc<dyn ArtifactDataStore> {
        &self.store
    }

    // Index lookup scoped by collection.
    fn get_checked(&self, collection: &str, artifact_id: &str) -> Result<Artifact> {
        let artifact = self
            .index
            .artifact(artifact_id)?
            .ok_or_else(|| RepositoryError::not_found(format!("artifact {artifact_id}")))?;
        if artifact.collection != collection {
            return Err(RepositoryError::not_found(format!(
                "artifact {artifact_id} in collection {collection}"
            )));
        }
        Ok(artifact)
    }

    /// Ingest an artifact
    ///
    /// Assigns the next version for `(collection, auid, uri)` — one past
    /// the highest version ever indexed, so deleted versions are not
    /// reused — writes the record to temp storage, and indexes the
    /// uncommitted descriptor.
    pub fn add_artifact(&self, mut data: ArtifactData) -> Result<Artifact> {
        let identifier = data.identifier();
        if identifier.collection.is_empty() || identifier.auid.is_empty() || identifier.uri.is_empty()
        {
            return Err(RepositoryError::invalid_argument(
                "artifact identifier has empty components",
            ));
        }

        let next_version = 1 + self
            .index
            .max_version(&identifier.collection, &identifier.auid, &identifier.uri)?
            .unwrap_or(0);
        data.set_version(next_version);

        let artifact = self.store.add_artifact(data)?;
        match self.index.index_artifact(artifact.clone()) {
            Ok(indexed) => Ok(indexed),
            Err(e) => {
                // The record bytes are unreferenced; tombstone them so GC
                // reclaims the temp space. The insert is not retried.
                error!(artifact = %artifact.id, error = %e, "index insert failed after store write");
                let _ = self.store.delete_artifact(&artifact);
                Err(e)
            }
        }
    }

    /// Commit an artifact for permanent storage
    ///
    /// Marks the index entry committed, then schedules the copy; the
    /// returned future resolves with the descriptor carrying the
    /// permanent storage URL. Committing twice is a no-op returning the
    /// current descriptor.
    pub fn commit_artifact(&self, collection: &str, artifact_id: &str) -> Result<CommitFuture> {
        let artifact = self.get_checked(collection, artifact_id)?;
        if !artifact.committed {
            self.index.commit_artifact(artifact_id)?;
        }
        self.store.commit_artifact(&artifact)
    }

    /// Delete an artifact
    ///
    /// Tombstones the store's journal, then removes the index entry. The
    /// record bytes are reclaimed by temp GC; already-copied records
    /// simply become unreachable. Deleting an id that is no longer
    /// indexed is a no-op (delete is idempotent).
    pub fn delete_artifact(&self, collection: &str, artifact_id: &str) -> Result<()> {
        let artifact = match self.get_checked(collection, artifact_id) {
            Ok(artifact) => artifact,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        self.store.delete_artifact(&artifact)?;
        self.index.delete_artifact(artifact_id)?;
        Ok(())
    }

    /// Descriptor of an artifact in a collection, if indexed
    pub fn artifact(&self, collection: &str, artifact_id: &str) -> Result<Option<Artifact>> {
        match self.get_checked(collection, artifact_id) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Content and headers of an artifact, opened from the store
    pub fn artifact_data(&self, collection: &str, artifact_id: &str) -> Result<ArtifactData> {
        let artifact = self.get_checked(collection, artifact_id)?;
        self.store.artifact_data(&artifact)
    }

    /// Whether any artifact with this id is indexed
    pub fn artifact_exists(&self, artifact_id: &str) -> Result<bool> {
        self.index.artifact_exists(artifact_id)
    }

    /// Whether an artifact is committed
    ///
    /// # Errors
    /// `NotFound` for an unknown id.
    pub fn is_artifact_committed(&self, artifact_id: &str) -> Result<bool> {
        self.index
            .artifact(artifact_id)?
            .map(|a| a.committed)
            .ok_or_else(|| RepositoryError::not_found(format!("artifact {artifact_id}")))
    }

    /// Collection ids with at least one committed artifact
    pub fn collection_ids(&self) -> Result<StringIter> {
        self.index.collection_ids()
    }

    /// AUIDs of a collection with at least one committed artifact
    pub fn au_ids(&self, collection: &str) -> Result<StringIter> {
        self.index.au_ids(collection)
    }

    /// Latest committed version of every URL in an AU
    pub fn latest_artifacts(&self, collection: &str, auid: &str) -> Result<ArtifactIter> {
        self.index.latest_artifacts(collection, auid)
    }

    /// Latest committed version of one URL, if any
    pub fn latest_artifact(
        &self,
        collection: &str,
        auid: &str,
        url: &str,
    ) -> Result<Option<Artifact>> {
        // Versions enumerate newest first
        Ok(self.index.artifact_versions(collection, auid, url)?.next())
    }

    /// All committed versions of one URL, newest first
    pub fn artifact_versions(
        &self,
        collection: &str,
        auid: &str,
        url: &str,
    ) -> Result<ArtifactIter> {
        self.index.artifact_versions(collection, auid, url)
    }

    /// A specific version of a URL
    pub fn artifact_version(
        &self,
        collection: &str,
        auid: &str,
        url: &str,
        version: u32,
        include_uncommitted: bool,
    ) -> Result<Option<Artifact>> {
        self.index
            .artifact_version(collection, auid, url, version, include_uncommitted)
    }

    /// Latest committed versions of URLs matching a prefix in an AU
    pub fn artifacts_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        self.index
            .latest_artifacts_with_prefix(collection, auid, prefix)
    }

    /// All committed versions of URLs matching a prefix in an AU
    pub fn artifact_versions_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        self.index
            .artifact_versions_with_prefix(collection, auid, prefix)
    }

    /// Latest committed versions matching a prefix across a collection
    pub fn artifacts_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        self.index
            .latest_artifacts_with_prefix_all_aus(collection, prefix)
    }

    /// All committed versions matching a prefix across a collection
    pub fn artifact_versions_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        self.index
            .artifact_versions_with_prefix_all_aus(collection, prefix)
    }

    /// Sum of content lengths over the latest committed version per URL
    pub fn au_size(&self, collection: &str, auid: &str) -> Result<u64> {
        self.index.au_size(collection, auid)
    }

    /// Number of URLs with a committed version in an AU
    pub fn au_artifact_count(&self, collection: &str, auid: &str) -> Result<u64> {
        self.index.au_artifact_count(collection, auid)
    }

    /// Seal an AU's active WARC if it has content
    pub fn seal_active_warc(&self, collection: &str, auid: &str) -> Result<()> {
        self.store.seal_active_warc(collection, auid)
    }

    /// Rebuild the index from the store's WARC files and journals
    pub fn rebuild_index(&self) -> Result<()> {
        self.store.rebuild_index(&self.index)
    }

    /// Run one temp WARC garbage-collection pass
    pub fn run_gc(&self) -> GcStats {
        self.store.gc_temp_warcs()
    }

    /// Filesystem usage of the store's base paths
    pub fn storage_info(&self) -> Result<StorageInfo> {
        self.store.storage_info()
    }

    /// Whether both the store and the index are ready
    pub fn is_ready(&self) -> bool {
        self.store.is_ready() && self.index.is_ready()
    }

    /// Wait for readiness with capped exponential backoff
    ///
    /// Returns `false` if the deadline passes first.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut backoff = READY_BACKOFF_START;

        loop {
            if self.is_ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(backoff.min(deadline - now));
            backoff = (backoff * 2).min(READY_BACKOFF_CEILING);
        }
    }

    /// Stop background work and drain in-flight commits
    pub fn shutdown(&self) {
        self.store.shutdown();
    }
}
