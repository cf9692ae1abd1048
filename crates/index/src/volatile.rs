//! In-memory artifact index
//!
//! A `RwLock`-guarded map keyed by artifact id, with a secondary map from
//! the naming tuple for uniqueness checks and direct version lookups.
//! Nothing is persisted: after a restart the store's `rebuild_index`
//! repopulates this index from the WARC files and journals.

use crate::{ArtifactIndex, ArtifactIter, StringIter};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use warcstore_core::{Artifact, RepositoryError, Result, StorageUrl};

type NameKey = (String, String, String);
type VersionKey = (String, String, String, u32);

#[derive(Default)]
struct IndexState {
    by_id: HashMap<String, Artifact>,
    by_tuple: HashMap<VersionKey, String>,
    max_versions: HashMap<NameKey, u32>,
}

/// In-memory, non-persistent artifact index
#[derive(Default)]
pub struct VolatileArtifactIndex {
    state: RwLock<IndexState>,
}

impl VolatileArtifactIndex {
    /// Create an empty index
    pub fn new() -> Self {
        VolatileArtifactIndex::default()
    }

    /// Number of indexed artifacts (committed or not)
    pub fn len(&self) -> usize {
        self.state.read().by_id.len()
    }

    /// Whether the index holds no artifacts
    pub fn is_empty(&self) -> bool {
        self.state.read().by_id.is_empty()
    }
}

fn name_key(a: &Artifact) -> NameKey {
    (a.collection.clone(), a.auid.clone(), a.uri.clone())
}

fn version_key(a: &Artifact) -> VersionKey {
    (
        a.collection.clone(),
        a.auid.clone(),
        a.uri.clone(),
        a.version,
    )
}

// Within an AU: URL ascending, then version descending.
fn cmp_in_au(a: &Artifact, b: &Artifact) -> std::cmp::Ordering {
    a.uri
        .cmp(&b.uri)
        .then_with(|| b.version.cmp(&a.version))
}

// Across AUs: URL ascending, then collection date ascending, then AUID
// ascending, then version descending.
fn cmp_all_aus(a: &Artifact, b: &Artifact) -> std::cmp::Ordering {
    a.uri
        .cmp(&b.uri)
        .then_with(|| a.collection_date.cmp(&b.collection_date))
        .then_with(|| a.auid.cmp(&b.auid))
        .then_with(|| b.version.cmp(&a.version))
}

// Reduce a committed set to the latest version per group key.
fn latest_per_group<K: std::hash::Hash + Eq>(
    artifacts: Vec<Artifact>,
    group: impl Fn(&Artifact) -> K,
) -> Vec<Artifact> {
    let mut latest: HashMap<K, Artifact> = HashMap::new();
    for artifact in artifacts {
        match latest.entry(group(&artifact)) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                if artifact.version > e.get().version {
                    e.insert(artifact);
                }
            }
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(artifact);
            }
        }
    }
    latest.into_values().collect()
}

impl VolatileArtifactIndex {
    // Snapshot of committed artifacts passing `filter`.
    fn committed_where(&self, filter: impl Fn(&Artifact) -> bool) -> Vec<Artifact> {
        self.state
            .read()
            .by_id
            .values()
            .filter(|a| a.committed && filter(a))
            .cloned()
            .collect()
    }

    fn sorted_iter(mut artifacts: Vec<Artifact>, in_au: bool) -> ArtifactIter {
        if in_au {
            artifacts.sort_by(cmp_in_au);
        } else {
            artifacts.sort_by(cmp_all_aus);
        }
        Box::new(artifacts.into_iter())
    }
}

impl ArtifactIndex for VolatileArtifactIndex {
    fn index_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        if artifact.id.is_empty() {
            return Err(RepositoryError::invalid_argument(
                "artifact descriptor has empty id",
            ));
        }

        let mut state = self.state.write();

        let vkey = version_key(&artifact);
        if let Some(existing) = state.by_tuple.get(&vkey) {
            if existing != &artifact.id {
                return Err(RepositoryError::invalid_argument(format!(
                    "version {} of {} already indexed under a different id",
                    artifact.version, artifact.uri
                )));
            }
        }

        let nkey = name_key(&artifact);
        let high = state.max_versions.entry(nkey).or_insert(0);
        if artifact.version > *high {
            *high = artifact.version;
        }

        // Re-indexing the same id (e.g. during reload) replaces the old
        // entry, including one under a previous naming tuple.
        if let Some(previous) = state.by_id.insert(artifact.id.clone(), artifact.clone()) {
            let old_key = version_key(&previous);
            if old_key != vkey {
                state.by_tuple.remove(&old_key);
            }
        }
        state.by_tuple.insert(vkey, artifact.id.clone());

        Ok(artifact)
    }

    fn artifact(&self, artifact_id: &str) -> Result<Option<Artifact>> {
        if artifact_id.is_empty() {
            return Err(RepositoryError::invalid_argument("empty artifact id"));
        }
        Ok(self.state.read().by_id.get(artifact_id).cloned())
    }

    fn commit_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>> {
        if artifact_id.is_empty() {
            return Err(RepositoryError::invalid_argument("empty artifact id"));
        }
        let mut state = self.state.write();
        Ok(state.by_id.get_mut(artifact_id).map(|a| {
            a.committed = true;
            a.clone()
        }))
    }

    fn delete_artifact(&self, artifact_id: &str) -> Result<bool> {
        if artifact_id.is_empty() {
            return Err(RepositoryError::invalid_argument("empty artifact id"));
        }
        let mut state = self.state.write();
        match state.by_id.remove(artifact_id) {
            None => Ok(false),
            Some(removed) => {
                state.by_tuple.remove(&version_key(&removed));
                debug!(artifact_id, uri = %removed.uri, "removed artifact from index");
                Ok(true)
            }
        }
    }

    fn update_storage_url(&self, artifact_id: &str, url: &StorageUrl) -> Result<Artifact> {
        let mut state = self.state.write();
        let artifact = state
            .by_id
            .get_mut(artifact_id)
            .ok_or_else(|| RepositoryError::not_found(format!("artifact {artifact_id}")))?;
        artifact.storage_url = url.clone();
        Ok(artifact.clone())
    }

    fn collection_ids(&self) -> Result<StringIter> {
        let ids: BTreeSet<String> = self
            .committed_where(|_| true)
            .into_iter()
            .map(|a| a.collection)
            .collect();
        Ok(Box::new(ids.into_iter()))
    }

    fn au_ids(&self, collection: &str) -> Result<StringIter> {
        let ids: BTreeSet<String> = self
            .committed_where(|a| a.collection == collection)
            .into_iter()
            .map(|a| a.auid)
            .collect();
        Ok(Box::new(ids.into_iter()))
    }

    fn latest_artifacts(&self, collection: &str, auid: &str) -> Result<ArtifactIter> {
        let committed =
            self.committed_where(|a| a.collection == collection && a.auid == auid);
        let latest = latest_per_group(committed, |a| a.uri.clone());
        Ok(Self::sorted_iter(latest, true))
    }

    fn artifact_versions(&self, collection: &str, auid: &str, url: &str) -> Result<ArtifactIter> {
        let versions = self
            .committed_where(|a| a.collection == collection && a.auid == auid && a.uri == url);
        Ok(Self::sorted_iter(versions, true))
    }

    fn latest_artifacts_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        let committed = self.committed_where(|a| {
            a.collection == collection && a.auid == auid && a.uri.starts_with(prefix)
        });
        let latest = latest_per_group(committed, |a| a.uri.clone());
        Ok(Self::sorted_iter(latest, true))
    }

    fn artifact_versions_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        let versions = self.committed_where(|a| {
            a.collection == collection && a.auid == auid && a.uri.starts_with(prefix)
        });
        Ok(Self::sorted_iter(versions, true))
    }

    fn latest_artifacts_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        let committed = self
            .committed_where(|a| a.collection == collection && a.uri.starts_with(prefix));
        let latest = latest_per_group(committed, |a| (a.auid.clone(), a.uri.clone()));
        Ok(Self::sorted_iter(latest, false))
    }

    fn artifact_versions_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<ArtifactIter> {
        let versions = self
            .committed_where(|a| a.collection == collection && a.uri.starts_with(prefix));
        Ok(Self::sorted_iter(versions, false))
    }

    fn artifact_version(
        &self,
        collection: &str,
        auid: &str,
        url: &str,
        version: u32,
        include_uncommitted: bool,
    ) -> Result<Option<Artifact>> {
        let state = self.state.read();
        let key = (
            collection.to_string(),
            auid.to_string(),
            url.to_string(),
            version,
        );
        let artifact = state
            .by_tuple
            .get(&key)
            .and_then(|id| state.by_id.get(id))
            .filter(|a| a.committed || include_uncommitted)
            .cloned();
        Ok(artifact)
    }

    fn max_version(&self, collection: &str, auid: &str, url: &str) -> Result<Option<u32>> {
        let key = (
            collection.to_string(),
            auid.to_string(),
            url.to_string(),
        );
        Ok(self.state.read().max_versions.get(&key).copied())
    }

    fn au_size(&self, collection: &str, auid: &str) -> Result<u64> {
        let committed =
            self.committed_where(|a| a.collection == collection && a.auid == auid);
        let latest = latest_per_group(committed, |a| a.uri.clone());
        Ok(latest.iter().map(|a| a.content_length).sum())
    }

    fn au_artifact_count(&self, collection: &str, auid: &str) -> Result<u64> {
        let committed =
            self.committed_where(|a| a.collection == collection && a.auid == auid);
        let latest = latest_per_group(committed, |a| a.uri.clone());
        Ok(latest.len() as u64)
    }
}
