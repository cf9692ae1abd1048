//! Artifact identity and descriptor types
//!
//! An artifact is one captured HTTP response, named by the tuple
//! `(collection, auid, uri, version)` and carrying a UUID assigned on first
//! ingest. The UUID is immutable and is the primary index key; the naming
//! tuple is unique across the repository.

use crate::error::{RepositoryError, Result};
use crate::storage_url::StorageUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity tuple of an artifact: `(id, collection, auid, uri, version)`
///
/// `id` is a UUID string assigned when the artifact is first ingested.
/// `version` is strictly positive and assigned by the repository facade so
/// that versions of a `(collection, auid, uri)` form a contiguous sequence
/// starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactIdentifier {
    /// UUID assigned on first ingest; immutable afterwards
    pub id: String,
    /// Top-level namespace for AUs
    pub collection: String,
    /// Archival Unit identifier (opaque AUID)
    pub auid: String,
    /// URL of the captured resource
    pub uri: String,
    /// Strictly positive version within `(collection, auid, uri)`
    pub version: u32,
}

impl ArtifactIdentifier {
    /// Create an identifier with a freshly assigned UUID
    pub fn new(
        collection: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        version: u32,
    ) -> Self {
        ArtifactIdentifier {
            id: Uuid::new_v4().to_string(),
            collection: collection.into(),
            auid: auid.into(),
            uri: uri.into(),
            version,
        }
    }

    /// Re-create an identifier from previously persisted parts
    pub fn from_parts(
        id: impl Into<String>,
        collection: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        version: u32,
    ) -> Self {
        ArtifactIdentifier {
            id: id.into(),
            collection: collection.into(),
            auid: auid.into(),
            uri: uri.into(),
            version,
        }
    }

    /// Validate that the identifier is usable as an index key
    ///
    /// # Errors
    /// `InvalidArgument` if any component is empty or the version is zero.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(RepositoryError::invalid_argument("artifact id is empty"));
        }
        if self.collection.is_empty() {
            return Err(RepositoryError::invalid_argument("collection is empty"));
        }
        if self.auid.is_empty() {
            return Err(RepositoryError::invalid_argument("auid is empty"));
        }
        if self.uri.is_empty() {
            return Err(RepositoryError::invalid_argument("uri is empty"));
        }
        if self.version == 0 {
            return Err(RepositoryError::invalid_argument(
                "version must be strictly positive",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ArtifactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, v{} ({})]",
            self.collection, self.auid, self.uri, self.version, self.id
        )
    }
}

/// Index-side artifact descriptor
///
/// This is the object returned by index lookups and enumerations. It
/// carries the identity tuple plus repository state: whether the artifact
/// has been committed, where its record bytes live, and the derived
/// content length and digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// UUID of the artifact
    pub id: String,
    /// Collection the artifact belongs to
    pub collection: String,
    /// Archival Unit the artifact belongs to
    pub auid: String,
    /// URL of the captured resource
    pub uri: String,
    /// Version within `(collection, auid, uri)`
    pub version: u32,
    /// Whether the artifact has been committed
    pub committed: bool,
    /// Pointer to the record bytes within a WARC file
    pub storage_url: StorageUrl,
    /// Length of the response body in bytes
    pub content_length: u64,
    /// Content digest in `algorithm:hex` form
    pub content_digest: String,
    /// Wall-clock time of ingest
    pub collection_date: DateTime<Utc>,
}

impl Artifact {
    /// Build a descriptor from an identifier and storage state
    pub fn new(
        identifier: &ArtifactIdentifier,
        committed: bool,
        storage_url: StorageUrl,
        content_length: u64,
        content_digest: impl Into<String>,
        collection_date: DateTime<Utc>,
    ) -> Self {
        Artifact {
            id: identifier.id.clone(),
            collection: identifier.collection.clone(),
            auid: identifier.auid.clone(),
            uri: identifier.uri.clone(),
            version: identifier.version,
            committed,
            storage_url,
            content_length,
            content_digest: content_digest.into(),
            collection_date,
        }
    }

    /// The identity tuple of this descriptor
    pub fn identifier(&self) -> ArtifactIdentifier {
        ArtifactIdentifier::from_parts(
            self.id.clone(),
            self.collection.clone(),
            self.auid.clone(),
            self.uri.clone(),
            self.version,
        )
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, v{}, committed={}, {}]",
            self.collection, self.auid, self.uri, self.version, self.committed, self.storage_url
        )
    }
}
