//! Journaled repository metadata
//!
//! Each AU carries an append-only WARC-format journal whose records hold a
//! WARC-fields mapping of `(artifact-id, committed, deleted)` plus an
//! optional storage-url confirmation written after a successful copy to
//! permanent storage. The last record for a given artifact id is
//! authoritative.

use crate::error::{RepositoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const FIELD_ARTIFACT_ID: &str = "artifact-id";
const FIELD_COMMITTED: &str = "committed";
const FIELD_DELETED: &str = "deleted";
const FIELD_STORAGE_URL: &str = "storage-url";

/// One journal entry: the repository state of a single artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryArtifactMetadata {
    /// UUID of the artifact this entry describes
    pub artifact_id: String,
    /// Whether the artifact has been committed
    pub committed: bool,
    /// Whether the artifact has been deleted (tombstone)
    pub deleted: bool,
    /// Permanent storage URL, present on the post-copy confirmation entry
    pub storage_url: Option<String>,
}

impl RepositoryArtifactMetadata {
    /// Entry recording an uncommitted artifact
    pub fn uncommitted(artifact_id: impl Into<String>) -> Self {
        RepositoryArtifactMetadata {
            artifact_id: artifact_id.into(),
            committed: false,
            deleted: false,
            storage_url: None,
        }
    }

    /// Entry recording a commit
    pub fn committed(artifact_id: impl Into<String>) -> Self {
        RepositoryArtifactMetadata {
            artifact_id: artifact_id.into(),
            committed: true,
            deleted: false,
            storage_url: None,
        }
    }

    /// Entry recording a deletion tombstone
    pub fn deleted(artifact_id: impl Into<String>) -> Self {
        RepositoryArtifactMetadata {
            artifact_id: artifact_id.into(),
            committed: false,
            deleted: true,
            storage_url: None,
        }
    }

    /// Attach the permanent storage URL (copy confirmation)
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = Some(url.into());
        self
    }

    /// Encode as WARC-fields lines (`name: value` pairs, CRLF-terminated)
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            (FIELD_ARTIFACT_ID.to_string(), self.artifact_id.clone()),
            (FIELD_COMMITTED.to_string(), self.committed.to_string()),
            (FIELD_DELETED.to_string(), self.deleted.to_string()),
        ];
        if let Some(url) = &self.storage_url {
            fields.push((FIELD_STORAGE_URL.to_string(), url.clone()));
        }
        fields
    }

    /// Decode from WARC-fields pairs
    ///
    /// # Errors
    /// `InvalidArgument` if the artifact id is missing or a boolean field
    /// does not parse.
    pub fn from_fields(fields: &[(String, String)]) -> Result<Self> {
        let find = |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };

        let artifact_id = find(FIELD_ARTIFACT_ID)
            .ok_or_else(|| RepositoryError::invalid_argument("journal entry has no artifact-id"))?
            .to_string();
        if artifact_id.is_empty() {
            return Err(RepositoryError::invalid_argument(
                "journal entry has empty artifact-id",
            ));
        }

        let parse_bool = |name: &str| -> Result<bool> {
            match find(name) {
                None => Ok(false),
                Some("true") => Ok(true),
                Some("false") => Ok(false),
                Some(other) => Err(RepositoryError::invalid_argument(format!(
                    "journal field {name} is not a boolean: {other}"
                ))),
            }
        };

        Ok(RepositoryArtifactMetadata {
            artifact_id,
            committed: parse_bool(FIELD_COMMITTED)?,
            deleted: parse_bool(FIELD_DELETED)?,
            storage_url: find(FIELD_STORAGE_URL).map(str::to_string),
        })
    }
}

impl fmt::Display for RepositoryArtifactMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}: committed={}, deleted={}]",
            self.artifact_id, self.committed, self.deleted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_round_trip() {
        let meta = RepositoryArtifactMetadata::committed("abc-123")
            .with_storage_url("file:///data/au/artifacts_1.warc?offset=0&length=100");
        let decoded = RepositoryArtifactMetadata::from_fields(&meta.to_fields()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_fields_round_trip_without_url() {
        let meta = RepositoryArtifactMetadata::deleted("abc-123");
        let decoded = RepositoryArtifactMetadata::from_fields(&meta.to_fields()).unwrap();
        assert!(decoded.deleted);
        assert!(!decoded.committed);
        assert!(decoded.storage_url.is_none());
    }

    #[test]
    fn test_missing_artifact_id_rejected() {
        let fields = vec![("committed".to_string(), "true".to_string())];
        assert!(RepositoryArtifactMetadata::from_fields(&fields).is_err());
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let fields = vec![
            ("artifact-id".to_string(), "x".to_string()),
            ("committed".to_string(), "yes".to_string()),
        ];
        assert!(RepositoryArtifactMetadata::from_fields(&fields).is_err());
    }

    #[test]
    fn test_absent_booleans_default_to_false() {
        let fields = vec![("artifact-id".to_string(), "x".to_string())];
        let meta = RepositoryArtifactMetadata::from_fields(&fields).unwrap();
        assert!(!meta.committed);
        assert!(!meta.deleted);
    }
}
