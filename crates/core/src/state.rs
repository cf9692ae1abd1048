//! Artifact lifecycle states
//!
//! The write path moves an artifact through
//! `NotIndexed → Uncommitted → Committed → Copied`, with the orthogonal
//! terminal states `Expired` (uncommitted past its TTL) and `Deleted`
//! (tombstoned in the journal). Temp WARC reload and garbage collection
//! classify every record they see into one of these states.

use std::fmt;

/// Lifecycle state of an artifact record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactState {
    /// Record exists on disk but the index has no entry for it
    NotIndexed,
    /// Indexed but not committed; subject to expiration
    Uncommitted,
    /// Uncommitted past the configured TTL; dropped from the index
    Expired,
    /// Journal says committed; the copy to permanent storage is pending
    Committed,
    /// Record bytes live in permanent storage; the temp copy is obsolete
    Copied,
    /// Tombstoned in the journal
    Deleted,
}

impl ArtifactState {
    /// Whether a temp WARC containing only records in this state may be
    /// reclaimed
    pub fn is_reclaimable(&self) -> bool {
        matches!(
            self,
            ArtifactState::Copied | ArtifactState::Expired | ArtifactState::Deleted
        )
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactState::NotIndexed => "NOT_INDEXED",
            ArtifactState::Uncommitted => "UNCOMMITTED",
            ArtifactState::Expired => "EXPIRED",
            ArtifactState::Committed => "COMMITTED",
            ArtifactState::Copied => "COPIED",
            ArtifactState::Deleted => "DELETED",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaimable_states() {
        assert!(ArtifactState::Copied.is_reclaimable());
        assert!(ArtifactState::Expired.is_reclaimable());
        assert!(ArtifactState::Deleted.is_reclaimable());
        assert!(!ArtifactState::Uncommitted.is_reclaimable());
        assert!(!ArtifactState::Committed.is_reclaimable());
        assert!(!ArtifactState::NotIndexed.is_reclaimable());
    }
}
