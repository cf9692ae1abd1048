//! Per-AU repository metadata journal
//!
//! Each AU directory carries an append-only `lockss-repo.warc` holding one
//! WARC `metadata` record per state change, with an
//! `application/warc-fields` payload of `artifact-id, committed, deleted`
//! and, after a successful copy, the permanent `storage-url`. Replay folds
//! the records in file order; the last entry for an artifact id wins.
//!
//! A torn tail (crash mid-append) is truncated back to the last complete
//! record during replay. A partially-written commit or delete therefore
//! reverts to the prior state, which the commit path re-drives safely.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::warn;
use warcstore_core::{RepositoryArtifactMetadata, RepositoryError, Result};
use warcstore_warc::headers::{ARTIFACT_ID_KEY, CONTENT_TYPE_WARC_FIELDS};
use warcstore_warc::{fields, write_record, WarcError, WarcRecordHeader, WarcRecordType, WarcScanner};

/// Append-only journal for one AU
///
/// Callers serialize appends through the AU's journal lock; the journal
/// itself holds no state beyond its path.
#[derive(Debug)]
pub struct RepositoryJournal {
    path: PathBuf,
}

impl RepositoryJournal {
    /// Journal at the given path (not created until the first append)
    pub fn new(path: PathBuf) -> Self {
        RepositoryJournal { path }
    }

    /// The journal file path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Whether the journal file exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Append one state record and sync it to disk
    pub fn append(&self, when: DateTime<Utc>, meta: &RepositoryArtifactMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let payload = fields::encode(&meta.to_fields());
        let mut header = WarcRecordHeader::new(
            WarcRecordType::Metadata,
            when,
            CONTENT_TYPE_WARC_FIELDS,
            payload.len() as u64,
        );
        header
            .extra
            .push((ARTIFACT_ID_KEY.to_string(), meta.artifact_id.clone()));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write_record(&mut file, &header, &mut Cursor::new(payload))?;
        file.sync_data()?;
        Ok(())
    }

    /// Fold the journal into per-artifact state, last entry wins
    ///
    /// With `repair`, a torn tail is truncated back to the last complete
    /// record. Broken framing mid-file stops the fold with a warning; the
    /// entries read so far are returned.
    pub fn replay(&self, repair: bool) -> Result<HashMap<String, RepositoryArtifactMetadata>> {
        let mut entries = HashMap::new();
        if !self.exists() {
            return Ok(entries);
        }

        let mut scanner = WarcScanner::open(&self.path, false)
            .map_err(RepositoryError::Io)?
            .with_payload(true);

        let mut tail_error = None;
        for record in &mut scanner {
            match record {
                Ok(record) => {
                    if record.header.record_type != WarcRecordType::Metadata {
                        continue;
                    }
                    let payload = record.payload.as_deref().unwrap_or_default();
                    match fields::parse(payload)
                        .map_err(|e| e.to_string())
                        .and_then(|f| {
                            RepositoryArtifactMetadata::from_fields(&f).map_err(|e| e.to_string())
                        }) {
                        Ok(meta) => {
                            entries.insert(meta.artifact_id.clone(), meta);
                        }
                        Err(reason) => {
                            warn!(
                                journal = %self.path.display(),
                                offset = record.offset,
                                reason,
                                "skipping undecodable journal entry"
                            );
                        }
                    }
                }
                Err(e) => {
                    tail_error = Some(e);
                    break;
                }
            }
        }

        match tail_error {
            None => {}
            Some(WarcError::Incomplete { offset }) => {
                warn!(
                    journal = %self.path.display(),
                    offset,
                    valid_end = scanner.position(),
                    "journal has a torn tail"
                );
                if repair {
                    let file = OpenOptions::new().write(true).open(&self.path)?;
                    file.set_len(scanner.position())?;
                    file.sync_data()?;
                }
            }
            Some(e) => {
                warn!(
                    journal = %self.path.display(),
                    error = %e,
                    "journal framing broken; replay stopped early"
                );
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn journal(dir: &std::path::Path) -> RepositoryJournal {
        RepositoryJournal::new(dir.join("au-dir").join("lockss-repo.warc"))
    }

    #[test]
    fn test_append_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let j = journal(dir.path());
        assert!(!j.exists());

        j.append(Utc::now(), &RepositoryArtifactMetadata::uncommitted("a1"))
            .unwrap();
        assert!(j.exists());
    }

    #[test]
    fn test_last_entry_wins() {
        let dir = tempdir().unwrap();
        let j = journal(dir.path());
        let now = Utc::now();

        j.append(now, &RepositoryArtifactMetadata::uncommitted("a1"))
            .unwrap();
        j.append(now, &RepositoryArtifactMetadata::committed("a1"))
            .unwrap();
        j.append(now, &RepositoryArtifactMetadata::uncommitted("a2"))
            .unwrap();
        j.append(now, &RepositoryArtifactMetadata::deleted("a2"))
            .unwrap();

        let state = j.replay(false).unwrap();
        assert_eq!(state.len(), 2);
        assert!(state["a1"].committed);
        assert!(!state["a1"].deleted);
        assert!(state["a2"].deleted);
    }

    #[test]
    fn test_storage_url_confirmation_survives_replay() {
        let dir = tempdir().unwrap();
        let j = journal(dir.path());
        let now = Utc::now();

        j.append(now, &RepositoryArtifactMetadata::committed("a1"))
            .unwrap();
        j.append(
            now,
            &RepositoryArtifactMetadata::committed("a1")
                .with_storage_url("file:///p/artifacts_1.warc?offset=0&length=50"),
        )
        .unwrap();

        let state = j.replay(false).unwrap();
        assert_eq!(
            state["a1"].storage_url.as_deref(),
            Some("file:///p/artifacts_1.warc?offset=0&length=50")
        );
    }

    #[test]
    fn test_torn_tail_truncated_and_replay_continues() {
        let dir = tempdir().unwrap();
        let j = journal(dir.path());
        let now = Utc::now();

        j.append(now, &RepositoryArtifactMetadata::committed("a1"))
            .unwrap();
        let good_len = std::fs::metadata(j.path()).unwrap().len();

        // Simulate a crash mid-append
        j.append(now, &RepositoryArtifactMetadata::deleted("a1"))
            .unwrap();
        let file = OpenOptions::new().write(true).open(j.path()).unwrap();
        file.set_len(std::fs::metadata(j.path()).unwrap().len() - 5)
            .unwrap();

        // Partial delete reverts: a1 is still committed
        let state = j.replay(true).unwrap();
        assert!(state["a1"].committed);
        assert!(!state["a1"].deleted);
        assert_eq!(std::fs::metadata(j.path()).unwrap().len(), good_len);

        // The journal accepts appends again after repair
        j.append(now, &RepositoryArtifactMetadata::deleted("a1"))
            .unwrap();
        let state = j.replay(false).unwrap();
        assert!(state["a1"].deleted);
    }

    #[test]
    fn test_garbage_midfile_stops_fold_with_partial_state() {
        let dir = tempdir().unwrap();
        let j = journal(dir.path());
        let now = Utc::now();

        j.append(now, &RepositoryArtifactMetadata::committed("a1"))
            .unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(j.path()).unwrap();
            file.write_all(b"WARC/9.9\r\nbroken\r\n\r\n").unwrap();
        }
        j.append(now, &RepositoryArtifactMetadata::committed("a2"))
            .unwrap();

        let state = j.replay(false).unwrap();
        assert!(state.contains_key("a1"));
        // The entry behind the garbage is unreachable
        assert!(!state.contains_key("a2"));
    }

    #[test]
    fn test_missing_journal_is_empty() {
        let dir = tempdir().unwrap();
        let j = journal(dir.path());
        assert!(j.replay(true).unwrap().is_empty());
    }
}
