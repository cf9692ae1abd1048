//! Recovery: temp WARC reload and index rebuild
//!
//! On restart the store re-classifies every record found in temp WARCs
//! against the journal and the index:
//!
//! | Journal says            | Classified  | Action                         |
//! |-------------------------|-------------|--------------------------------|
//! | deleted                 | DELETED     | drop from index, GC candidate  |
//! | committed, permanent URL| COPIED      | point index at permanent copy  |
//! | committed, no URL       | COMMITTED   | re-submit the copy task        |
//! | none/uncommitted, fresh | UNCOMMITTED | index as uncommitted           |
//! | none/uncommitted, stale | EXPIRED     | drop from index, GC candidate  |
//!
//! `rebuild_index` goes further for disaster recovery: it streams every
//! permanent WARC (active and sealed) back into the index, replays every
//! AU journal to restore committed/deleted flags, truncates torn active
//! tails, and finishes with the temp reload above.

use crate::journal::RepositoryJournal;
use crate::store::{codec_error, is_gz, sha256_hex, AuKey, StoreInner};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};
use warcstore_core::{
    Artifact, ArtifactIdentifier, ArtifactState, RepositoryArtifactMetadata, Result, StorageUrl,
};
use warcstore_index::ArtifactIndex;
use warcstore_warc::{http, ScannedRecord, WarcError, WarcRecordType, WarcScanner};

/// Counters from one temp WARC reload
#[derive(Debug, Default, Clone, Copy)]
pub struct ReloadStats {
    /// Temp WARC files examined
    pub files_seen: usize,
    /// Artifact records classified
    pub records_seen: usize,
    /// Records expired and dropped from the index
    pub expired: usize,
    /// Interrupted copies re-submitted
    pub copies_resubmitted: usize,
}

/// Lazily loaded per-AU journal state, shared by reload and GC passes
#[derive(Default)]
pub(crate) struct JournalCache {
    entries: HashMap<AuKey, HashMap<String, RepositoryArtifactMetadata>>,
}

impl JournalCache {
    pub(crate) fn new() -> Self {
        JournalCache::default()
    }

    pub(crate) fn au_state(
        &mut self,
        inner: &StoreInner,
        collection: &str,
        auid: &str,
    ) -> &HashMap<String, RepositoryArtifactMetadata> {
        let key = AuKey {
            collection: collection.to_string(),
            auid: auid.to_string(),
        };
        if !self.entries.contains_key(&key) {
            let mut merged = HashMap::new();
            for base in inner.layout.base_paths() {
                let journal =
                    RepositoryJournal::new(inner.layout.journal_path(base, collection, auid));
                match journal.replay(true) {
                    Ok(state) => merged.extend(state),
                    Err(e) => {
                        warn!(
                            journal = %journal.path().display(),
                            error = %e,
                            "journal replay failed"
                        );
                    }
                }
            }
            self.entries.insert(key.clone(), merged);
        }
        self.entries.get(&key).expect("inserted above")
    }
}

/// Classify one temp record against journal and index state
pub(crate) fn classify_record(
    inner: &StoreInner,
    meta: Option<&RepositoryArtifactMetadata>,
    indexed: Option<&Artifact>,
    record_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ArtifactState {
    if meta.is_some_and(|m| m.deleted) {
        return ArtifactState::Deleted;
    }

    let journal_committed = meta.is_some_and(|m| m.committed);
    let permanent_url = meta
        .and_then(|m| m.storage_url.as_deref())
        .and_then(|s| StorageUrl::parse(s).ok())
        .filter(|url| !inner.is_temp_url(url));

    if let Some(ix) = indexed {
        if !inner.is_temp_url(&ix.storage_url) {
            return ArtifactState::Copied;
        }
        if ix.committed || journal_committed {
            return ArtifactState::Committed;
        }
        if inner.is_expired(record_date, now) {
            return ArtifactState::Expired;
        }
        return ArtifactState::Uncommitted;
    }

    if journal_committed {
        if permanent_url.is_some() {
            return ArtifactState::Copied;
        }
        return ArtifactState::Committed;
    }

    if inner.is_expired(record_date, now) {
        ArtifactState::Expired
    } else {
        ArtifactState::NotIndexed
    }
}

// Rebuild a descriptor from a scanned record (payload required: the
// digest is recomputed from the body bytes).
fn descriptor_from_record(
    record: &ScannedRecord,
    identifier: &ArtifactIdentifier,
    committed: bool,
    storage_url: StorageUrl,
) -> std::result::Result<Artifact, WarcError> {
    let payload = record.payload.as_deref().unwrap_or_default();
    let mut cursor = Cursor::new(payload);
    let (_, head_len) = http::parse_head(&mut cursor, record.offset)?;
    let body = &payload[head_len as usize..];

    Ok(Artifact::new(
        identifier,
        committed,
        storage_url,
        body.len() as u64,
        format!("sha256:{}", sha256_hex(body)),
        record.header.date,
    ))
}

fn warc_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Err(_) => return Vec::new(),
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().into_owned());
                name.is_some_and(|n| {
                    n.ends_with(crate::paths::WARC_EXTENSION)
                        || n.ends_with(crate::paths::WARC_GZ_EXTENSION)
                })
            })
            .collect(),
    };
    files.sort();
    files
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Err(_) => Vec::new(),
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
    }
}

impl StoreInner {
    /// Reload every temp WARC, classifying each record (§ module docs)
    pub(crate) fn reload_temp_warcs(
        inner: &Arc<Self>,
        index: &Arc<dyn ArtifactIndex>,
    ) -> Result<ReloadStats> {
        let now = inner.clock.now();
        let mut cache = JournalCache::new();
        let mut stats = ReloadStats::default();

        for base in inner.layout.base_paths() {
            let tmp_dir = inner.layout.tmp_warcs_dir(base);
            for path in warc_files_in(&tmp_dir) {
                stats.files_seen += 1;
                Self::reload_temp_file(inner, index, &mut cache, &path, now, &mut stats)?;

                let length = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                inner.pool.register(crate::pool::WarcFile {
                    path: path.clone(),
                    length,
                    compressed: is_gz(&path),
                });
            }
        }

        Ok(stats)
    }

    fn reload_temp_file(
        inner: &Arc<Self>,
        index: &Arc<dyn ArtifactIndex>,
        cache: &mut JournalCache,
        path: &Path,
        now: DateTime<Utc>,
        stats: &mut ReloadStats,
    ) -> Result<()> {
        let mut scanner = WarcScanner::open(path, is_gz(path))
            .map_err(warcstore_core::RepositoryError::Io)?
            .with_payload(true);

        let mut torn = false;
        for record in &mut scanner {
            let record = match record {
                Ok(r) => r,
                Err(WarcError::Incomplete { offset }) => {
                    warn!(
                        path = %path.display(),
                        offset,
                        "torn tail in temp WARC; truncating unreferenced garbage"
                    );
                    torn = true;
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "temp WARC framing broken; stopping scan");
                    break;
                }
            };
            if record.header.record_type != WarcRecordType::Response {
                continue;
            }

            let (identifier, _) = match record.header.artifact_identity(record.offset) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "temp record lacks identity headers; skipping");
                    continue;
                }
            };
            stats.records_seen += 1;

            let meta = cache
                .au_state(inner, &identifier.collection, &identifier.auid)
                .get(&identifier.id)
                .cloned();
            let indexed = index.artifact(&identifier.id)?;
            let state =
                classify_record(inner, meta.as_ref(), indexed.as_ref(), record.header.date, now);
            debug!(artifact = %identifier.id, state = %state, "classified temp record");

            let temp_url = StorageUrl::file(path, record.offset, record.stored_length);
            match state {
                ArtifactState::Deleted => {
                    if indexed.is_some() {
                        index.delete_artifact(&identifier.id)?;
                    }
                }
                ArtifactState::Expired => {
                    if indexed.is_some() {
                        index.delete_artifact(&identifier.id)?;
                    }
                    stats.expired += 1;
                }
                ArtifactState::Copied => {
                    // Make sure the index points at the permanent copy
                    let permanent = meta
                        .as_ref()
                        .and_then(|m| m.storage_url.as_deref())
                        .and_then(|s| StorageUrl::parse(s).ok());
                    if let Some(permanent) = permanent {
                        match indexed {
                            Some(ix) if inner.is_temp_url(&ix.storage_url) => {
                                index.update_storage_url(&identifier.id, &permanent)?;
                                index.commit_artifact(&identifier.id)?;
                            }
                            Some(_) => {}
                            None => {
                                match descriptor_from_record(&record, &identifier, true, permanent)
                                {
                                    Ok(descriptor) => {
                                        index.index_artifact(descriptor)?;
                                    }
                                    Err(e) => warn!(
                                        path = %path.display(),
                                        error = %e,
                                        "cannot rebuild descriptor for copied artifact"
                                    ),
                                }
                            }
                        }
                    }
                }
                ArtifactState::Committed => {
                    let descriptor = match descriptor_from_record(&record, &identifier, true, temp_url)
                    {
                        Ok(d) => d,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "cannot rebuild committed descriptor");
                            continue;
                        }
                    };
                    let descriptor = index.index_artifact(descriptor)?;
                    stats.copies_resubmitted += 1;
                    // Fire and forget: completion lands in the journal and
                    // the index, same as a live commit.
                    let _ = Self::submit_copy(inner, descriptor)?;
                }
                ArtifactState::Uncommitted | ArtifactState::NotIndexed => {
                    match descriptor_from_record(&record, &identifier, false, temp_url) {
                        Ok(descriptor) => {
                            index.index_artifact(descriptor)?;
                        }
                        Err(e) => warn!(
                            path = %path.display(),
                            error = %e,
                            "cannot rebuild uncommitted descriptor"
                        ),
                    }
                }
            }
        }

        // A torn record was never acknowledged to any caller; cut it off
        // so the file is a clean sequence of whole records again.
        if torn {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(scanner.position())?;
            file.sync_data()?;
        }

        Ok(())
    }

    /// Rebuild an index from permanent WARCs, journals, and temp WARCs
    pub(crate) fn rebuild_index(inner: &Arc<Self>, index: &Arc<dyn ArtifactIndex>) -> Result<()> {
        // 1. Stream every permanent WARC back into the index
        for base in inner.layout.base_paths() {
            for coll_dir in subdirectories(&inner.layout.collections_dir(base)) {
                for au_dir in subdirectories(&coll_dir) {
                    for path in warc_files_in(&au_dir) {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        if !inner.layout.is_artifact_warc_name(&name) {
                            continue;
                        }
                        inner.scan_permanent_warc(index, &path, true)?;
                    }
                }
            }
            for path in warc_files_in(&inner.layout.sealed_dir(base)) {
                inner.scan_permanent_warc(index, &path, false)?;
            }
        }

        // 2. Replay journals: restore committed/deleted flags
        for base in inner.layout.base_paths() {
            for coll_dir in subdirectories(&inner.layout.collections_dir(base)) {
                for au_dir in subdirectories(&coll_dir) {
                    let journal = RepositoryJournal::new(au_dir.join(crate::paths::JOURNAL_FILE));
                    if !journal.exists() {
                        continue;
                    }
                    for (artifact_id, meta) in journal.replay(true)? {
                        if meta.deleted {
                            index.delete_artifact(&artifact_id)?;
                        } else if meta.committed {
                            index.commit_artifact(&artifact_id)?;
                        }
                    }
                }
            }
        }

        // 3. Recover uncommitted artifacts and interrupted copies
        Self::reload_temp_warcs(inner, index)?;
        Ok(())
    }

    // Stream one permanent WARC into the index. Active WARCs may carry a
    // torn tail from a crash mid-append; truncate back to the last good
    // record so the file is appendable again. Sealed WARCs are immutable:
    // report and leave them alone.
    fn scan_permanent_warc(
        &self,
        index: &Arc<dyn ArtifactIndex>,
        path: &Path,
        truncate_torn_tail: bool,
    ) -> Result<()> {
        let mut scanner = WarcScanner::open(path, is_gz(path))
            .map_err(warcstore_core::RepositoryError::Io)?
            .with_payload(true);

        let mut torn = false;
        for record in &mut scanner {
            let record = match record {
                Ok(r) => r,
                Err(WarcError::Incomplete { offset }) => {
                    warn!(path = %path.display(), offset, "torn tail in permanent WARC");
                    torn = true;
                    break;
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "permanent WARC framing broken; scan stopped");
                    break;
                }
            };
            if record.header.record_type != WarcRecordType::Response {
                continue;
            }

            let (identifier, _) = match record.header.artifact_identity(record.offset) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "permanent record lacks identity headers; skipping");
                    continue;
                }
            };

            let url = StorageUrl::file(path, record.offset, record.stored_length);
            match descriptor_from_record(&record, &identifier, true, url) {
                Ok(descriptor) => {
                    if let Err(e) = index.index_artifact(descriptor) {
                        warn!(
                            path = %path.display(),
                            artifact = %identifier.id,
                            error = %e,
                            "could not re-index permanent record"
                        );
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %codec_error(path, e), "undecodable permanent record; skipping");
                }
            }
        }

        if torn && truncate_torn_tail {
            let valid_end = scanner.position();
            warn!(
                path = %path.display(),
                valid_end,
                "truncating active WARC to last good record boundary"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_end)?;
            file.sync_data()?;
        }

        Ok(())
    }
}
