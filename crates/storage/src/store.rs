//! The WARC artifact data store
//!
//! Writes land in pooled temp WARCs; commit journals the state change and
//! hands the record to the copy pool, which appends it to the AU's active
//! permanent WARC (sealing on threshold), confirms the new location in the
//! journal, and updates the index. Reads open the storage URL at the
//! recorded offset and parse a single record.
//!
//! Concurrency: the temp pool serializes writers per temp file, each AU
//! has a writer lock for its active WARC and another for its journal, and
//! readers open files independently at recorded offsets.

use crate::commit::CommitFuture;
use crate::config::StoreConfig;
use crate::gc::{GcStats, GcWorker};
use crate::journal::RepositoryJournal;
use crate::paths::{StorageLayout, WARC_GZ_EXTENSION};
use crate::pool::{WarcFile, WarcFilePool};
use crate::scheduler::CopyScheduler;
use crate::{ArtifactDataStore, StorageInfo};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warcstore_core::storage_url::FILE_SCHEME;
use warcstore_core::{
    Artifact, ArtifactData, Clock, Payload, RepositoryArtifactMetadata, RepositoryError, Result,
    StorageUrl, SystemClock,
};
use warcstore_index::ArtifactIndex;
use warcstore_warc::headers::CONTENT_TYPE_WARC_FIELDS;
use warcstore_warc::{
    fields, http, open_record_at, read_record_header, write_record, write_record_gz, WarcError,
    WarcRecordHeader, WarcRecordType,
};

/// Headroom added to a record's payload when sizing a temp WARC request
pub(crate) const ESTIMATED_RECORD_OVERHEAD: u64 = 1024;

/// Lowercase hex SHA-256 of a byte slice
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Map a codec error onto the repository error model, with file context
pub(crate) fn codec_error(path: &Path, e: WarcError) -> RepositoryError {
    match e {
        WarcError::Io(e) => RepositoryError::Io(e),
        WarcError::Malformed { offset, reason } => {
            RepositoryError::malformed_record(format!("{}:{offset}", path.display()), reason)
        }
        WarcError::Incomplete { offset } => RepositoryError::malformed_record(
            format!("{}:{offset}", path.display()),
            "record cut short",
        ),
    }
}

pub(crate) fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(WARC_GZ_EXTENSION)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct AuKey {
    pub collection: String,
    pub auid: String,
}

#[derive(Default)]
pub(crate) struct ActiveWarc {
    pub path: Option<PathBuf>,
    pub length: u64,
    pub artifact_count: u64,
}

/// Per-AU mutable state: the active WARC writer lock and the journal lock
pub(crate) struct AuHandles {
    pub collection: String,
    pub auid: String,
    pub base: PathBuf,
    pub active: Mutex<ActiveWarc>,
    pub journal: Mutex<RepositoryJournal>,
}

/// Store state shared with copy workers and the GC thread
pub(crate) struct StoreInner {
    pub config: StoreConfig,
    pub layout: StorageLayout,
    pub clock: Arc<dyn Clock>,
    pub pool: WarcFilePool,
    pub index: RwLock<Option<Arc<dyn ArtifactIndex>>>,
    pub aus: DashMap<AuKey, Arc<AuHandles>>,
    pub scheduler: CopyScheduler,
    pub pending_copies: Mutex<HashSet<String>>,
    pub ready: AtomicBool,
}

/// WARC-backed artifact data store over local filesystem base paths
pub struct WarcDataStore {
    inner: Arc<StoreInner>,
    gc: Mutex<Option<GcWorker>>,
}

impl WarcDataStore {
    /// Create a store with the system clock
    pub fn new(config: StoreConfig) -> Result<Self> {
        WarcDataStore::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a store with an injected clock (tests drive expiration)
    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RepositoryError::invalid_argument(e.to_string()))?;

        let layout = StorageLayout::new(config.base_paths.clone(), config.use_warc_compression);
        let pool = WarcFilePool::new(
            config.threshold_warc_size,
            config.block_size,
            config.use_warc_compression,
        );
        let scheduler = CopyScheduler::new(config.commit_worker_count, config.commit_queue_depth);

        Ok(WarcDataStore {
            inner: Arc::new(StoreInner {
                layout,
                pool,
                scheduler,
                clock,
                config,
                index: RwLock::new(None),
                aus: DashMap::new(),
                pending_copies: Mutex::new(HashSet::new()),
                ready: AtomicBool::new(false),
            }),
            gc: Mutex::new(None),
        })
    }

    /// Block until all queued commit copies have completed
    ///
    /// Test and shutdown aid; does not stop the workers.
    pub fn drain_commits(&self) {
        self.inner.scheduler.drain();
    }
}

impl ArtifactDataStore for WarcDataStore {
    fn set_artifact_index(&self, index: Arc<dyn ArtifactIndex>) {
        *self.inner.index.write() = Some(index);
    }

    fn init(&self) -> Result<()> {
        let index = self.inner.index()?;
        self.inner.layout.create_scaffolding()?;
        let stats = StoreInner::reload_temp_warcs(&self.inner, &index)?;
        info!(
            reloaded = stats.records_seen,
            expired = stats.expired,
            resubmitted = stats.copies_resubmitted,
            "temporary WARC reload complete"
        );

        let mut gc = self.gc.lock();
        if gc.is_none() {
            *gc = Some(GcWorker::start(
                Arc::clone(&self.inner),
                self.inner.config.gc_interval,
            ));
        }
        self.inner.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    fn add_artifact(&self, data: ArtifactData) -> Result<Artifact> {
        self.inner.add_artifact(data)
    }

    fn artifact_data(&self, artifact: &Artifact) -> Result<ArtifactData> {
        self.inner.artifact_data(artifact)
    }

    fn commit_artifact(&self, artifact: &Artifact) -> Result<CommitFuture> {
        StoreInner::commit_artifact(&self.inner, artifact)
    }

    fn delete_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.inner.delete_artifact(artifact)
    }

    fn seal_active_warc(&self, collection: &str, auid: &str) -> Result<()> {
        self.inner.seal_active_warc(collection, auid)
    }

    fn rebuild_index(&self, index: &Arc<dyn ArtifactIndex>) -> Result<()> {
        StoreInner::rebuild_index(&self.inner, index)
    }

    fn gc_temp_warcs(&self) -> GcStats {
        self.inner.gc_pass()
    }

    fn storage_info(&self) -> Result<StorageInfo> {
        self.inner.storage_info()
    }

    fn shutdown(&self) {
        if let Some(worker) = self.gc.lock().take() {
            worker.shutdown();
        }
        self.inner.scheduler.shutdown();
        self.inner.ready.store(false, Ordering::Release);
    }
}

impl Drop for WarcDataStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl StoreInner {
    pub(crate) fn index(&self) -> Result<Arc<dyn ArtifactIndex>> {
        self.index
            .read()
            .clone()
            .ok_or_else(|| RepositoryError::illegal_state("no artifact index attached"))
    }

    pub(crate) fn is_temp_url(&self, url: &StorageUrl) -> bool {
        self.layout.is_tmp_path(&url.file_path())
    }

    // First base path with room for the write; unknown capacity counts as
    // room so a bare test filesystem never blocks writes.
    fn base_for_write(&self, bytes_expected: u64) -> PathBuf {
        for base in self.layout.base_paths() {
            match fs4::available_space(base) {
                Ok(available) if available < bytes_expected => continue,
                _ => return base.clone(),
            }
        }
        self.layout.base_paths()[0].clone()
    }

    pub(crate) fn au_handles(&self, collection: &str, auid: &str) -> Arc<AuHandles> {
        let key = AuKey {
            collection: collection.to_string(),
            auid: auid.to_string(),
        };
        if let Some(handles) = self.aus.get(&key) {
            return Arc::clone(&handles);
        }

        // An AU lives on the base path that already holds its directory;
        // new AUs go to the first base.
        let base = self
            .layout
            .base_paths()
            .iter()
            .find(|b| self.layout.au_dir(b, collection, auid).is_dir())
            .cloned()
            .unwrap_or_else(|| self.layout.base_paths()[0].clone());

        let active = self.resume_active(&self.layout.au_dir(&base, collection, auid));
        let journal =
            RepositoryJournal::new(self.layout.journal_path(&base, collection, auid));

        let handles = Arc::new(AuHandles {
            collection: collection.to_string(),
            auid: auid.to_string(),
            base,
            active: Mutex::new(active),
            journal: Mutex::new(journal),
        });
        Arc::clone(&self.aus.entry(key).or_insert(handles))
    }

    // Adopt the newest artifact WARC in the AU directory as the active
    // file, truncating a torn tail before any further append.
    fn resume_active(&self, au_dir: &Path) -> ActiveWarc {
        let entries = match std::fs::read_dir(au_dir) {
            Err(_) => return ActiveWarc::default(),
            Ok(entries) => entries,
        };

        let newest = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| {
                        let name = n.to_string_lossy();
                        self.layout.is_artifact_warc_name(&name)
                            && name.ends_with(self.layout.warc_extension())
                    })
                    .unwrap_or(false)
            })
            .max();
        let path = match newest {
            None => return ActiveWarc::default(),
            Some(p) => p,
        };

        let mut artifact_count = 0u64;
        let mut scanner = match warcstore_warc::WarcScanner::open(&path, is_gz(&path)) {
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot reopen active WARC");
                return ActiveWarc::default();
            }
            Ok(s) => s,
        };
        let mut torn = false;
        for record in &mut scanner {
            match record {
                Ok(r) if r.header.record_type == WarcRecordType::Response => artifact_count += 1,
                Ok(_) => {}
                Err(WarcError::Incomplete { offset }) => {
                    warn!(
                        path = %path.display(),
                        offset,
                        valid_end = scanner.position(),
                        "truncating torn tail of active WARC"
                    );
                    torn = true;
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "active WARC framing broken; starting a new one");
                    return ActiveWarc::default();
                }
            }
        }

        let length = scanner.position();
        if torn {
            if let Err(e) = OpenOptions::new()
                .write(true)
                .open(&path)
                .and_then(|f| f.set_len(length))
            {
                warn!(path = %path.display(), error = %e, "failed to truncate active WARC; starting a new one");
                return ActiveWarc::default();
            }
        }

        ActiveWarc {
            path: Some(path),
            length,
            artifact_count,
        }
    }

    pub(crate) fn add_artifact(&self, data: ArtifactData) -> Result<Artifact> {
        let identifier = data.identifier().clone();
        identifier.validate()?;

        // Stream the payload once, deriving length and digest. The record
        // head needs Content-Length up front, so the body is buffered.
        let mut body = Vec::new();
        data.payload().consume()?.read_to_end(&mut body)?;
        let body_len = body.len() as u64;
        let digest = format!("sha256:{}", sha256_hex(&body));

        let head = http::head_bytes(data.response());
        let record_len = head.len() as u64 + body_len;
        let header = WarcRecordHeader::for_artifact(
            &identifier,
            data.collection_date(),
            record_len,
            body_len,
        );

        let bytes_expected = record_len + ESTIMATED_RECORD_OVERHEAD;
        let base = self.base_for_write(bytes_expected);
        let tmp_dir = self.layout.tmp_warcs_dir(&base);

        let mut warc = self.pool.find_warc(&tmp_dir, bytes_expected);
        let appended = self.append_record_to_temp(&mut warc, &header, &head, &body);
        let path = warc.path.clone();
        self.pool.return_warc(warc);
        let (offset, stored_len) = appended?;

        let url = StorageUrl::file(&path, offset, stored_len);
        let artifact = Artifact::new(
            &identifier,
            false,
            url,
            body_len,
            digest,
            data.collection_date(),
        );
        debug!(artifact = %artifact.id, uri = %artifact.uri, "wrote artifact to temp WARC");
        Ok(artifact)
    }

    fn append_record_to_temp(
        &self,
        warc: &mut WarcFile,
        header: &WarcRecordHeader,
        head: &[u8],
        body: &[u8],
    ) -> Result<(u64, u64)> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&warc.path)?;

        // The file is the source of truth for the write offset; pool
        // bookkeeping catches up below.
        let mut offset = file.metadata()?.len();
        if offset == 0 {
            offset = self.write_warcinfo(&mut file, warc.compressed)?;
        }

        let compressed = warc.compressed;
        let mut payload = Cursor::new(head).chain(Cursor::new(body));
        let mut write = |file: &mut File| -> Result<u64> {
            let stored = if compressed {
                write_record_gz(file, header, &mut payload)?
            } else {
                write_record(file, header, &mut payload)?
            };
            file.flush()?;
            Ok(stored)
        };

        match write(&mut file) {
            Ok(stored) => {
                warc.length = offset + stored;
                Ok((offset, stored))
            }
            Err(e) => {
                // Drop the partial record so the file stays a sequence of
                // whole records; if even that fails the tail is garbage
                // until the next reload truncates it.
                if let Err(trunc) = file.set_len(offset) {
                    warn!(
                        path = %warc.path.display(),
                        error = %trunc,
                        "could not truncate partial record after failed write"
                    );
                }
                warc.length = file.metadata().map(|m| m.len()).unwrap_or(offset);
                Err(e)
            }
        }
    }

    fn write_warcinfo(&self, file: &mut File, compressed: bool) -> Result<u64> {
        let now = self.clock.now();
        let info = fields::encode(&[
            (
                "software".to_string(),
                concat!("warcstore/", env!("CARGO_PKG_VERSION")).to_string(),
            ),
            ("format".to_string(), "WARC File Format 1.0".to_string()),
            ("created".to_string(), now.to_rfc3339()),
        ]);
        let header = WarcRecordHeader::new(
            WarcRecordType::Warcinfo,
            now,
            CONTENT_TYPE_WARC_FIELDS,
            info.len() as u64,
        );
        let written = if compressed {
            write_record_gz(file, &header, &mut Cursor::new(info))?
        } else {
            write_record(file, &header, &mut Cursor::new(info))?
        };
        Ok(written)
    }

    pub(crate) fn artifact_data(&self, artifact: &Artifact) -> Result<ArtifactData> {
        let url = &artifact.storage_url;
        if url.scheme != FILE_SCHEME {
            return Err(RepositoryError::invalid_argument(format!(
                "unsupported storage URL scheme: {url}"
            )));
        }
        let (offset, length) = match (url.offset, url.length) {
            (Some(o), Some(l)) => (o, l),
            _ => {
                return Err(RepositoryError::invalid_argument(format!(
                    "storage URL has no offset/length: {url}"
                )))
            }
        };

        let path = url.file_path();
        let mut reader =
            open_record_at(&path, offset, length, is_gz(&path)).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::UnexpectedEof => {
                    RepositoryError::not_found(format!("storage URL does not resolve: {url}"))
                }
                _ => RepositoryError::Io(e),
            })?;

        let header = read_record_header(&mut reader, offset)
            .map_err(|e| codec_error(&path, e))?
            .ok_or_else(|| RepositoryError::not_found(format!("no record at {url}")))?;
        if header.record_type != WarcRecordType::Response {
            return Err(RepositoryError::not_found(format!(
                "record at {url} is not an artifact"
            )));
        }
        let (identifier, _) = header
            .artifact_identity(offset)
            .map_err(|e| codec_error(&path, e))?;
        if identifier.id != artifact.id {
            return Err(RepositoryError::not_found(format!(
                "record at {url} belongs to a different artifact"
            )));
        }

        let (response, head_len) =
            http::parse_head(&mut reader, offset).map_err(|e| codec_error(&path, e))?;
        let body_len = header.content_length.saturating_sub(head_len);

        // The payload token owns the open (bounded) file handle; the body
        // is read lazily and at most once.
        let payload = Payload::from_reader(Box::new(reader.take(body_len)));

        let mut data =
            ArtifactData::with_identifier(identifier, response, payload, header.date);
        data.set_content(body_len, artifact.content_digest.clone());
        data.set_storage_url(url.clone());
        Ok(data)
    }

    pub(crate) fn commit_artifact(inner: &Arc<Self>, artifact: &Artifact) -> Result<CommitFuture> {
        let index = inner.index()?;

        let current = match index.artifact(&artifact.id)? {
            None => {
                // Deletion wins over commit
                debug!(artifact = %artifact.id, "commit of deleted artifact is a no-op");
                return Ok(CommitFuture::resolved(Ok(None)));
            }
            Some(current) => current,
        };

        if current.committed && !inner.is_temp_url(&current.storage_url) {
            return Ok(CommitFuture::resolved(Ok(Some(current))));
        }

        let handles = inner.au_handles(&artifact.collection, &artifact.auid);
        handles.journal.lock().append(
            inner.clock.now(),
            &RepositoryArtifactMetadata::committed(&artifact.id),
        )?;

        Self::submit_copy(inner, current)
    }

    /// Queue the temp→permanent copy for an artifact
    ///
    /// Used by commit and by reload when re-driving interrupted copies. A
    /// copy already in flight resolves immediately with the current
    /// descriptor (commit is idempotent).
    pub(crate) fn submit_copy(inner: &Arc<Self>, artifact: Artifact) -> Result<CommitFuture> {
        {
            let mut pending = inner.pending_copies.lock();
            if !pending.insert(artifact.id.clone()) {
                return Ok(CommitFuture::resolved(Ok(Some(artifact))));
            }
        }

        let id = artifact.id.clone();
        let (future, promise) = CommitFuture::pending();
        let task_inner = Arc::clone(inner);
        let submitted = inner.scheduler.submit(move || {
            let id = artifact.id.clone();
            let result = task_inner.move_to_permanent(&artifact);
            task_inner.pending_copies.lock().remove(&id);
            match result {
                Ok(updated) => promise.complete(Ok(Some(updated))),
                Err(e) => {
                    warn!(
                        artifact = %id,
                        error = %e,
                        "commit copy failed; reload will re-drive it"
                    );
                    promise.complete(Err(e.to_string()));
                }
            }
        });

        if submitted.is_err() {
            inner.pending_copies.lock().remove(&id);
            return Err(RepositoryError::Io(io::Error::other(
                "commit copy queue is full",
            )));
        }
        Ok(future)
    }

    /// Copy a record from its temp WARC into the AU's active WARC
    ///
    /// Appends the stored bytes verbatim under the AU writer lock (the
    /// compression mode is a store-wide invariant, so the framing carries
    /// over), fsyncs, confirms the new location in the journal, and points
    /// the index at it.
    pub(crate) fn move_to_permanent(&self, artifact: &Artifact) -> Result<Artifact> {
        let src = &artifact.storage_url;
        if !self.is_temp_url(src) {
            return Ok(artifact.clone());
        }
        let (offset, length) = src.offset.zip(src.length).ok_or_else(|| {
            RepositoryError::invalid_argument(format!("storage URL has no offset/length: {src}"))
        })?;

        let mut raw = vec![0u8; length as usize];
        {
            let mut file = File::open(src.file_path())?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut raw)?;
        }

        let handles = self.au_handles(&artifact.collection, &artifact.auid);
        let (dest_path, dest_offset) = {
            let mut active = handles.active.lock();
            self.ensure_active(&handles, &mut active)?;

            let threshold = self.config.threshold_warc_size;
            if threshold > 0
                && active.artifact_count > 0
                && active.length + length > threshold
            {
                self.seal_locked(&handles, &mut active)?;
                self.ensure_active(&handles, &mut active)?;
            }

            let path = active.path.clone().expect("active WARC ensured above");
            let mut file = OpenOptions::new().append(true).open(&path)?;
            file.write_all(&raw)?;
            file.sync_data()?;

            let dest_offset = active.length;
            active.length += length;
            active.artifact_count += 1;
            (path, dest_offset)
        };

        let new_url = StorageUrl::file(&dest_path, dest_offset, length);
        handles.journal.lock().append(
            self.clock.now(),
            &RepositoryArtifactMetadata::committed(&artifact.id)
                .with_storage_url(new_url.to_string()),
        )?;

        let updated = match self
            .index()
            .and_then(|index| index.update_storage_url(&artifact.id, &new_url))
        {
            Ok(updated) => updated,
            Err(e) => {
                // The journal and WARCs are authoritative; a rebuild
                // recovers the index.
                warn!(artifact = %artifact.id, error = %e, "index storage-url update failed");
                let mut updated = artifact.clone();
                updated.committed = true;
                updated.storage_url = new_url.clone();
                updated
            }
        };

        info!(
            artifact = %artifact.id,
            to = %new_url,
            "moved artifact to permanent storage"
        );
        Ok(updated)
    }

    fn ensure_active(&self, handles: &AuHandles, active: &mut ActiveWarc) -> Result<()> {
        if active.path.is_some() {
            return Ok(());
        }

        let au_dir = self
            .layout
            .au_dir(&handles.base, &handles.collection, &handles.auid);
        std::fs::create_dir_all(&au_dir)?;

        let mut when = self.clock.now();
        let path = loop {
            let candidate = self.layout.active_warc_path(
                &handles.base,
                &handles.collection,
                &handles.auid,
                when,
            );
            if !candidate.exists() {
                break candidate;
            }
            when += ChronoDuration::milliseconds(1);
        };

        let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
        let length = self.write_warcinfo(&mut file, self.config.use_warc_compression)?;
        file.sync_data()?;

        debug!(path = %path.display(), "opened new active WARC");
        *active = ActiveWarc {
            path: Some(path),
            length,
            artifact_count: 0,
        };
        Ok(())
    }

    fn seal_locked(&self, handles: &AuHandles, active: &mut ActiveWarc) -> Result<()> {
        let src = match &active.path {
            None => return Ok(()),
            Some(path) => path.clone(),
        };

        let sealed_dir = self.layout.sealed_dir(&handles.base);
        std::fs::create_dir_all(&sealed_dir)?;

        let mut when = self.clock.now();
        let target = loop {
            let candidate = self.layout.sealed_warc_path(
                &handles.base,
                &handles.collection,
                &handles.auid,
                when,
            );
            if !candidate.exists() {
                break candidate;
            }
            when += ChronoDuration::milliseconds(1);
        };

        std::fs::rename(&src, &target)?;
        info!(from = %src.display(), to = %target.display(), "sealed active WARC");
        *active = ActiveWarc::default();

        // The rename moved every record; re-point the index and confirm
        // the new locations in the journal (offsets are unchanged).
        self.repoint_sealed_records(handles, &target);
        Ok(())
    }

    fn repoint_sealed_records(&self, handles: &AuHandles, sealed: &Path) {
        let index = match self.index() {
            Err(_) => return,
            Ok(index) => index,
        };
        let scanner = match warcstore_warc::WarcScanner::open(sealed, is_gz(sealed)) {
            Err(e) => {
                warn!(path = %sealed.display(), error = %e, "cannot rescan sealed WARC");
                return;
            }
            Ok(scanner) => scanner,
        };

        for record in scanner {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %sealed.display(), error = %e, "sealed WARC rescan stopped");
                    break;
                }
            };
            if record.header.record_type != WarcRecordType::Response {
                continue;
            }
            let identifier = match record.header.artifact_identity(record.offset) {
                Ok((identifier, _)) => identifier,
                Err(_) => continue,
            };

            let url = StorageUrl::file(sealed, record.offset, record.stored_length);
            match index.update_storage_url(&identifier.id, &url) {
                Ok(_) => {
                    // Deleted artifacts are absent from the index and get
                    // no confirmation; a committed=true entry would undo
                    // their tombstone on replay.
                    if let Err(e) = handles.journal.lock().append(
                        self.clock.now(),
                        &RepositoryArtifactMetadata::committed(&identifier.id)
                            .with_storage_url(url.to_string()),
                    ) {
                        warn!(artifact = %identifier.id, error = %e, "journal confirmation failed after seal");
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(artifact = %identifier.id, error = %e, "index update failed after seal");
                }
            }
        }
    }

    pub(crate) fn seal_active_warc(&self, collection: &str, auid: &str) -> Result<()> {
        let handles = self.au_handles(collection, auid);
        let mut active = handles.active.lock();
        if active.path.is_none() || active.artifact_count == 0 {
            return Ok(());
        }
        self.seal_locked(&handles, &mut active)
    }

    pub(crate) fn delete_artifact(&self, artifact: &Artifact) -> Result<()> {
        let handles = self.au_handles(&artifact.collection, &artifact.auid);
        handles.journal.lock().append(
            self.clock.now(),
            &RepositoryArtifactMetadata::deleted(&artifact.id),
        )?;
        debug!(artifact = %artifact.id, "journaled artifact deletion");
        Ok(())
    }

    pub(crate) fn storage_info(&self) -> Result<StorageInfo> {
        let mut total = 0u64;
        let mut available = 0u64;
        for base in self.layout.base_paths() {
            total += fs4::total_space(base)?;
            available += fs4::available_space(base)?;
        }
        let used = total.saturating_sub(available);
        let percent_used = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Ok(StorageInfo {
            total,
            used,
            available,
            percent_used,
        })
    }

    /// Age of a record against the uncommitted-artifact TTL
    pub(crate) fn is_expired(&self, record_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match ChronoDuration::from_std(self.config.uncommitted_expiration) {
            Ok(ttl) => now - record_date >= ttl,
            Err(_) => false,
        }
    }
}
