//! Temp WARC garbage collection
//!
//! A background thread periodically scans idle temp WARCs. A file is
//! unlinked only when every artifact record in it is in a terminal state
//! (`COPIED`, `EXPIRED`, `DELETED`); any record still `UNCOMMITTED` or
//! `COMMITTED` keeps the file alive. Expired records are dropped from the
//! index as a side effect of classification.

use crate::recovery::{classify_record, JournalCache};
use crate::store::{is_gz, StoreInner};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use warcstore_core::{ArtifactState, Result};
use warcstore_warc::{WarcError, WarcRecordType, WarcScanner};

/// Counters from one GC pass
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    /// Idle temp WARCs examined
    pub files_examined: usize,
    /// Temp WARCs unlinked
    pub files_removed: usize,
}

/// Background GC thread with graceful shutdown
pub(crate) struct GcWorker {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl GcWorker {
    /// Start the GC loop at the given interval
    pub(crate) fn start(inner: Arc<StoreInner>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = std::thread::Builder::new()
            .name("warcstore-gc".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    // Sleep in slices so shutdown is responsive
                    let slice = Duration::from_millis(100).min(interval);
                    let mut slept = Duration::ZERO;
                    while slept < interval {
                        if flag.load(Ordering::Relaxed) {
                            return;
                        }
                        std::thread::sleep(slice);
                        slept += slice;
                    }

                    let stats = inner.gc_pass();
                    if stats.files_removed > 0 {
                        info!(
                            examined = stats.files_examined,
                            removed = stats.files_removed,
                            "temp WARC GC pass complete"
                        );
                    }
                }
            })
            .expect("failed to spawn GC thread");

        GcWorker {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and join it
    pub(crate) fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl StoreInner {
    /// One GC pass over idle temp WARCs
    pub(crate) fn gc_pass(&self) -> GcStats {
        let mut stats = GcStats::default();
        let index = match self.index() {
            Err(_) => return stats,
            Ok(index) => index,
        };

        let now = self.clock.now();
        let mut cache = JournalCache::new();

        for warc in self.pool.idle_files() {
            stats.files_examined += 1;
            let reclaimable =
                match self.temp_file_reclaimable(&index, &mut cache, &warc.path, now) {
                    Ok(reclaimable) => reclaimable,
                    Err(e) => {
                        debug!(path = %warc.path.display(), error = %e, "GC scan failed; keeping file");
                        false
                    }
                };
            if !reclaimable {
                continue;
            }

            // Remove from the pool only if nothing borrowed or grew the
            // file since the scan, then unlink.
            if self
                .pool
                .remove_if_idle(&warc.path, warc.length)
                .is_none()
            {
                continue;
            }
            match std::fs::remove_file(&warc.path) {
                Ok(()) => {
                    info!(path = %warc.path.display(), "reclaimed temp WARC");
                    stats.files_removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    stats.files_removed += 1;
                }
                Err(e) => {
                    warn!(path = %warc.path.display(), error = %e, "could not unlink temp WARC");
                    self.pool.register(warc);
                }
            }
        }

        let pool = self.pool.stats();
        debug!(
            files = pool.file_count,
            bytes = pool.total_bytes,
            blocks = pool.blocks_allocated,
            "temp pool state after GC pass"
        );
        stats
    }

    // A temp WARC is reclaimable when every artifact record in it is in a
    // terminal state. A torn tail is unreferenced garbage and does not
    // block reclamation; unreadable framing does.
    fn temp_file_reclaimable(
        &self,
        index: &Arc<dyn warcstore_index::ArtifactIndex>,
        cache: &mut JournalCache,
        path: &std::path::Path,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let scanner = match WarcScanner::open(path, is_gz(path)) {
            Ok(scanner) => scanner,
            // A pool entry whose file is gone is just a stale entry
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        for record in scanner {
            let record = match record {
                Ok(r) => r,
                Err(WarcError::Incomplete { .. }) => break,
                Err(_) => return Ok(false),
            };
            if record.header.record_type != WarcRecordType::Response {
                continue;
            }

            let (identifier, _) = match record.header.artifact_identity(record.offset) {
                Ok(identity) => identity,
                Err(_) => return Ok(false),
            };

            let meta = cache
                .au_state(self, &identifier.collection, &identifier.auid)
                .get(&identifier.id)
                .cloned();
            let indexed = index.artifact(&identifier.id)?;
            let state =
                classify_record(self, meta.as_ref(), indexed.as_ref(), record.header.date, now);

            if state == ArtifactState::Expired && indexed.is_some() {
                index.delete_artifact(&identifier.id)?;
            }
            if !state.is_reclaimable() {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
