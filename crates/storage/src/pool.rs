//! Temporary WARC file pool
//!
//! Uncommitted artifacts land in pooled temp WARCs. The pool lends out a
//! file with enough headroom for a pending write, serializing writers
//! through an in-use set: a temp WARC is never handed to two writers at
//! once, but distinct writers get distinct files in parallel.
//!
//! Selection is best-fit on the trailing filesystem block: among eligible
//! files, pick the one that would leave its last block fullest after the
//! write, minimizing wasted block space.
//!
//! The pool is an explicit per-store registry. Tests constructing several
//! stores get independent pools.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A pooled temp WARC file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcFile {
    /// Location of the file
    pub path: PathBuf,
    /// Current on-disk length in bytes
    pub length: u64,
    /// Whether records in this file are gzip members
    pub compressed: bool,
}

/// Aggregate pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of files in the pool
    pub file_count: usize,
    /// Sum of file lengths
    pub total_bytes: u64,
    /// Sum of blocks allocated at the configured block size
    pub blocks_allocated: u64,
}

#[derive(Default)]
struct PoolState {
    files: HashMap<PathBuf, WarcFile>,
    in_use: HashSet<PathBuf>,
}

/// Pool of partially-filled temp WARC files
pub struct WarcFilePool {
    threshold: u64,
    block_size: u64,
    compressed: bool,
    state: Mutex<PoolState>,
}

impl WarcFilePool {
    /// Create an empty pool
    ///
    /// `threshold` caps how full a temp WARC may grow (0 = unlimited);
    /// `compressed` is the compression mode new files are created with.
    pub fn new(threshold: u64, block_size: u64, compressed: bool) -> Self {
        WarcFilePool {
            threshold,
            block_size,
            compressed,
            state: Mutex::new(PoolState::default()),
        }
    }

    // Bytes used in the last block if the file held `size` bytes, all
    // previous blocks maximally filled.
    fn bytes_used_last_block(&self, size: u64) -> u64 {
        if size == 0 {
            return 0;
        }
        ((size - 1) % self.block_size) + 1
    }

    /// Borrow a temp WARC under `tmp_dir` that can take `bytes_expected`
    /// more bytes, creating a fresh one if none fits
    ///
    /// The returned file is marked in use until [`WarcFilePool::return_warc`].
    pub fn find_warc(&self, tmp_dir: &Path, bytes_expected: u64) -> WarcFile {
        let mut state = self.state.lock();

        let candidate = state
            .files
            .values()
            .filter(|w| !state.in_use.contains(&w.path))
            .filter(|w| w.path.starts_with(tmp_dir))
            .filter(|w| w.compressed == self.compressed)
            .filter(|w| self.threshold == 0 || w.length + bytes_expected <= self.threshold)
            .max_by_key(|w| self.bytes_used_last_block(w.length + bytes_expected))
            .cloned();

        let warc = match candidate {
            Some(w) => w,
            None => {
                let name = format!("{}{}", Uuid::new_v4(), self.extension());
                let warc = WarcFile {
                    path: tmp_dir.join(name),
                    length: 0,
                    compressed: self.compressed,
                };
                debug!(path = %warc.path.display(), "created temp WARC");
                state.files.insert(warc.path.clone(), warc.clone());
                warc
            }
        };

        state.in_use.insert(warc.path.clone());
        warc
    }

    fn extension(&self) -> &'static str {
        if self.compressed {
            crate::paths::WARC_GZ_EXTENSION
        } else {
            crate::paths::WARC_EXTENSION
        }
    }

    /// Return a borrowed file, recording its new length
    pub fn return_warc(&self, warc: WarcFile) {
        let mut state = self.state.lock();
        if !state.files.contains_key(&warc.path) {
            warn!(path = %warc.path.display(), "returned WARC is not a pool member; adding it");
        } else if !state.in_use.contains(&warc.path) {
            warn!(path = %warc.path.display(), "returned WARC was not in use");
        }
        state.in_use.remove(&warc.path);
        state.files.insert(warc.path.clone(), warc);
    }

    /// Register a file discovered on disk (reload path)
    pub fn register(&self, warc: WarcFile) {
        let mut state = self.state.lock();
        state.files.insert(warc.path.clone(), warc);
    }

    /// Whether a file is currently lent to a writer
    pub fn is_in_use(&self, path: &Path) -> bool {
        self.state.lock().in_use.contains(path)
    }

    /// Remove a file from the pool
    ///
    /// Warns (and still removes) when the file is in use; the live writer
    /// is not force-released.
    pub fn remove_warc(&self, path: &Path) -> Option<WarcFile> {
        let mut state = self.state.lock();
        if state.in_use.remove(path) {
            warn!(path = %path.display(), "removing temp WARC that is in use");
        }
        state.files.remove(path)
    }

    /// Remove a file only if it is idle and unchanged since observed
    ///
    /// GC scans a file and then removes it; a writer may borrow, append,
    /// and return the file in between. Checking the recorded length under
    /// the pool lock closes that window.
    pub fn remove_if_idle(&self, path: &Path, expected_length: u64) -> Option<WarcFile> {
        let mut state = self.state.lock();
        if state.in_use.contains(path) {
            return None;
        }
        match state.files.get(path) {
            Some(w) if w.length == expected_length => state.files.remove(path),
            _ => None,
        }
    }

    /// Snapshot of files not currently lent out
    pub fn idle_files(&self) -> Vec<WarcFile> {
        let state = self.state.lock();
        state
            .files
            .values()
            .filter(|w| !state.in_use.contains(&w.path))
            .cloned()
            .collect()
    }

    /// Aggregate statistics at the configured block size
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let total_bytes = state.files.values().map(|w| w.length).sum::<u64>();
        let blocks_allocated = state
            .files
            .values()
            .map(|w| w.length.div_ceil(self.block_size))
            .sum();
        PoolStats {
            file_count: state.files.len(),
            total_bytes,
            blocks_allocated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WarcFilePool {
        // threshold 1000, block size 100
        WarcFilePool::new(1000, 100, false)
    }

    fn seed(pool: &WarcFilePool, tmp: &Path, name: &str, length: u64) -> PathBuf {
        let path = tmp.join(name);
        pool.register(WarcFile {
            path: path.clone(),
            length,
            compressed: false,
        });
        path
    }

    #[test]
    fn test_creates_fresh_file_when_empty() {
        let pool = pool();
        let tmp = Path::new("/data/tmp/warcs");

        let warc = pool.find_warc(tmp, 100);
        assert!(warc.path.starts_with(tmp));
        assert_eq!(warc.length, 0);
        assert!(pool.is_in_use(&warc.path));
        assert!(warc.path.to_string_lossy().ends_with(".warc"));
    }

    #[test]
    fn test_best_fit_prefers_fullest_trailing_block() {
        let pool = pool();
        let tmp = Path::new("/t");
        // After writing 40 more bytes: 150+40 → 90 used in last block;
        // 420+40 → 60; 260+40 → 100 (exact fill, best).
        seed(&pool, tmp, "a.warc", 150);
        seed(&pool, tmp, "b.warc", 420);
        let best = seed(&pool, tmp, "c.warc", 260);

        let warc = pool.find_warc(tmp, 40);
        assert_eq!(warc.path, best);
    }

    #[test]
    fn test_threshold_excludes_full_files() {
        let pool = pool();
        let tmp = Path::new("/t");
        seed(&pool, tmp, "full.warc", 950);

        // 950 + 100 > 1000: must create a new file
        let warc = pool.find_warc(tmp, 100);
        assert_ne!(warc.path, tmp.join("full.warc"));
        assert_eq!(warc.length, 0);
    }

    #[test]
    fn test_in_use_files_not_lent_twice() {
        let pool = pool();
        let tmp = Path::new("/t");
        seed(&pool, tmp, "a.warc", 10);

        let first = pool.find_warc(tmp, 10);
        let second = pool.find_warc(tmp, 10);
        assert_ne!(first.path, second.path);
    }

    #[test]
    fn test_return_updates_length_and_frees() {
        let pool = pool();
        let tmp = Path::new("/t");
        seed(&pool, tmp, "a.warc", 10);

        let mut warc = pool.find_warc(tmp, 10);
        warc.length = 90;
        pool.return_warc(warc.clone());

        assert!(!pool.is_in_use(&warc.path));
        let again = pool.find_warc(tmp, 10);
        assert_eq!(again.path, warc.path);
        assert_eq!(again.length, 90);
    }

    #[test]
    fn test_compression_mode_mismatch_not_lent() {
        let pool = WarcFilePool::new(1000, 100, true);
        let tmp = Path::new("/t");
        // Uncompressed leftover from an earlier configuration
        pool.register(WarcFile {
            path: tmp.join("old.warc"),
            length: 10,
            compressed: false,
        });

        let warc = pool.find_warc(tmp, 10);
        assert_ne!(warc.path, tmp.join("old.warc"));
        assert!(warc.compressed);
        assert!(warc.path.to_string_lossy().ends_with(".warc.gz"));
    }

    #[test]
    fn test_remove_warc() {
        let pool = pool();
        let tmp = Path::new("/t");
        let path = seed(&pool, tmp, "a.warc", 10);

        let removed = pool.remove_warc(&path).unwrap();
        assert_eq!(removed.length, 10);
        assert!(pool.remove_warc(&path).is_none());
    }

    #[test]
    fn test_idle_files_excludes_borrowed() {
        let pool = pool();
        let tmp = Path::new("/t");
        seed(&pool, tmp, "a.warc", 10);
        seed(&pool, tmp, "b.warc", 20);

        let borrowed = pool.find_warc(tmp, 10);
        let idle = pool.idle_files();
        assert_eq!(idle.len(), 1);
        assert_ne!(idle[0].path, borrowed.path);
    }

    #[test]
    fn test_zero_threshold_means_unlimited() {
        let pool = WarcFilePool::new(0, 100, false);
        let tmp = Path::new("/t");
        seed(&pool, tmp, "big.warc", u64::MAX / 2);

        let warc = pool.find_warc(tmp, 1000);
        assert_eq!(warc.path, tmp.join("big.warc"));
    }

    #[test]
    fn test_stats() {
        let pool = pool();
        let tmp = Path::new("/t");
        seed(&pool, tmp, "a.warc", 150);
        seed(&pool, tmp, "b.warc", 300);

        let stats = pool.stats();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 450);
        assert_eq!(stats.blocks_allocated, 2 + 3);
    }
}
