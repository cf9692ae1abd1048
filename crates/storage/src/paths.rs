//! Storage paths and naming
//!
//! Canonical layout beneath each configured base path:
//!
//! ```text
//! <base>/tmp/warcs/<uuid>.warc[.gz]                                  # temp WARCs
//! <base>/collections/<coll>/au-<md5(auid)>/artifacts_<ts>.warc[.gz]  # active WARC
//! <base>/collections/<coll>/au-<md5(auid)>/lockss-repo.warc          # journal
//! <base>/sealed/<coll>_au-<md5(auid)>_<ts>artifacts.warc[.gz]        # sealed WARCs
//! ```
//!
//! `<ts>` is `yyyyMMddHHmmssSSS` in UTC. The AU directory name is the
//! lowercase hex MD5 of the AUID, keeping opaque (and possibly very long)
//! AUIDs out of the filesystem namespace.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};

/// Temp WARC directory, relative to a base path
pub const TMP_WARCS_DIR: &str = "tmp/warcs";

/// Collections directory, relative to a base path
pub const COLLECTIONS_DIR: &str = "collections";

/// Sealed WARC directory, relative to a base path
pub const SEALED_DIR: &str = "sealed";

/// Per-AU repository metadata journal file name
pub const JOURNAL_FILE: &str = "lockss-repo.warc";

/// Extension for uncompressed WARC files
pub const WARC_EXTENSION: &str = ".warc";

/// Extension for per-record-gzipped WARC files
pub const WARC_GZ_EXTENSION: &str = ".warc.gz";

/// Lowercase hex MD5 of an AUID
pub fn au_hash(auid: &str) -> String {
    let digest = Md5::digest(auid.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// File timestamp `yyyyMMddHHmmssSSS` in UTC
pub fn file_timestamp(when: DateTime<Utc>) -> String {
    when.format("%Y%m%d%H%M%S%3f").to_string()
}

/// Path layout over the store's base paths
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_paths: Vec<PathBuf>,
    compressed: bool,
}

impl StorageLayout {
    /// Layout over the given base paths
    pub fn new(base_paths: Vec<PathBuf>, compressed: bool) -> Self {
        StorageLayout {
            base_paths,
            compressed,
        }
    }

    /// The configured base paths, in write preference order
    pub fn base_paths(&self) -> &[PathBuf] {
        &self.base_paths
    }

    /// Extension for newly created WARCs
    pub fn warc_extension(&self) -> &'static str {
        if self.compressed {
            WARC_GZ_EXTENSION
        } else {
            WARC_EXTENSION
        }
    }

    /// Temp WARC directory under a base path
    pub fn tmp_warcs_dir(&self, base: &Path) -> PathBuf {
        base.join(TMP_WARCS_DIR)
    }

    /// Collections directory under a base path
    pub fn collections_dir(&self, base: &Path) -> PathBuf {
        base.join(COLLECTIONS_DIR)
    }

    /// AU directory under a base path
    pub fn au_dir(&self, base: &Path, collection: &str, auid: &str) -> PathBuf {
        self.collections_dir(base)
            .join(collection)
            .join(format!("au-{}", au_hash(auid)))
    }

    /// Journal path for an AU under a base path
    pub fn journal_path(&self, base: &Path, collection: &str, auid: &str) -> PathBuf {
        self.au_dir(base, collection, auid).join(JOURNAL_FILE)
    }

    /// Sealed WARC directory under a base path
    pub fn sealed_dir(&self, base: &Path) -> PathBuf {
        base.join(SEALED_DIR)
    }

    /// Active WARC path for an AU, stamped with the given instant
    pub fn active_warc_path(
        &self,
        base: &Path,
        collection: &str,
        auid: &str,
        when: DateTime<Utc>,
    ) -> PathBuf {
        self.au_dir(base, collection, auid).join(format!(
            "artifacts_{}{}",
            file_timestamp(when),
            self.warc_extension()
        ))
    }

    /// Sealed WARC path for an AU, stamped with the given instant
    pub fn sealed_warc_path(
        &self,
        base: &Path,
        collection: &str,
        auid: &str,
        when: DateTime<Utc>,
    ) -> PathBuf {
        self.sealed_dir(base).join(format!(
            "{}_au-{}_{}artifacts{}",
            collection,
            au_hash(auid),
            file_timestamp(when),
            self.warc_extension()
        ))
    }

    /// Whether a path lies under any base's temp WARC directory
    pub fn is_tmp_path(&self, path: &Path) -> bool {
        self.base_paths
            .iter()
            .any(|base| path.starts_with(self.tmp_warcs_dir(base)))
    }

    /// Whether a file name marks an active (or once-active) artifact WARC
    pub fn is_artifact_warc_name(&self, name: &str) -> bool {
        name.starts_with("artifacts_")
            && (name.ends_with(WARC_EXTENSION) || name.ends_with(WARC_GZ_EXTENSION))
    }

    /// Create the directory scaffolding under every base path
    pub fn create_scaffolding(&self) -> std::io::Result<()> {
        for base in &self.base_paths {
            std::fs::create_dir_all(self.tmp_warcs_dir(base))?;
            std::fs::create_dir_all(self.collections_dir(base))?;
            std::fs::create_dir_all(self.sealed_dir(base))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn layout() -> StorageLayout {
        StorageLayout::new(vec![PathBuf::from("/data")], false)
    }

    #[test]
    fn test_au_hash_is_lowercase_md5() {
        // md5("auid:test") is stable
        assert_eq!(au_hash("auid:test"), "5adc6d97c13e9239990adbe072c82551");
        assert_eq!(au_hash("auid:test").len(), 32);
    }

    #[test]
    fn test_file_timestamp_format() {
        let when = Utc.with_ymd_and_hms(2023, 6, 1, 8, 9, 10).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(file_timestamp(when), "20230601080910042");
    }

    #[test]
    fn test_layout_paths() {
        let l = layout();
        let base = Path::new("/data");
        assert_eq!(l.tmp_warcs_dir(base), PathBuf::from("/data/tmp/warcs"));

        let au = l.au_dir(base, "c1", "auid:test");
        assert_eq!(
            au,
            PathBuf::from("/data/collections/c1/au-5adc6d97c13e9239990adbe072c82551")
        );
        assert_eq!(l.journal_path(base, "c1", "auid:test"), au.join("lockss-repo.warc"));
    }

    #[test]
    fn test_warc_names() {
        let l = layout();
        let base = Path::new("/data");
        let when = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();

        let active = l.active_warc_path(base, "c1", "a1", when);
        assert!(active
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("artifacts_20230601000000000"));
        assert!(active.to_string_lossy().ends_with(".warc"));

        let sealed = l.sealed_warc_path(base, "c1", "a1", when);
        let name = sealed.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("c1_au-"));
        assert!(name.ends_with("artifacts.warc"));
        assert!(sealed.starts_with("/data/sealed"));
    }

    #[test]
    fn test_compressed_extension() {
        let l = StorageLayout::new(vec![PathBuf::from("/data")], true);
        assert_eq!(l.warc_extension(), ".warc.gz");
        let when = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        assert!(l
            .active_warc_path(Path::new("/data"), "c", "a", when)
            .to_string_lossy()
            .ends_with(".warc.gz"));
    }

    #[test]
    fn test_is_tmp_path() {
        let l = layout();
        assert!(l.is_tmp_path(Path::new("/data/tmp/warcs/x.warc")));
        assert!(!l.is_tmp_path(Path::new("/data/collections/c1/au-ff/a.warc")));
        assert!(!l.is_tmp_path(Path::new("/elsewhere/tmp/warcs/x.warc")));
    }

    #[test]
    fn test_scaffolding_created() {
        let dir = tempfile::tempdir().unwrap();
        let l = StorageLayout::new(vec![dir.path().to_path_buf()], false);
        l.create_scaffolding().unwrap();
        assert!(l.tmp_warcs_dir(dir.path()).is_dir());
        assert!(l.collections_dir(dir.path()).is_dir());
        assert!(l.sealed_dir(dir.path()).is_dir());
    }
}
