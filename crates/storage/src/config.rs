//! Data store configuration
//!
//! Controls storage placement, sealing thresholds, temp artifact
//! expiration, compression, and background work sizing.

use std::path::PathBuf;
use std::time::Duration;

/// One gibibyte, the default seal threshold
pub const DEFAULT_THRESHOLD_WARC_SIZE: u64 = 1024 * 1024 * 1024;

/// Default TTL for unacknowledged temp artifacts (one week)
pub const DEFAULT_UNCOMMITTED_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default filesystem block size assumed by the temp pool heuristic
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Data store configuration
///
/// `threshold_warc_size` caps both temp WARC fill and AU active WARCs;
/// `0` disables sealing (and temp fill limits).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base directories for permanent storage and temp WARCs, in write
    /// preference order
    pub base_paths: Vec<PathBuf>,
    /// Seal-on-size threshold for AU active WARCs; 0 disables sealing
    pub threshold_warc_size: u64,
    /// TTL for uncommitted temp artifacts
    pub uncommitted_expiration: Duration,
    /// Whether new WARCs are gzipped per record
    pub use_warc_compression: bool,
    /// Filesystem block size used by the temp pool best-fit heuristic
    pub block_size: u64,
    /// Number of commit copy worker threads
    pub commit_worker_count: usize,
    /// Maximum queued commit copy tasks before backpressure
    pub commit_queue_depth: usize,
    /// Temp WARC garbage-collection period
    pub gc_interval: Duration,
}

impl StoreConfig {
    /// Configuration with defaults over the given base paths
    pub fn new<P: Into<PathBuf>>(base_paths: impl IntoIterator<Item = P>) -> Self {
        StoreConfig {
            base_paths: base_paths.into_iter().map(Into::into).collect(),
            threshold_warc_size: DEFAULT_THRESHOLD_WARC_SIZE,
            uncommitted_expiration: DEFAULT_UNCOMMITTED_EXPIRATION,
            use_warc_compression: false,
            block_size: DEFAULT_BLOCK_SIZE,
            commit_worker_count: 2,
            commit_queue_depth: 4096,
            gc_interval: Duration::from_secs(600),
        }
    }

    /// Configuration for tests: small threshold, long GC period so tests
    /// drive GC explicitly
    pub fn for_testing<P: Into<PathBuf>>(base_paths: impl IntoIterator<Item = P>) -> Self {
        StoreConfig {
            threshold_warc_size: 1024 * 1024,
            gc_interval: Duration::from_secs(3600),
            ..StoreConfig::new(base_paths)
        }
    }

    /// Set the seal threshold (0 disables sealing)
    pub fn with_threshold_warc_size(mut self, bytes: u64) -> Self {
        self.threshold_warc_size = bytes;
        self
    }

    /// Set the uncommitted artifact TTL
    pub fn with_uncommitted_expiration(mut self, ttl: Duration) -> Self {
        self.uncommitted_expiration = ttl;
        self
    }

    /// Enable or disable per-record gzip for new WARCs
    pub fn with_warc_compression(mut self, compress: bool) -> Self {
        self.use_warc_compression = compress;
        self
    }

    /// Set the block size used by the temp pool heuristic
    pub fn with_block_size(mut self, bytes: u64) -> Self {
        self.block_size = bytes;
        self
    }

    /// Set the commit copy worker count
    pub fn with_commit_workers(mut self, count: usize) -> Self {
        self.commit_worker_count = count;
        self
    }

    /// Set the GC period
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_paths.is_empty() {
            return Err(ConfigError::NoBasePaths);
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.commit_worker_count == 0 {
            return Err(ConfigError::NoCommitWorkers);
        }
        if self.commit_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// At least one base path is required
    #[error("at least one base path is required")]
    NoBasePaths,

    /// Block size must be positive
    #[error("block size must be positive")]
    ZeroBlockSize,

    /// At least one commit worker is required
    #[error("at least one commit worker is required")]
    NoCommitWorkers,

    /// Commit queue depth must be positive
    #[error("commit queue depth must be positive")]
    ZeroQueueDepth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new(["/data"]);
        assert_eq!(config.threshold_warc_size, DEFAULT_THRESHOLD_WARC_SIZE);
        assert_eq!(config.uncommitted_expiration, DEFAULT_UNCOMMITTED_EXPIRATION);
        assert!(!config.use_warc_compression);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::new(["/a", "/b"])
            .with_threshold_warc_size(1024)
            .with_warc_compression(true)
            .with_commit_workers(4);
        assert_eq!(config.base_paths.len(), 2);
        assert_eq!(config.threshold_warc_size, 1024);
        assert!(config.use_warc_compression);
        assert_eq!(config.commit_worker_count, 4);
    }

    #[test]
    fn test_validate_rejects_empty_base_paths() {
        let config = StoreConfig::new(Vec::<PathBuf>::new());
        assert!(matches!(config.validate(), Err(ConfigError::NoBasePaths)));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = StoreConfig::new(["/data"]);
        config.commit_worker_count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::NoCommitWorkers)));
    }

    #[test]
    fn test_zero_threshold_is_valid() {
        let config = StoreConfig::new(["/data"]).with_threshold_warc_size(0);
        assert!(config.validate().is_ok());
    }
}
