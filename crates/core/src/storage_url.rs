//! Storage URLs: opaque pointers to a record within a WARC file
//!
//! Grammar: `scheme://opaque-path[?offset=<u64>&length=<u64>]`. A missing
//! offset/length pair means "whole file" and is used for warcinfo records.
//! The scheme is `file` for on-disk WARCs and `volatile` for in-memory
//! stores.

use crate::error::{RepositoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Scheme used for records stored in on-disk WARC files
pub const FILE_SCHEME: &str = "file";

/// Scheme used by in-memory (volatile) stores
pub const VOLATILE_SCHEME: &str = "volatile";

/// An opaque pointer to a record within a WARC file
///
/// Parseable back to `(path, offset, length)`. For temp WARCs the path
/// identifies the pooled temp file; for permanent storage it identifies
/// the AU's active or sealed WARC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageUrl {
    /// URL scheme (`file`, `volatile`, ...)
    pub scheme: String,
    /// Path of the container file
    pub path: String,
    /// Byte offset of the record within the file
    pub offset: Option<u64>,
    /// Stored length of the record in bytes
    pub length: Option<u64>,
}

impl StorageUrl {
    /// Pointer to a record at a byte range within an on-disk WARC
    pub fn file(path: impl AsRef<Path>, offset: u64, length: u64) -> Self {
        StorageUrl {
            scheme: FILE_SCHEME.to_string(),
            path: path.as_ref().to_string_lossy().into_owned(),
            offset: Some(offset),
            length: Some(length),
        }
    }

    /// Pointer to a whole file (warcinfo records)
    pub fn whole_file(path: impl AsRef<Path>) -> Self {
        StorageUrl {
            scheme: FILE_SCHEME.to_string(),
            path: path.as_ref().to_string_lossy().into_owned(),
            offset: None,
            length: None,
        }
    }

    /// Parse a storage URL from its string form
    ///
    /// # Errors
    /// `InvalidArgument` if the scheme separator is missing, the path is
    /// empty, or the query carries anything but valid `offset`/`length`
    /// integers.
    pub fn parse(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| RepositoryError::invalid_argument(format!("bad storage URL: {s}")))?;

        if scheme.is_empty() {
            return Err(RepositoryError::invalid_argument(format!(
                "storage URL has empty scheme: {s}"
            )));
        }

        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        if path.is_empty() {
            return Err(RepositoryError::invalid_argument(format!(
                "storage URL has empty path: {s}"
            )));
        }

        let mut offset = None;
        let mut length = None;

        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    RepositoryError::invalid_argument(format!("bad storage URL query: {s}"))
                })?;
                let parsed: u64 = value.parse().map_err(|_| {
                    RepositoryError::invalid_argument(format!(
                        "storage URL {key} is not an integer: {s}"
                    ))
                })?;
                match key {
                    "offset" => offset = Some(parsed),
                    "length" => length = Some(parsed),
                    _ => {
                        return Err(RepositoryError::invalid_argument(format!(
                            "unknown storage URL parameter {key}: {s}"
                        )))
                    }
                }
            }
        }

        if offset.is_some() != length.is_some() {
            return Err(RepositoryError::invalid_argument(format!(
                "storage URL must carry both offset and length or neither: {s}"
            )));
        }

        Ok(StorageUrl {
            scheme: scheme.to_string(),
            path: path.to_string(),
            offset,
            length,
        })
    }

    /// The container file path
    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Whether the container file lives under `dir`
    pub fn is_under(&self, dir: &Path) -> bool {
        Path::new(&self.path).starts_with(dir)
    }
}

impl fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.offset, self.length) {
            (Some(offset), Some(length)) => write!(
                f,
                "{}://{}?offset={}&length={}",
                self.scheme, self.path, offset, length
            ),
            _ => write!(f, "{}://{}", self.scheme, self.path),
        }
    }
}
