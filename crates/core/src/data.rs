//! Ingestible/readable artifact data
//!
//! [`ArtifactData`] is what crosses the repository boundary on both the
//! write and read sides: an identifier, the HTTP response status line and
//! headers, and a payload byte stream. The payload is a
//! single-consumption lazy byte source — the store streams it exactly once
//! while deriving the content length and digest.

use crate::artifact::ArtifactIdentifier;
use crate::error::{RepositoryError, Result};
use crate::storage_url::StorageUrl;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::io::{Cursor, Read};

/// HTTP response status line and headers
///
/// The body travels separately as the artifact payload. Header order is
/// preserved; duplicate names are allowed, as on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponseHead {
    /// Protocol version, e.g. `HTTP/1.1`
    pub version: String,
    /// Status code, e.g. 200
    pub status_code: u16,
    /// Reason phrase, e.g. `OK` (may be empty)
    pub reason: String,
    /// Response headers in wire order
    pub headers: Vec<(String, String)>,
}

impl HttpResponseHead {
    /// A response head with the given status code and no headers
    pub fn new(status_code: u16, reason: impl Into<String>) -> Self {
        HttpResponseHead {
            version: "HTTP/1.1".to_string(),
            status_code,
            reason: reason.into(),
            headers: Vec::new(),
        }
    }

    /// A `200 OK` response head
    pub fn ok() -> Self {
        HttpResponseHead::new(200, "OK")
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of the named header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The status line without trailing CRLF, e.g. `HTTP/1.1 200 OK`
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            format!("{} {}", self.version, self.status_code)
        } else {
            format!("{} {} {}", self.version, self.status_code, self.reason)
        }
    }
}

/// Single-consumption byte source for an artifact payload
///
/// Holds the underlying reader (an in-memory buffer on ingest, an open
/// file handle bounded to the record's byte range on read-back) and hands
/// it out at most once. A second consumption attempt fails with
/// `StreamAlreadyConsumed`.
pub struct Payload {
    source: Mutex<Option<Box<dyn Read + Send>>>,
}

impl Payload {
    /// Payload over an in-memory buffer
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Payload {
            source: Mutex::new(Some(Box::new(Cursor::new(bytes)))),
        }
    }

    /// Payload over an arbitrary reader (e.g. a bounded file region)
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Payload {
            source: Mutex::new(Some(reader)),
        }
    }

    /// Take the underlying reader
    ///
    /// # Errors
    /// `StreamAlreadyConsumed` if the payload was consumed before.
    pub fn consume(&self) -> Result<Box<dyn Read + Send>> {
        self.source
            .lock()
            .take()
            .ok_or(RepositoryError::StreamAlreadyConsumed)
    }

    /// Whether the payload has already been consumed
    pub fn is_consumed(&self) -> bool {
        self.source.lock().is_none()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// An artifact as ingested or read back: identity, HTTP response, payload
///
/// The content length and digest are `None` until the store has streamed
/// the payload; the storage URL is `None` until the record is persisted.
#[derive(Debug)]
pub struct ArtifactData {
    identifier: ArtifactIdentifier,
    response: HttpResponseHead,
    payload: Payload,
    content_length: Option<u64>,
    content_digest: Option<String>,
    collection_date: DateTime<Utc>,
    storage_url: Option<StorageUrl>,
}

impl ArtifactData {
    /// Artifact data for ingest; a fresh UUID is assigned and the version
    /// is left at zero for the repository facade to stamp
    pub fn new(
        collection: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        response: HttpResponseHead,
        payload: Payload,
        collection_date: DateTime<Utc>,
    ) -> Self {
        ArtifactData {
            identifier: ArtifactIdentifier::new(collection, auid, uri, 0),
            response,
            payload,
            content_length: None,
            content_digest: None,
            collection_date,
            storage_url: None,
        }
    }

    /// Artifact data with an existing identifier (read-back, recovery)
    pub fn with_identifier(
        identifier: ArtifactIdentifier,
        response: HttpResponseHead,
        payload: Payload,
        collection_date: DateTime<Utc>,
    ) -> Self {
        ArtifactData {
            identifier,
            response,
            payload,
            content_length: None,
            content_digest: None,
            collection_date,
            storage_url: None,
        }
    }

    /// The artifact's identity tuple
    pub fn identifier(&self) -> &ArtifactIdentifier {
        &self.identifier
    }

    /// Stamp the repository-assigned version onto the identifier
    pub fn set_version(&mut self, version: u32) {
        self.identifier.version = version;
    }

    /// The HTTP response status line and headers
    pub fn response(&self) -> &HttpResponseHead {
        &self.response
    }

    /// The single-consumption payload
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Derived body length, once the payload has been streamed
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Derived body digest (`algorithm:hex`), once streamed
    pub fn content_digest(&self) -> Option<&str> {
        self.content_digest.as_deref()
    }

    /// Wall-clock time of ingest
    pub fn collection_date(&self) -> DateTime<Utc> {
        self.collection_date
    }

    /// Where the record bytes live, once persisted
    pub fn storage_url(&self) -> Option<&StorageUrl> {
        self.storage_url.as_ref()
    }

    /// Record the derived content length and digest
    pub fn set_content(&mut self, length: u64, digest: impl Into<String>) {
        self.content_length = Some(length);
        self.content_digest = Some(digest.into());
    }

    /// Record the storage location after persisting
    pub fn set_storage_url(&mut self, url: StorageUrl) {
        self.storage_url = Some(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_payload_consumes_once() {
        let payload = Payload::from_bytes(b"hello".to_vec());
        assert!(!payload.is_consumed());

        let mut reader = payload.consume().unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert!(payload.is_consumed());

        let err = match payload.consume() {
            Err(e) => e,
            Ok(_) => panic!("expected consume() to fail on an already-consumed payload"),
        };
        assert!(matches!(err, RepositoryError::StreamAlreadyConsumed));
    }

    #[test]
    fn test_response_head_header_lookup_is_case_insensitive() {
        let head = HttpResponseHead::ok().with_header("Content-Type", "text/html");
        assert_eq!(head.header("content-type"), Some("text/html"));
        assert_eq!(head.header("X-Missing"), None);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(HttpResponseHead::ok().status_line(), "HTTP/1.1 200 OK");
        assert_eq!(
            HttpResponseHead::new(204, "").status_line(),
            "HTTP/1.1 204"
        );
    }

    #[test]
    fn test_new_artifact_data_has_unstamped_version() {
        let data = ArtifactData::new(
            "c1",
            "a1",
            "http://h/p",
            HttpResponseHead::ok(),
            Payload::from_bytes(Vec::new()),
            Utc::now(),
        );
        assert_eq!(data.identifier().version, 0);
        assert!(data.content_length().is_none());
        assert!(data.storage_url().is_none());
    }
}
