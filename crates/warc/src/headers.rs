//! WARC header names and content types
//!
//! These strings are part of the persisted format and must not change:
//! external consumers read the WARC files and journal directly.

/// Version line at the start of every record
pub const WARC_VERSION: &str = "WARC/1.0";

/// Record id header (`<urn:uuid:...>`)
pub const WARC_RECORD_ID: &str = "WARC-Record-ID";

/// Record type header (`warcinfo`, `response`, `metadata`)
pub const WARC_TYPE: &str = "WARC-Type";

/// Record date header (ISO-8601 UTC)
pub const WARC_DATE: &str = "WARC-Date";

/// Payload content type header
pub const CONTENT_TYPE: &str = "Content-Type";

/// Payload length header
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Artifact UUID
pub const ARTIFACT_ID_KEY: &str = "X-Lockss-Artifact-Id";

/// Artifact collection
pub const ARTIFACT_COLLECTION_KEY: &str = "X-Lockss-Collection";

/// Artifact AUID
pub const ARTIFACT_AUID_KEY: &str = "X-Lockss-Auid";

/// Artifact URI
pub const ARTIFACT_URI_KEY: &str = "X-Lockss-Uri";

/// Artifact version
pub const ARTIFACT_VERSION_KEY: &str = "X-Lockss-Version";

/// Artifact body length (the HTTP entity body, not the whole record)
pub const ARTIFACT_LENGTH_KEY: &str = "X-Lockss-Length";

/// Content type of artifact record payloads
pub const CONTENT_TYPE_HTTP_RESPONSE: &str = "application/http; msgtype=response";

/// Content type of warcinfo and journal payloads
pub const CONTENT_TYPE_WARC_FIELDS: &str = "application/warc-fields";

/// Line terminator used throughout the format
pub const CRLF: &[u8] = b"\r\n";
