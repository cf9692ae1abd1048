//! WARC record framing and parsing
//!
//! A record is framed as `WARC/1.0\r\n<named headers>\r\n\r\n<payload>\r\n\r\n`.
//! The writer streams the payload through; the reader parses a record head
//! at a caller-supplied offset and validates `Content-Length` against the
//! bytes actually present.

use crate::headers;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, BufRead, Read, Write};
use thiserror::Error;
use uuid::Uuid;
use warcstore_core::ArtifactIdentifier;

/// Codec errors
///
/// `Incomplete` means a clean EOF landed inside a record: the remainder is
/// a torn tail, expected after a crash, and the caller may truncate back
/// to the last record boundary. `Malformed` means the framing itself is
/// broken and the file needs attention.
#[derive(Debug, Error)]
pub enum WarcError {
    /// I/O failure while reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record framing is broken at the given offset
    #[error("malformed record at offset {offset}: {reason}")]
    Malformed {
        /// Offset of the record whose framing is broken
        offset: u64,
        /// What was wrong
        reason: String,
    },

    /// Clean EOF in the middle of a record (torn tail)
    #[error("incomplete record at offset {offset}")]
    Incomplete {
        /// Offset of the record the EOF landed in
        offset: u64,
    },
}

impl WarcError {
    fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        WarcError::Malformed {
            offset,
            reason: reason.into(),
        }
    }
}

/// WARC record types emitted by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarcRecordType {
    /// File-level descriptive record at the head of each WARC
    Warcinfo,
    /// One captured HTTP response (an artifact)
    Response,
    /// Repository journal state record
    Metadata,
}

impl WarcRecordType {
    /// Wire representation of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            WarcRecordType::Warcinfo => "warcinfo",
            WarcRecordType::Response => "response",
            WarcRecordType::Metadata => "metadata",
        }
    }

    /// Parse the wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "warcinfo" => Some(WarcRecordType::Warcinfo),
            "response" => Some(WarcRecordType::Response),
            "metadata" => Some(WarcRecordType::Metadata),
            _ => None,
        }
    }
}

/// Build a `WARC-Record-ID` value for an artifact UUID
pub fn record_id_for(artifact_id: &str) -> String {
    format!("<urn:uuid:{artifact_id}>")
}

/// Parsed or to-be-written record head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecordHeader {
    /// `WARC-Record-ID` value
    pub record_id: String,
    /// Record type
    pub record_type: WarcRecordType,
    /// `WARC-Date` value
    pub date: DateTime<Utc>,
    /// Payload content type
    pub content_type: String,
    /// Payload length in bytes
    pub content_length: u64,
    /// Additional headers (`X-Lockss-*`) in emission order
    pub extra: Vec<(String, String)>,
}

impl WarcRecordHeader {
    /// Header for a non-artifact record with a fresh record id
    pub fn new(
        record_type: WarcRecordType,
        date: DateTime<Utc>,
        content_type: impl Into<String>,
        content_length: u64,
    ) -> Self {
        WarcRecordHeader {
            record_id: record_id_for(&Uuid::new_v4().to_string()),
            record_type,
            date,
            content_type: content_type.into(),
            content_length,
            extra: Vec::new(),
        }
    }

    /// Header for an artifact record, carrying the identity headers
    ///
    /// `content_length` is the full record payload (HTTP head + body);
    /// `body_length` is the entity body alone and becomes
    /// `X-Lockss-Length`.
    pub fn for_artifact(
        identifier: &ArtifactIdentifier,
        date: DateTime<Utc>,
        content_length: u64,
        body_length: u64,
    ) -> Self {
        WarcRecordHeader {
            record_id: record_id_for(&identifier.id),
            record_type: WarcRecordType::Response,
            date,
            content_type: headers::CONTENT_TYPE_HTTP_RESPONSE.to_string(),
            content_length,
            extra: vec![
                (
                    headers::ARTIFACT_ID_KEY.to_string(),
                    identifier.id.clone(),
                ),
                (
                    headers::ARTIFACT_COLLECTION_KEY.to_string(),
                    identifier.collection.clone(),
                ),
                (
                    headers::ARTIFACT_AUID_KEY.to_string(),
                    identifier.auid.clone(),
                ),
                (
                    headers::ARTIFACT_URI_KEY.to_string(),
                    identifier.uri.clone(),
                ),
                (
                    headers::ARTIFACT_VERSION_KEY.to_string(),
                    identifier.version.to_string(),
                ),
                (
                    headers::ARTIFACT_LENGTH_KEY.to_string(),
                    body_length.to_string(),
                ),
            ],
        }
    }

    /// First value of an extra header, case-insensitive
    pub fn field(&self, name: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Recover the artifact identity and body length from the
    /// `X-Lockss-*` headers of a response record
    pub fn artifact_identity(&self, offset: u64) -> Result<(ArtifactIdentifier, u64), WarcError> {
        let get = |name: &str| {
            self.field(name)
                .ok_or_else(|| WarcError::malformed(offset, format!("missing {name} header")))
        };

        let version: u32 = get(headers::ARTIFACT_VERSION_KEY)?.parse().map_err(|_| {
            WarcError::malformed(offset, "artifact version is not an integer")
        })?;
        let body_length: u64 = get(headers::ARTIFACT_LENGTH_KEY)?.parse().map_err(|_| {
            WarcError::malformed(offset, "artifact length is not an integer")
        })?;

        let identifier = ArtifactIdentifier::from_parts(
            get(headers::ARTIFACT_ID_KEY)?,
            get(headers::ARTIFACT_COLLECTION_KEY)?,
            get(headers::ARTIFACT_AUID_KEY)?,
            get(headers::ARTIFACT_URI_KEY)?,
            version,
        );

        Ok((identifier, body_length))
    }

    /// Serialize the record head, including the blank separator line
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(headers::WARC_VERSION.as_bytes());
        out.extend_from_slice(headers::CRLF);

        let mut push = |name: &str, value: &str| {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(headers::CRLF);
        };

        push(headers::WARC_RECORD_ID, &self.record_id);
        push(headers::WARC_TYPE, self.record_type.as_str());
        push(
            headers::WARC_DATE,
            &self.date.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        push(headers::CONTENT_TYPE, &self.content_type);
        push(headers::CONTENT_LENGTH, &self.content_length.to_string());
        for (name, value) in &self.extra {
            push(name, value);
        }

        out.extend_from_slice(headers::CRLF);
        out
    }
}

/// Write one uncompressed record; returns the bytes written
///
/// The payload reader must yield exactly `header.content_length` bytes.
pub fn write_record<W: Write>(
    out: &mut W,
    header: &WarcRecordHeader,
    payload: &mut dyn Read,
) -> io::Result<u64> {
    let head = header.to_wire();
    out.write_all(&head)?;

    let copied = io::copy(payload, out)?;
    if copied != header.content_length {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "payload produced {copied} bytes, Content-Length says {}",
                header.content_length
            ),
        ));
    }

    out.write_all(headers::CRLF)?;
    out.write_all(headers::CRLF)?;
    Ok(head.len() as u64 + copied + 4)
}

/// Write one record as a single gzip member; returns the compressed size
pub fn write_record_gz<W: Write>(
    out: &mut W,
    header: &WarcRecordHeader,
    payload: &mut dyn Read,
) -> io::Result<u64> {
    let mut counter = CountingWriter { inner: out, written: 0 };
    let mut encoder = GzEncoder::new(&mut counter, Compression::default());
    write_record(&mut encoder, header, payload)?;
    encoder.finish()?;
    Ok(counter.written)
}

struct CountingWriter<'a, W: Write> {
    inner: &'a mut W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// One parsed record: head plus (optionally buffered) payload bytes
#[derive(Debug)]
pub struct RawRecord {
    /// Parsed record head
    pub header: WarcRecordHeader,
    /// Payload bytes, present only when requested
    pub payload: Option<Vec<u8>>,
}

// Reads one CRLF-terminated line. Returns Ok(None) on clean EOF before any
// byte; Incomplete on EOF mid-line.
fn read_line<R: BufRead>(
    reader: &mut R,
    offset: u64,
    first: bool,
) -> Result<Option<String>, WarcError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        if first {
            return Ok(None);
        }
        return Err(WarcError::Incomplete { offset });
    }
    if !buf.ends_with(b"\r\n") {
        // EOF mid-line or a bare LF; both mean the record is cut short
        return Err(WarcError::Incomplete { offset });
    }
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| WarcError::malformed(offset, "record head is not UTF-8"))
}

/// Parse a record head at `offset`
///
/// Returns `Ok(None)` on clean EOF at a record boundary. Fails
/// `Incomplete` on EOF inside the head, `Malformed` on bad framing or a
/// missing mandatory header.
pub fn read_record_header<R: BufRead>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<WarcRecordHeader>, WarcError> {
    let version = match read_line(reader, offset, true)? {
        None => return Ok(None),
        Some(line) => line,
    };
    if version != headers::WARC_VERSION {
        return Err(WarcError::malformed(
            offset,
            format!("expected {} version line, got {version:?}", headers::WARC_VERSION),
        ));
    }

    let mut named: Vec<(String, String)> = Vec::new();
    loop {
        let line = read_line(reader, offset, false)?.expect("non-first lines return Some");
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            WarcError::malformed(offset, format!("header line without colon: {line:?}"))
        })?;
        named.push((name.trim().to_string(), value.trim().to_string()));
    }

    let take = |name: &str| -> Result<String, WarcError> {
        named
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| WarcError::malformed(offset, format!("missing {name} header")))
    };

    let record_id = take(headers::WARC_RECORD_ID)?;
    let type_str = take(headers::WARC_TYPE)?;
    let record_type = WarcRecordType::parse(&type_str)
        .ok_or_else(|| WarcError::malformed(offset, format!("unknown record type {type_str:?}")))?;
    let date_str = take(headers::WARC_DATE)?;
    let date = DateTime::parse_from_rfc3339(&date_str)
        .map_err(|_| WarcError::malformed(offset, format!("bad WARC-Date {date_str:?}")))?
        .with_timezone(&Utc);
    let content_type = take(headers::CONTENT_TYPE)?;
    let content_length: u64 = take(headers::CONTENT_LENGTH)?
        .parse()
        .map_err(|_| WarcError::malformed(offset, "Content-Length is not an integer"))?;

    let known = [
        headers::WARC_RECORD_ID,
        headers::WARC_TYPE,
        headers::WARC_DATE,
        headers::CONTENT_TYPE,
        headers::CONTENT_LENGTH,
    ];
    let extra = named
        .into_iter()
        .filter(|(n, _)| !known.iter().any(|k| k.eq_ignore_ascii_case(n)))
        .collect();

    Ok(Some(WarcRecordHeader {
        record_id,
        record_type,
        date,
        content_type,
        content_length,
        extra,
    }))
}

/// Parse one full record (head, payload, trailer) at `offset`
///
/// With `with_payload` false the payload bytes are discarded but still
/// length-checked. Returns `Ok(None)` on clean EOF at the boundary.
pub fn read_record<R: BufRead>(
    reader: &mut R,
    offset: u64,
    with_payload: bool,
) -> Result<Option<RawRecord>, WarcError> {
    let header = match read_record_header(reader, offset)? {
        None => return Ok(None),
        Some(h) => h,
    };

    let payload = if with_payload {
        let mut buf = vec![0u8; header.content_length as usize];
        read_exact_or_incomplete(reader, &mut buf, offset)?;
        Some(buf)
    } else {
        discard_exact(reader, header.content_length, offset)?;
        None
    };

    // The trailer doubles as the Content-Length check: if the payload was
    // shorter or longer than declared, these four bytes will not line up.
    let mut trailer = [0u8; 4];
    read_exact_or_incomplete(reader, &mut trailer, offset)?;
    if &trailer != b"\r\n\r\n" {
        return Err(WarcError::malformed(
            offset,
            "record trailer missing (Content-Length mismatch?)",
        ));
    }

    Ok(Some(RawRecord { header, payload }))
}

fn read_exact_or_incomplete<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    offset: u64,
) -> Result<(), WarcError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WarcError::Incomplete { offset }
        } else {
            WarcError::Io(e)
        }
    })
}

fn discard_exact<R: Read>(reader: &mut R, mut remaining: u64, offset: u64) -> Result<(), WarcError> {
    let mut scratch = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(scratch.len() as u64) as usize;
        let n = reader.read(&mut scratch[..want])?;
        if n == 0 {
            return Err(WarcError::Incomplete { offset });
        }
        remaining -= n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn artifact_header(payload_len: u64, body_len: u64) -> WarcRecordHeader {
        let ident = ArtifactIdentifier::new("c1", "a1", "http://h/p", 1);
        WarcRecordHeader::for_artifact(&ident, Utc::now(), payload_len, body_len)
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let payload = b"HTTP/1.1 200 OK\r\n\r\nhello";
        let header = artifact_header(payload.len() as u64, 5);

        let mut buf = Vec::new();
        let written = write_record(&mut buf, &header, &mut Cursor::new(payload)).unwrap();
        assert_eq!(written, buf.len() as u64);

        let mut reader = Cursor::new(&buf);
        let record = read_record(&mut reader, 0, true).unwrap().unwrap();
        assert_eq!(record.header.record_type, WarcRecordType::Response);
        assert_eq!(record.header.content_length, payload.len() as u64);
        assert_eq!(record.payload.unwrap(), payload);

        let (ident, body_len) = record.header.artifact_identity(0).unwrap();
        assert_eq!(ident.collection, "c1");
        assert_eq!(ident.version, 1);
        assert_eq!(body_len, 5);
    }

    #[test]
    fn test_gzip_round_trip() {
        let payload = b"HTTP/1.1 200 OK\r\n\r\ncompressed body";
        let header = artifact_header(payload.len() as u64, 15);

        let mut buf = Vec::new();
        let compressed_len = write_record_gz(&mut buf, &header, &mut Cursor::new(payload)).unwrap();
        assert_eq!(compressed_len, buf.len() as u64);

        let mut decoder =
            std::io::BufReader::new(flate2::bufread::GzDecoder::new(Cursor::new(&buf)));
        let record = read_record(&mut decoder, 0, true).unwrap().unwrap();
        assert_eq!(record.payload.unwrap(), payload);
    }

    #[test]
    fn test_clean_eof_returns_none() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        assert!(read_record(&mut reader, 0, true).unwrap().is_none());
    }

    #[test]
    fn test_truncated_payload_is_incomplete() {
        let payload = b"0123456789";
        let header = artifact_header(payload.len() as u64, 10);
        let mut buf = Vec::new();
        write_record(&mut buf, &header, &mut Cursor::new(payload)).unwrap();
        buf.truncate(buf.len() - 6);

        let mut reader = Cursor::new(&buf);
        let err = read_record(&mut reader, 0, true).unwrap_err();
        assert!(matches!(err, WarcError::Incomplete { offset: 0 }));
    }

    #[test]
    fn test_truncated_head_is_incomplete() {
        let header = artifact_header(4, 4);
        let mut buf = Vec::new();
        write_record(&mut buf, &header, &mut Cursor::new(b"body")).unwrap();
        buf.truncate(20);

        let mut reader = Cursor::new(&buf);
        let err = read_record(&mut reader, 0, true).unwrap_err();
        assert!(matches!(err, WarcError::Incomplete { .. }));
    }

    #[test]
    fn test_content_length_mismatch_is_malformed() {
        let payload = b"0123456789";
        let mut header = artifact_header(payload.len() as u64, 10);

        // Lie about the length: the trailer bytes will not line up
        header.content_length = 6;
        let mut lied = header.to_wire();
        lied.extend_from_slice(payload);
        lied.extend_from_slice(b"\r\n\r\n");

        let mut reader = Cursor::new(&lied);
        let err = read_record(&mut reader, 0, true).unwrap_err();
        assert!(matches!(err, WarcError::Malformed { .. }));
    }

    #[test]
    fn test_missing_mandatory_header_is_malformed() {
        let text = b"WARC/1.0\r\nWARC-Type: response\r\n\r\n";
        let mut reader = Cursor::new(&text[..]);
        let err = read_record_header(&mut reader, 0).unwrap_err();
        assert!(matches!(err, WarcError::Malformed { .. }));
    }

    #[test]
    fn test_bad_version_line_is_malformed() {
        let text = b"WARC/0.9\r\n\r\n";
        let mut reader = Cursor::new(&text[..]);
        let err = read_record_header(&mut reader, 0).unwrap_err();
        assert!(matches!(err, WarcError::Malformed { .. }));
    }

    #[test]
    fn test_writer_rejects_short_payload() {
        let header = artifact_header(10, 10);
        let mut buf = Vec::new();
        let err = write_record(&mut buf, &header, &mut Cursor::new(b"short")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_skip_payload_still_validates_framing() {
        let payload = b"0123456789";
        let header = artifact_header(payload.len() as u64, 10);
        let mut buf = Vec::new();
        write_record(&mut buf, &header, &mut Cursor::new(payload)).unwrap();

        let mut reader = Cursor::new(&buf);
        let record = read_record(&mut reader, 0, false).unwrap().unwrap();
        assert!(record.payload.is_none());
        assert_eq!(reader.position() as usize, buf.len());
    }
}
