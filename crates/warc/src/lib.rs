//! WARC/1.0 record codec for warcstore
//!
//! This crate frames and parses single WARC records:
//! - Record framing: `WARC/1.0\r\n<headers>\r\n\r\n<payload>\r\n\r\n`
//! - Artifact records: `application/http; msgtype=response` payloads with
//!   the repository's `X-Lockss-*` identity headers
//! - `application/warc-fields` payloads (warcinfo and journal records)
//! - Optional gzip framing, one gzip member per record
//! - Sequential scanning of a WARC file with torn-tail detection
//!
//! Offsets are caller-supplied: the parser is always invoked at a known
//! record boundary. The codec distinguishes `Incomplete` (clean EOF in the
//! middle of a record — a torn tail that rebuild may truncate) from
//! `Malformed` (framing broken mid-file).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fields;
pub mod headers;
pub mod http;
pub mod record;
pub mod scan;

pub use record::{
    read_record, read_record_header, record_id_for, write_record, write_record_gz, RawRecord,
    WarcError, WarcRecordHeader, WarcRecordType,
};
pub use scan::{open_record_at, ScannedRecord, WarcScanner};
