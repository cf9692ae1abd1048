//! HTTP response head emission and parsing
//!
//! Artifact record payloads are the captured HTTP response on the wire:
//! status line, headers, blank line, body. This module handles the head;
//! the body is streamed separately.

use crate::record::WarcError;
use std::io::BufRead;
use warcstore_core::HttpResponseHead;

/// Serialize a response head: status line + headers + blank line
pub fn head_bytes(head: &HttpResponseHead) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(head.status_line().as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in &head.headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Parse a response head from the start of a record payload
///
/// Consumes the head (through the blank line) from `reader` and returns
/// it with the number of bytes consumed; the reader is left positioned at
/// the first body byte.
pub fn parse_head<R: BufRead>(
    reader: &mut R,
    offset: u64,
) -> Result<(HttpResponseHead, u64), WarcError> {
    let mut consumed = 0u64;

    let mut read_line = |reader: &mut R| -> Result<String, WarcError> {
        let mut buf = Vec::new();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || !buf.ends_with(b"\r\n") {
            return Err(WarcError::Malformed {
                offset,
                reason: "HTTP response head cut short".to_string(),
            });
        }
        consumed += n as u64;
        buf.truncate(buf.len() - 2);
        String::from_utf8(buf).map_err(|_| WarcError::Malformed {
            offset,
            reason: "HTTP response head is not UTF-8".to_string(),
        })
    };

    let status_line = read_line(reader)?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    let reason = parts.next().unwrap_or_default();

    if !version.starts_with("HTTP/") {
        return Err(WarcError::Malformed {
            offset,
            reason: format!("bad HTTP status line: {status_line:?}"),
        });
    }
    let status_code: u16 = code.parse().map_err(|_| WarcError::Malformed {
        offset,
        reason: format!("bad HTTP status code: {code:?}"),
    })?;

    let mut head = HttpResponseHead {
        version: version.to_string(),
        status_code,
        reason: reason.to_string(),
        headers: Vec::new(),
    };

    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| WarcError::Malformed {
            offset,
            reason: format!("HTTP header line without colon: {line:?}"),
        })?;
        head.headers
            .push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok((head, consumed))
}
