//! `application/warc-fields` payload encoding
//!
//! A warc-fields payload is a sequence of `name: value` lines, CRLF
//! terminated. Warcinfo records and journal state records use this
//! encoding.

use crate::record::WarcError;

/// Encode name/value pairs as a warc-fields payload
pub fn encode(fields: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(fields.len() * 32);
    for (name, value) in fields {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Parse a warc-fields payload back into name/value pairs
///
/// Blank lines are skipped; a non-blank line without a colon is malformed.
pub fn parse(bytes: &[u8]) -> Result<Vec<(String, String)>, WarcError> {
    let text = std::str::from_utf8(bytes).map_err(|_| WarcError::Malformed {
        offset: 0,
        reason: "warc-fields payload is not UTF-8".to_string(),
    })?;

    let mut fields = Vec::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| WarcError::Malformed {
            offset: 0,
            reason: format!("warc-fields line without colon: {line:?}"),
        })?;
        fields.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(fields)
}
