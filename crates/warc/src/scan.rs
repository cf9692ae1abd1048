//! Sequential WARC file scanning
//!
//! Reload, rebuild, and garbage collection all walk WARC files record by
//! record. The scanner tracks byte positions so callers get each record's
//! stored offset and length (compressed length for gzipped files) and,
//! after a torn tail, the last good record boundary for truncation.

use crate::record::{read_record, RawRecord, WarcError, WarcRecordHeader};
use flate2::bufread::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Open a bounded reader over one stored record
///
/// Seeks to `offset` and limits the reader to `length` stored bytes,
/// decompressing if the record is a gzip member. Fails with
/// `UnexpectedEof` when the range extends past the end of the file.
pub fn open_record_at(
    path: &Path,
    offset: u64,
    length: u64,
    compressed: bool,
) -> io::Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if offset.checked_add(length).is_none_or(|end| end > file_len) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("record range {offset}+{length} exceeds file length {file_len}"),
        ));
    }
    file.seek(SeekFrom::Start(offset))?;
    let bounded = file.take(length);
    if compressed {
        Ok(Box::new(BufReader::new(flate2::read::GzDecoder::new(
            BufReader::new(bounded),
        ))))
    } else {
        Ok(Box::new(BufReader::new(bounded)))
    }
}

/// A record yielded by the scanner
#[derive(Debug)]
pub struct ScannedRecord {
    /// Byte offset of the record within the file
    pub offset: u64,
    /// Stored length in the file (compressed length for gzipped files)
    pub stored_length: u64,
    /// Parsed record head
    pub header: WarcRecordHeader,
    /// Payload bytes, present only when requested
    pub payload: Option<Vec<u8>>,
}

// BufRead adapter that tracks how many bytes have been consumed from the
// underlying reader. The position is the authoritative record boundary.
struct CountingReader<R> {
    inner: R,
    pos: u64,
}

impl<R: BufRead> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.inner.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.inner.consume(n);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt as u64;
        self.inner.consume(amt);
    }
}

/// Iterator over the records of one WARC file
///
/// Yields `Ok(ScannedRecord)` per record and at most one trailing `Err`:
/// `Incomplete` for a torn tail, `Malformed` for broken framing. After any
/// error the scanner stops. [`WarcScanner::position`] reports the end of
/// the last successfully scanned record, which is the truncation point for
/// a torn tail.
pub struct WarcScanner<R> {
    reader: CountingReader<R>,
    compressed: bool,
    with_payload: bool,
    done: bool,
}

impl WarcScanner<BufReader<File>> {
    /// Open a WARC file for scanning
    pub fn open(path: &Path, compressed: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(WarcScanner::new(BufReader::new(file), compressed))
    }
}

impl<R: BufRead> WarcScanner<R> {
    /// Scan an already-open reader positioned at a record boundary
    pub fn new(reader: R, compressed: bool) -> Self {
        WarcScanner {
            reader: CountingReader { inner: reader, pos: 0 },
            compressed,
            with_payload: false,
            done: false,
        }
    }

    /// Also buffer each record's payload bytes
    pub fn with_payload(mut self, with_payload: bool) -> Self {
        self.with_payload = with_payload;
        self
    }

    /// Byte position after the last successfully scanned record
    pub fn position(&self) -> u64 {
        self.reader.pos
    }

    fn next_plain(&mut self, offset: u64) -> Result<Option<RawRecord>, WarcError> {
        read_record(&mut self.reader, offset, self.with_payload)
    }

    fn next_gzip(&mut self, offset: u64) -> Result<Option<RawRecord>, WarcError> {
        // Clean EOF check before opening a member
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let decoder = GzDecoder::new(&mut self.reader);
        let mut decoded = BufReader::new(decoder);
        let record = match read_record(&mut decoded, offset, self.with_payload)? {
            None => return Err(WarcError::Incomplete { offset }),
            Some(r) => r,
        };

        // Drain to the end of the member so the gzip trailer is consumed
        // from the underlying reader; one record per member.
        let leftover = io::copy(&mut decoded, &mut io::sink()).map_err(WarcError::Io)?;
        if leftover > 0 {
            return Err(WarcError::Malformed {
                offset,
                reason: format!("{leftover} trailing bytes in gzip member"),
            });
        }

        Ok(Some(record))
    }
}

impl<R: BufRead> Iterator for WarcScanner<R> {
    type Item = Result<ScannedRecord, WarcError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let offset = self.reader.pos;

        let result = if self.compressed {
            self.next_gzip(offset)
        } else {
            self.next_plain(offset)
        };

        match result {
            Ok(None) => {
                self.done = true;
                None
            }
            Ok(Some(raw)) => Some(Ok(ScannedRecord {
                offset,
                stored_length: self.reader.pos - offset,
                header: raw.header,
                payload: raw.payload,
            })),
            Err(e) => {
                self.done = true;
                // Partial consumption of the broken record must not move
                // the reported boundary: position() is the truncation
                // point and stays at the start of the bad record.
                self.reader.pos = offset;
                // A corrupt deflate stream surfaces as an InvalidData I/O
                // error; report it as broken framing, not an I/O failure.
                let e = match e {
                    WarcError::Io(io_err)
                        if matches!(
                            io_err.kind(),
                            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
                        ) =>
                    {
                        WarcError::Malformed {
                            offset,
                            reason: io_err.to_string(),
                        }
                    }
                    other => other,
                };
                Some(Err(e))
            }
        }
    }
}
