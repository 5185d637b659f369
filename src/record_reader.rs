//! A quote-aware record framer.
//!
//! Finds the boundary of the next CSV record in a byte stream, honoring
//! quoted fields that may contain literal `\n`/`\r` bytes, and reports
//! the exact start/end byte offset of each record (end measured *after*
//! the consumed terminator, so a seek to `end_offset` always lands on the
//! next record's first byte). The raw bytes it hands back (terminator
//! stripped) are the input the field parser (`crate::field_parser`)
//! expects.

use std::io::{self, BufRead};

const QUOTE: u8 = b'"';

/// Reads CSV records off a buffered reader, tracking absolute byte
/// offsets from wherever the underlying reader started.
pub struct RecordReader<R> {
    inner: R,
    offset: u64,
    quote: u8,
}

pub struct RawRecord {
    pub start_offset: u64,
    pub end_offset: u64,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_offset(inner, 0)
    }

    /// `start_offset` is the absolute file offset of the first byte
    /// `inner` will yield; needed when `inner` was already seeked.
    pub fn with_offset(inner: R, start_offset: u64) -> Self {
        RecordReader {
            inner,
            offset: start_offset,
            quote: QUOTE,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Reads the next raw record into `buf` (cleared first, terminator
    /// stripped). Returns `None` at EOF with nothing left to yield.
    pub fn read_raw(&mut self, buf: &mut Vec<u8>) -> io::Result<Option<RawRecord>> {
        buf.clear();
        let start_offset = self.offset;
        let mut in_quotes = false;
        let mut saw_any_byte = false;

        loop {
            let available = self.inner.fill_buf()?;

            if available.is_empty() {
                // EOF mid-record (no trailing newline) still counts as
                // a record if any byte was accumulated.
                if saw_any_byte {
                    return Ok(Some(RawRecord {
                        start_offset,
                        end_offset: self.offset,
                    }));
                }
                return Ok(None);
            }

            let mut consumed = 0usize;
            let mut terminated = false;

            for &byte in available {
                consumed += 1;

                if in_quotes {
                    buf.push(byte);
                    if byte == self.quote {
                        // Parity toggle: correctly re-enters "in quotes"
                        // on a doubled escape and exits on a genuine
                        // closing quote, for the purpose of locating the
                        // record boundary (the field parser performs the
                        // actual `""` decoding).
                        in_quotes = false;
                    }
                    saw_any_byte = true;
                    continue;
                }

                if byte == self.quote {
                    in_quotes = true;
                    buf.push(byte);
                    saw_any_byte = true;
                    continue;
                }

                if byte == b'\n' {
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    terminated = true;
                    saw_any_byte = true;
                    break;
                }

                buf.push(byte);
                saw_any_byte = true;
            }

            self.inner.consume(consumed);
            self.offset += consumed as u64;

            if terminated {
                return Ok(Some(RawRecord {
                    start_offset,
                    end_offset: self.offset,
                }));
            }
        }
    }
}
