//! RFC 4180 line-to-fields splitter.
//!
//! Operates on a single CSV record whose trailing `\r?\n` has already
//! been stripped by the record reader. The fast path (no quotes, no
//! surrounding spaces anywhere in the record) never allocates beyond
//! the caller-owned output vector.

use std::borrow::Cow;

use crate::error::ParseError;

const QUOTE: u8 = b'"';
const COMMA: u8 = b',';
const SPACE: u8 = b' ';

/// A single decoded field. Borrowed when no quote-unescaping or
/// trimming copy was needed, owned otherwise.
pub type Field<'a> = Cow<'a, [u8]>;

/// Parses `record` (no trailing terminator) into `out`, reusing `out`'s
/// storage across calls. An empty record yields a single empty field.
pub fn parse_record<'a>(record: &'a [u8], out: &mut Vec<Field<'a>>) -> Result<(), ParseError> {
    out.clear();

    if record.is_empty() {
        out.push(Cow::Borrowed(&record[0..0]));
        return Ok(());
    }

    // Fast path: no quote byte anywhere in the record means every
    // field is a plain, comma-delimited, space-trimmed slice.
    if !record.contains(&QUOTE) {
        for raw in record.split(|&b| b == COMMA) {
            out.push(Cow::Borrowed(trim_spaces(raw)));
        }
        return Ok(());
    }

    parse_quoted_record(record, out)
}

fn trim_spaces(field: &[u8]) -> &[u8] {
    let start = field.iter().position(|&b| b != SPACE).unwrap_or(field.len());
    let end = field.iter().rposition(|&b| b != SPACE).map_or(start, |i| i + 1);
    &field[start..end]
}

fn parse_quoted_record<'a>(
    record: &'a [u8],
    out: &mut Vec<Field<'a>>,
) -> Result<(), ParseError> {
    let mut i = 0usize;
    let len = record.len();

    loop {
        // Skip leading spaces before the field begins.
        while i < len && record[i] == SPACE {
            i += 1;
        }

        if i < len && record[i] == QUOTE {
            let field_start = i;
            i += 1; // past opening quote
            let mut decoded: Option<Vec<u8>> = None;
            let mut segment_start = i;

            loop {
                if i >= len {
                    return Err(ParseError::new("unterminated quoted field"));
                }

                if record[i] == QUOTE {
                    if i + 1 < len && record[i + 1] == QUOTE {
                        // Escaped quote: "" -> "
                        let buf = decoded.get_or_insert_with(|| record[segment_start..i].to_vec());
                        buf.push(QUOTE);
                        i += 2;
                        segment_start = i;
                        continue;
                    }

                    // Closing quote.
                    let field: Field<'a> = match decoded {
                        Some(mut buf) => {
                            buf.extend_from_slice(&record[segment_start..i]);
                            Cow::Owned(buf)
                        }
                        None => Cow::Borrowed(&record[field_start + 1..i]),
                    };
                    out.push(field);
                    i += 1; // past closing quote
                    break;
                }

                i += 1;
            }

            // Trailing spaces are allowed between the closing quote and
            // the next comma/end of record; anything else is malformed.
            while i < len && record[i] == SPACE {
                i += 1;
            }

            if i < len {
                if record[i] != COMMA {
                    return Err(ParseError::new(
                        "unexpected text after closing quote in quoted field",
                    ));
                }
                i += 1; // past comma, next field starts
                continue;
            }

            // End of record right after this field.
            return Ok(());
        }

        // Unquoted field: read until the next unescaped comma.
        let field_start = i;
        while i < len && record[i] != COMMA {
            i += 1;
        }
        out.push(Cow::Borrowed(trim_spaces(&record[field_start..i])));

        if i >= len {
            return Ok(());
        }

        i += 1; // past comma
        if i == len {
            // Trailing comma: one more (empty) field follows.
            out.push(Cow::Borrowed(&record[0..0]));
            return Ok(());
        }
    }
}
