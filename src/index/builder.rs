//! Single streaming pass over a CSV file that emits block metadata.
//!
//! The first block is special-cased: its row values are buffered until
//! the block is complete, because the column types that decide *how*
//! min/max comparisons are made (numeric vs lexicographic) are only
//! known once the first block's non-empty/numeric counters have been
//! fully accumulated. Every later block already knows the column types
//! and is folded with a plain running accumulator, never buffering full
//! row values.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::{EngineError, EngineResult, ParseError};
use crate::field_parser;
use crate::record_reader::RecordReader;

use super::{parse_finite, BlockMeta, ColumnEntry, ColumnStats, ColumnType, Index, CURRENT_VERSION};

const READ_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeInference {
    On,
    Off,
}

struct BlockAccumulator {
    start_row: u64,
    start_offset: u64,
    stats: Vec<ColumnStats>,
}

impl BlockAccumulator {
    fn new(start_row: u64, start_offset: u64, num_columns: usize) -> Self {
        BlockAccumulator {
            start_row,
            start_offset,
            stats: (0..num_columns)
                .map(|_| ColumnStats {
                    min: Vec::new(),
                    max: Vec::new(),
                    empty_count: 0,
                })
                .collect(),
        }
    }

    fn observe(&mut self, column: usize, field: &[u8], column_ty: ColumnType) {
        let stats = &mut self.stats[column];

        if field.is_empty() {
            stats.empty_count += 1;
            return;
        }

        if stats.min.is_empty() && stats.max.is_empty() {
            stats.min = field.to_vec();
            stats.max = field.to_vec();
            return;
        }

        if less_than(field, &stats.min, column_ty) {
            stats.min = field.to_vec();
        }
        if less_than(&stats.max, field, column_ty) {
            stats.max = field.to_vec();
        }
    }

    fn finish(self, end_row: u64, end_offset: u64) -> BlockMeta {
        BlockMeta {
            start_row: self.start_row,
            end_row,
            start_offset: self.start_offset,
            end_offset,
            stats: self.stats,
        }
    }
}

fn less_than(a: &[u8], b: &[u8], ty: ColumnType) -> bool {
    if ty == ColumnType::Numeric {
        if let (Some(x), Some(y)) = (parse_finite(a), parse_finite(b)) {
            return x < y;
        }
    }
    a < b
}

/// Builds a block index over `path`. `block_size` rows per block.
pub fn build(path: &Path, block_size: u32, type_inference: TypeInference) -> EngineResult<Index> {
    assert!(block_size > 0, "block_size must be positive");

    let metadata = std::fs::metadata(path)?;
    let file_size = metadata.len() as i64;
    let file_mtime_ns = mtime_ns(&metadata)?;

    let header_fields = read_header_fields(path)?;
    let num_columns = header_fields.len();

    let mut file = File::open(path)?;
    let header_len = {
        let mut reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, &mut file);
        let mut probe = RecordReader::new(&mut reader);
        let mut buf = Vec::new();
        probe
            .read_raw(&mut buf)?
            .ok_or_else(|| EngineError::Parse(ParseError::new("empty file: no header row")))?
            .end_offset
    };
    file.seek(SeekFrom::Start(header_len))?;

    let mut reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, file);
    let mut record_reader = RecordReader::with_offset(&mut reader, header_len);

    let mut raw_buf = Vec::new();
    let mut fields = Vec::new();

    // --- Phase 1: buffer the first block's rows to learn column types ---
    let first_block_cap = block_size as usize;
    let mut buffered_rows: Vec<Vec<Vec<u8>>> = Vec::with_capacity(first_block_cap);
    let mut numeric_count = vec![0u64; num_columns];
    let mut nonempty_count = vec![0u64; num_columns];
    let mut row_index: u64 = 0;
    let mut first_block_end_offset = header_len;
    let mut exhausted_in_first_block = false;

    while (buffered_rows.len() as u32) < block_size {
        let raw = match record_reader.read_raw(&mut raw_buf)? {
            Some(raw) => raw,
            None => {
                exhausted_in_first_block = true;
                break;
            }
        };

        if raw_buf.is_empty() {
            continue; // skip trailing empty lines
        }

        field_parser::parse_record(&raw_buf, &mut fields)
            .map_err(|e| EngineError::Parse(ParseError::at_row(e.message, row_index)))?;

        if fields.len() != num_columns {
            return Err(EngineError::Parse(ParseError::at_row(
                format!("expected {num_columns} fields, found {}", fields.len()),
                row_index,
            )));
        }

        let mut row_values = Vec::with_capacity(num_columns);
        for (c, field) in fields.iter().enumerate() {
            if !field.is_empty() {
                nonempty_count[c] += 1;
                if type_inference == TypeInference::On && parse_finite(field).is_some() {
                    numeric_count[c] += 1;
                }
            }
            row_values.push(field.to_vec());
        }
        buffered_rows.push(row_values);

        row_index += 1;
        first_block_end_offset = record_reader.offset();
        let _ = raw;
    }

    let column_types = infer_types(type_inference, num_columns, &numeric_count, &nonempty_count);

    let mut blocks = Vec::new();

    if !buffered_rows.is_empty() {
        let mut first_block = BlockAccumulator::new(0, header_len, num_columns);
        for row_values in &buffered_rows {
            for (c, value) in row_values.iter().enumerate() {
                first_block.observe(c, value, column_types[c]);
            }
        }
        blocks.push(first_block.finish(row_index, first_block_end_offset));
    }

    // --- Phase 2: single-pass accumulation for every later block ---
    let mut current =
        BlockAccumulator::new(row_index, first_block_end_offset, num_columns);
    let mut rows_in_block: u64 = 0;

    if !exhausted_in_first_block {
        loop {
            let raw = match record_reader.read_raw(&mut raw_buf)? {
                Some(raw) => raw,
                None => break,
            };

            if raw_buf.is_empty() {
                continue;
            }

            field_parser::parse_record(&raw_buf, &mut fields)
                .map_err(|e| EngineError::Parse(ParseError::at_row(e.message, row_index)))?;

            if fields.len() != num_columns {
                return Err(EngineError::Parse(ParseError::at_row(
                    format!("expected {num_columns} fields, found {}", fields.len()),
                    row_index,
                )));
            }

            for (c, field) in fields.iter().enumerate() {
                current.observe(c, field, column_types[c]);
            }

            row_index += 1;
            rows_in_block += 1;
            let _ = raw;

            if rows_in_block == u64::from(block_size) {
                let end_offset = record_reader.offset();
                blocks.push(current.finish(row_index, end_offset));
                rows_in_block = 0;
                current = BlockAccumulator::new(row_index, end_offset, num_columns);
            }
        }

        if rows_in_block > 0 {
            let end_offset = record_reader.offset();
            blocks.push(current.finish(row_index, end_offset));
        }
    }

    let columns = header_fields
        .into_iter()
        .zip(column_types)
        .map(|(name, ty)| ColumnEntry { name, ty })
        .collect();

    let index = Index {
        version: CURRENT_VERSION,
        block_size,
        file_size,
        file_mtime_ns,
        columns,
        blocks,
    };

    index
        .check_invariants()
        .expect("builder produced an invalid index");
    Ok(index)
}

fn infer_types(
    type_inference: TypeInference,
    num_columns: usize,
    numeric_count: &[u64],
    nonempty_count: &[u64],
) -> Vec<ColumnType> {
    if type_inference == TypeInference::Off {
        return vec![ColumnType::String; num_columns];
    }

    (0..num_columns)
        .map(|c| {
            if nonempty_count[c] > 0 && 5 * numeric_count[c] >= 4 * nonempty_count[c] {
                ColumnType::Numeric
            } else {
                ColumnType::String
            }
        })
        .collect()
}

fn read_header_fields(path: &Path) -> EngineResult<Vec<String>> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, file);
    let mut record_reader = RecordReader::new(&mut reader);
    let mut buf = Vec::new();

    record_reader
        .read_raw(&mut buf)?
        .ok_or_else(|| EngineError::Parse(ParseError::new("empty file: no header row")))?;

    let mut fields = Vec::new();
    field_parser::parse_record(&buf, &mut fields)
        .map_err(|e| EngineError::Parse(ParseError::at_row(e.message, 0)))?;

    Ok(fields
        .iter()
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect())
}

#[cfg(unix)]
fn mtime_ns(metadata: &std::fs::Metadata) -> EngineResult<i64> {
    use std::os::unix::fs::MetadataExt;
    Ok(metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec())
}

#[cfg(not(unix))]
fn mtime_ns(metadata: &std::fs::Metadata) -> EngineResult<i64> {
    let modified = metadata.modified()?;
    let duration = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(duration.as_nanos() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(contents: &str) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file.into_temp_path()
    }

    #[test]
    fn builds_contiguous_blocks() {
        let path = write_temp_csv("id,country\n1,UK\n2,US\n3,UK\n4,UK\n5,US\n");
        let index = build(&path, 2, TypeInference::On).unwrap();

        assert_eq!(index.blocks.len(), 3);
        assert_eq!(index.blocks[0].start_row, 0);
        assert_eq!(index.blocks[0].end_row, 2);
        assert_eq!(index.blocks[2].start_row, 4);
        assert_eq!(index.blocks[2].end_row, 5);
        index.check_invariants().unwrap();
    }

    #[test]
    fn infers_numeric_column_type() {
        let path = write_temp_csv("id,country\n1,UK\n2,US\n3,UK\n");
        let index = build(&path, 10, TypeInference::On).unwrap();
        assert_eq!(index.columns[0].ty, ColumnType::Numeric);
        assert_eq!(index.columns[1].ty, ColumnType::String);
    }

    #[test]
    fn type_inference_off_forces_string() {
        let path = write_temp_csv("id,country\n1,UK\n2,US\n");
        let index = build(&path, 10, TypeInference::Off).unwrap();
        assert!(index.columns.iter().all(|c| c.ty == ColumnType::String));
    }

    #[test]
    fn numeric_min_max_use_numeric_order_not_lexicographic() {
        // Lexicographically "9" > "10", numerically 9 < 10.
        let path = write_temp_csv("n\n9\n10\n2\n");
        let index = build(&path, 10, TypeInference::On).unwrap();
        assert_eq!(index.columns[0].ty, ColumnType::Numeric);
        assert_eq!(index.blocks[0].stats[0].min, b"2");
        assert_eq!(index.blocks[0].stats[0].max, b"10");
    }

    #[test]
    fn empty_field_updates_only_empty_count() {
        let path = write_temp_csv("id,country\n1,\n2,US\n");
        let index = build(&path, 10, TypeInference::On).unwrap();
        assert_eq!(index.blocks[0].stats[1].empty_count, 1);
        assert_eq!(index.blocks[0].stats[1].min, b"US");
    }

    #[test]
    fn malformed_row_aborts_with_row_index() {
        let path = write_temp_csv("id,country\n1,UK\n2\n");
        let err = build(&path, 10, TypeInference::On).unwrap_err();
        match err {
            EngineError::Parse(e) => assert_eq!(e.row, Some(1)),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn second_block_honors_inferred_type_directly() {
        let path = write_temp_csv("n\n1\n2\n9\n10\n2\n");
        let index = build(&path, 2, TypeInference::On).unwrap();
        assert_eq!(index.blocks.len(), 3);
        assert_eq!(index.blocks[1].stats[0].min, b"9");
        assert_eq!(index.blocks[1].stats[0].max, b"10");
    }
}
