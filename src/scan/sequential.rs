//! Non-indexed streaming scan and indexed scan-with-seek.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use crate::config::EngineConfig;
use crate::diagnostics;
use crate::error::EngineResult;
use crate::eval::eval;
use crate::field_parser;
use crate::index::pruner::can_prune;
use crate::index::Index;
use crate::record_reader::RecordReader;

use super::{write_projected_row, ScanContext};

const NON_INDEXED_BUFFER_CAPACITY: usize = 256 * 1024;

/// Streams every row from `reader`, applying the predicate and
/// projection, stopping at `ctx.limit`. Used for stdin mode and the
/// plain (no-index) file path alike; both hand in a reader already
/// positioned right after the header.
pub fn scan_stream<R: BufRead, W: Write>(
    reader: R,
    ctx: &ScanContext,
    config: &EngineConfig,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    let mut record_reader = RecordReader::new(reader);
    let mut raw_buf = Vec::new();
    let mut fields = Vec::new();
    let mut emitted: u64 = 0;
    let mut since_flush: usize = 0;

    while ctx.limit.map_or(true, |n| emitted < n) {
        let Some(_raw) = record_reader.read_raw(&mut raw_buf)? else {
            break;
        };
        if raw_buf.is_empty() {
            continue;
        }

        field_parser::parse_record(&raw_buf, &mut fields)?;

        let matches = match &ctx.predicate {
            Some(expr) => eval(expr, &ctx.header, &fields),
            None => true,
        };

        if matches {
            write_projected_row(out, &ctx.projection, &fields)?;
            emitted += 1;
            since_flush += 1;
            if since_flush >= config.flush_every {
                out.flush()?;
                since_flush = 0;
            }
        }
    }

    out.flush()?;
    Ok(emitted)
}

/// Opens `path` with a 256 KiB buffer and streams it with no index.
pub fn scan_file_sequential<W: Write>(
    path: &Path,
    header_len: u64,
    ctx: &ScanContext,
    config: &EngineConfig,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(header_len))?;
    let reader = BufReader::with_capacity(NON_INDEXED_BUFFER_CAPACITY, file);
    scan_stream(reader, ctx, config, out)
}

/// Scans `path` using `index` to seek past pruned blocks.
/// Requires a predicate; callers without one should use
/// [`scan_file_sequential`] instead, since there is nothing to prune.
pub fn scan_file_indexed<W: Write>(
    path: &Path,
    index: &Index,
    ctx: &ScanContext,
    config: &EngineConfig,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    let pruned: Vec<bool> = match &ctx.predicate {
        Some(expr) => index.blocks.iter().map(|b| can_prune(index, b, expr)).collect(),
        None => vec![false; index.blocks.len()],
    };
    diagnostics::prune_summary(config, pruned.iter().filter(|&&p| p).count(), pruned.len());

    let Some(first_live) = pruned.iter().position(|&p| !p) else {
        out.flush()?;
        return Ok(0);
    };

    let mut file = File::open(path)?;
    let start_offset = index.blocks[first_live].start_offset;
    file.seek(SeekFrom::Start(start_offset))?;
    diagnostics::seek_target(config, first_live, start_offset);

    let mut reader = BufReader::with_capacity(NON_INDEXED_BUFFER_CAPACITY, file);
    let mut record_reader = RecordReader::with_offset(&mut reader, start_offset);

    let mut raw_buf = Vec::new();
    let mut fields = Vec::new();
    let mut emitted: u64 = 0;
    let mut since_flush: usize = 0;
    let mut row_index = index.blocks[first_live].start_row;
    let mut current_block = first_live;

    'scan: loop {
        if ctx.limit.map_or(false, |n| emitted >= n) {
            break;
        }
        if current_block >= index.blocks.len() {
            break;
        }

        // Crossed into the next block: skip forward over any further
        // pruned runs before reading its rows. Only a skip forces a
        // seek; stepping into the immediately following (non-pruned)
        // block is already where the stream sits.
        if row_index >= index.blocks[current_block].end_row {
            current_block += 1;
            let mut skipped_a_block = false;
            while current_block < index.blocks.len() && pruned[current_block] {
                current_block += 1;
                skipped_a_block = true;
            }
            if current_block >= index.blocks.len() {
                break;
            }

            row_index = index.blocks[current_block].start_row;

            if skipped_a_block {
                let target_offset = index.blocks[current_block].start_offset;
                drop(record_reader);
                let mut file = reader.into_inner();
                file.seek(SeekFrom::Start(target_offset))?;
                diagnostics::seek_target(config, current_block, target_offset);
                reader = BufReader::with_capacity(NON_INDEXED_BUFFER_CAPACITY, file);
                record_reader = RecordReader::with_offset(&mut reader, target_offset);
            }
            continue 'scan;
        }

        let Some(_raw) = record_reader.read_raw(&mut raw_buf)? else {
            break;
        };
        if raw_buf.is_empty() {
            // Builder never counts a skipped trailing blank as a row,
            // so neither does row_index here.
            continue;
        }

        field_parser::parse_record(&raw_buf, &mut fields)?;
        row_index += 1;

        let matches = match &ctx.predicate {
            Some(expr) => eval(expr, &ctx.header, &fields),
            None => true,
        };

        if matches {
            write_projected_row(out, &ctx.projection, &fields)?;
            emitted += 1;
            since_flush += 1;
            if since_flush >= config.flush_every {
                out.flush()?;
                since_flush = 0;
            }
        }
    }

    out.flush()?;
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::index::TypeInference;
    use crate::predicate::Expr;
    use crate::scan::ResolvedProjection;
    use std::io::Write as _;

    fn write_temp_csv(contents: &str) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file.into_temp_path()
    }

    fn run_sequential(path: &Path, header: &[&str], predicate: Option<Expr>, limit: Option<u64>) -> String {
        let header = Header::from_fields(header.iter().map(|s| s.to_string()));
        let header_len = {
            let contents = std::fs::read(path).unwrap();
            contents.iter().position(|&b| b == b'\n').unwrap() as u64 + 1
        };
        let ctx = ScanContext {
            projection: ResolvedProjection {
                ordinals: (0..header.len()).collect(),
            },
            header,
            predicate,
            limit,
        };
        let config = EngineConfig::builder().build();
        let mut out = csv::WriterBuilder::new().from_writer(Vec::new());
        scan_file_sequential(path, header_len, &ctx, &config, &mut out).unwrap();
        String::from_utf8(out.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn filters_and_projects_rows() {
        let path = write_temp_csv("id,country,total\n1,UK,50\n2,US,120\n3,UK,150\n");
        let out = run_sequential(
            &path,
            &["id", "country", "total"],
            Some(Expr::eq("country", "UK")),
            None,
        );
        assert_eq!(out, "1,UK,50\n3,UK,150\n");
    }

    #[test]
    fn limit_stops_early() {
        let path = write_temp_csv("id\n1\n2\n3\n");
        let out = run_sequential(&path, &["id"], None, Some(1));
        assert_eq!(out, "1\n");
    }

    #[test]
    fn indexed_scan_seeks_past_pruned_blocks() {
        let mut rows = String::from("bucket\n");
        for _ in 0..100 {
            rows.push_str("A\n");
        }
        for _ in 0..100 {
            rows.push_str("B\n");
        }
        let path = write_temp_csv(&rows);
        let index = crate::index::build(&path, 50, TypeInference::On).unwrap();
        assert_eq!(index.blocks.len(), 4);

        let header = Header::from_fields(["bucket"]);
        let ctx = ScanContext {
            projection: ResolvedProjection { ordinals: vec![0] },
            header,
            predicate: Some(Expr::eq("bucket", "B")),
            limit: Some(3),
        };
        let config = EngineConfig::builder().build();
        let mut out = csv::WriterBuilder::new().from_writer(Vec::new());
        let emitted = scan_file_indexed(&path, &index, &ctx, &config, &mut out).unwrap();
        assert_eq!(emitted, 3);
        let text = String::from_utf8(out.into_inner().unwrap()).unwrap();
        assert_eq!(text, "B\nB\nB\n");
    }
}
