//! Planner & dispatcher: the single entry point that turns a [`Query`]
//! into emitted output.

use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::config::EngineConfig;
use crate::diagnostics;
use crate::error::{EngineError, EngineResult, ParseError};
use crate::field_parser;
use crate::header::{canonicalize, Header};
use crate::index::{sidecar_path, Index};
use crate::query::{Projection, Query, Source};
use crate::record_reader::RecordReader;
use crate::scan::{sequential, ResolvedProjection, ScanContext};

/// Runs `query` to completion, writing CSV (header first, flushed
/// immediately) to `out`.
pub fn run<W: Write>(query: &Query, config: &EngineConfig, out: &mut csv::Writer<W>) -> EngineResult<u64> {
    match &query.source {
        Source::Stdin => run_stdin(query, config, out),
        Source::Path(path) => run_file(query, path, config, out),
    }
}

fn run_stdin<W: Write>(query: &Query, config: &EngineConfig, out: &mut csv::Writer<W>) -> EngineResult<u64> {
    let stdin = io::stdin();
    let mut record_reader = RecordReader::new(stdin.lock());
    let header = read_header(&mut record_reader)?;

    let projection = resolve_projection(&query.projection, &header)?;
    validate_predicate_columns(query, &header)?;
    diagnostics::strategy_chosen(config, "stdin");
    write_output_header(out, &projection, &header)?;

    let ctx = ScanContext {
        header,
        projection,
        predicate: query.predicate.clone(),
        limit: query.limit,
    };

    let stdin = io::stdin();
    let reader = BufReader::new(stdin.lock());
    sequential::scan_stream(reader, &ctx, config, out)
}

fn run_file<W: Write>(
    query: &Query,
    path: &Path,
    config: &EngineConfig,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    let file = std::fs::File::open(path)?;
    let metadata = file.metadata()?;
    let file_size = metadata.len();

    let mut probe = RecordReader::new(BufReader::new(file));
    let header = read_header(&mut probe)?;
    let header_len = probe.offset();

    let projection = resolve_projection(&query.projection, &header)?;
    validate_predicate_columns(query, &header)?;

    let index = load_valid_index(path, config, &metadata, &header);

    let ctx = ScanContext {
        header,
        projection,
        predicate: query.predicate.clone(),
        limit: query.limit,
    };
    write_output_header(out, &ctx.projection, &ctx.header)?;

    match index {
        Some(index) => {
            diagnostics::strategy_chosen(config, "indexed");
            sequential::scan_file_indexed(path, &index, &ctx, config, out)
        }
        None if config.should_use_parallel(file_size, query.limit) => {
            diagnostics::strategy_chosen(config, "parallel");
            crate::scan::parallel::scan_file_parallel(path, header_len, &ctx, config, out)
        }
        None => {
            diagnostics::strategy_chosen(config, "sequential");
            sequential::scan_file_sequential(path, header_len, &ctx, config, out)
        }
    }
}

fn read_header<R: BufRead>(record_reader: &mut RecordReader<R>) -> EngineResult<Header> {
    let mut buf = Vec::new();
    record_reader
        .read_raw(&mut buf)?
        .ok_or_else(|| EngineError::Parse(ParseError::new("empty source: no header row")))?;

    let mut fields = Vec::new();
    field_parser::parse_record(&buf, &mut fields)?;
    Ok(Header::from_fields(
        fields.iter().map(|f| String::from_utf8_lossy(f).into_owned()),
    ))
}

fn resolve_projection(projection: &Projection, header: &Header) -> EngineResult<ResolvedProjection> {
    let ordinals = match projection {
        Projection::All => (0..header.len()).collect(),
        Projection::Columns(names) => names
            .iter()
            .map(|name| header.resolve(&canonicalize(name)))
            .collect::<EngineResult<Vec<usize>>>()?,
    };
    Ok(ResolvedProjection { ordinals })
}

fn validate_predicate_columns(query: &Query, header: &Header) -> EngineResult<()> {
    let Some(predicate) = &query.predicate else {
        return Ok(());
    };
    let mut first_error = None;
    predicate.for_each_column(|column| {
        if first_error.is_none() && header.ordinal_of(column).is_none() {
            first_error = Some(EngineError::UnknownColumn(column.to_string()));
        }
    });
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn write_output_header<W: Write>(
    out: &mut csv::Writer<W>,
    projection: &ResolvedProjection,
    header: &Header,
) -> EngineResult<()> {
    out.write_record(&projection.output_header(header))?;
    out.flush()?;
    Ok(())
}

/// Loads `<source>.sidx` and revalidates it against the source's
/// *current* metadata. Any failure downgrades silently to "no index" —
/// a missing or stale sidecar is never a query error.
fn load_valid_index(
    source_path: &Path,
    config: &EngineConfig,
    metadata: &std::fs::Metadata,
    header: &Header,
) -> Option<Index> {
    let sidx_path = sidecar_path(source_path);
    let index = match Index::load(&sidx_path) {
        Ok(index) => index,
        Err(_) => return None,
    };

    let file_size = metadata.len() as i64;
    let file_mtime_ns = mtime_ns(metadata);

    match index.validate_against(file_size, file_mtime_ns, header.original()) {
        Ok(()) => {
            diagnostics::index_loaded(config, &sidx_path, index.blocks.len());
            Some(index)
        }
        Err(e) => {
            diagnostics::index_validation_failed(config, &sidx_path, &e.to_string());
            None
        }
    }
}

#[cfg(unix)]
fn mtime_ns(metadata: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec()
}

#[cfg(not(unix))]
fn mtime_ns(metadata: &std::fs::Metadata) -> i64 {
    let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
    let duration = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_nanos() as i64
}
