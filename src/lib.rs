//! A streaming, block-indexed CSV query engine.
//!
//! Given a [`Query`] over a single CSV file, streams matching rows to
//! a CSV output writer, choosing among a sequential scan, an
//! index-guided seek scan, and a parallel chunked scan depending on
//! file size, the presence of a valid `.sidx` sidecar, and the query's
//! `LIMIT`. The SQL text that produces a `Query` is out of scope here;
//! build one directly with [`Query::builder`].

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod field_parser;
pub mod header;
pub mod index;
pub mod planner;
pub mod predicate;
pub mod query;
pub mod record_reader;
pub mod scan;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use predicate::{BinaryOp, CompareOp, Comparison, Expr};
pub use query::{Projection, Query, QueryBuilder, Source};

use std::io::Write;

/// Runs `query` against its source, writing CSV to `out`. Thin
/// convenience wrapper over [`planner::run`] that reads execution
/// hints from the environment once.
pub fn execute<W: Write>(query: &Query, out: &mut csv::Writer<W>) -> EngineResult<u64> {
    let config = EngineConfig::from_env();
    planner::run(query, &config, out)
}

/// Runs `query` with an explicit [`EngineConfig`] instead of reading
/// the environment, for callers that already manage their own
/// configuration (e.g. a test harness pinning `parallelism`).
pub fn execute_with_config<W: Write>(
    query: &Query,
    config: &EngineConfig,
    out: &mut csv::Writer<W>,
) -> EngineResult<u64> {
    planner::run(query, config, out)
}
