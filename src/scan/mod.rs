//! Shared scanning machinery used by both the sequential and parallel
//! scanners: the resolved projection, the per-query context threaded
//! through a scan, and the output-row writer.

pub mod parallel;
pub mod sequential;

use std::io::Write;

use crate::error::EngineResult;
use crate::header::Header;
use crate::predicate::Expr;

/// Projection resolved against the header once by the planner (spec
/// §4.5 step 3): either every ordinal in header order, or the ordinals
/// of the requested columns in request order.
#[derive(Debug, Clone)]
pub struct ResolvedProjection {
    pub ordinals: Vec<usize>,
}

impl ResolvedProjection {
    pub fn output_header(&self, header: &Header) -> Vec<String> {
        self.ordinals
            .iter()
            .map(|&i| header.original()[i].clone())
            .collect()
    }
}

/// Everything a scanner needs about the query that does not change
/// while rows are being produced.
#[derive(Clone)]
pub struct ScanContext {
    pub header: Header,
    pub projection: ResolvedProjection,
    pub predicate: Option<Expr>,
    pub limit: Option<u64>,
}

/// Writes the projected fields of `record` to `writer`, in projection
/// order. A row shorter than the header (a ragged source row) yields
/// an empty field for any missing ordinal, matching how a standard CSV
/// writer pads short records.
pub fn write_projected_row<W: Write>(
    writer: &mut csv::Writer<W>,
    projection: &ResolvedProjection,
    record: &[impl AsRef<[u8]>],
) -> EngineResult<()> {
    writer.write_record(
        projection
            .ordinals
            .iter()
            .map(|&i| record.get(i).map(|f| f.as_ref()).unwrap_or(b"")),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_header_follows_projection_order() {
        let header = Header::from_fields(["id", "country", "total"]);
        let projection = ResolvedProjection {
            ordinals: vec![2, 0],
        };
        assert_eq!(projection.output_header(&header), vec!["total", "id"]);
    }

    #[test]
    fn write_projected_row_pads_missing_ordinals() {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        let projection = ResolvedProjection { ordinals: vec![0, 2] };
        let record: Vec<&[u8]> = vec![b"1"];
        write_projected_row(&mut writer, &projection, &record).unwrap();
        writer.flush().unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "1,\n");
    }
}
