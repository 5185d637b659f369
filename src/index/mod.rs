//! The in-memory block index.

mod builder;
mod format;
pub mod pruner;

pub use builder::{build, TypeInference};
pub use format::CURRENT_VERSION;

use std::path::Path;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Numeric,
}

#[derive(Debug, Clone)]
pub struct ColumnEntry {
    pub name: String,
    pub ty: ColumnType,
}

#[derive(Debug, Clone)]
pub struct ColumnStats {
    pub min: Vec<u8>,
    pub max: Vec<u8>,
    pub empty_count: u32,
}

#[derive(Debug, Clone)]
pub struct BlockMeta {
    pub start_row: u64,
    pub end_row: u64,
    pub start_offset: u64,
    pub end_offset: u64,
    pub stats: Vec<ColumnStats>,
}

impl BlockMeta {
    pub fn row_count(&self) -> u64 {
        self.end_row - self.start_row
    }
}

#[derive(Debug, Clone)]
pub struct Index {
    pub version: u32,
    pub block_size: u32,
    pub file_size: i64,
    pub file_mtime_ns: i64,
    pub columns: Vec<ColumnEntry>,
    pub blocks: Vec<BlockMeta>,
}

impl Index {
    /// Reads a `.sidx` file from `path`.
    pub fn load(path: &Path) -> EngineResult<Index> {
        let file = std::fs::File::open(path)?;
        format::read(std::io::BufReader::new(file))
    }

    /// Writes this index to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let file = std::fs::File::create(path)?;
        format::write(std::io::BufWriter::new(file), self)
    }

    /// Validates against the *current* metadata of the source file this
    /// index claims to describe.
    pub fn validate_against(
        &self,
        file_size: i64,
        file_mtime_ns: i64,
        source_header: &[String],
    ) -> EngineResult<()> {
        if self.file_size != file_size {
            return Err(EngineError::InvalidIndex("file size mismatch".into()));
        }

        if self.file_mtime_ns != file_mtime_ns {
            return Err(EngineError::InvalidIndex("mtime mismatch".into()));
        }

        if self.columns.len() != source_header.len() {
            return Err(EngineError::InvalidIndex(
                "column dictionary length mismatch".into(),
            ));
        }

        for (entry, header_name) in self.columns.iter().zip(source_header.iter()) {
            if entry.name.trim().to_lowercase() != header_name.trim().to_lowercase() {
                return Err(EngineError::InvalidIndex(
                    "column dictionary does not match source header".into(),
                ));
            }
        }

        self.check_invariants()
    }

    /// Checks structural invariants (contiguous row/byte ranges across
    /// blocks, consistent stats shape, min <= max per column). Called
    /// after every successful build and on every load.
    pub fn check_invariants(&self) -> EngineResult<()> {
        for (i, block) in self.blocks.iter().enumerate() {
            if !(block.start_row < block.end_row) {
                return Err(EngineError::InvalidIndex(format!(
                    "block {i}: start_row must be < end_row"
                )));
            }
            if !(block.start_offset <= block.end_offset) {
                return Err(EngineError::InvalidIndex(format!(
                    "block {i}: start_offset must be <= end_offset"
                )));
            }

            // Contiguity with the next block.
            if let Some(next) = self.blocks.get(i + 1) {
                if block.end_row != next.start_row {
                    return Err(EngineError::InvalidIndex(format!(
                        "block {i}/{}: row ranges are not contiguous",
                        i + 1
                    )));
                }
                if block.end_offset != next.start_offset {
                    return Err(EngineError::InvalidIndex(format!(
                        "block {i}/{}: byte ranges are not contiguous",
                        i + 1
                    )));
                }
            }

            if block.stats.len() != self.columns.len() {
                return Err(EngineError::InvalidIndex(format!(
                    "block {i}: stats length does not match column dictionary"
                )));
            }

            let row_count = block.row_count();

            for (c, stats) in block.stats.iter().enumerate() {
                if u64::from(stats.empty_count) > row_count {
                    return Err(EngineError::InvalidIndex(format!(
                        "block {i} column {c}: empty_count exceeds row count"
                    )));
                }

                let column_ty = self.columns[c].ty;
                if !min_le_max(&stats.min, &stats.max, column_ty) {
                    return Err(EngineError::InvalidIndex(format!(
                        "block {i} column {c}: min is not <= max"
                    )));
                }
            }
        }

        if self.columns.is_empty() && !self.blocks.is_empty() {
            return Err(EngineError::InvalidIndex(
                "column dictionary is empty but blocks carry stats".into(),
            ));
        }

        Ok(())
    }

    /// A human-readable summary for CLI-free inspection: block count
    /// and, per column, its inferred type and overall min/max across
    /// every block. Byte values are shown lossily via [`bstr`] since a
    /// min/max pair is not guaranteed to be valid UTF-8.
    pub fn describe(&self) -> String {
        use bstr::ByteSlice;
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "version {} | {} block(s) | block_size {}", self.version, self.blocks.len(), self.block_size);

        for (i, column) in self.columns.iter().enumerate() {
            let mut overall_min: Option<&[u8]> = None;
            let mut overall_max: Option<&[u8]> = None;

            for block in &self.blocks {
                let stats = &block.stats[i];
                if stats.min.is_empty() && stats.max.is_empty() {
                    continue;
                }
                if overall_min.map_or(true, |m| less_than_for_describe(&stats.min, m, column.ty)) {
                    overall_min = Some(&stats.min);
                }
                if overall_max.map_or(true, |m| less_than_for_describe(m, &stats.max, column.ty)) {
                    overall_max = Some(&stats.max);
                }
            }

            let ty = match column.ty {
                ColumnType::String => "string",
                ColumnType::Numeric => "numeric",
            };
            let _ = writeln!(
                out,
                "  {} ({ty}): min={} max={}",
                column.name,
                overall_min.map_or("-".to_string(), |b| b.to_str_lossy().into_owned()),
                overall_max.map_or("-".to_string(), |b| b.to_str_lossy().into_owned()),
            );
        }

        out
    }
}

fn less_than_for_describe(a: &[u8], b: &[u8], ty: ColumnType) -> bool {
    if ty == ColumnType::Numeric {
        if let (Some(x), Some(y)) = (parse_finite(a), parse_finite(b)) {
            return x < y;
        }
    }
    a < b
}

/// Compares `min` and `max` under the column's declared comparison:
/// numeric if `ty == Numeric` and both parse as finite doubles,
/// lexicographic (byte-wise) otherwise.
pub fn min_le_max(min: &[u8], max: &[u8], ty: ColumnType) -> bool {
    if ty == ColumnType::Numeric {
        if let (Some(a), Some(b)) = (parse_finite(min), parse_finite(max)) {
            return a <= b;
        }
    }
    min <= max
}

pub fn parse_finite(bytes: &[u8]) -> Option<f64> {
    fast_float2::parse::<f64, _>(bytes)
        .ok()
        .filter(|n: &f64| n.is_finite())
}

pub fn sidecar_path(source: &Path) -> std::path::PathBuf {
    let mut os = source.as_os_str().to_owned();
    os.push(".sidx");
    std::path::PathBuf::from(os)
}
