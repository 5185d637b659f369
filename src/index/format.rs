//! `.sidx` binary layout: little-endian, position-dependent, version 3.

use std::io::{self, Read, Write};

use crate::error::{EngineError, EngineResult};

use super::{BlockMeta, ColumnEntry, ColumnStats, ColumnType, Index};

const MAGIC: &[u8; 4] = b"SIDX";
pub const CURRENT_VERSION: u32 = 3;
const MIN_SUPPORTED_VERSION: u32 = 1;

pub fn write<W: Write>(mut w: W, index: &Index) -> EngineResult<()> {
    w.write_all(MAGIC)?;
    write_u32(&mut w, index.version)?;
    write_u32(&mut w, index.block_size)?;
    write_u32(&mut w, index.blocks.len() as u32)?;
    write_i64(&mut w, index.file_size)?;
    write_i64(&mut w, index.file_mtime_ns)?;
    write_u32(&mut w, index.columns.len() as u32)?;

    for column in &index.columns {
        write_bytes(&mut w, column.name.as_bytes())?;
        w.write_all(&[column_type_tag(column.ty)])?;
    }

    for block in &index.blocks {
        write_u64(&mut w, block.start_row)?;
        write_u64(&mut w, block.end_row)?;
        write_u64(&mut w, block.start_offset)?;
        write_u64(&mut w, block.end_offset)?;

        for stats in &block.stats {
            write_bytes(&mut w, &stats.min)?;
            write_bytes(&mut w, &stats.max)?;
            write_u32(&mut w, stats.empty_count)?;
        }
    }

    w.flush()?;
    Ok(())
}

pub fn read<R: Read>(mut r: R) -> EngineResult<Index> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|_| EngineError::BadMagic)?;
    if &magic != MAGIC {
        return Err(EngineError::BadMagic);
    }

    let version = read_u32(&mut r)?;
    if version < MIN_SUPPORTED_VERSION || version > CURRENT_VERSION {
        return Err(EngineError::UnsupportedVersion(version));
    }
    let has_empty_count = version >= 3;

    let block_size = read_u32(&mut r)?;
    let num_blocks = read_u32(&mut r)?;
    let file_size = read_i64(&mut r)?;
    let file_mtime_ns = read_i64(&mut r)?;
    let columns_len = read_u32(&mut r)?;

    let mut columns = Vec::with_capacity(columns_len as usize);
    for _ in 0..columns_len {
        let name = String::from_utf8(read_bytes(&mut r)?)
            .map_err(|e| EngineError::InvalidIndex(format!("column name is not UTF-8: {e}")))?;
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        let ty = column_type_from_tag(tag[0])?;
        columns.push(ColumnEntry { name, ty });
    }

    let mut blocks = Vec::with_capacity(num_blocks as usize);
    for _ in 0..num_blocks {
        let start_row = read_u64(&mut r)?;
        let end_row = read_u64(&mut r)?;
        let start_offset = read_u64(&mut r)?;
        let end_offset = read_u64(&mut r)?;

        let mut stats = Vec::with_capacity(columns.len());
        for _ in 0..columns.len() {
            let min = read_bytes(&mut r)?;
            let max = read_bytes(&mut r)?;
            let empty_count = if has_empty_count { read_u32(&mut r)? } else { 0 };
            stats.push(ColumnStats { min, max, empty_count });
        }

        blocks.push(BlockMeta {
            start_row,
            end_row,
            start_offset,
            end_offset,
            stats,
        });
    }

    Ok(Index {
        version,
        block_size,
        file_size,
        file_mtime_ns,
        columns,
        blocks,
    })
}

fn column_type_tag(ty: ColumnType) -> u8 {
    match ty {
        ColumnType::String => 0,
        ColumnType::Numeric => 1,
    }
}

fn column_type_from_tag(tag: u8) -> EngineResult<ColumnType> {
    match tag {
        0 => Ok(ColumnType::String),
        1 => Ok(ColumnType::Numeric),
        other => Err(EngineError::InvalidIndex(format!(
            "unknown column type tag: {other}"
        ))),
    }
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Index {
        Index {
            version: CURRENT_VERSION,
            block_size: 2,
            file_size: 42,
            file_mtime_ns: 1_700_000_000_000,
            columns: vec![
                ColumnEntry {
                    name: "id".into(),
                    ty: ColumnType::Numeric,
                },
                ColumnEntry {
                    name: "country".into(),
                    ty: ColumnType::String,
                },
            ],
            blocks: vec![BlockMeta {
                start_row: 0,
                end_row: 2,
                start_offset: 0,
                end_offset: 10,
                stats: vec![
                    ColumnStats {
                        min: b"1".to_vec(),
                        max: b"2".to_vec(),
                        empty_count: 0,
                    },
                    ColumnStats {
                        min: b"UK".to_vec(),
                        max: b"US".to_vec(),
                        empty_count: 1,
                    },
                ],
            }],
        }
    }

    #[test]
    fn round_trips_byte_identically() {
        let index = sample_index();
        let mut buf = Vec::new();
        write(&mut buf, &index).unwrap();
        let read_back = read(&buf[..]).unwrap();

        let mut buf2 = Vec::new();
        write(&mut buf2, &read_back).unwrap();
        assert_eq!(buf, buf2);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = read(&b"NOPE"[..]).unwrap_err();
        assert!(matches!(err, EngineError::BadMagic));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&999u32.to_le_bytes());
        let err = read(&buf[..]).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedVersion(999)));
    }
}
