use std::fmt;
use std::io;

/// The crate-wide error taxonomy.
///
/// Index load/validation errors never reach this type directly: the
/// planner downgrades them to a diagnostic and falls back to the
/// non-indexed path instead of propagating them to the caller.
#[derive(Debug)]
pub enum EngineError {
    Io(io::Error),
    Parse(ParseError),
    UnknownColumn(String),
    BadMagic,
    UnsupportedVersion(u32),
    InvalidIndex(String),
    Cancelled,
}

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub row: Option<u64>,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            row: None,
        }
    }

    pub fn at_row(message: impl Into<String>, row: u64) -> Self {
        ParseError {
            message: message.into(),
            row: Some(row),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "parse error at row {}: {}", row, self.message),
            None => write!(f, "parse error: {}", self.message),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::Io(e) => e.fmt(f),
            EngineError::Parse(e) => e.fmt(f),
            EngineError::UnknownColumn(name) => write!(f, "unknown column: {}", name),
            EngineError::BadMagic => write!(f, "not a .sidx file (bad magic bytes)"),
            EngineError::UnsupportedVersion(v) => write!(f, "unsupported .sidx version: {}", v),
            EngineError::InvalidIndex(msg) => write!(f, "invalid index: {}", msg),
            EngineError::Cancelled => write!(f, "query cancelled"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> EngineError {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return EngineError::Cancelled;
        }
        EngineError::Io(err)
    }
}

impl From<ParseError> for EngineError {
    fn from(err: ParseError) -> EngineError {
        EngineError::Parse(err)
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> EngineError {
        if !err.is_io_error() {
            return EngineError::Parse(ParseError::new(err.to_string()));
        }
        match err.into_kind() {
            csv::ErrorKind::Io(io_err) => EngineError::from(io_err),
            _ => unreachable!(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
