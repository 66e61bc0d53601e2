//! Error types for the generator.
//!
//! Every generation-time failure is fatal: the run stops before any
//! artifact is written and `main` reports the error with a non-zero exit.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single `<type> <name>` item of a declaration was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeclFault {
    #[error("pass arrays to system calls as pointers")]
    Array,
    #[error("use a typedef for function pointer parameters")]
    FunctionPointer,
    #[error("expected `<type> <name>`")]
    Unparseable,
    #[error("parameter name is used by the generated wrapper (`more`, `ret64`, `parmN`)")]
    ReservedName,
}

#[derive(Debug, Error)]
pub enum GenError {
    #[error("record {record}: in declaration of `{decl}`: `{item}`: {fault}")]
    Malformed {
        record: usize,
        decl: String,
        item: String,
        fault: DeclFault,
    },

    #[error("record {record}: duplicate system call `{name}` (first declared in {first_unit})")]
    Duplicate {
        record: usize,
        name: String,
        first_unit: String,
    },

    #[error("system calls `{first}` and `{second}` both map to id `{symbol}`")]
    IdCollision {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("system call `{name}` maps to `{symbol}`, which is reserved")]
    ReservedId { name: String, symbol: String },

    #[error("record {record}: unit `{unit}`: {reason}")]
    UnitPath {
        record: usize,
        unit: String,
        reason: String,
    },

    #[error("`{name}` is listed as {setting} but no such system call is declared")]
    UnknownCall { name: String, setting: &'static str },

    #[error("`{name}` is listed as both strong and disabled")]
    ConflictingBinding { name: String },

    #[error("invalid system call list: {0}")]
    Input(#[from] serde_json::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GenError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GenError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable diagnostic code, used by `sysgen check --json`.
    pub fn code(&self) -> &'static str {
        match self {
            GenError::Malformed { .. } => "SIG_001",
            GenError::Duplicate { .. } => "SIG_002",
            GenError::IdCollision { .. } => "SIG_003",
            GenError::ReservedId { .. } => "SIG_004",
            GenError::UnitPath { .. } => "SIG_005",
            GenError::UnknownCall { .. } => "CFG_001",
            GenError::ConflictingBinding { .. } => "CFG_002",
            GenError::Input(_) => "INP_001",
            GenError::Io { .. } => "IO_001",
            GenError::Internal(_) => "INT_001",
        }
    }

    /// Index of the offending input record, when the error points at one.
    pub fn record(&self) -> Option<usize> {
        match self {
            GenError::Malformed { record, .. }
            | GenError::Duplicate { record, .. }
            | GenError::UnitPath { record, .. } => Some(*record),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
