//! Structured error taxonomy for the import pipeline.
//!
//! Failure classes mirror the stages of the pipeline: configuration problems
//! surface before any body I/O, encoding and parse problems kill the current
//! task, and integrity errors indicate a value that passed pass-1 inference
//! but failed to re-parse during pass-2 (a bug, never silently absorbed).

use std::path::PathBuf;

use thiserror::Error;

/// Hard ceiling on the size of a single decoded field, in bytes.
pub const MAX_FIELD_BYTES: usize = 128 * 1024;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unknown encoding '{0}' (expected utf8, utf16, or win1252)")]
    UnknownEncoding(String),

    #[error("Dialect option {option} must be exactly one character, got '{value}'")]
    BadDialectChar { option: &'static str, value: String },

    #[error("Unknown quoting mode '{0}'")]
    UnknownQuoting(String),

    #[error("Missing columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("{path:?} contains no records (end of file)")]
    EmptyFile { path: PathBuf },

    #[error("UTF-16 file has odd byte length ({0} bytes)")]
    OddUtf16Length(u64),

    #[error("Missing or malformed byte-order mark (got {0:02x?})")]
    BadBom(Vec<u8>),

    #[error("Short read inside a UTF-16 code unit")]
    ShortCodeUnit,

    #[error("Field exceeds {MAX_FIELD_BYTES} bytes at record {record}")]
    FieldTooLarge { record: usize },

    #[error("Record {record}: {message}")]
    Strict { record: usize, message: String },

    #[error("New-line character seen in unquoted field at record {record}")]
    StrayNewline { record: usize },

    #[error("Value '{value}' chosen as {dtype} in pass 1 failed to re-parse in pass 2")]
    Integrity { value: String, dtype: &'static str },

    #[error("Worker runner '{runner}' exited with status {status}")]
    WorkerFailed { runner: String, status: i32 },
}
