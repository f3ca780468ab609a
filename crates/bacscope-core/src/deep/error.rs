use std::io;

use thiserror::Error;

/// Fatal errors of the deep decode pass.
#[derive(Debug, Error)]
pub enum DeepDecodeError {
    /// The decoder executable is missing or not executable. Distinct from a
    /// run that matched nothing, which is an empty success.
    #[error("deep decoder `{tool}` is not available: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to start deep decoder `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("deep decoder I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("deep decoder exited with {status} without producing records: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("ran out of memory or staging space after {produced} records")]
    ResourceExhausted { produced: u64 },
    #[error("deep decoding cancelled")]
    Cancelled,
}

impl DeepDecodeError {
    /// Map a staging or buffering I/O failure, turning exhaustion into
    /// `ResourceExhausted`.
    pub fn from_io(err: io::Error, produced: u64) -> Self {
        if is_exhaustion(&err) {
            DeepDecodeError::ResourceExhausted { produced }
        } else {
            DeepDecodeError::Io(err)
        }
    }
}

pub fn is_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::StorageFull | io::ErrorKind::OutOfMemory
    )
}

/// Problems with one output line. The line is skipped with a warning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("expected at most {expected} columns, found {found}")]
    TooManyColumns { expected: usize, found: usize },
    #[error("missing frame number")]
    MissingFrameNumber,
    #[error("invalid value {value:?} for {field}")]
    InvalidField { field: String, value: String },
}
