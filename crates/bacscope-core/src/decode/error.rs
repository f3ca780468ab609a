use std::path::PathBuf;

use thiserror::Error;

use crate::source::SourceError;

/// Fatal errors of the generic decode pass.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open capture {path}: {source}")]
    CaptureOpen {
        path: PathBuf,
        #[source]
        source: SourceError,
    },
    #[error("decoding cancelled")]
    Cancelled,
}

/// Per-frame problems. These never abort a pass: the frame is logged and
/// skipped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("packet slice error: {0}")]
    Slice(String),
    #[error("frame too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("unsupported linktype {0}")]
    UnsupportedLinktype(i32),
}
