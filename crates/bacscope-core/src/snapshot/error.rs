use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid snapshot: {0}")]
    Invalid(String),
    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u32 },
    #[error("out of storage while writing snapshot after {written} packets")]
    ResourceExhausted { written: u64 },
    #[error("snapshot operation cancelled")]
    Cancelled,
}

impl SnapshotError {
    pub(crate) fn from_io(err: std::io::Error, written: u64) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull | std::io::ErrorKind::OutOfMemory => {
                SnapshotError::ResourceExhausted { written }
            }
            _ => SnapshotError::Io(err),
        }
    }
}
