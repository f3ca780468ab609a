//! Capture container access.
//!
//! Sources only deal with framing: they hand out raw link-layer frames with
//! their capture metadata and leave every header decision to `decode`.

pub(crate) mod pcap;

pub use pcap::PcapFileSource;

use pcap_parser::Linktype;
use thiserror::Error;

/// One frame as stored in the capture container.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    /// Capture timestamp in seconds since the Unix epoch, when the block has one.
    pub ts: Option<f64>,
    pub linktype: Linktype,
    /// Length of the frame on the wire (may exceed `data.len()` when truncated).
    pub orig_len: u32,
    pub data: Vec<u8>,
}

pub trait PacketSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a pcap or pcapng file (magic {magic:02x?})")]
    NotACapture { magic: [u8; 4] },
    #[error("capture framing error ({context}): {message}")]
    Framing {
        context: &'static str,
        message: String,
    },
}

impl SourceError {
    pub(crate) fn framing(context: &'static str, err: impl std::fmt::Display) -> Self {
        SourceError::Framing {
            context,
            message: err.to_string(),
        }
    }
}
