//! Generic decode pass.
//!
//! Turns every frame of a capture into a [`PacketRecord`] in file order.
//! Frame numbers are file ordinals starting at 1; a frame that fails to
//! decode still consumes its number, so both decode passes agree on them.
//! Per-frame failures are recorded as warnings and the frame is skipped.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;
pub mod tcp;

use std::path::{Path, PathBuf};

use crate::config::AnalysisConfig;
use crate::knowledge::KnowledgeBase;
use crate::progress::{CancellationToken, Phase, ProgressSink, ProgressUpdate, percent_of};
use crate::record::PacketRecord;
use crate::source::{PacketSource, PcapFileSource};
use crate::warnings::WarningLog;

pub use error::{DecodeError, FrameError};
pub use parser::decode_frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub progress_interval: u64,
    pub cancel_check_interval: u64,
    pub keep_raw_bytes: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for DecodeOptions {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            progress_interval: config.progress_interval.max(1),
            cancel_check_interval: config.cancel_check_interval.max(1),
            keep_raw_bytes: config.keep_raw_bytes,
        }
    }
}

/// Result of a complete generic pass.
#[derive(Debug, Default)]
pub struct DecodedCapture {
    pub records: Vec<PacketRecord>,
    /// Frames read from the container, decoded or not.
    pub frames_read: u64,
    pub warnings: WarningLog,
}

pub struct CaptureDecoder {
    path: PathBuf,
    options: DecodeOptions,
}

impl CaptureDecoder {
    /// Check that `path` opens as a capture container.
    ///
    /// # Errors
    /// `DecodeError::CaptureOpen` when the file is missing, unreadable or
    /// not a pcap/pcapng container.
    pub fn open(path: impl AsRef<Path>, options: DecodeOptions) -> Result<Self, DecodeError> {
        let path = path.as_ref().to_path_buf();
        open_source(&path)?;
        Ok(Self { path, options })
    }

    /// Pre-pass frame count, used as the denominator for progress.
    ///
    /// A container error ends the count early; the decode pass reports it.
    pub fn count_frames(&self, cancel: &CancellationToken) -> Result<u64, DecodeError> {
        let mut source = open_source(&self.path)?;
        let mut count = 0u64;
        while let Ok(Some(_)) = source.next_packet() {
            count += 1;
            if count % self.options.cancel_check_interval == 0 && cancel.is_cancelled() {
                return Err(DecodeError::Cancelled);
            }
        }
        Ok(count)
    }

    /// Lazy record sequence over the capture. Every call starts from the
    /// first frame again.
    pub fn records(&self) -> Result<CaptureRecords, DecodeError> {
        Ok(CaptureRecords {
            source: Box::new(open_source(&self.path)?),
            tracker: tcp::TcpTracker::new(),
            keep_raw_bytes: self.options.keep_raw_bytes,
            frame_number: 0,
            last_ts: 0.0,
            finished: false,
            warnings: WarningLog::new(),
        })
    }

    /// Run the whole pass, feeding `knowledge` as records are produced.
    ///
    /// Progress is reported every `progress_interval` frames and
    /// cancellation is checked every `cancel_check_interval` frames.
    pub fn decode(
        &self,
        knowledge: &mut KnowledgeBase,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DecodedCapture, DecodeError> {
        progress.report(ProgressUpdate::new(Phase::Counting, "counting frames", 0));
        let total = self.count_frames(cancel)?;
        tracing::debug!(path = %self.path.display(), total, "starting generic decode");

        let mut records = self.records()?;
        let mut decoded = Vec::with_capacity(total as usize);
        let mut last_frame = 0u64;
        while let Some(record) = records.next() {
            knowledge.observe(&record);
            decoded.push(record);

            let frame = records.frames_read();
            for checkpoint in last_frame + 1..=frame {
                if checkpoint % self.options.cancel_check_interval == 0 && cancel.is_cancelled() {
                    return Err(DecodeError::Cancelled);
                }
                if checkpoint % self.options.progress_interval == 0 {
                    progress.report(ProgressUpdate::new(
                        Phase::Decoding,
                        format!("decoded {checkpoint} of {total} frames"),
                        percent_of(checkpoint, total),
                    ));
                }
            }
            last_frame = frame;
        }
        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }

        let frames_read = records.frames_read();
        progress.report(ProgressUpdate::new(
            Phase::Decoding,
            format!("decoded {frames_read} frames"),
            100,
        ));
        tracing::info!(
            frames = frames_read,
            records = decoded.len(),
            warnings = records.warnings().len(),
            "generic decode finished"
        );
        Ok(DecodedCapture {
            records: decoded,
            frames_read,
            warnings: records.into_warnings(),
        })
    }
}

fn open_source(path: &Path) -> Result<PcapFileSource, DecodeError> {
    PcapFileSource::open(path).map_err(|source| DecodeError::CaptureOpen {
        path: path.to_path_buf(),
        source,
    })
}

/// Pull-based record iterator. Frames that fail to decode are skipped and
/// noted in [`CaptureRecords::warnings`]; a container error ends the
/// sequence with a warning.
pub struct CaptureRecords {
    source: Box<dyn PacketSource>,
    tracker: tcp::TcpTracker,
    keep_raw_bytes: bool,
    frame_number: u64,
    last_ts: f64,
    finished: bool,
    warnings: WarningLog,
}

impl CaptureRecords {
    pub fn frames_read(&self) -> u64 {
        self.frame_number
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    pub fn into_warnings(self) -> WarningLog {
        self.warnings
    }
}

impl Iterator for CaptureRecords {
    type Item = PacketRecord;

    fn next(&mut self) -> Option<PacketRecord> {
        while !self.finished {
            let event = match self.source.next_packet() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(err) => {
                    self.finished = true;
                    self.warnings.push(
                        format!("after frame {}", self.frame_number),
                        format!("capture ends early: {err}"),
                    );
                    break;
                }
            };

            self.frame_number += 1;
            if let Some(ts) = event.ts {
                self.last_ts = ts;
            }
            match decode_frame(self.frame_number, self.last_ts, &event, &mut self.tracker) {
                Ok(mut record) => {
                    if self.keep_raw_bytes {
                        record.raw = Some(event.data);
                    }
                    return Some(record);
                }
                Err(err) => {
                    self.warnings
                        .push(format!("frame {}", self.frame_number), err.to_string());
                }
            }
        }
        None
    }
}
