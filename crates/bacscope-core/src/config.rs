//! Analysis configuration.
//!
//! Every field has a default so partial configuration files deserialize
//! cleanly; the CLI layers its flags on top.

use serde::{Deserialize, Serialize};

use crate::deep::command::{DEFAULT_DISPLAY_FILTER, DEFAULT_FIELDS, DEFAULT_TOOL};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 5_000;
pub const DEFAULT_CANCEL_CHECK_INTERVAL: u64 = 1_000;
pub const DEFAULT_BUCKET_SECONDS: u32 = 300;
pub const DEFAULT_SNAPSHOT_FLUSH_INTERVAL: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames between progress callbacks.
    pub progress_interval: u64,
    /// Frames between cancellation checks.
    pub cancel_check_interval: u64,
    /// Width of the throughput time buckets, in seconds.
    pub bucket_seconds: u32,
    /// Keep raw frame bytes on generic records.
    pub keep_raw_bytes: bool,
    pub deep_decoder: DeepDecoderConfig,
    pub snapshot: SnapshotConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
            bucket_seconds: DEFAULT_BUCKET_SECONDS,
            keep_raw_bytes: false,
            deep_decoder: DeepDecoderConfig::default(),
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Replace zero intervals with their defaults; a zero cadence would
    /// never fire.
    pub fn normalized(mut self) -> Self {
        if self.progress_interval == 0 {
            self.progress_interval = DEFAULT_PROGRESS_INTERVAL;
        }
        if self.cancel_check_interval == 0 {
            self.cancel_check_interval = DEFAULT_CANCEL_CHECK_INTERVAL;
        }
        if self.bucket_seconds == 0 {
            self.bucket_seconds = DEFAULT_BUCKET_SECONDS;
        }
        if self.snapshot.flush_interval == 0 {
            self.snapshot.flush_interval = DEFAULT_SNAPSHOT_FLUSH_INTERVAL;
        }
        if self.deep_decoder.fields.is_empty() {
            self.deep_decoder.fields = DeepDecoderConfig::default().fields;
        }
        self
    }
}

/// External deep decoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepDecoderConfig {
    pub enabled: bool,
    /// Executable name or path.
    pub tool: String,
    /// Read filter handed to the decoder.
    pub display_filter: String,
    /// Field extractors, in output column order.
    pub fields: Vec<String>,
}

impl Default for DeepDecoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tool: DEFAULT_TOOL.to_string(),
            display_filter: DEFAULT_DISPLAY_FILTER.to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Persist only protocol-of-interest packets.
    pub only_protocol_packets: bool,
    /// Records written between flushes and progress callbacks.
    pub flush_interval: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            only_protocol_packets: true,
            flush_interval: DEFAULT_SNAPSHOT_FLUSH_INTERVAL,
        }
    }
}
