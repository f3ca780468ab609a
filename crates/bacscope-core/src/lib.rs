//! bacscope core library for offline BACnet capture analysis.
//!
//! A capture file goes through two independent decode passes: a fast
//! generic pass (`source` framing, `decode` header extraction,
//! `protocols` classification) and an optional deep pass through an
//! external dissector (`deep`). The enriched records are merged into the
//! generic set by frame number (`merge`), each pass feeds its own device
//! knowledge base (`knowledge`) and statistics are computed over the
//! merged records (`analysis::stats`). A finished analysis can be stored
//! as a compressed snapshot and restored without the capture (`snapshot`).
//!
//! Invariants:
//! - Frame numbers are 1-based file ordinals in both passes.
//! - Fragment-flagged records are kept but never aggregated.
//! - Per-frame problems become warnings; only setup failures, resource
//!   exhaustion and cancellation abort a run.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use bacscope_core::{AnalysisConfig, CancellationToken, NoProgress, analyze_capture};
//!
//! let outcome = analyze_capture(
//!     Path::new("capture.pcapng"),
//!     &AnalysisConfig::default(),
//!     &NoProgress,
//!     &CancellationToken::new(),
//! )?;
//! println!("devices: {}", outcome.knowledge.device_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

pub mod analysis;
pub mod config;
pub mod decode;
pub mod deep;
pub mod details;
pub mod knowledge;
pub mod merge;
pub mod progress;
pub mod protocols;
pub mod record;
pub mod snapshot;
pub mod source;
pub mod warnings;

pub use analysis::{
    AggregateStatistics, AnalysisError, AnalysisOutcome, analyze_capture, build_report,
    input_info,
};
pub use config::{AnalysisConfig, DeepDecoderConfig, SnapshotConfig};
pub use decode::{CaptureDecoder, DecodeError, DecodeOptions};
pub use deep::{DeepDecodeError, DeepDecoder};
pub use details::DetailMap;
pub use knowledge::{DeviceIdentity, KnowledgeBase, KnowledgeBaseSnapshot, TcpHealthCounters};
pub use merge::{MergeSummary, merge_packets};
pub use progress::{CancellationToken, NoProgress, Phase, ProgressSink, ProgressUpdate};
pub use protocols::classifier::classify;
pub use record::PacketRecord;
pub use snapshot::{
    AnalysisSnapshot, RestoredSnapshot, SnapshotError, read_snapshot, validate_snapshot,
    write_snapshot,
};
pub use source::{PacketEvent, PacketSource, PcapFileSource, SourceError};
pub use warnings::{Warning, WarningLog};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when no capture time is available.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

/// Analysis report with deterministic ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    pub tool: ToolInfo,
    /// RFC3339 timestamp derived from the capture, not the wall clock.
    pub generated_at: String,
    pub input: InputInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_summary: Option<CaptureSummary>,
    /// Per hierarchy key (`base` or `base/application`), sorted by key.
    pub protocols: Vec<ProtocolSummary>,
    /// BACnet frames per service, most frequent first.
    #[serde(default)]
    pub services: Vec<ServiceSummary>,
    /// Known devices sorted by address.
    pub devices: Vec<DeviceSummary>,
    pub health: HealthSummary,
    pub top_sources: Vec<TalkerSummary>,
    pub top_destinations: Vec<TalkerSummary>,
    /// Present when a deep pass was merged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeSummary>,
    pub warnings: Vec<Warning>,
}

/// Tool metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Input capture metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the analyzer.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

/// Capture totals over non-fragmented records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub packets_total: u64,
    pub bytes_total: u64,
    pub fragments_excluded: u64,
    /// RFC3339 timestamp of the first packet (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC3339 timestamp of the last packet (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
    pub duration_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSummary {
    pub protocol: String,
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    /// Service name, or the APDU type for frames without a service.
    pub service: String,
    pub packets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Instance confirmed by an identity announcement.
    pub announced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    #[serde(flatten)]
    pub counters: TcpHealthCounters,
    pub loss_events: u64,
    /// Loss events per TCP frame, in percent.
    pub loss_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkerSummary {
    pub address: String,
    pub packets: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_omits_optional_fields_when_none() {
        let report = Report {
            report_version: REPORT_VERSION,
            tool: ToolInfo {
                name: "bacscope".to_string(),
                version: "0.1.0".to_string(),
            },
            generated_at: DEFAULT_GENERATED_AT.to_string(),
            input: InputInfo {
                path: "capture.pcapng".to_string(),
                bytes: 1,
            },
            capture_summary: Some(CaptureSummary {
                packets_total: 1,
                bytes_total: 60,
                fragments_excluded: 0,
                time_start: None,
                time_end: None,
                duration_s: 0.0,
            }),
            protocols: vec![],
            services: vec![],
            devices: vec![DeviceSummary {
                address: "10.0.0.5".to_string(),
                instance: None,
                name: None,
                vendor: None,
                announced: false,
            }],
            health: HealthSummary {
                counters: TcpHealthCounters::default(),
                loss_events: 0,
                loss_percentage: 0.0,
            },
            top_sources: vec![],
            top_destinations: vec![],
            merge: None,
            warnings: vec![],
        };

        let json = serde_json::to_value(&report).expect("serialize report");
        let summary = json
            .get("capture_summary")
            .and_then(|value| value.as_object())
            .expect("capture_summary object");
        assert!(!summary.contains_key("time_start"));
        assert!(!summary.contains_key("time_end"));
        assert!(json.get("merge").is_none());
        let device = json["devices"][0].as_object().expect("device object");
        assert!(!device.contains_key("instance"));
        assert_eq!(json["health"]["retransmissions"], 0);
    }
}
