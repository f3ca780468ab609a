//! Persisted analysis snapshots.
//!
//! A snapshot is a gzip-compressed JSON object holding one finished
//! analysis: statistics, the knowledge base projection and a packet list
//! (protocol-of-interest packets only, unless configured otherwise).
//! Top-level keys appear in this order:
//!
//! `version`, `createdAt`, `sourceFile`, `onlyProtocolPackets`,
//! `statistics`, `knowledgeBase`, `packets`, `packetCount`
//!
//! Packets never carry raw bytes, so a restored analysis is exact for
//! metadata and lossy for payloads.

pub mod error;
pub mod reader;
pub mod writer;

use serde::{Deserialize, Serialize};

use crate::analysis::{AggregateStatistics, build_report};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseSnapshot};
use crate::record::PacketRecord;
use crate::warnings::WarningLog;
use crate::{InputInfo, Report};

pub use error::SnapshotError;
pub use reader::{SnapshotInfo, read_snapshot, read_snapshot_from, validate_snapshot};
pub use writer::{SnapshotContents, write_snapshot, write_snapshot_to};

/// Format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Top-level keys.
pub(crate) mod keys {
    pub const VERSION: &str = "version";
    pub const CREATED_AT: &str = "createdAt";
    pub const SOURCE_FILE: &str = "sourceFile";
    pub const ONLY_PROTOCOL_PACKETS: &str = "onlyProtocolPackets";
    pub const STATISTICS: &str = "statistics";
    pub const KNOWLEDGE_BASE: &str = "knowledgeBase";
    pub const PACKETS: &str = "packets";
    pub const PACKET_COUNT: &str = "packetCount";

    /// Device list inside `knowledgeBase`.
    pub const DEVICES: &str = "devices";
}

/// A snapshot in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub version: u32,
    /// RFC3339 creation time.
    pub created_at: String,
    pub source_file: Option<String>,
    pub only_protocol_packets: bool,
    pub statistics: AggregateStatistics,
    pub knowledge_base: KnowledgeBaseSnapshot,
    pub packets: Vec<PacketRecord>,
}

impl AnalysisSnapshot {
    pub fn knowledge(&self) -> KnowledgeBase {
        KnowledgeBase::from_snapshot(self.knowledge_base.clone())
    }
}

/// A snapshot read back from storage, with the problems skipped on the way.
#[derive(Debug, Clone)]
pub struct RestoredSnapshot {
    pub snapshot: AnalysisSnapshot,
    pub warnings: WarningLog,
}

impl RestoredSnapshot {
    /// Rebuild a report without the original capture.
    pub fn report(&self, input: InputInfo) -> Report {
        build_report(
            input,
            &self.snapshot.statistics,
            &self.snapshot.knowledge(),
            &self.warnings,
            None,
        )
    }
}
