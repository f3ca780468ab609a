use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::analysis::{AggregateStatistics, AnalysisOutcome};
use crate::config::SnapshotConfig;
use crate::knowledge::KnowledgeBase;
use crate::progress::{CancellationToken, Phase, ProgressSink, ProgressUpdate, percent_of};
use crate::record::PacketRecord;

use super::error::SnapshotError;
use super::{SNAPSHOT_VERSION, keys};

/// Borrowed view of what goes into a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotContents<'a> {
    pub source_file: Option<&'a str>,
    pub statistics: &'a AggregateStatistics,
    pub knowledge: &'a KnowledgeBase,
    pub packets: &'a [PacketRecord],
}

impl<'a> From<&'a AnalysisOutcome> for SnapshotContents<'a> {
    fn from(outcome: &'a AnalysisOutcome) -> Self {
        Self {
            source_file: outcome.source.to_str(),
            statistics: &outcome.statistics,
            knowledge: &outcome.knowledge,
            packets: &outcome.records,
        }
    }
}

/// Write a snapshot to `path`.
///
/// The document is staged next to `path` and moved into place once
/// complete, so a failed write never leaves a truncated snapshot behind.
/// Returns the number of packets written.
pub fn write_snapshot(
    path: &Path,
    contents: SnapshotContents<'_>,
    config: &SnapshotConfig,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64, SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let staged = tempfile::NamedTempFile::new_in(dir)?;
    let written = write_snapshot_to(
        BufWriter::new(staged.as_file()),
        contents,
        config,
        progress,
        cancel,
    )?;
    staged
        .persist(path)
        .map_err(|err| SnapshotError::from_io(err.error, written))?;
    tracing::info!(path = %path.display(), packets = written, "snapshot written");
    Ok(written)
}

/// Stream a compressed snapshot into `output`.
///
/// Packets are serialized one at a time; every `flush_interval` packets the
/// compressor is flushed, progress is reported and cancellation checked.
pub fn write_snapshot_to<W: Write>(
    output: W,
    contents: SnapshotContents<'_>,
    config: &SnapshotConfig,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64, SnapshotError> {
    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| SnapshotError::Invalid(err.to_string()))?;
    let flush_interval = config.flush_interval.max(1);
    let only_protocol = config.only_protocol_packets;
    let selected = contents
        .packets
        .iter()
        .filter(|record| !only_protocol || record.is_protocol_of_interest());
    let total = if only_protocol {
        contents
            .packets
            .iter()
            .filter(|r| r.is_protocol_of_interest())
            .count() as u64
    } else {
        contents.packets.len() as u64
    };

    let mut doc = DocumentWriter::new(GzEncoder::new(output, Compression::default()));
    doc.raw("{")?;
    doc.field(keys::VERSION, &SNAPSHOT_VERSION, true)?;
    doc.field(keys::CREATED_AT, &created_at, false)?;
    doc.field(keys::SOURCE_FILE, &contents.source_file, false)?;
    doc.field(keys::ONLY_PROTOCOL_PACKETS, &only_protocol, false)?;
    doc.field(keys::STATISTICS, contents.statistics, false)?;
    doc.field(keys::KNOWLEDGE_BASE, &contents.knowledge.snapshot(), false)?;
    doc.key(keys::PACKETS, false)?;
    doc.raw("[")?;
    for record in selected {
        if doc.written > 0 {
            doc.raw(",")?;
        }
        doc.value(record)?;
        doc.written += 1;

        if doc.written % flush_interval == 0 {
            doc.flush()?;
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }
            progress.report(ProgressUpdate::new(
                Phase::SnapshotWrite,
                format!("wrote {} of {total} packets", doc.written),
                percent_of(doc.written, total),
            ));
        }
    }
    doc.raw("]")?;
    let written = doc.written;
    doc.field(keys::PACKET_COUNT, &written, false)?;
    doc.raw("}")?;
    doc.finish()?;

    progress.report(ProgressUpdate::new(
        Phase::SnapshotWrite,
        format!("wrote {written} packets"),
        100,
    ));
    tracing::debug!(packets = written, only_protocol, "snapshot streamed");
    Ok(written)
}

/// Hand-framed JSON object over a compressor. Values are serialized into a
/// reusable buffer so storage errors can be told apart from JSON errors.
struct DocumentWriter<W: Write> {
    encoder: GzEncoder<W>,
    buf: Vec<u8>,
    written: u64,
}

impl<W: Write> DocumentWriter<W> {
    fn new(encoder: GzEncoder<W>) -> Self {
        Self {
            encoder,
            buf: Vec::new(),
            written: 0,
        }
    }

    fn raw(&mut self, text: &str) -> Result<(), SnapshotError> {
        self.encoder
            .write_all(text.as_bytes())
            .map_err(|err| SnapshotError::from_io(err, self.written))
    }

    fn key(&mut self, key: &str, first: bool) -> Result<(), SnapshotError> {
        if !first {
            self.raw(",")?;
        }
        self.value(key)?;
        self.raw(":")
    }

    fn field<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        first: bool,
    ) -> Result<(), SnapshotError> {
        self.key(key, first)?;
        self.value(value)
    }

    fn value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SnapshotError> {
        self.buf.clear();
        if self.buf.try_reserve(256).is_err() {
            return Err(SnapshotError::ResourceExhausted {
                written: self.written,
            });
        }
        serde_json::to_writer(&mut self.buf, value)?;
        self.encoder
            .write_all(&self.buf)
            .map_err(|err| SnapshotError::from_io(err, self.written))
    }

    fn flush(&mut self) -> Result<(), SnapshotError> {
        self.encoder
            .flush()
            .map_err(|err| SnapshotError::from_io(err, self.written))
    }

    fn finish(self) -> Result<(), SnapshotError> {
        let written = self.written;
        let mut inner = self
            .encoder
            .finish()
            .map_err(|err| SnapshotError::from_io(err, written))?;
        inner
            .flush()
            .map_err(|err| SnapshotError::from_io(err, written))
    }
}
