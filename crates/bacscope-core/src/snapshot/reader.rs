use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess,
    Visitor,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::analysis::AggregateStatistics;
use crate::knowledge::{DeviceEntry, KnowledgeBaseSnapshot};
use crate::progress::{CancellationToken, Phase, ProgressSink, ProgressUpdate, percent_of};
use crate::record::{PacketRecord, transport};
use crate::warnings::WarningLog;

use super::error::SnapshotError;
use super::{AnalysisSnapshot, RestoredSnapshot, SNAPSHOT_VERSION, keys};

/// Packets restored between progress callbacks and cancellation checks.
const RESTORE_INTERVAL: u64 = 1_000;

/// Top-level facts of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub version: u64,
    pub created_at: String,
    pub source_file: Option<String>,
    pub only_protocol_packets: bool,
    pub packet_count: Option<u64>,
}

/// Unlisted keys (statistics, knowledge base) are skipped by serde without
/// being buffered; `packets` must be present but is skipped too.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotShape {
    version: u64,
    created_at: String,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    only_protocol_packets: bool,
    #[serde(default)]
    packet_count: Option<u64>,
    #[allow(dead_code)]
    packets: IgnoredAny,
}

fn open(path: &Path) -> Result<GzDecoder<BufReader<File>>, SnapshotError> {
    Ok(GzDecoder::new(BufReader::new(File::open(path)?)))
}

/// Check that `path` holds a snapshot this build can read.
///
/// Statistics, knowledge base and packets are skipped, not parsed.
pub fn validate_snapshot(path: &Path) -> Result<SnapshotInfo, SnapshotError> {
    let shape: SnapshotShape = serde_json::from_reader(BufReader::new(open(path)?))?;
    let info = SnapshotInfo {
        version: shape.version,
        created_at: shape.created_at,
        source_file: shape.source_file,
        only_protocol_packets: shape.only_protocol_packets,
        packet_count: shape.packet_count,
    };
    check_version(info.version)?;
    OffsetDateTime::parse(&info.created_at, &Rfc3339)
        .map_err(|err| SnapshotError::Invalid(format!("createdAt: {err}")))?;
    Ok(info)
}

fn check_version(version: u64) -> Result<(), SnapshotError> {
    if version == 0 || version > u64::from(SNAPSHOT_VERSION) {
        return Err(SnapshotError::UnsupportedVersion {
            found: version,
            supported: SNAPSHOT_VERSION,
        });
    }
    Ok(())
}

pub fn read_snapshot(
    path: &Path,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<RestoredSnapshot, SnapshotError> {
    let restored = read_snapshot_from(open(path)?, progress, cancel)?;
    tracing::info!(
        path = %path.display(),
        packets = restored.snapshot.packets.len(),
        warnings = restored.warnings.len(),
        "snapshot restored"
    );
    Ok(restored)
}

/// Restore a snapshot from a compressed stream.
///
/// The document is streamed: packets are restored one at a time and never
/// held as a whole JSON tree. Only a missing or unsupported version, or a
/// document that is not a JSON object, is fatal. A malformed statistics
/// map, knowledge base section, packet field or packet falls back to its
/// empty value and is reported in [`RestoredSnapshot::warnings`].
pub fn read_snapshot_from<R: Read>(
    input: R,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<RestoredSnapshot, SnapshotError> {
    progress.report(ProgressUpdate::new(Phase::SnapshotRead, "reading snapshot", 0));
    let mut warnings = WarningLog::new();
    let mut cancelled = false;
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(input));
    let visitor = SnapshotVisitor {
        progress,
        cancel,
        warnings: &mut warnings,
        cancelled: &mut cancelled,
    };
    let staged = match (&mut deserializer).deserialize_map(visitor) {
        Ok(staged) => staged,
        Err(_) if cancelled => return Err(SnapshotError::Cancelled),
        Err(err) => return Err(err.into()),
    };
    deserializer.end()?;

    let version = staged
        .version
        .ok_or_else(|| SnapshotError::Invalid("missing version".to_string()))?;
    check_version(version)?;

    let total = staged.packets_seen;
    if let Some(expected) = staged.packet_count.filter(|expected| *expected != total) {
        warnings.push(
            "snapshot packets",
            format!("packetCount says {expected}, found {total}"),
        );
    }

    progress.report(ProgressUpdate::new(
        Phase::SnapshotRead,
        format!("restored {} packets", staged.packets.len()),
        100,
    ));
    Ok(RestoredSnapshot {
        snapshot: AnalysisSnapshot {
            version: version as u32,
            created_at: staged.created_at,
            source_file: staged.source_file,
            only_protocol_packets: staged.only_protocol_packets,
            statistics: staged.statistics,
            knowledge_base: staged.knowledge_base,
            packets: staged.packets,
        },
        warnings,
    })
}

/// Top-level values gathered while the document streams past.
#[derive(Default)]
struct StagedSnapshot {
    version: Option<u64>,
    created_at: String,
    source_file: Option<String>,
    only_protocol_packets: bool,
    packet_count: Option<u64>,
    statistics: AggregateStatistics,
    knowledge_base: KnowledgeBaseSnapshot,
    packets: Vec<PacketRecord>,
    /// Packet entries encountered, restored or not.
    packets_seen: u64,
}

struct SnapshotVisitor<'a> {
    progress: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    warnings: &'a mut WarningLog,
    cancelled: &'a mut bool,
}

impl<'de> Visitor<'de> for SnapshotVisitor<'_> {
    type Value = StagedSnapshot;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a snapshot object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<StagedSnapshot, A::Error> {
        let SnapshotVisitor {
            progress,
            cancel,
            warnings,
            cancelled,
        } = self;
        let ctx = "snapshot";
        let mut staged = StagedSnapshot::default();
        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                keys::VERSION => staged.version = map.next_value::<Value>()?.as_u64(),
                keys::CREATED_AT => {
                    staged.created_at = convert(map.next_value()?, &key, ctx, warnings)
                }
                keys::SOURCE_FILE => {
                    staged.source_file = convert(map.next_value()?, &key, ctx, warnings)
                }
                keys::ONLY_PROTOCOL_PACKETS => {
                    staged.only_protocol_packets = convert(map.next_value()?, &key, ctx, warnings)
                }
                keys::PACKET_COUNT => {
                    staged.packet_count = convert(map.next_value()?, &key, ctx, warnings)
                }
                keys::STATISTICS => {
                    staged.statistics = match map.next_value()? {
                        Value::Object(fields) => {
                            restore_fields(fields, "snapshot statistics", warnings)
                        }
                        Value::Null => AggregateStatistics::default(),
                        _ => {
                            warnings.push("snapshot statistics", "not an object");
                            AggregateStatistics::default()
                        }
                    }
                }
                keys::KNOWLEDGE_BASE => {
                    staged.knowledge_base = match map.next_value()? {
                        Value::Object(fields) => restore_knowledge(fields, warnings),
                        Value::Null => KnowledgeBaseSnapshot::default(),
                        _ => {
                            warnings.push("snapshot knowledgeBase", "not an object");
                            KnowledgeBaseSnapshot::default()
                        }
                    }
                }
                keys::PACKETS => {
                    let seed = PacketsSeed {
                        progress,
                        cancel,
                        warnings: &mut *warnings,
                        cancelled: &mut *cancelled,
                        expected: staged.packet_count,
                        packets: &mut staged.packets,
                        seen: &mut staged.packets_seen,
                    };
                    map.next_value_seed(seed)?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(staged)
    }
}

/// Restores the `packets` array entry by entry.
struct PacketsSeed<'a> {
    progress: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    warnings: &'a mut WarningLog,
    cancelled: &'a mut bool,
    /// `packetCount`, when it came before the array.
    expected: Option<u64>,
    packets: &'a mut Vec<PacketRecord>,
    seen: &'a mut u64,
}

impl<'de> DeserializeSeed<'de> for PacketsSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for PacketsSeed<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a packet array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        let PacketsSeed {
            progress,
            cancel,
            warnings,
            cancelled,
            expected,
            packets,
            seen,
        } = self;
        let total = expected.unwrap_or(0);
        while let Some(entry) = seq.next_element::<Value>()? {
            let index = *seen;
            *seen += 1;
            let position = index + 1;
            if position % RESTORE_INTERVAL == 0 {
                if cancel.is_cancelled() {
                    *cancelled = true;
                    return Err(de::Error::custom("snapshot restore cancelled"));
                }
                progress.report(ProgressUpdate::new(
                    Phase::SnapshotRead,
                    format!("restored {position} packets"),
                    percent_of(position, total),
                ));
            }
            if let Some(record) = restore_packet(entry, index as usize, warnings) {
                packets.push(record);
            }
        }
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        self.not_an_array();
        Ok(())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<(), E> {
        self.not_an_array();
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<(), E> {
        self.not_an_array();
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<(), E> {
        self.not_an_array();
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<(), E> {
        self.not_an_array();
        Ok(())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<(), E> {
        self.not_an_array();
        Ok(())
    }
}

impl PacketsSeed<'_> {
    fn not_an_array(self) {
        let PacketsSeed { warnings, .. } = self;
        warnings.push("snapshot packets", "not an array");
    }
}

/// Deserialize one value, falling back to the default (with a warning)
/// when it does not fit.
fn convert<T: DeserializeOwned + Default>(
    value: Value,
    key: &str,
    context: &str,
    warnings: &mut WarningLog,
) -> T {
    if value.is_null() {
        return T::default();
    }
    serde_json::from_value(value).unwrap_or_else(|err| {
        warnings.push(format!("{context} {key}"), err.to_string());
        T::default()
    })
}

/// Remove `key` and deserialize it, falling back to the default (with a
/// warning) when the value does not fit.
fn take<T: DeserializeOwned + Default>(
    map: &mut Map<String, Value>,
    key: &str,
    context: &str,
    warnings: &mut WarningLog,
) -> T {
    map.remove(key)
        .map_or_else(T::default, |value| convert(value, key, context, warnings))
}

/// Restore a `#[serde(default)]` struct key by key.
///
/// The keys come from the struct's own serialized default, so every field
/// is covered without a hand-kept list. A value that does not deserialize
/// in isolation is dropped with a warning and the field keeps its default.
fn restore_fields<T>(mut input: Map<String, Value>, context: &str, warnings: &mut WarningLog) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    let Ok(Value::Object(template)) = serde_json::to_value(T::default()) else {
        return T::default();
    };
    let mut accepted = template.clone();
    for key in template.keys() {
        let Some(value) = input.remove(key).filter(|value| !value.is_null()) else {
            continue;
        };
        let mut trial = template.clone();
        trial.insert(key.clone(), value);
        let trial = Value::Object(trial);
        if let Err(err) = T::deserialize(&trial) {
            warnings.push(format!("{context} {key}"), err.to_string());
            continue;
        }
        if let Value::Object(mut trial) = trial {
            if let Some(value) = trial.remove(key) {
                accepted.insert(key.clone(), value);
            }
        }
    }
    serde_json::from_value(Value::Object(accepted)).unwrap_or_default()
}

fn restore_knowledge(mut map: Map<String, Value>, warnings: &mut WarningLog) -> KnowledgeBaseSnapshot {
    let ctx = "snapshot knowledgeBase";
    let devices = match map.remove(keys::DEVICES) {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                serde_json::from_value::<DeviceEntry>(entry)
                    .map_err(|err| warnings.push(format!("{ctx} device {index}"), err.to_string()))
                    .ok()
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(_) => {
            warnings.push(format!("{ctx} {}", keys::DEVICES), "not an array");
            Vec::new()
        }
    };
    KnowledgeBaseSnapshot {
        devices,
        ..restore_fields(map, ctx, warnings)
    }
}

/// Restore one packet field by field. Only a missing or malformed frame
/// number drops the packet.
fn restore_packet(entry: Value, index: usize, warnings: &mut WarningLog) -> Option<PacketRecord> {
    let ctx = format!("snapshot packet {index}");
    let Value::Object(mut map) = entry else {
        warnings.push(ctx, "not an object");
        return None;
    };
    let Some(frame_number) = map.get("frame_number").and_then(Value::as_u64) else {
        warnings.push(ctx, "missing frame_number");
        return None;
    };
    let transport = match take::<String>(&mut map, "transport", &ctx, warnings) {
        name if name.is_empty() => transport::ETHERNET.to_string(),
        name => name,
    };

    let mut record = PacketRecord::new(frame_number, 0.0, 0, &transport);
    record.timestamp = take(&mut map, "timestamp", &ctx, warnings);
    record.length = take(&mut map, "length", &ctx, warnings);
    record.src_mac = take(&mut map, "src_mac", &ctx, warnings);
    record.dst_mac = take(&mut map, "dst_mac", &ctx, warnings);
    record.src_addr = take(&mut map, "src_addr", &ctx, warnings);
    record.dst_addr = take(&mut map, "dst_addr", &ctx, warnings);
    record.ttl = take(&mut map, "ttl", &ctx, warnings);
    record.src_port = take(&mut map, "src_port", &ctx, warnings);
    record.dst_port = take(&mut map, "dst_port", &ctx, warnings);
    record.app_protocol = take(&mut map, "app_protocol", &ctx, warnings);
    record.details = take(&mut map, "details", &ctx, warnings);
    record.fragment = take(&mut map, "fragment", &ctx, warnings);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn restore(text: &str) -> Result<RestoredSnapshot, SnapshotError> {
        read_snapshot_from(&gzip(text)[..], &NoProgress, &CancellationToken::new())
    }

    #[test]
    fn malformed_sections_degrade_to_empty_with_warnings() {
        let restored = restore(
            r#"{
                "version": 1,
                "createdAt": "2024-01-01T00:00:00Z",
                "statistics": {"total_packets": 4, "protocol_counts": "oops", "total_bytes": 240},
                "knowledgeBase": {"devices": [{"address": "10.0.0.5", "instance": "7", "announced": true}, 3]},
                "packets": [
                    {"frame_number": 1, "timestamp": 1.5, "length": 60, "transport": "UDP", "src_port": "x"},
                    {"timestamp": 2.0},
                    {"frame_number": 3, "transport": "UDP", "details": {"bacapp.type": "1"}}
                ],
                "packetCount": 3
            }"#,
        )
        .unwrap();
        let snapshot = &restored.snapshot;
        assert_eq!(snapshot.statistics.total_packets, 4);
        assert_eq!(snapshot.statistics.total_bytes, 240);
        assert!(snapshot.statistics.protocol_counts.is_empty());
        assert_eq!(snapshot.knowledge_base.devices.len(), 1);
        assert_eq!(snapshot.knowledge_base.devices[0].identity.instance.as_deref(), Some("7"));

        let frames: Vec<u64> = snapshot.packets.iter().map(|p| p.frame_number).collect();
        assert_eq!(frames, vec![1, 3]);
        assert_eq!(snapshot.packets[0].timestamp, 1.5);
        assert_eq!(snapshot.packets[0].src_port, None);
        assert_eq!(snapshot.packets[1].details.apdu_type(), Some("1"));
        // protocol_counts, device 1, src_port, missing frame_number
        assert_eq!(restored.warnings.len(), 4);
    }

    #[test]
    fn every_statistics_field_is_restored() {
        use crate::details::keys as detail_keys;

        let mut record = PacketRecord::new(1, 1_700_000_000.5, 64, transport::UDP);
        record.src_addr = Some("10.0.0.1".to_string());
        record.dst_addr = Some("10.0.0.255".to_string());
        record.src_port = Some(47_808);
        record.dst_port = Some(47_808);
        record.details.insert(detail_keys::UNCONFIRMED_SERVICE, "8");
        let statistics = AggregateStatistics::from_records(&[record], 60);
        let Value::Object(fields) = serde_json::to_value(&statistics).unwrap() else {
            panic!("statistics serialize to an object");
        };

        let mut warnings = WarningLog::new();
        let restored: AggregateStatistics =
            restore_fields(fields, "snapshot statistics", &mut warnings);
        assert_eq!(restored, statistics);
        assert_eq!(restored.service_counts.get("who-Is"), Some(&1));
        assert!(warnings.is_empty());
    }

    #[test]
    fn bad_statistics_field_only_drops_itself() {
        let fields = serde_json::json!({
            "total_packets": 9,
            "service_counts": ["not", "a", "map"],
            "destination_port_counts": {"47808": 9},
            "unknown": true
        });
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        let mut warnings = WarningLog::new();
        let restored: AggregateStatistics =
            restore_fields(fields, "snapshot statistics", &mut warnings);
        assert_eq!(restored.total_packets, 9);
        assert!(restored.service_counts.is_empty());
        assert_eq!(restored.destination_port_counts.get(&47_808), Some(&9));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn knowledge_device_key_matches_serialized_name() {
        let value = serde_json::to_value(KnowledgeBaseSnapshot::default()).unwrap();
        assert!(value.get(keys::DEVICES).is_some());
    }

    #[test]
    fn packet_fields_survive_restore() {
        let mut record = PacketRecord::new(7, 12.5, 80, transport::UDP);
        record.src_mac = Some("00:01:02:03:04:05".to_string());
        record.dst_mac = Some("ff:ff:ff:ff:ff:ff".to_string());
        record.src_addr = Some("10.0.0.1".to_string());
        record.dst_addr = Some("10.0.0.2".to_string());
        record.ttl = Some(64);
        record.src_port = Some(47_808);
        record.dst_port = Some(47_809);
        record.app_protocol = Some("BACnet".to_string());
        record.details.insert("bacapp.type", "1");
        record.fragment = true;

        let mut warnings = WarningLog::new();
        let entry = serde_json::to_value(&record).unwrap();
        assert_eq!(restore_packet(entry, 0, &mut warnings), Some(record));
        assert!(warnings.is_empty());
    }

    #[test]
    fn packets_stream_with_progress_and_cancellation() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Collect(Mutex<Vec<ProgressUpdate>>);
        impl ProgressSink for Collect {
            fn report(&self, update: ProgressUpdate) {
                self.0.lock().unwrap().push(update);
            }
        }

        let packets: Vec<String> = (1..=2_500)
            .map(|frame| format!(r#"{{"frame_number": {frame}, "transport": "UDP"}}"#))
            .collect();
        let text = format!(
            r#"{{"version": 1, "createdAt": "2024-01-01T00:00:00Z", "packets": [{}], "packetCount": 2500}}"#,
            packets.join(",")
        );

        let sink = Collect::default();
        let restored = read_snapshot_from(&gzip(&text)[..], &sink, &CancellationToken::new()).unwrap();
        assert_eq!(restored.snapshot.packets.len(), 2_500);
        assert!(restored.warnings.is_empty());
        let updates = sink.0.lock().unwrap();
        assert!(updates.iter().any(|u| u.operation == "restored 2000 packets"));
        assert_eq!(updates.last().map(|u| u.percent), Some(100));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            read_snapshot_from(&gzip(&text)[..], &NoProgress, &cancel),
            Err(SnapshotError::Cancelled)
        ));
    }

    #[test]
    fn non_array_packets_degrade_with_warning() {
        let restored = restore(r#"{"version": 1, "createdAt": "x", "packets": {"a": [1]}}"#).unwrap();
        assert!(restored.snapshot.packets.is_empty());
        assert_eq!(restored.warnings.len(), 1);
    }

    #[test]
    fn missing_knowledge_base_is_tolerated() {
        let restored = restore(r#"{"version": 1, "createdAt": "x", "packets": []}"#).unwrap();
        assert!(restored.snapshot.knowledge_base.devices.is_empty());
        assert!(restored.warnings.is_empty());
    }

    #[test]
    fn version_is_required_and_bounded() {
        assert!(matches!(
            restore(r#"{"packets": []}"#),
            Err(SnapshotError::Invalid(_))
        ));
        assert!(matches!(
            restore(r#"{"version": 2, "packets": []}"#),
            Err(SnapshotError::UnsupportedVersion { found: 2, .. })
        ));
        assert!(matches!(restore("[1, 2]"), Err(SnapshotError::Json(_))));
    }
}
