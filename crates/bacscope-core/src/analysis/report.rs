use std::path::Path;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::knowledge::KnowledgeBase;
use crate::merge::MergeSummary;
use crate::warnings::WarningLog;
use crate::{
    CaptureSummary, DEFAULT_GENERATED_AT, DeviceSummary, HealthSummary, InputInfo,
    ProtocolSummary, REPORT_VERSION, Report, ServiceSummary, TalkerSummary, ToolInfo,
};

use super::{AggregateStatistics, AnalysisOutcome};

/// Talkers listed per direction.
const TOP_TALKERS: usize = 10;

/// Input metadata for `path`; the size is 0 when the file cannot be read.
pub fn input_info(path: &Path) -> InputInfo {
    InputInfo {
        path: path.display().to_string(),
        bytes: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
    }
}

/// Assemble a report from analysis results.
///
/// `generated_at` is derived from the capture (last timestamp, else the
/// first) so the same input always yields the same report.
pub fn build_report(
    input: InputInfo,
    statistics: &AggregateStatistics,
    knowledge: &KnowledgeBase,
    warnings: &WarningLog,
    merge: Option<MergeSummary>,
) -> Report {
    let time_start = ts_to_rfc3339(statistics.first_timestamp);
    let time_end = ts_to_rfc3339(statistics.last_timestamp);
    let generated_at = time_end
        .clone()
        .or_else(|| time_start.clone())
        .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string());

    let capture_summary = CaptureSummary {
        packets_total: statistics.total_packets,
        bytes_total: statistics.total_bytes,
        fragments_excluded: statistics.fragments_excluded,
        time_start,
        time_end,
        duration_s: statistics.duration(),
    };

    let protocols = statistics
        .hierarchy_counts
        .iter()
        .map(|(protocol, packets)| ProtocolSummary {
            protocol: protocol.clone(),
            packets: *packets,
            bytes: statistics.hierarchy_bytes.get(protocol).copied().unwrap_or(0),
        })
        .collect();

    let mut services: Vec<ServiceSummary> = statistics
        .service_counts
        .iter()
        .map(|(service, packets)| ServiceSummary {
            service: service.clone(),
            packets: *packets,
        })
        .collect();
    services.sort_by(|a, b| b.packets.cmp(&a.packets).then_with(|| a.service.cmp(&b.service)));

    let devices = knowledge
        .devices()
        .map(|(address, identity)| DeviceSummary {
            address: address.to_string(),
            instance: identity.instance.clone(),
            name: identity.name.clone(),
            vendor: identity.vendor.clone(),
            announced: identity.announced,
        })
        .collect();

    let health = knowledge.health();
    let health = HealthSummary {
        counters: *health,
        loss_events: health.loss_events(),
        loss_percentage: health.loss_percentage(),
    };

    let talkers = |entries: Vec<(String, u64)>| -> Vec<TalkerSummary> {
        entries
            .into_iter()
            .map(|(address, packets)| TalkerSummary { address, packets })
            .collect()
    };

    Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "bacscope".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at,
        input,
        capture_summary: Some(capture_summary),
        protocols,
        services,
        devices,
        health,
        top_sources: talkers(statistics.top_sources(TOP_TALKERS)),
        top_destinations: talkers(statistics.top_destinations(TOP_TALKERS)),
        merge,
        warnings: warnings.iter().cloned().collect(),
    }
}

impl AnalysisOutcome {
    pub fn report(&self) -> Report {
        build_report(
            input_info(&self.source),
            &self.statistics,
            &self.knowledge,
            &self.warnings,
            self.merge,
        )
    }
}

fn ts_to_rfc3339(ts: Option<f64>) -> Option<String> {
    let ts = ts?;
    let nanos = (ts * 1_000_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::keys;
    use crate::record::{PacketRecord, transport};

    fn bacnet(frame: u64, ts: f64, src: &str) -> PacketRecord {
        let mut record = PacketRecord::new(frame, ts, 60, transport::UDP);
        record.src_addr = Some(src.to_string());
        record.src_port = Some(47_808);
        record.dst_port = Some(47_808);
        record.details.insert(keys::INSTANCE_NUMBER, "77");
        record
    }

    #[test]
    fn report_is_derived_from_capture_time() {
        let records = vec![bacnet(1, 0.0, "10.0.0.1"), bacnet(2, 2.5, "10.0.0.2")];
        let statistics = AggregateStatistics::from_records(&records, 300);
        let mut knowledge = KnowledgeBase::new();
        knowledge.observe_all(&records);
        let mut warnings = WarningLog::new();
        warnings.push("frame 3", "truncated");

        let input = InputInfo {
            path: "capture.pcapng".to_string(),
            bytes: 10,
        };
        let report = build_report(input, &statistics, &knowledge, &warnings, None);
        assert_eq!(report.generated_at, "1970-01-01T00:00:02.5Z");
        let summary = report.capture_summary.as_ref().unwrap();
        assert_eq!(summary.packets_total, 2);
        assert_eq!(summary.time_start.as_deref(), Some("1970-01-01T00:00:00Z"));
        assert_eq!(summary.duration_s, 2.5);
        assert_eq!(report.protocols.len(), 1);
        assert_eq!(report.protocols[0].protocol, "UDP");
        assert_eq!(report.devices.len(), 2);
        assert_eq!(report.devices[0].instance.as_deref(), Some("77"));
        assert_eq!(report.warnings.len(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("merge").is_none());
        assert_eq!(json["health"]["loss_events"], 0);
    }

    #[test]
    fn services_are_listed_most_frequent_first() {
        let mut records = Vec::new();
        for (frame, service) in [(1, "8"), (2, "0"), (3, "8")] {
            let mut record = bacnet(frame, frame as f64, "10.0.0.1");
            record.details.insert(keys::UNCONFIRMED_SERVICE, service);
            records.push(record);
        }
        let statistics = AggregateStatistics::from_records(&records, 300);
        let input = InputInfo {
            path: "capture.pcapng".to_string(),
            bytes: 10,
        };
        let report = build_report(
            input,
            &statistics,
            &KnowledgeBase::new(),
            &WarningLog::new(),
            None,
        );
        let services: Vec<(&str, u64)> = report
            .services
            .iter()
            .map(|s| (s.service.as_str(), s.packets))
            .collect();
        assert_eq!(services, vec![("who-Is", 2), ("i-Am", 1)]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["services"][0]["service"], "who-Is");
    }

    #[test]
    fn empty_capture_uses_default_timestamp() {
        let report = build_report(
            InputInfo {
                path: "empty.pcap".to_string(),
                bytes: 24,
            },
            &AggregateStatistics::default(),
            &KnowledgeBase::new(),
            &WarningLog::new(),
            Some(MergeSummary::default()),
        );
        assert_eq!(report.generated_at, DEFAULT_GENERATED_AT);
        assert!(report.devices.is_empty());
        assert!(report.merge.is_some());
    }
}
