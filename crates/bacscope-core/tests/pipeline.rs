mod support;

use std::sync::Mutex;

use bacscope_core::{
    AnalysisConfig, AnalysisError, CancellationToken, NoProgress, Phase, ProgressUpdate,
    analyze_capture,
};
use support::{Frame, bacnet_capture, tcp_frame, udp_frame, write_legacy_pcap};

#[test]
fn fragmented_frames_are_kept_but_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = bacnet_capture(dir.path(), 10_000, 50);

    let outcome = analyze_capture(
        &path,
        &AnalysisConfig::default(),
        &NoProgress,
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(outcome.frames_read, 10_000);
    assert_eq!(outcome.records.len(), 10_000);
    assert_eq!(outcome.records.iter().filter(|r| r.fragment).count(), 50);
    assert_eq!(outcome.statistics.total_packets, 9_950);
    assert_eq!(outcome.statistics.fragments_excluded, 50);
    assert_eq!(outcome.statistics.protocol_counts.get("UDP"), Some(&9_950));
    assert_eq!(
        outcome.statistics.hierarchy_counts.get("UDP/BACnet"),
        Some(&9_950)
    );
    assert!(outcome.warnings.is_empty());
    assert!(outcome.merge.is_none());

    let frames: Vec<u64> = outcome.records.iter().map(|r| r.frame_number).collect();
    assert!(frames.windows(2).all(|pair| pair[1] == pair[0] + 1));
    assert_eq!(frames[0], 1);
}

#[test]
fn progress_is_reported_per_phase() {
    let dir = tempfile::tempdir().unwrap();
    let path = bacnet_capture(dir.path(), 2_500, 0);
    let seen = Mutex::new(Vec::new());
    let sink = |update: ProgressUpdate| seen.lock().unwrap().push((update.phase, update.percent));

    let config = AnalysisConfig {
        progress_interval: 1_000,
        ..AnalysisConfig::default()
    };
    analyze_capture(&path, &config, &sink, &CancellationToken::new()).unwrap();

    let seen = seen.into_inner().unwrap();
    let decoding: Vec<u8> = seen
        .iter()
        .filter(|(phase, _)| *phase == Phase::Decoding)
        .map(|(_, percent)| *percent)
        .collect();
    assert_eq!(decoding, vec![40, 80, 100]);
    assert_eq!(seen.first().map(|(phase, _)| *phase), Some(Phase::Counting));
    assert_eq!(seen.last(), Some(&(Phase::Statistics, 100)));
}

#[test]
fn cancellation_is_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = bacnet_capture(dir.path(), 3_000, 0);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = analyze_capture(&path, &AnalysisConfig::default(), &NoProgress, &cancel).unwrap_err();
    assert!(matches!(err, AnalysisError::Cancelled));
}

#[test]
fn legacy_capture_feeds_health_and_seen_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.pcap");
    let frames = vec![
        Frame {
            ts_us: 1_000_000,
            data: tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 80, 1, b"GET / HTTP/1.1\r\n"),
        },
        Frame {
            ts_us: 1_100_000,
            data: tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 80, 1, b"GET / HTTP/1.1\r\n"),
        },
        Frame {
            ts_us: 1_200_000,
            data: udp_frame([10, 0, 0, 7], [10, 0, 0, 255], 47_808, 47_808, &[0x81, 0x0b]),
        },
    ];
    write_legacy_pcap(&path, &frames);

    let outcome = analyze_capture(
        &path,
        &AnalysisConfig::default(),
        &NoProgress,
        &CancellationToken::new(),
    )
    .unwrap();

    let health = outcome.knowledge.health();
    assert_eq!(health.total_tcp_frames, 2);
    assert_eq!(health.retransmissions, 1);
    assert_eq!(health.loss_events(), 1);
    assert_eq!(
        outcome.knowledge.seen_addresses().collect::<Vec<_>>(),
        vec!["10.0.0.7"]
    );
    assert_eq!(outcome.statistics.hierarchy_counts.get("TCP/HTTP"), Some(&2));
    assert_eq!(outcome.protocol_records().count(), 1);

    let report = outcome.report();
    assert_eq!(report.health.counters.retransmissions, 1);
    assert_eq!(report.capture_summary.unwrap().packets_total, 3);
}
