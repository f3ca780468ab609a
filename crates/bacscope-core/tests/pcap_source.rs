mod support;

use std::fs;

use bacscope_core::{PacketSource, PcapFileSource, SourceError};
use support::{
    BACNET_PORT, Frame, udp_frame, write_legacy_pcap, write_pcapng, write_pcapng_with_tsresol,
};

fn frames() -> Vec<Frame> {
    (0..3)
        .map(|i| Frame {
            ts_us: 1_000_000 + i * 500_000,
            data: udp_frame([10, 0, 0, 1], [10, 0, 0, 2], BACNET_PORT, BACNET_PORT, &[0x81]),
        })
        .collect()
}

#[test]
fn pcapng_source_reads_every_frame_with_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.pcapng");
    write_pcapng(&path, &frames());

    let mut source = PcapFileSource::open(&path).unwrap();
    let mut stamps = Vec::new();
    while let Some(event) = source.next_packet().unwrap() {
        assert_eq!(event.orig_len as usize, event.data.len());
        stamps.push(event.ts.unwrap());
    }
    assert_eq!(stamps, vec![1.0, 1.5, 2.0]);
}

#[test]
fn pcapng_timestamps_honor_interface_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nanos.pcapng");
    write_pcapng_with_tsresol(&path, &frames(), Some(9));

    let mut source = PcapFileSource::open(&path).unwrap();
    let mut stamps = Vec::new();
    while let Some(event) = source.next_packet().unwrap() {
        stamps.push(event.ts.unwrap());
    }
    assert_eq!(stamps, vec![1.0, 1.5, 2.0]);
}

#[test]
fn legacy_pcap_source_reads_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.pcap");
    write_legacy_pcap(&path, &frames());

    let mut source = PcapFileSource::open(&path).unwrap();
    let mut packets = 0;
    while source.next_packet().unwrap().is_some() {
        packets += 1;
    }
    assert_eq!(packets, 3);
}

#[test]
fn pcap_source_rejects_truncated_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.pcapng");
    fs::write(&path, [0x0a, 0x0d, 0x0d]).unwrap();

    let err = match PcapFileSource::open(&path) {
        Ok(_) => panic!("expected truncated file to be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, SourceError::Io(_)));
}

#[test]
fn pcap_source_rejects_unknown_magic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, b"not a capture at all").unwrap();

    assert!(matches!(
        PcapFileSource::open(&path),
        Err(SourceError::NotACapture { .. })
    ));
}
