//! Capture fixtures written at test time.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use etherparse::PacketBuilder;

pub const SRC_MAC: [u8; 6] = [0x00, 0x10, 0x20, 0x30, 0x40, 0x50];
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];
pub const BACNET_PORT: u16 = 47_808;

/// One frame with its capture time in microseconds since the epoch.
pub struct Frame {
    pub ts_us: u64,
    pub data: Vec<u8>,
}

pub fn udp_frame(src: [u8; 4], dst: [u8; 4], src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, BROADCAST_MAC)
        .ipv4(src, dst, 64)
        .udp(src_port, dst_port);
    let mut packet = Vec::<u8>::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).expect("build udp frame");
    packet
}

/// BVLC original-broadcast I-Am for `instance`.
pub fn i_am_frame(src: [u8; 4], instance: u32) -> Vec<u8> {
    let object_id = (8u32 << 22) | instance;
    let mut payload = vec![0x81, 0x0b, 0x00, 0x00, 0x01, 0x20, 0xff, 0xff, 0x00, 0xff];
    payload.extend_from_slice(&[0x10, 0x00, 0xc4]);
    payload.extend_from_slice(&object_id.to_be_bytes());
    payload.extend_from_slice(&[0x22, 0x05, 0xc4, 0x91, 0x00, 0x21, 0x07]);
    let len = payload.len() as u16;
    payload[2..4].copy_from_slice(&len.to_be_bytes());
    udp_frame(src, [255, 255, 255, 255], BACNET_PORT, BACNET_PORT, &payload)
}

/// UDP frame whose IPv4 header carries a non-zero fragment offset.
pub fn fragment_frame(src: [u8; 4], offset_units: u16) -> Vec<u8> {
    let mut data = udp_frame(src, [10, 0, 0, 255], BACNET_PORT, BACNET_PORT, &[0u8; 24]);
    let ip = 14;
    data[ip + 6..ip + 8].copy_from_slice(&(offset_units & 0x1fff).to_be_bytes());
    data[ip + 10] = 0;
    data[ip + 11] = 0;
    let checksum = ipv4_checksum(&data[ip..ip + 20]);
    data[ip + 10..ip + 12].copy_from_slice(&checksum.to_be_bytes());
    data
}

pub fn tcp_frame(src: [u8; 4], dst: [u8; 4], dst_port: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, BROADCAST_MAC)
        .ipv4(src, dst, 64)
        .tcp(40_000, dst_port, seq, 4096)
        .ack(1);
    let mut packet = Vec::<u8>::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).expect("build tcp frame");
    packet
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum = 0u32;
    for chunk in header.chunks(2) {
        sum = sum.wrapping_add(u32::from(u16::from_be_bytes([chunk[0], chunk[1]])));
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

pub fn write_pcapng(path: &Path, frames: &[Frame]) {
    write_pcapng_with_tsresol(path, frames, None);
}

/// Big-endian pcapng whose interface declares `if_tsresol` as a power of
/// ten (6 = microseconds, 9 = nanoseconds).
pub fn write_pcapng_with_tsresol(path: &Path, frames: &[Frame], tsresol: Option<u8>) {
    let units_per_us = 10u64.pow(u32::from(tsresol.unwrap_or(6)).saturating_sub(6));
    let mut output = Vec::new();
    output.extend_from_slice(&pcapng_block(0x0A0D0D0A, &section_header_body()));
    output.extend_from_slice(&pcapng_block(1, &interface_desc_body(tsresol)));
    for frame in frames {
        let ts = frame.ts_us * units_per_us;
        output.extend_from_slice(&pcapng_block(6, &enhanced_packet_body(ts, &frame.data)));
    }
    fs::write(path, output).expect("write pcapng fixture");
}

/// Little-endian, microsecond legacy pcap with an Ethernet link type.
pub fn write_legacy_pcap(path: &Path, frames: &[Frame]) {
    let mut output = Vec::new();
    output.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    output.extend_from_slice(&2u16.to_le_bytes());
    output.extend_from_slice(&4u16.to_le_bytes());
    output.extend_from_slice(&0i32.to_le_bytes());
    output.extend_from_slice(&0u32.to_le_bytes());
    output.extend_from_slice(&65_535u32.to_le_bytes());
    output.extend_from_slice(&1u32.to_le_bytes());
    for frame in frames {
        let len = frame.data.len() as u32;
        output.extend_from_slice(&((frame.ts_us / 1_000_000) as u32).to_le_bytes());
        output.extend_from_slice(&((frame.ts_us % 1_000_000) as u32).to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&frame.data);
    }
    fs::write(path, output).expect("write pcap fixture");
}

fn pcapng_block(block_type: u32, body: &[u8]) -> Vec<u8> {
    let total_len = (8 + body.len() + 4) as u32;
    let mut block = Vec::with_capacity(total_len as usize);
    block.extend_from_slice(&block_type.to_be_bytes());
    block.extend_from_slice(&total_len.to_be_bytes());
    block.extend_from_slice(body);
    block.extend_from_slice(&total_len.to_be_bytes());
    block
}

fn section_header_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0x1A2B3C4Du32.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&(-1i64).to_be_bytes());
    body
}

fn interface_desc_body(tsresol: Option<u8>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&65535u32.to_be_bytes());
    if let Some(resolution) = tsresol {
        // if_tsresol, padded to four bytes, then opt_endofopt
        body.extend_from_slice(&9u16.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&[resolution, 0, 0, 0]);
        body.extend_from_slice(&[0, 0, 0, 0]);
    }
    body
}

fn enhanced_packet_body(ts: u64, data: &[u8]) -> Vec<u8> {
    let ts_high = (ts >> 32) as u32;
    let ts_low = (ts & 0xFFFF_FFFF) as u32;
    let cap_len = data.len() as u32;
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&ts_high.to_be_bytes());
    body.extend_from_slice(&ts_low.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(data);
    body.resize(body.len() + (4 - data.len() % 4) % 4, 0);
    body
}

/// Capture of `total` BACnet frames, `fragments` of them IPv4 fragments
/// with a non-zero offset, spread evenly. Frames are one millisecond apart.
pub fn bacnet_capture(dir: &Path, total: u64, fragments: u64) -> PathBuf {
    let step = if fragments == 0 { u64::MAX } else { total / fragments };
    let frames: Vec<Frame> = (0..total)
        .map(|i| {
            let src = [10, 0, (i % 4) as u8, 10];
            let data = if fragments > 0 && i % step == step - 1 && i / step < fragments {
                fragment_frame(src, 185)
            } else if i % 100 == 0 {
                i_am_frame(src, 1000 + (i % 4) as u32)
            } else {
                udp_frame(src, [10, 0, 0, 255], BACNET_PORT, BACNET_PORT, &[0x81, 0x0a, 0x00, 0x04])
            };
            Frame {
                ts_us: 1_700_000_000_000_000 + i * 1_000,
                data,
            }
        })
        .collect();
    let path = dir.join("bacnet.pcapng");
    write_pcapng(&path, &frames);
    path
}
