//! Per-flow TCP sequence tracking.
//!
//! Annotates segments with the analysis flags the deep decoder dialect
//! uses, so the health accumulator gets signals from the generic pass too.
//! Flows are directional; state lives for the whole capture.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::details::{DetailMap, keys};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

/// The header fields the tracker needs from one segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Segment {
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub ack_flag: bool,
    pub payload_len: u32,
}

#[derive(Debug, Default)]
struct FlowState {
    next_seq: Option<u32>,
    last_seq: Option<u32>,
    last_ack: Option<u32>,
    last_window: Option<u16>,
}

#[derive(Debug, Default)]
pub struct TcpTracker {
    flows: HashMap<FlowKey, FlowState>,
}

impl TcpTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `segment` against its flow, update the flow and return the
    /// analysis keys that apply.
    pub fn observe(&mut self, key: FlowKey, segment: &Segment) -> Vec<&'static str> {
        let mut flags = Vec::new();
        let control = segment.syn || segment.fin || segment.rst;

        if segment.rst {
            flags.push(keys::TCP_RESET);
        }
        if segment.window == 0 && !control {
            flags.push(keys::TCP_ZERO_WINDOW);
        }

        let state = self.flows.entry(key).or_default();
        if let Some(next) = state.next_seq {
            if !control && segment.payload_len <= 1 && segment.seq == next.wrapping_sub(1) {
                flags.push(keys::TCP_KEEP_ALIVE);
            } else if segment.payload_len > 0 {
                let delta = segment.seq.wrapping_sub(next) as i32;
                if delta > 0 {
                    flags.push(keys::TCP_LOST_SEGMENT);
                } else if delta < 0 {
                    if state.last_seq == Some(segment.seq) {
                        flags.push(keys::TCP_RETRANSMISSION);
                    } else {
                        flags.push(keys::TCP_OUT_OF_ORDER);
                    }
                }
            } else if segment.ack_flag
                && !control
                && state.last_ack == Some(segment.ack)
                && state.last_window == Some(segment.window)
            {
                flags.push(keys::TCP_DUPLICATE_ACK);
            }
        }

        let seg_len = segment.payload_len + u32::from(segment.syn) + u32::from(segment.fin);
        let end = segment.seq.wrapping_add(seg_len);
        let advances = state
            .next_seq
            .is_none_or(|next| end.wrapping_sub(next) as i32 > 0);
        if advances {
            state.next_seq = Some(end);
        }
        if segment.payload_len > 0 {
            state.last_seq = Some(segment.seq);
        }
        if segment.ack_flag {
            state.last_ack = Some(segment.ack);
        }
        state.last_window = Some(segment.window);

        flags
    }

    /// Observe and write the flags into `details` as set flags.
    pub fn annotate(&mut self, key: FlowKey, segment: &Segment, details: &mut DetailMap) {
        for flag in self.observe(key, segment) {
            details.insert(flag, "1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> FlowKey {
        FlowKey {
            src_ip: "10.0.0.1".parse().unwrap(),
            src_port: 40_000,
            dst_ip: "10.0.0.2".parse().unwrap(),
            dst_port: 80,
        }
    }

    fn data(seq: u32, len: u32) -> Segment {
        Segment {
            seq,
            ack: 1,
            window: 1024,
            ack_flag: true,
            payload_len: len,
            ..Default::default()
        }
    }

    #[test]
    fn in_order_stream_has_no_flags() {
        let mut tracker = TcpTracker::new();
        let syn = Segment {
            seq: 99,
            window: 1024,
            syn: true,
            ..Default::default()
        };
        assert!(tracker.observe(key(), &syn).is_empty());
        assert!(tracker.observe(key(), &data(100, 10)).is_empty());
        assert!(tracker.observe(key(), &data(110, 10)).is_empty());
        assert_eq!(tracker.flows.len(), 1);
    }

    #[test]
    fn gap_retransmission_and_out_of_order() {
        let mut tracker = TcpTracker::new();
        tracker.observe(key(), &data(100, 10));
        assert_eq!(tracker.observe(key(), &data(120, 10)), vec![keys::TCP_LOST_SEGMENT]);
        assert_eq!(tracker.observe(key(), &data(120, 10)), vec![keys::TCP_RETRANSMISSION]);
        assert_eq!(tracker.observe(key(), &data(110, 10)), vec![keys::TCP_OUT_OF_ORDER]);
    }

    #[test]
    fn keep_alive_and_duplicate_ack() {
        let mut tracker = TcpTracker::new();
        tracker.observe(key(), &data(100, 10));
        assert_eq!(tracker.observe(key(), &data(109, 1)), vec![keys::TCP_KEEP_ALIVE]);

        let mut pure_ack = data(110, 0);
        pure_ack.ack = 2;
        assert!(tracker.observe(key(), &pure_ack).is_empty());
        assert_eq!(tracker.observe(key(), &pure_ack), vec![keys::TCP_DUPLICATE_ACK]);
    }

    #[test]
    fn reset_and_zero_window_are_flagged() {
        let mut tracker = TcpTracker::new();
        let rst = Segment {
            seq: 5,
            rst: true,
            ..Default::default()
        };
        assert_eq!(tracker.observe(key(), &rst), vec![keys::TCP_RESET]);

        let mut details = DetailMap::new();
        let mut zero = data(5, 0);
        zero.window = 0;
        tracker.annotate(key(), &zero, &mut details);
        assert_eq!(details.iter().collect::<Vec<_>>(), vec![(keys::TCP_ZERO_WINDOW, "1")]);
    }
}
