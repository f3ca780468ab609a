use serde::{Deserialize, Serialize};

use crate::details::{DetailField, DetailMap, is_unset_flag};
use crate::record::{PacketRecord, transport};

/// TCP health categories, in classification precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCategory {
    Retransmission,
    FastRetransmission,
    DuplicateAck,
    Reset,
    LostSegment,
    OutOfOrder,
    ZeroWindow,
    KeepAlive,
}

impl HealthCategory {
    /// Order in which text fallback tests categories; the first hit wins.
    pub const PRECEDENCE: [HealthCategory; 8] = [
        HealthCategory::Retransmission,
        HealthCategory::FastRetransmission,
        HealthCategory::DuplicateAck,
        HealthCategory::Reset,
        HealthCategory::LostSegment,
        HealthCategory::OutOfOrder,
        HealthCategory::ZeroWindow,
        HealthCategory::KeepAlive,
    ];

    fn needles(self) -> &'static [&'static str] {
        match self {
            HealthCategory::Retransmission => &["retransmission"],
            HealthCategory::FastRetransmission => &["fast retransmission", "fast_retransmission"],
            HealthCategory::DuplicateAck => &["duplicate ack", "duplicate_ack", "dup ack"],
            HealthCategory::Reset => &["reset"],
            HealthCategory::LostSegment => &[
                "lost segment",
                "lost_segment",
                "previous segment not captured",
            ],
            HealthCategory::OutOfOrder => &["out-of-order", "out of order", "out_of_order"],
            HealthCategory::ZeroWindow => &["zero window", "zero_window", "zerowindow"],
            HealthCategory::KeepAlive => &["keep-alive", "keep alive", "keep_alive", "keepalive"],
        }
    }

    /// Substring classification of an unknown detail entry.
    ///
    /// Note that "fast retransmission" also contains "retransmission" and
    /// is therefore counted as a plain retransmission here. Entries of the
    /// known dialect never reach this path.
    pub fn from_text(key: &str, value: &str) -> Option<Self> {
        if is_unset_flag(value) {
            return None;
        }
        let text = format!("{} {}", key, value).to_ascii_lowercase();
        Self::PRECEDENCE
            .into_iter()
            .find(|category| category.needles().iter().any(|n| text.contains(n)))
    }
}

/// Running transport health counters for one capture pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpHealthCounters {
    pub total_tcp_frames: u64,
    pub retransmissions: u64,
    pub fast_retransmissions: u64,
    pub duplicate_acks: u64,
    pub resets: u64,
    pub lost_segments: u64,
    pub out_of_order: u64,
    pub zero_window: u64,
    pub keep_alive: u64,
    pub icmp_unreachable: u64,
}

impl TcpHealthCounters {
    pub fn observe(&mut self, record: &PacketRecord) {
        if record.transport.eq_ignore_ascii_case(transport::TCP) {
            self.total_tcp_frames += 1;
        }
        if is_icmp_unreachable(record) {
            self.icmp_unreachable += 1;
        }
        self.observe_details(&record.details);
    }

    /// Count each detail entry into at most one category.
    pub fn observe_details(&mut self, details: &DetailMap) {
        for field in details.fields() {
            let category = match field {
                DetailField::Health(category) => Some(category),
                DetailField::Other { key, value } => HealthCategory::from_text(key, value),
                _ => None,
            };
            if let Some(category) = category {
                self.increment(category);
            }
        }
    }

    pub fn increment(&mut self, category: HealthCategory) {
        *self.slot(category) += 1;
    }

    pub fn count(&self, category: HealthCategory) -> u64 {
        match category {
            HealthCategory::Retransmission => self.retransmissions,
            HealthCategory::FastRetransmission => self.fast_retransmissions,
            HealthCategory::DuplicateAck => self.duplicate_acks,
            HealthCategory::Reset => self.resets,
            HealthCategory::LostSegment => self.lost_segments,
            HealthCategory::OutOfOrder => self.out_of_order,
            HealthCategory::ZeroWindow => self.zero_window,
            HealthCategory::KeepAlive => self.keep_alive,
        }
    }

    fn slot(&mut self, category: HealthCategory) -> &mut u64 {
        match category {
            HealthCategory::Retransmission => &mut self.retransmissions,
            HealthCategory::FastRetransmission => &mut self.fast_retransmissions,
            HealthCategory::DuplicateAck => &mut self.duplicate_acks,
            HealthCategory::Reset => &mut self.resets,
            HealthCategory::LostSegment => &mut self.lost_segments,
            HealthCategory::OutOfOrder => &mut self.out_of_order,
            HealthCategory::ZeroWindow => &mut self.zero_window,
            HealthCategory::KeepAlive => &mut self.keep_alive,
        }
    }

    /// Sum of every error category, ICMP unreachable included.
    pub fn loss_events(&self) -> u64 {
        HealthCategory::PRECEDENCE
            .into_iter()
            .map(|category| self.count(category))
            .sum::<u64>()
            + self.icmp_unreachable
    }

    pub fn loss_percentage(&self) -> f64 {
        if self.total_tcp_frames == 0 {
            return 0.0;
        }
        self.loss_events() as f64 / self.total_tcp_frames as f64 * 100.0
    }

    /// Element-wise maximum. Both decode passes see the same capture, so
    /// adding would count shared frames twice.
    pub fn merge_max(&self, other: &TcpHealthCounters) -> TcpHealthCounters {
        TcpHealthCounters {
            total_tcp_frames: self.total_tcp_frames.max(other.total_tcp_frames),
            retransmissions: self.retransmissions.max(other.retransmissions),
            fast_retransmissions: self.fast_retransmissions.max(other.fast_retransmissions),
            duplicate_acks: self.duplicate_acks.max(other.duplicate_acks),
            resets: self.resets.max(other.resets),
            lost_segments: self.lost_segments.max(other.lost_segments),
            out_of_order: self.out_of_order.max(other.out_of_order),
            zero_window: self.zero_window.max(other.zero_window),
            keep_alive: self.keep_alive.max(other.keep_alive),
            icmp_unreachable: self.icmp_unreachable.max(other.icmp_unreachable),
        }
    }
}

fn is_icmp_unreachable(record: &PacketRecord) -> bool {
    let v4 = record.transport.eq_ignore_ascii_case(transport::ICMP);
    let v6 = record.transport.eq_ignore_ascii_case(transport::ICMPV6);
    if !v4 && !v6 {
        return false;
    }
    let details = &record.details;
    if details
        .icmp_type_name()
        .is_some_and(|name| name.to_ascii_lowercase().contains("unreachable"))
    {
        return true;
    }
    let unreachable_code = if v6 { "1" } else { "3" };
    details
        .icmp_type()
        .is_some_and(|code| code.trim() == unreachable_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::keys;

    #[test]
    fn text_fallback_follows_precedence() {
        assert_eq!(
            HealthCategory::from_text("Expert Info", "[TCP Retransmission]"),
            Some(HealthCategory::Retransmission)
        );
        assert_eq!(
            HealthCategory::from_text("Expert Info", "TCP Fast Retransmission"),
            Some(HealthCategory::Retransmission)
        );
        assert_eq!(
            HealthCategory::from_text("Expert Info", "[TCP Dup ACK 4#1]"),
            Some(HealthCategory::DuplicateAck)
        );
        assert_eq!(
            HealthCategory::from_text("tcp.window", "TCP ZeroWindow"),
            Some(HealthCategory::ZeroWindow)
        );
        assert_eq!(HealthCategory::from_text("custom.reset", "0"), None);
        assert_eq!(HealthCategory::from_text("bacapp.type", "1"), None);
    }

    #[test]
    fn known_keys_count_exactly_once() {
        let mut record = PacketRecord::new(1, 0.0, 60, transport::TCP);
        record.details.insert(keys::TCP_FAST_RETRANSMISSION, "1");
        record.details.insert(keys::TCP_RESET, "1");
        record.details.insert(keys::TCP_KEEP_ALIVE, "0");

        let mut counters = TcpHealthCounters::default();
        counters.observe(&record);
        assert_eq!(counters.total_tcp_frames, 1);
        assert_eq!(counters.fast_retransmissions, 1);
        assert_eq!(counters.retransmissions, 0);
        assert_eq!(counters.resets, 1);
        assert_eq!(counters.keep_alive, 0);
        assert_eq!(counters.loss_events(), 2);
        assert!((counters.loss_percentage() - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn icmp_unreachable_by_name_or_code() {
        let mut counters = TcpHealthCounters::default();

        let mut by_name = PacketRecord::new(1, 0.0, 70, transport::ICMP);
        by_name.details.insert(keys::ICMP_TYPE_NAME, "Destination Unreachable");
        counters.observe(&by_name);

        let mut by_code = PacketRecord::new(2, 0.0, 70, transport::ICMPV6);
        by_code.details.insert(keys::ICMP_TYPE, "1");
        counters.observe(&by_code);

        let mut echo = PacketRecord::new(3, 0.0, 70, transport::ICMP);
        echo.details.insert(keys::ICMP_TYPE, "8");
        counters.observe(&echo);

        assert_eq!(counters.icmp_unreachable, 2);
        assert_eq!(counters.total_tcp_frames, 0);
        assert_eq!(counters.loss_percentage(), 0.0);
    }

    #[test]
    fn loss_events_equals_sum_of_categories() {
        let mut counters = TcpHealthCounters::default();
        for category in HealthCategory::PRECEDENCE {
            counters.increment(category);
        }
        counters.icmp_unreachable = 3;
        let sum: u64 = HealthCategory::PRECEDENCE
            .into_iter()
            .map(|c| counters.count(c))
            .sum();
        assert_eq!(counters.loss_events(), sum + 3);
    }

    #[test]
    fn merge_takes_maximum_per_counter() {
        let a = TcpHealthCounters {
            total_tcp_frames: 10,
            resets: 2,
            ..Default::default()
        };
        let b = TcpHealthCounters {
            total_tcp_frames: 4,
            resets: 5,
            keep_alive: 1,
            ..Default::default()
        };
        let merged = a.merge_max(&b);
        assert_eq!(merged.total_tcp_frames, 10);
        assert_eq!(merged.resets, 5);
        assert_eq!(merged.keep_alive, 1);
    }
}
