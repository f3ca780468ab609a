use serde::{Deserialize, Serialize};

use crate::details::DetailMap;
use crate::protocols::bacnet;

/// Transport labels carried by [`PacketRecord::transport`].
pub mod transport {
    pub const TCP: &str = "TCP";
    pub const UDP: &str = "UDP";
    pub const ICMP: &str = "ICMP";
    pub const ICMPV6: &str = "ICMPv6";
    pub const ARP: &str = "ARP";
    pub const IPV4: &str = "IPv4";
    pub const IPV6: &str = "IPv6";
    pub const ETHERNET: &str = "Ethernet";
}

/// One decoded frame.
///
/// `frame_number` is the 1-based ordinal of the frame in its capture file.
/// Both decode passes number frames the same way, which makes it the merge
/// key. Fragment-flagged records stay in the record set but are skipped by
/// every aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub frame_number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Frame length on the wire.
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_addr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_addr: Option<String>,
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "DetailMap::is_empty")]
    pub details: DetailMap,
    /// Raw frame bytes; never persisted.
    #[serde(skip)]
    pub raw: Option<Vec<u8>>,
    #[serde(default)]
    pub fragment: bool,
}

impl PacketRecord {
    pub fn new(frame_number: u64, timestamp: f64, length: u32, transport: &str) -> Self {
        Self {
            frame_number,
            timestamp,
            length,
            src_mac: None,
            dst_mac: None,
            src_addr: None,
            dst_addr: None,
            transport: transport.to_string(),
            ttl: None,
            src_port: None,
            dst_port: None,
            app_protocol: None,
            details: DetailMap::new(),
            raw: None,
            fragment: false,
        }
    }

    /// Membership in the protocol of interest: label match, or either port
    /// inside the well-known port range.
    pub fn is_protocol_of_interest(&self) -> bool {
        self.app_protocol
            .as_deref()
            .is_some_and(|label| label.eq_ignore_ascii_case(bacnet::PROTOCOL_NAME))
            || self.dst_port.is_some_and(bacnet::is_bacnet_port)
            || self.src_port.is_some_and(bacnet::is_bacnet_port)
    }

    /// `base` or `base/application` key used by the hierarchical counters.
    pub fn hierarchy_key(&self) -> String {
        match self.app_protocol.as_deref() {
            Some(app) if !app.is_empty() => format!("{}/{}", self.transport, app),
            _ => self.transport.clone(),
        }
    }
}
