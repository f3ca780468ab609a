//! Application-layer labelling from transport, ports and a payload prefix.
//!
//! Lookup order, first match wins:
//! 1. well-known port registry (destination port checked before source)
//! 2. the BACnet/IP UDP port range
//! 3. ASCII signature sniff of a TCP payload prefix

use super::bacnet;
use crate::record::transport;

/// Well-known layer-7 ports. Applies to both TCP and UDP.
const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (20, "FTP"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
    (69, "TFTP"),
    (80, "HTTP"),
    (110, "POP3"),
    (123, "NTP"),
    (137, "NetBIOS"),
    (138, "NetBIOS"),
    (139, "NetBIOS"),
    (143, "IMAP"),
    (161, "SNMP"),
    (162, "SNMP"),
    (389, "LDAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (502, "Modbus"),
    (514, "Syslog"),
    (1883, "MQTT"),
    (1900, "SSDP"),
    (3389, "RDP"),
    (5353, "mDNS"),
];

/// Textual protocol signatures matched against the start of a TCP payload.
const TCP_SIGNATURES: &[(&[u8], &str)] = &[
    (b"GET ", "HTTP"),
    (b"POST ", "HTTP"),
    (b"PUT ", "HTTP"),
    (b"HEAD ", "HTTP"),
    (b"DELETE ", "HTTP"),
    (b"OPTIONS ", "HTTP"),
    (b"PATCH ", "HTTP"),
    (b"HTTP/", "HTTP"),
    (b"SSH-", "SSH"),
    (b"RTSP/", "RTSP"),
    (b"EHLO ", "SMTP"),
    (b"HELO ", "SMTP"),
    (b"* OK", "IMAP"),
    (b"+OK", "POP3"),
];

/// Label a frame. Transport names compare case-insensitively, so `Udp`
/// and `UDP` behave the same.
pub fn classify(
    transport_name: &str,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    payload: Option<&[u8]>,
) -> Option<&'static str> {
    let is_tcp = transport_name.eq_ignore_ascii_case(transport::TCP);
    let is_udp = transport_name.eq_ignore_ascii_case(transport::UDP);
    if !is_tcp && !is_udp {
        return None;
    }

    if let Some(label) = [dst_port, src_port]
        .into_iter()
        .flatten()
        .find_map(well_known_port)
    {
        return Some(label);
    }

    if is_udp
        && (src_port.is_some_and(bacnet::is_bacnet_port)
            || dst_port.is_some_and(bacnet::is_bacnet_port))
    {
        return Some(bacnet::PROTOCOL_NAME);
    }

    if is_tcp {
        return payload.and_then(sniff_tcp_payload);
    }
    None
}

pub fn well_known_port(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(known, _)| *known == port)
        .map(|(_, label)| *label)
}

fn sniff_tcp_payload(payload: &[u8]) -> Option<&'static str> {
    TCP_SIGNATURES
        .iter()
        .find(|(prefix, _)| payload.starts_with(prefix))
        .map(|(_, label)| *label)
}
