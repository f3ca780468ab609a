use std::net::IpAddr;

use etherparse::{Ipv6ExtensionSlice, Ipv6ExtensionsSlice, NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;

use crate::details::keys;
use crate::protocols::classifier;
use crate::record::{PacketRecord, transport};
use crate::source::PacketEvent;

use super::error::FrameError;
use super::layout;
use super::reader::{
    FrameReader, arp_fields, icmp_type_name, ipv4_fragment_offset, loose_ipv4, transport_ports,
};
use super::tcp::{FlowKey, Segment, TcpTracker};

/// Decode one captured frame into a record.
///
/// Extraction order: Ethernet, then ARP or IPv4/IPv6, then TCP/UDP/ICMP,
/// then the application label. When the structured slicer rejects an IPv4
/// frame a lenient header parse takes over, and UDP ports are read from
/// the first four payload bytes.
pub fn decode_frame(
    frame_number: u64,
    timestamp: f64,
    event: &PacketEvent,
    tracker: &mut TcpTracker,
) -> Result<PacketRecord, FrameError> {
    let mut record = PacketRecord::new(
        frame_number,
        timestamp,
        event.orig_len,
        transport::ETHERNET,
    );
    let data = event.data.as_slice();

    match event.linktype {
        Linktype::ETHERNET => decode_ethernet(data, &mut record, tracker)?,
        Linktype::LINUX_SLL => decode_linux_sll(data, &mut record, tracker)?,
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => {
            decode_ip(data, &mut record, tracker)?
        }
        other => return Err(FrameError::UnsupportedLinktype(other.0)),
    }
    Ok(record)
}

fn decode_ethernet(
    data: &[u8],
    record: &mut PacketRecord,
    tracker: &mut TcpTracker,
) -> Result<(), FrameError> {
    let reader = FrameReader::new(data);
    reader.require_len(layout::ETHERNET_HEADER_LEN)?;
    record.dst_mac = Some(reader.mac_at(layout::ETHERNET_DST_OFFSET)?);
    record.src_mac = Some(reader.mac_at(layout::ETHERNET_SRC_OFFSET)?);

    let ethertype = reader.u16_at(layout::ETHERNET_TYPE_OFFSET)?;
    let network = reader.tail(layout::ETHERNET_HEADER_LEN)?;
    if ethertype == layout::ETHERTYPE_ARP {
        return fill_arp(network, record);
    }

    match SlicedPacket::from_ethernet(data) {
        Ok(sliced) => {
            let payload = fill_from_slice(&sliced, record, tracker);
            label(record, payload);
            Ok(())
        }
        Err(err) if ethertype == layout::ETHERTYPE_IPV4 => {
            fill_loose_ipv4(network, record).map_err(|_| FrameError::Slice(err.to_string()))
        }
        Err(err) => Err(FrameError::Slice(err.to_string())),
    }
}

fn decode_linux_sll(
    data: &[u8],
    record: &mut PacketRecord,
    tracker: &mut TcpTracker,
) -> Result<(), FrameError> {
    let reader = FrameReader::new(data);
    reader.require_len(layout::LINUX_SLL_HEADER_LEN)?;
    if usize::from(reader.u16_at(layout::LINUX_SLL_ADDR_LEN_OFFSET)?) == layout::MAC_LEN {
        record.src_mac = Some(reader.mac_at(layout::LINUX_SLL_ADDR_OFFSET)?);
    }

    let protocol = reader.u16_at(layout::LINUX_SLL_PROTOCOL_OFFSET)?;
    let network = reader.tail(layout::LINUX_SLL_HEADER_LEN)?;
    if protocol == layout::ETHERTYPE_ARP {
        return fill_arp(network, record);
    }

    match SlicedPacket::from_linux_sll(data) {
        Ok(sliced) => {
            let payload = fill_from_slice(&sliced, record, tracker);
            label(record, payload);
            Ok(())
        }
        Err(err) if protocol == layout::ETHERTYPE_IPV4 => {
            fill_loose_ipv4(network, record).map_err(|_| FrameError::Slice(err.to_string()))
        }
        Err(err) => Err(FrameError::Slice(err.to_string())),
    }
}

fn decode_ip(
    data: &[u8],
    record: &mut PacketRecord,
    tracker: &mut TcpTracker,
) -> Result<(), FrameError> {
    match SlicedPacket::from_ip(data) {
        Ok(sliced) => {
            let payload = fill_from_slice(&sliced, record, tracker);
            label(record, payload);
            Ok(())
        }
        Err(err) => fill_loose_ipv4(data, record).map_err(|_| FrameError::Slice(err.to_string())),
    }
}

fn label(record: &mut PacketRecord, payload: Option<&[u8]>) {
    record.app_protocol =
        classifier::classify(&record.transport, record.src_port, record.dst_port, payload)
            .map(str::to_string);
}

fn fill_arp(data: &[u8], record: &mut PacketRecord) -> Result<(), FrameError> {
    let arp = arp_fields(data)?;
    record.transport = transport::ARP.to_string();
    record.src_addr = Some(arp.sender.to_string());
    record.dst_addr = Some(arp.target.to_string());
    record.details.insert(keys::ARP_OPCODE, arp.opcode.to_string());
    Ok(())
}

/// Fill network and transport fields; returns the transport payload used
/// for the application sniff.
fn fill_from_slice<'s>(
    sliced: &'s SlicedPacket<'_>,
    record: &mut PacketRecord,
    tracker: &mut TcpTracker,
) -> Option<&'s [u8]> {
    let net = sliced.net.as_ref()?;
    let (src_ip, dst_ip) = match net {
        NetSlice::Ipv4(ipv4) => {
            let header = ipv4.header();
            record.transport = transport::IPV4.to_string();
            record.ttl = Some(header.ttl());
            record.fragment = ipv4_fragment_offset(header.slice()).is_ok_and(|offset| offset != 0);
            (
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
            )
        }
        NetSlice::Ipv6(ipv6) => {
            let header = ipv6.header();
            record.transport = transport::IPV6.to_string();
            record.ttl = Some(header.hop_limit());
            record.fragment = ipv6_fragment_offset(ipv6.extensions()) != 0;
            (
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
            )
        }
    };
    record.src_addr = Some(src_ip.to_string());
    record.dst_addr = Some(dst_ip.to_string());

    match &sliced.transport {
        Some(TransportSlice::Udp(udp)) => {
            record.transport = transport::UDP.to_string();
            record.src_port = Some(udp.source_port());
            record.dst_port = Some(udp.destination_port());
            Some(udp.payload())
        }
        Some(TransportSlice::Tcp(tcp)) => {
            record.transport = transport::TCP.to_string();
            record.src_port = Some(tcp.source_port());
            record.dst_port = Some(tcp.destination_port());
            let segment = Segment {
                seq: tcp.sequence_number(),
                ack: tcp.acknowledgment_number(),
                window: tcp.window_size(),
                syn: tcp.syn(),
                fin: tcp.fin(),
                rst: tcp.rst(),
                ack_flag: tcp.ack(),
                payload_len: tcp.payload().len() as u32,
            };
            let key = FlowKey {
                src_ip,
                src_port: tcp.source_port(),
                dst_ip,
                dst_port: tcp.destination_port(),
            };
            tracker.annotate(key, &segment, &mut record.details);
            Some(tcp.payload())
        }
        Some(TransportSlice::Icmpv4(icmp)) => {
            fill_icmp(record, false, icmp.type_u8(), icmp.code_u8());
            None
        }
        Some(TransportSlice::Icmpv6(icmp)) => {
            fill_icmp(record, true, icmp.type_u8(), icmp.code_u8());
            None
        }
        None => {
            let ip_payload = net.ip_payload_ref()?;
            fill_unsliced_transport(record, ip_payload.ip_number.0, ip_payload.payload)
        }
    }
}

/// Offset of the fragment extension header, zero when there is none. Only
/// non-first fragments lose their transport header.
fn ipv6_fragment_offset(extensions: &Ipv6ExtensionsSlice<'_>) -> u16 {
    extensions
        .clone()
        .into_iter()
        .find_map(|extension| match extension {
            Ipv6ExtensionSlice::Fragment(fragment) => Some(fragment.fragment_offset().value()),
            _ => None,
        })
        .unwrap_or(0)
}

fn fill_loose_ipv4(data: &[u8], record: &mut PacketRecord) -> Result<(), FrameError> {
    let ip = loose_ipv4(data)?;
    record.transport = transport::IPV4.to_string();
    record.ttl = Some(ip.ttl);
    record.src_addr = Some(ip.src.to_string());
    record.dst_addr = Some(ip.dst.to_string());
    record.fragment = ip.fragment_offset != 0;
    let payload = fill_unsliced_transport(record, ip.protocol, ip.payload);
    label(record, payload);
    Ok(())
}

/// Transport fields for a payload the slicer did not decode. Fragments
/// only get their transport label: their payload does not start with a
/// transport header.
fn fill_unsliced_transport<'a>(
    record: &mut PacketRecord,
    protocol: u8,
    payload: &'a [u8],
) -> Option<&'a [u8]> {
    if let Some(name) = transport_name(protocol) {
        record.transport = name.to_string();
    }
    if record.fragment || protocol != layout::IP_PROTO_UDP {
        return None;
    }
    let (src_port, dst_port) = transport_ports(payload)?;
    record.src_port = Some(src_port);
    record.dst_port = Some(dst_port);
    payload.get(layout::UDP_HEADER_LEN..)
}

fn transport_name(protocol: u8) -> Option<&'static str> {
    match protocol {
        layout::IP_PROTO_TCP => Some(transport::TCP),
        layout::IP_PROTO_UDP => Some(transport::UDP),
        layout::IP_PROTO_ICMP => Some(transport::ICMP),
        layout::IP_PROTO_ICMPV6 => Some(transport::ICMPV6),
        _ => None,
    }
}

fn fill_icmp(record: &mut PacketRecord, v6: bool, icmp_type: u8, code: u8) {
    record.transport = if v6 {
        transport::ICMPV6
    } else {
        transport::ICMP
    }
    .to_string();
    record.details.insert(keys::ICMP_TYPE, icmp_type.to_string());
    record.details.insert(keys::ICMP_CODE, code.to_string());
    if let Some(name) = icmp_type_name(v6, icmp_type) {
        record.details.insert(keys::ICMP_TYPE_NAME, name);
    }
}
