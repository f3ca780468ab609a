use std::net::Ipv4Addr;

use super::error::FrameError;
use super::layout;

/// Bounds-checked big-endian access to frame bytes.
pub struct FrameReader<'a> {
    data: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn require_len(&self, needed: usize) -> Result<(), FrameError> {
        if self.data.len() < needed {
            return Err(FrameError::TooShort {
                needed,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8, FrameError> {
        self.require_len(offset + 1)?;
        Ok(self.data[offset])
    }

    pub fn u16_at(&self, offset: usize) -> Result<u16, FrameError> {
        self.require_len(offset + 2)?;
        Ok(u16::from_be_bytes([self.data[offset], self.data[offset + 1]]))
    }

    pub fn ipv4_at(&self, offset: usize) -> Result<Ipv4Addr, FrameError> {
        self.require_len(offset + 4)?;
        let b = &self.data[offset..offset + 4];
        Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }

    pub fn mac_at(&self, offset: usize) -> Result<String, FrameError> {
        self.require_len(offset + layout::MAC_LEN)?;
        Ok(format_mac(&self.data[offset..offset + layout::MAC_LEN]))
    }

    pub fn tail(&self, offset: usize) -> Result<&'a [u8], FrameError> {
        self.require_len(offset)?;
        Ok(&self.data[offset..])
    }
}

pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Source and destination port read from the first four transport bytes.
pub fn transport_ports(payload: &[u8]) -> Option<(u16, u16)> {
    let reader = FrameReader::new(payload);
    reader.require_len(layout::TRANSPORT_PORTS_LEN).ok()?;
    Some((reader.u16_at(0).ok()?, reader.u16_at(2).ok()?))
}

/// Fragment offset field of an IPv4 header, in 8-byte units.
pub fn ipv4_fragment_offset(header: &[u8]) -> Result<u16, FrameError> {
    let raw = FrameReader::new(header).u16_at(layout::IPV4_FRAGMENT_OFFSET)?;
    Ok(raw & layout::IPV4_FRAGMENT_OFFSET_MASK)
}

/// IPv4 header fields read without the structured slicer.
#[derive(Debug, PartialEq, Eq)]
pub struct LooseIpv4<'a> {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ttl: u8,
    pub protocol: u8,
    pub fragment_offset: u16,
    pub payload: &'a [u8],
}

/// Lenient IPv4 parse used when the structured slicer rejects a frame,
/// typically because the capture was truncated. The payload is cut at the
/// header's total length or the end of the data, whichever comes first.
pub fn loose_ipv4(data: &[u8]) -> Result<LooseIpv4<'_>, FrameError> {
    let reader = FrameReader::new(data);
    reader.require_len(layout::IPV4_MIN_HEADER_LEN)?;
    let version_ihl = reader.u8_at(0)?;
    if version_ihl >> 4 != 4 {
        return Err(FrameError::Slice(format!(
            "not an IPv4 header (version {})",
            version_ihl >> 4
        )));
    }
    let header_len = usize::from(version_ihl & 0x0f) * 4;
    if header_len < layout::IPV4_MIN_HEADER_LEN {
        return Err(FrameError::Slice(format!(
            "IPv4 header length {header_len} below minimum"
        )));
    }
    reader.require_len(header_len)?;

    let total_len = usize::from(reader.u16_at(layout::IPV4_TOTAL_LEN_OFFSET)?);
    let end = total_len.clamp(header_len, data.len());
    Ok(LooseIpv4 {
        src: reader.ipv4_at(layout::IPV4_SRC_OFFSET)?,
        dst: reader.ipv4_at(layout::IPV4_DST_OFFSET)?,
        ttl: reader.u8_at(layout::IPV4_TTL_OFFSET)?,
        protocol: reader.u8_at(layout::IPV4_PROTOCOL_OFFSET)?,
        fragment_offset: ipv4_fragment_offset(data)?,
        payload: &data[header_len..end],
    })
}

#[derive(Debug, PartialEq, Eq)]
pub struct ArpFields {
    pub opcode: u16,
    pub sender: Ipv4Addr,
    pub target: Ipv4Addr,
}

pub fn arp_fields(data: &[u8]) -> Result<ArpFields, FrameError> {
    let reader = FrameReader::new(data);
    reader.require_len(layout::ARP_IPV4_LEN)?;
    Ok(ArpFields {
        opcode: reader.u16_at(layout::ARP_OPCODE_OFFSET)?,
        sender: reader.ipv4_at(layout::ARP_SENDER_IP_OFFSET)?,
        target: reader.ipv4_at(layout::ARP_TARGET_IP_OFFSET)?,
    })
}

pub fn icmp_type_name(v6: bool, icmp_type: u8) -> Option<&'static str> {
    let table = if v6 {
        layout::ICMPV6_TYPE_NAMES
    } else {
        layout::ICMPV4_TYPE_NAMES
    };
    table
        .iter()
        .find(|(code, _)| *code == icmp_type)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_header(total_len: u16, flags_frag: u16, protocol: u8) -> Vec<u8> {
        let mut header = vec![0u8; 20];
        header[0] = 0x45;
        header[2..4].copy_from_slice(&total_len.to_be_bytes());
        header[6..8].copy_from_slice(&flags_frag.to_be_bytes());
        header[8] = 64;
        header[9] = protocol;
        header[12..16].copy_from_slice(&[10, 0, 0, 1]);
        header[16..20].copy_from_slice(&[10, 0, 0, 2]);
        header
    }

    #[test]
    fn fragment_offset_ignores_flag_bits() {
        let header = ipv4_header(20, 0x2000, 17);
        assert_eq!(ipv4_fragment_offset(&header).unwrap(), 0);
        let header = ipv4_header(20, 0x2000 | 185, 17);
        assert_eq!(ipv4_fragment_offset(&header).unwrap(), 185);
    }

    #[test]
    fn loose_ipv4_clamps_payload_to_available_bytes() {
        let mut data = ipv4_header(1500, 0, 17);
        data.extend_from_slice(&[0xba, 0xc0, 0xba, 0xc1, 0, 0]);
        let parsed = loose_ipv4(&data).unwrap();
        assert_eq!(parsed.src, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(parsed.protocol, 17);
        assert_eq!(parsed.payload.len(), 6);
        assert_eq!(transport_ports(parsed.payload), Some((47_808, 47_809)));
    }

    #[test]
    fn loose_ipv4_rejects_other_versions() {
        let mut data = ipv4_header(20, 0, 17);
        data[0] = 0x65;
        assert!(matches!(loose_ipv4(&data), Err(FrameError::Slice(_))));
        assert!(matches!(
            loose_ipv4(&data[..10]),
            Err(FrameError::TooShort { needed: 20, .. })
        ));
    }

    #[test]
    fn transport_ports_need_four_bytes() {
        assert_eq!(transport_ports(&[0, 80, 1]), None);
        assert_eq!(transport_ports(&[0, 80, 0, 53]), Some((80, 53)));
    }

    #[test]
    fn mac_and_icmp_names() {
        assert_eq!(format_mac(&[0, 0x1b, 0x2c, 0xff, 1, 2]), "00:1b:2c:ff:01:02");
        assert_eq!(icmp_type_name(false, 3), Some("destination unreachable"));
        assert_eq!(icmp_type_name(true, 1), Some("destination unreachable"));
        assert_eq!(icmp_type_name(true, 3), Some("time exceeded"));
        assert_eq!(icmp_type_name(false, 42), None);
    }
}
