use std::io::{Read, Seek, SeekFrom};

use super::layout;
use crate::source::SourceError;
use pcap_parser::Linktype;

/// Container flavour detected from the leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Legacy,
    Ng,
}

/// Read the magic bytes and rewind the reader to the start.
///
/// # Errors
/// Returns `SourceError::Io` when the reader cannot be read or rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], SourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

/// Classify the container from its magic.
///
/// # Errors
/// Returns `SourceError::NotACapture` for anything that is neither a
/// PCAPNG section header nor one of the legacy PCAP magics.
pub fn container_kind(magic: &[u8; 4]) -> Result<ContainerKind, SourceError> {
    if magic == &layout::PCAPNG_MAGIC {
        Ok(ContainerKind::Ng)
    } else if layout::LEGACY_MAGICS.contains(magic) {
        Ok(ContainerKind::Legacy)
    } else {
        Err(SourceError::NotACapture { magic: *magic })
    }
}

/// Per-interface facts a PCAPNG packet block needs from its interface
/// description block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub linktype: Linktype,
    /// Timestamp units per second (`if_tsresol`).
    pub resolution: u64,
    /// Seconds added to every timestamp (`if_tsoffset`).
    pub offset: i64,
}

impl Interface {
    /// An invalid `if_tsresol` falls back to microseconds.
    pub fn new(linktype: Linktype, resolution: Option<u64>, offset: i64) -> Self {
        Self {
            linktype,
            resolution: resolution
                .filter(|units| *units > 0)
                .unwrap_or(layout::DEFAULT_TS_RESOLUTION),
            offset,
        }
    }
}

impl Default for Interface {
    fn default() -> Self {
        Self::new(Linktype::ETHERNET, None, 0)
    }
}

/// Resolve the interface for a given id; unknown ids read as Ethernet with
/// microsecond timestamps.
pub fn interface_for(interfaces: &[Interface], if_id: u32) -> Interface {
    interfaces
        .get(if_id as usize)
        .copied()
        .unwrap_or_default()
}

/// Convert a PCAPNG high/low timestamp to seconds in the interface's
/// resolution.
pub fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32, interface: &Interface) -> f64 {
    let ts = (u64::from(ts_high) << 32) | u64::from(ts_low);
    let whole = ts / interface.resolution;
    let fraction = ts % interface.resolution;
    interface.offset as f64 + whole as f64 + fraction as f64 / interface.resolution as f64
}

/// Convert a legacy PCAP seconds/fraction pair to seconds.
pub fn legacy_ts_to_seconds(ts_sec: u32, ts_frac: u32) -> f64 {
    ts_sec as f64 + (ts_frac as f64 / layout::MICROS_PER_SECOND)
}

/// Trim block data to the captured length; PCAPNG bodies carry padding.
pub fn captured_bytes(data: &[u8], caplen: u32) -> &[u8] {
    let len = (caplen as usize).min(data.len());
    &data[..len]
}

#[cfg(test)]
mod tests {
    use super::{
        ContainerKind, Interface, captured_bytes, container_kind, interface_for,
        legacy_ts_to_seconds, pcapng_ts_to_seconds, read_magic_and_rewind,
    };
    use crate::source::SourceError;
    use pcap_parser::Linktype;
    use std::io::Cursor;
    use std::io::Read;

    #[test]
    fn detects_container_kinds() {
        assert_eq!(
            container_kind(&super::layout::PCAPNG_MAGIC).unwrap(),
            ContainerKind::Ng
        );
        assert_eq!(
            container_kind(&[0xd4, 0xc3, 0xb2, 0xa1]).unwrap(),
            ContainerKind::Legacy
        );
        let err = container_kind(b"GET ").unwrap_err();
        assert!(matches!(err, SourceError::NotACapture { .. }));
    }

    #[test]
    fn read_magic_rewinds() {
        let bytes = [0x0a, 0x0d, 0x0d, 0x0a, 0x01];
        let mut cursor = Cursor::new(bytes);
        let magic = read_magic_and_rewind(&mut cursor).unwrap();
        assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
        let mut buf = [0u8; 1];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 0x0a);
    }

    #[test]
    fn read_magic_too_short() {
        let mut cursor = Cursor::new([0x0a, 0x0d, 0x0d]);
        let err = read_magic_and_rewind(&mut cursor).unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }

    #[test]
    fn unknown_interface_defaults_to_ethernet_microseconds() {
        let interfaces = [Interface::new(Linktype::RAW, Some(1_000_000_000), 0)];
        assert_eq!(interface_for(&interfaces, 0).linktype, Linktype::RAW);
        let fallback = interface_for(&interfaces, 1);
        assert_eq!(fallback.linktype, Linktype::ETHERNET);
        assert_eq!(fallback.resolution, 1_000_000);
    }

    #[test]
    fn timestamps_convert_microseconds() {
        let seconds = pcapng_ts_to_seconds(0, 1_500_000, &Interface::default());
        assert!((seconds - 1.5).abs() < f64::EPSILON);
        let seconds = legacy_ts_to_seconds(10, 250_000);
        assert!((seconds - 10.25).abs() < 1e-9);
    }

    #[test]
    fn timestamps_follow_interface_resolution() {
        let nanos = Interface::new(Linktype::ETHERNET, Some(1_000_000_000), 0);
        let ts = 1_700_000_000_250_000_000u64;
        let seconds = pcapng_ts_to_seconds((ts >> 32) as u32, ts as u32, &nanos);
        assert!((seconds - 1_700_000_000.25).abs() < 1e-6);

        let binary = Interface::new(Linktype::ETHERNET, Some(1 << 10), 100);
        let seconds = pcapng_ts_to_seconds(0, 3 * 1024 + 512, &binary);
        assert!((seconds - 103.5).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_resolution_falls_back_to_microseconds() {
        let interface = Interface::new(Linktype::ETHERNET, None, 0);
        assert_eq!(interface.resolution, 1_000_000);
        assert_eq!(Interface::new(Linktype::ETHERNET, Some(0), 0).resolution, 1_000_000);
    }

    #[test]
    fn captured_bytes_drops_padding() {
        let data = [1u8, 2, 3, 0];
        assert_eq!(captured_bytes(&data, 3), &[1, 2, 3]);
        assert_eq!(captured_bytes(&data, 9), &data);
    }
}
