use std::fs::File;
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapBlock, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};

use crate::source::{PacketEvent, PacketSource, SourceError};

use super::layout::PCAP_READER_BUFFER_SIZE;
use super::reader::{
    ContainerKind, Interface, captured_bytes, container_kind, interface_for,
    legacy_ts_to_seconds, pcapng_ts_to_seconds, read_magic_and_rewind,
};

/// Frame source over a legacy PCAP or PCAPNG file, in file order.
pub struct PcapFileSource {
    framing: Framing,
}

enum Framing {
    Legacy(LegacyFraming),
    Ng(NgFraming),
}

struct LegacyFraming {
    reader: LegacyPcapReader<File>,
    linktype: Linktype,
    nanosecond: bool,
}

struct NgFraming {
    reader: PcapNGReader<File>,
    /// Interfaces of the current section, indexed by interface id.
    interfaces: Vec<Interface>,
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let mut file = File::open(path)?;
        let magic = read_magic_and_rewind(&mut file)?;
        let framing = match container_kind(&magic)? {
            ContainerKind::Ng => Framing::Ng(NgFraming {
                reader: PcapNGReader::new(PCAP_READER_BUFFER_SIZE, file)
                    .map_err(|e| SourceError::framing("pcapng header", e))?,
                interfaces: Vec::new(),
            }),
            ContainerKind::Legacy => Framing::Legacy(LegacyFraming {
                reader: LegacyPcapReader::new(PCAP_READER_BUFFER_SIZE, file)
                    .map_err(|e| SourceError::framing("pcap header", e))?,
                linktype: Linktype::ETHERNET,
                nanosecond: false,
            }),
        };
        Ok(Self { framing })
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        match &mut self.framing {
            Framing::Legacy(framing) => framing.next_frame(),
            Framing::Ng(framing) => framing.next_frame(),
        }
    }
}

impl LegacyFraming {
    fn next_frame(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let event = match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            self.linktype = header.network;
                            self.nanosecond = header.is_nanosecond_precision();
                            None
                        }
                        PcapBlockOwned::Legacy(packet) => {
                            Some(legacy_event(&packet, self.linktype, self.nanosecond))
                        }
                        _ => None,
                    };
                    self.reader.consume(offset);
                    if event.is_some() {
                        return Ok(event);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => self
                    .reader
                    .refill()
                    .map_err(|e| SourceError::framing("pcap refill", e))?,
                Err(e) => return Err(SourceError::framing("pcap record", e)),
            }
        }
    }
}

fn legacy_event(packet: &LegacyPcapBlock<'_>, linktype: Linktype, nanosecond: bool) -> PacketEvent {
    let micros = if nanosecond {
        packet.ts_usec / 1_000
    } else {
        packet.ts_usec
    };
    PacketEvent {
        ts: Some(legacy_ts_to_seconds(packet.ts_sec, micros)),
        linktype,
        orig_len: packet.origlen,
        data: captured_bytes(packet.data, packet.caplen).to_vec(),
    }
}

impl NgFraming {
    fn next_frame(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let event = match block {
                        PcapBlockOwned::NG(block) => ng_event(block, &mut self.interfaces),
                        _ => None,
                    };
                    self.reader.consume(offset);
                    if event.is_some() {
                        return Ok(event);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete(_)) => self
                    .reader
                    .refill()
                    .map_err(|e| SourceError::framing("pcapng refill", e))?,
                Err(e) => return Err(SourceError::framing("pcapng block", e)),
            }
        }
    }
}

fn ng_event(block: Block<'_>, interfaces: &mut Vec<Interface>) -> Option<PacketEvent> {
    match block {
        Block::SectionHeader(_) => {
            interfaces.clear();
            None
        }
        Block::InterfaceDescription(intf) => {
            interfaces.push(Interface::new(
                intf.linktype,
                intf.ts_resolution(),
                intf.ts_offset(),
            ));
            None
        }
        Block::EnhancedPacket(packet) => {
            let interface = interface_for(interfaces, packet.if_id);
            Some(PacketEvent {
                ts: Some(pcapng_ts_to_seconds(packet.ts_high, packet.ts_low, &interface)),
                linktype: interface.linktype,
                orig_len: packet.origlen,
                data: captured_bytes(packet.data, packet.caplen).to_vec(),
            })
        }
        // Simple packet blocks carry no timestamp and always belong to
        // the first interface.
        Block::SimplePacket(packet) => Some(PacketEvent {
            ts: None,
            linktype: interface_for(interfaces, 0).linktype,
            orig_len: packet.origlen,
            data: captured_bytes(packet.data, packet.origlen).to_vec(),
        }),
        _ => None,
    }
}
