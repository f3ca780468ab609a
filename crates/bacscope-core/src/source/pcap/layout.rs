/// Section header block magic for PCAPNG files.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Legacy PCAP magics: microsecond and nanosecond variants, both byte orders.
pub const LEGACY_MAGICS: [[u8; 4]; 4] = [
    [0xd4, 0xc3, 0xb2, 0xa1],
    [0xa1, 0xb2, 0xc3, 0xd4],
    [0x4d, 0x3c, 0xb2, 0xa1],
    [0xa1, 0xb2, 0x3c, 0x4d],
];

/// Buffer size handed to the pcap-parser readers.
pub const PCAP_READER_BUFFER_SIZE: usize = 64 * 1024;

pub const MICROS_PER_SECOND: f64 = 1e6;

/// PCAPNG timestamp units per second when an interface has no `if_tsresol`.
pub const DEFAULT_TS_RESOLUTION: u64 = 1_000_000;
