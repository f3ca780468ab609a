/// Application label used for the protocol of interest.
pub const PROTOCOL_NAME: &str = "BACnet";

/// BACnet/IP well-known UDP port (0xBAC0).
pub const PORT_BASE: u16 = 47_808;
/// Number of contiguous ports starting at `PORT_BASE` (0xBAC0..=0xBACF).
pub const PORT_RANGE_LEN: u16 = 16;
pub const PORT_LAST: u16 = PORT_BASE + PORT_RANGE_LEN - 1;

/// Substrings in free text that mark an identity announcement.
pub const ANNOUNCEMENT_MARKERS: [&str; 2] = ["i-am", "iam"];

/// `device,<digits>` object identifier prefix as rendered by decoders.
pub const DEVICE_OBJECT_PREFIX: &str = "device,";
