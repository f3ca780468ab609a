//! BACnet/IP, the protocol of interest.
//!
//! Frames are recognised by the UDP port range 0xBAC0..=0xBACF or by a
//! decoder label. Service codes follow the standard tables in `services`;
//! the textual markers used by the knowledge base live in `layout`.

pub mod layout;
pub mod services;

pub use layout::{PORT_BASE, PORT_LAST, PROTOCOL_NAME};
pub use services::{
    ApduType, ConfirmedService, ServiceKind, UnconfirmedService, classify_service,
    extract_service_code, service_label,
};

pub fn is_bacnet_port(port: u16) -> bool {
    (PORT_BASE..=PORT_LAST).contains(&port)
}
