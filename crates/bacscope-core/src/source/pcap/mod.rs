//! PCAP/PCAPNG source implementation.
//!
//! This module provides a `PacketSource` backed by legacy PCAP or PCAPNG
//! files. It handles file I/O and block framing, emitting raw frames in file
//! order. Frame numbering is left to the decoder so that every emitted frame
//! gets exactly one ordinal.

pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
