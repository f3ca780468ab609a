use std::io::{self, BufRead};

use crate::protocols::bacnet;
use crate::record::{PacketRecord, transport};
use crate::warnings::WarningLog;

use super::error::LineError;

mod fields {
    pub const FRAME_NUMBER: &str = "frame.number";
    pub const TIME_EPOCH: &str = "frame.time_epoch";
    pub const FRAME_LEN: &str = "frame.len";
    pub const ETH_SRC: &str = "eth.src";
    pub const ETH_DST: &str = "eth.dst";
    pub const IP_SRC: &str = "ip.src";
    pub const IP_DST: &str = "ip.dst";
    pub const IPV6_SRC: &str = "ipv6.src";
    pub const IPV6_DST: &str = "ipv6.dst";
    pub const IP_TTL: &str = "ip.ttl";
    pub const IPV6_HLIM: &str = "ipv6.hlim";
    pub const UDP_SRCPORT: &str = "udp.srcport";
    pub const UDP_DSTPORT: &str = "udp.dstport";
}

/// Parse one tab-separated output line.
///
/// Columns pair with `field_names` in order; missing trailing columns are
/// treated as empty, extra columns are an error. Structural fields fill
/// the record itself, every other non-empty column lands in the detail map
/// under its field name.
pub fn parse_line(line: &str, field_names: &[String]) -> Result<PacketRecord, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() > field_names.len() {
        return Err(LineError::TooManyColumns {
            expected: field_names.len(),
            found: columns.len(),
        });
    }

    let mut record = PacketRecord::new(0, 0.0, 0, transport::ETHERNET);
    let mut frame_number = None;
    for (field, value) in field_names.iter().zip(columns) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match field.as_str() {
            fields::FRAME_NUMBER => frame_number = Some(number(field, value)?),
            fields::TIME_EPOCH => record.timestamp = number(field, value)?,
            fields::FRAME_LEN => record.length = number(field, value)?,
            fields::ETH_SRC => record.src_mac = Some(value.to_string()),
            fields::ETH_DST => record.dst_mac = Some(value.to_string()),
            fields::IP_SRC => set_address(&mut record, true, value, transport::IPV4),
            fields::IP_DST => set_address(&mut record, false, value, transport::IPV4),
            fields::IPV6_SRC => set_address(&mut record, true, value, transport::IPV6),
            fields::IPV6_DST => set_address(&mut record, false, value, transport::IPV6),
            fields::IP_TTL | fields::IPV6_HLIM => record.ttl = Some(number(field, value)?),
            fields::UDP_SRCPORT => record.src_port = Some(number(field, value)?),
            fields::UDP_DSTPORT => record.dst_port = Some(number(field, value)?),
            _ => record.details.insert(field.clone(), value),
        }
    }

    record.frame_number = frame_number.ok_or(LineError::MissingFrameNumber)?;
    if record.src_port.is_some() || record.dst_port.is_some() {
        record.transport = transport::UDP.to_string();
    }
    record.app_protocol = Some(bacnet::PROTOCOL_NAME.to_string());
    Ok(record)
}

fn number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, LineError> {
    value.parse().map_err(|_| LineError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn set_address(record: &mut PacketRecord, source: bool, value: &str, network: &str) {
    let slot = if source {
        &mut record.src_addr
    } else {
        &mut record.dst_addr
    };
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
    if record.transport == transport::ETHERNET {
        record.transport = network.to_string();
    }
}

/// Pull-based reader over staged decoder output.
///
/// Malformed lines are skipped and noted in [`StagedRecords::warnings`].
/// An I/O error ends iteration; fetch it with [`StagedRecords::take_error`].
pub struct StagedRecords<R> {
    reader: R,
    field_names: Vec<String>,
    line: Vec<u8>,
    line_number: u64,
    bytes_read: u64,
    error: Option<io::Error>,
    warnings: WarningLog,
}

impl<R: BufRead> StagedRecords<R> {
    pub fn new(reader: R, field_names: Vec<String>) -> Self {
        Self {
            reader,
            field_names,
            line: Vec::new(),
            line_number: 0,
            bytes_read: 0,
            error: None,
            warnings: WarningLog::new(),
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    pub fn into_warnings(self) -> WarningLog {
        self.warnings
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: BufRead> Iterator for StagedRecords<R> {
    type Item = PacketRecord;

    fn next(&mut self) -> Option<PacketRecord> {
        if self.error.is_some() {
            return None;
        }
        loop {
            self.line.clear();
            let read = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.error = Some(err);
                    return None;
                }
            };
            self.bytes_read += read as u64;
            self.line_number += 1;

            let text = String::from_utf8_lossy(&self.line);
            if text.trim().is_empty() {
                continue;
            }
            match parse_line(&text, &self.field_names) {
                Ok(record) => return Some(record),
                Err(err) => self
                    .warnings
                    .push(format!("deep decoder line {}", self.line_number), err.to_string()),
            }
        }
    }
}
