//! Free-form per-frame detail maps.
//!
//! Decoders fill a [`DetailMap`] with whatever key/value pairs they know.
//! Consumers never look keys up by ad hoc literals: they go through the
//! named accessors below or through [`DetailField`], which normalises one
//! entry into a closed set of known field kinds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::knowledge::health::HealthCategory;

/// Keys emitted by the generic decoder and the deep decoder dialect.
pub mod keys {
    pub const INFO: &str = "_ws.col.Info";
    pub const BVLC_FUNCTION: &str = "bvlc.function";
    pub const BACNET_CONTROL: &str = "bacnet.control";
    pub const APDU_TYPE: &str = "bacapp.type";
    pub const CONFIRMED_SERVICE: &str = "bacapp.confirmed_service";
    pub const UNCONFIRMED_SERVICE: &str = "bacapp.unconfirmed_service";
    pub const INVOKE_ID: &str = "bacapp.invoke_id";
    pub const OBJECT_TYPE: &str = "bacapp.objectType";
    pub const INSTANCE_NUMBER: &str = "bacapp.instance_number";
    pub const VENDOR_IDENTIFIER: &str = "bacapp.vendor_identifier";

    pub const ICMP_TYPE: &str = "icmp.type";
    pub const ICMP_CODE: &str = "icmp.code";
    pub const ICMP_TYPE_NAME: &str = "icmp.type_name";
    pub const ARP_OPCODE: &str = "arp.opcode";

    pub const TCP_RETRANSMISSION: &str = "tcp.analysis.retransmission";
    pub const TCP_SPURIOUS_RETRANSMISSION: &str = "tcp.analysis.spurious_retransmission";
    pub const TCP_FAST_RETRANSMISSION: &str = "tcp.analysis.fast_retransmission";
    pub const TCP_DUPLICATE_ACK: &str = "tcp.analysis.duplicate_ack";
    pub const TCP_DUPLICATE_ACK_NUM: &str = "tcp.analysis.duplicate_ack_num";
    pub const TCP_DUPLICATE_ACK_FRAME: &str = "tcp.analysis.duplicate_ack_frame";
    pub const TCP_RESET: &str = "tcp.flags.reset";
    pub const TCP_LOST_SEGMENT: &str = "tcp.analysis.lost_segment";
    pub const TCP_ACK_LOST_SEGMENT: &str = "tcp.analysis.ack_lost_segment";
    pub const TCP_OUT_OF_ORDER: &str = "tcp.analysis.out_of_order";
    pub const TCP_ZERO_WINDOW: &str = "tcp.analysis.zero_window";
    pub const TCP_ZERO_WINDOW_CHECK: &str = "tcp.analysis.zero_window_probe";
    pub const TCP_ZERO_WINDOW_CHECK_ACK: &str = "tcp.analysis.zero_window_probe_ack";
    pub const TCP_KEEP_ALIVE: &str = "tcp.analysis.keep_alive";
    pub const TCP_KEEP_ALIVE_ACK: &str = "tcp.analysis.keep_alive_ack";
}

/// String-keyed detail map. Keys are case-sensitive; the same field may
/// appear twice with different casing when two decoders disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailMap(BTreeMap<String, String>);

impl DetailMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Overwrite entries key-by-key from `other`; keys only present here stay.
    pub fn update_from(&mut self, other: &DetailMap) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every entry normalised into a [`DetailField`].
    pub fn fields(&self) -> impl Iterator<Item = DetailField<'_>> {
        self.iter().map(|(key, value)| DetailField::parse(key, value))
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .or_else(|| {
                self.0
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn apdu_type(&self) -> Option<&str> {
        self.lookup(keys::APDU_TYPE)
    }

    pub fn confirmed_service(&self) -> Option<&str> {
        self.lookup(keys::CONFIRMED_SERVICE)
    }

    pub fn unconfirmed_service(&self) -> Option<&str> {
        self.lookup(keys::UNCONFIRMED_SERVICE)
    }

    pub fn icmp_type(&self) -> Option<&str> {
        self.lookup(keys::ICMP_TYPE)
    }

    pub fn icmp_type_name(&self) -> Option<&str> {
        self.lookup(keys::ICMP_TYPE_NAME)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DetailMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One detail entry, normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailField<'a> {
    InstanceNumber(&'a str),
    ObjectIdentifier(&'a str),
    ObjectName(&'a str),
    VendorIdentifier(&'a str),
    ApduType(&'a str),
    ConfirmedService(&'a str),
    UnconfirmedService(&'a str),
    /// A known TCP analysis flag that is set.
    Health(HealthCategory),
    /// A known key that carries no signal (unset flag or bookkeeping field).
    Inert,
    /// Anything else; consumers may fall back to text matching.
    Other { key: &'a str, value: &'a str },
}

impl<'a> DetailField<'a> {
    pub fn parse(key: &'a str, value: &'a str) -> Self {
        if let Some(field) = parse_tcp_analysis(key, value) {
            return field;
        }

        let norm = normalize_key(key);
        if norm.contains("instancenumber") {
            DetailField::InstanceNumber(value)
        } else if norm.contains("objectidentifier")
            || norm.contains("deviceinstance")
            || norm.contains("objectinstance")
        {
            DetailField::ObjectIdentifier(value)
        } else if norm.contains("name") {
            DetailField::ObjectName(value)
        } else if norm.contains("vendor") {
            DetailField::VendorIdentifier(value)
        } else if key.eq_ignore_ascii_case(keys::APDU_TYPE) {
            DetailField::ApduType(value)
        } else if key.eq_ignore_ascii_case(keys::CONFIRMED_SERVICE) {
            DetailField::ConfirmedService(value)
        } else if key.eq_ignore_ascii_case(keys::UNCONFIRMED_SERVICE) {
            DetailField::UnconfirmedService(value)
        } else {
            DetailField::Other { key, value }
        }
    }
}

fn parse_tcp_analysis<'a>(key: &str, value: &str) -> Option<DetailField<'a>> {
    let category = match key {
        keys::TCP_RETRANSMISSION | keys::TCP_SPURIOUS_RETRANSMISSION => {
            HealthCategory::Retransmission
        }
        keys::TCP_FAST_RETRANSMISSION => HealthCategory::FastRetransmission,
        keys::TCP_DUPLICATE_ACK => HealthCategory::DuplicateAck,
        keys::TCP_RESET => HealthCategory::Reset,
        keys::TCP_LOST_SEGMENT => HealthCategory::LostSegment,
        keys::TCP_OUT_OF_ORDER => HealthCategory::OutOfOrder,
        keys::TCP_ZERO_WINDOW => HealthCategory::ZeroWindow,
        keys::TCP_KEEP_ALIVE => HealthCategory::KeepAlive,
        keys::TCP_DUPLICATE_ACK_NUM
        | keys::TCP_DUPLICATE_ACK_FRAME
        | keys::TCP_ACK_LOST_SEGMENT
        | keys::TCP_ZERO_WINDOW_CHECK
        | keys::TCP_ZERO_WINDOW_CHECK_ACK
        | keys::TCP_KEEP_ALIVE_ACK => return Some(DetailField::Inert),
        _ => return None,
    };
    if is_unset_flag(value) {
        Some(DetailField::Inert)
    } else {
        Some(DetailField::Health(category))
    }
}

/// `0`, `false` and friends mark a flag that is present but not set.
pub fn is_unset_flag(value: &str) -> bool {
    let value = value.trim();
    value == "0" || value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("not set")
}

/// Lowercase and keep only ASCII alphanumerics, so `bacapp.instance_number`
/// and `Instance Number` compare equal.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
