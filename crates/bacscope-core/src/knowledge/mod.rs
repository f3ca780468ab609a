//! Device knowledge base.
//!
//! Two accumulators fed by the same record stream:
//! - `identity`: endpoint address -> BACnet instance, name and vendor,
//!   learned only from protocol-of-interest frames
//! - `health`: TCP/ICMP health counters, fed by every frame
//!
//! Each decode pass owns its own [`KnowledgeBase`]; the two are combined
//! afterwards with [`KnowledgeBase::merge`]. Fragment-flagged records are
//! ignored by both accumulators.

pub mod health;
pub mod identity;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::record::PacketRecord;

pub use health::{HealthCategory, TcpHealthCounters};
pub use identity::{DeviceIdentity, IdentityEvidence};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeBase {
    devices: BTreeMap<String, DeviceIdentity>,
    seen: BTreeSet<String>,
    health: TcpHealthCounters,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &PacketRecord) {
        if record.fragment {
            return;
        }
        self.health.observe(record);

        if !record.is_protocol_of_interest() {
            return;
        }
        let Some(address) = record.src_addr.as_deref() else {
            return;
        };
        self.seen.insert(address.to_string());
        if record.details.is_empty() {
            return;
        }

        let evidence = IdentityEvidence::extract(&record.details);
        if evidence.is_empty() {
            return;
        }
        self.devices
            .entry(address.to_string())
            .or_default()
            .apply(&evidence);
    }

    pub fn observe_all<'a>(&mut self, records: impl IntoIterator<Item = &'a PacketRecord>) {
        for record in records {
            self.observe(record);
        }
    }

    /// Combine two knowledge bases; `later` acts as the later writer for
    /// the identity rules. Seen sets are unioned, health counters take the
    /// per-counter maximum.
    pub fn merge(earlier: &KnowledgeBase, later: &KnowledgeBase) -> KnowledgeBase {
        let mut devices = earlier.devices.clone();
        for (address, identity) in &later.devices {
            let merged = match devices.get(address) {
                Some(existing) => existing.merged_with(identity),
                None => identity.clone(),
            };
            devices.insert(address.clone(), merged);
        }
        KnowledgeBase {
            devices,
            seen: earlier.seen.union(&later.seen).cloned().collect(),
            health: earlier.health.merge_max(&later.health),
        }
    }

    pub fn device(&self, address: &str) -> Option<&DeviceIdentity> {
        self.devices.get(address)
    }

    pub fn devices(&self) -> impl Iterator<Item = (&str, &DeviceIdentity)> {
        self.devices.iter().map(|(a, d)| (a.as_str(), d))
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn seen_addresses(&self) -> impl Iterator<Item = &str> {
        self.seen.iter().map(String::as_str)
    }

    pub fn health(&self) -> &TcpHealthCounters {
        &self.health
    }

    pub fn snapshot(&self) -> KnowledgeBaseSnapshot {
        KnowledgeBaseSnapshot {
            devices: self
                .devices
                .iter()
                .map(|(address, identity)| DeviceEntry {
                    address: address.clone(),
                    identity: identity.clone(),
                })
                .collect(),
            seen_addresses: self.seen.iter().cloned().collect(),
            health: self.health,
        }
    }

    pub fn from_snapshot(snapshot: KnowledgeBaseSnapshot) -> Self {
        Self {
            devices: snapshot
                .devices
                .into_iter()
                .map(|entry| (entry.address, entry.identity))
                .collect(),
            seen: snapshot.seen_addresses.into_iter().collect(),
            health: snapshot.health,
        }
    }
}

/// Serializable projection of a [`KnowledgeBase`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseSnapshot {
    pub devices: Vec<DeviceEntry>,
    pub seen_addresses: Vec<String>,
    pub health: TcpHealthCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub address: String,
    #[serde(flatten)]
    pub identity: DeviceIdentity,
}
