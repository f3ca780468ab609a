use serde::{Deserialize, Serialize};

use crate::details::{DetailField, DetailMap};
use crate::protocols::bacnet::{self, layout::ANNOUNCEMENT_MARKERS, layout::DEVICE_OBJECT_PREFIX};

/// What the knowledge base believes about one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Set once the instance came from an identity announcement.
    pub announced: bool,
}

impl DeviceIdentity {
    /// Apply one frame's evidence.
    ///
    /// An announcement overwrites the instance; any other frame only fills
    /// it in when absent. Name and vendor are first-writer-wins.
    pub fn apply(&mut self, evidence: &IdentityEvidence) {
        if let Some(instance) = &evidence.instance {
            if evidence.announcement {
                self.instance = Some(instance.clone());
                self.announced = true;
            } else if self.instance.is_none() {
                self.instance = Some(instance.clone());
            }
        }
        if self.name.is_none() {
            self.name = evidence.name.clone();
        }
        if self.vendor.is_none() {
            self.vendor = evidence.vendor.clone();
        }
    }

    /// Combine with an identity learned later (for instance by the deep pass).
    pub fn merged_with(&self, later: &DeviceIdentity) -> DeviceIdentity {
        let mut out = self.clone();
        out.apply(&IdentityEvidence {
            instance: later.instance.clone(),
            name: later.name.clone(),
            vendor: later.vendor.clone(),
            announcement: later.announced,
        });
        out
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_none() && self.name.is_none() && self.vendor.is_none()
    }
}

/// Identity candidates extracted from one detail map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityEvidence {
    pub instance: Option<String>,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub announcement: bool,
}

impl IdentityEvidence {
    /// Scan every entry once and keep the first candidate per category.
    ///
    /// Instance priority: explicit instance-number field, then a
    /// `device,<digits>` object reference in any value, then an object
    /// identifier field.
    pub fn extract(details: &DetailMap) -> Self {
        let mut explicit = None;
        let mut device_ref = None;
        let mut object_id = None;
        let mut name = None;
        let mut vendor = None;
        let mut announcement = false;

        for (key, value) in details.iter() {
            if !announcement && is_announcement_text(value) {
                announcement = true;
            }
            if device_ref.is_none() {
                device_ref = device_reference(value);
            }
            match DetailField::parse(key, value) {
                DetailField::InstanceNumber(v) if explicit.is_none() => explicit = digits(v),
                DetailField::ObjectIdentifier(v) if object_id.is_none() => object_id = digits(v),
                DetailField::ObjectName(v) if name.is_none() => name = name_candidate(v),
                DetailField::VendorIdentifier(v) if vendor.is_none() => {
                    vendor = vendor_candidate(v)
                }
                _ => {}
            }
        }

        if !announcement {
            announcement = bacnet::classify_service(details)
                .is_some_and(|kind| kind.is_identity_announcement());
        }

        Self {
            instance: explicit.or(device_ref).or(object_id),
            name,
            vendor,
            announcement,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instance.is_none() && self.name.is_none() && self.vendor.is_none()
    }
}

fn is_announcement_text(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    ANNOUNCEMENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Keep only ASCII digits; an empty result is no candidate.
pub fn digits(value: &str) -> Option<String> {
    let out: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    (!out.is_empty()).then_some(out)
}

fn device_reference(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let start = lower.find(DEVICE_OBJECT_PREFIX)? + DEVICE_OBJECT_PREFIX.len();
    let number: String = lower[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    (!number.is_empty()).then_some(number)
}

fn name_candidate(value: &str) -> Option<String> {
    let value = value.trim();
    (value.chars().count() > 1).then(|| value.to_string())
}

fn vendor_candidate(value: &str) -> Option<String> {
    digits(value).or_else(|| {
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
