//! BACnet APDU and service code tables (ASHRAE 135, clause 21).

use crate::details::DetailMap;

/// APDU type, the high nibble of the first APDU octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduType {
    ConfirmedRequest,
    UnconfirmedRequest,
    SimpleAck,
    ComplexAck,
    SegmentAck,
    Error,
    Reject,
    Abort,
}

impl ApduType {
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => ApduType::ConfirmedRequest,
            1 => ApduType::UnconfirmedRequest,
            2 => ApduType::SimpleAck,
            3 => ApduType::ComplexAck,
            4 => ApduType::SegmentAck,
            5 => ApduType::Error,
            6 => ApduType::Reject,
            7 => ApduType::Abort,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ApduType::ConfirmedRequest => "confirmed-REQUEST",
            ApduType::UnconfirmedRequest => "unconfirmed-REQUEST",
            ApduType::SimpleAck => "simpleACK",
            ApduType::ComplexAck => "complexACK",
            ApduType::SegmentAck => "segmentACK",
            ApduType::Error => "error",
            ApduType::Reject => "reject",
            ApduType::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedService {
    AcknowledgeAlarm,
    ConfirmedCovNotification,
    ConfirmedEventNotification,
    GetAlarmSummary,
    GetEnrollmentSummary,
    SubscribeCov,
    AtomicReadFile,
    AtomicWriteFile,
    AddListElement,
    RemoveListElement,
    CreateObject,
    DeleteObject,
    ReadProperty,
    ReadPropertyConditional,
    ReadPropertyMultiple,
    WriteProperty,
    WritePropertyMultiple,
    DeviceCommunicationControl,
    ConfirmedPrivateTransfer,
    ConfirmedTextMessage,
    ReinitializeDevice,
    VtOpen,
    VtClose,
    VtData,
    Authenticate,
    RequestKey,
    ReadRange,
    LifeSafetyOperation,
    SubscribeCovProperty,
    GetEventInformation,
    SubscribeCovPropertyMultiple,
    ConfirmedCovNotificationMultiple,
    ConfirmedAuditNotification,
    AuditLogQuery,
}

impl ConfirmedService {
    pub fn from_code(code: u32) -> Option<Self> {
        use ConfirmedService::*;
        Some(match code {
            0 => AcknowledgeAlarm,
            1 => ConfirmedCovNotification,
            2 => ConfirmedEventNotification,
            3 => GetAlarmSummary,
            4 => GetEnrollmentSummary,
            5 => SubscribeCov,
            6 => AtomicReadFile,
            7 => AtomicWriteFile,
            8 => AddListElement,
            9 => RemoveListElement,
            10 => CreateObject,
            11 => DeleteObject,
            12 => ReadProperty,
            13 => ReadPropertyConditional,
            14 => ReadPropertyMultiple,
            15 => WriteProperty,
            16 => WritePropertyMultiple,
            17 => DeviceCommunicationControl,
            18 => ConfirmedPrivateTransfer,
            19 => ConfirmedTextMessage,
            20 => ReinitializeDevice,
            21 => VtOpen,
            22 => VtClose,
            23 => VtData,
            24 => Authenticate,
            25 => RequestKey,
            26 => ReadRange,
            27 => LifeSafetyOperation,
            28 => SubscribeCovProperty,
            29 => GetEventInformation,
            30 => SubscribeCovPropertyMultiple,
            31 => ConfirmedCovNotificationMultiple,
            32 => ConfirmedAuditNotification,
            33 => AuditLogQuery,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use ConfirmedService::*;
        match self {
            AcknowledgeAlarm => "acknowledgeAlarm",
            ConfirmedCovNotification => "confirmedCOVNotification",
            ConfirmedEventNotification => "confirmedEventNotification",
            GetAlarmSummary => "getAlarmSummary",
            GetEnrollmentSummary => "getEnrollmentSummary",
            SubscribeCov => "subscribeCOV",
            AtomicReadFile => "atomicReadFile",
            AtomicWriteFile => "atomicWriteFile",
            AddListElement => "addListElement",
            RemoveListElement => "removeListElement",
            CreateObject => "createObject",
            DeleteObject => "deleteObject",
            ReadProperty => "readProperty",
            ReadPropertyConditional => "readPropertyConditional",
            ReadPropertyMultiple => "readPropertyMultiple",
            WriteProperty => "writeProperty",
            WritePropertyMultiple => "writePropertyMultiple",
            DeviceCommunicationControl => "deviceCommunicationControl",
            ConfirmedPrivateTransfer => "confirmedPrivateTransfer",
            ConfirmedTextMessage => "confirmedTextMessage",
            ReinitializeDevice => "reinitializeDevice",
            VtOpen => "vtOpen",
            VtClose => "vtClose",
            VtData => "vtData",
            Authenticate => "authenticate",
            RequestKey => "requestKey",
            ReadRange => "readRange",
            LifeSafetyOperation => "lifeSafetyOperation",
            SubscribeCovProperty => "subscribeCOVProperty",
            GetEventInformation => "getEventInformation",
            SubscribeCovPropertyMultiple => "subscribeCOVPropertyMultiple",
            ConfirmedCovNotificationMultiple => "confirmedCOVNotificationMultiple",
            ConfirmedAuditNotification => "confirmedAuditNotification",
            AuditLogQuery => "auditLogQuery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnconfirmedService {
    IAm,
    IHave,
    UnconfirmedCovNotification,
    UnconfirmedEventNotification,
    UnconfirmedPrivateTransfer,
    UnconfirmedTextMessage,
    TimeSynchronization,
    WhoHas,
    WhoIs,
    UtcTimeSynchronization,
    WriteGroup,
    UnconfirmedCovNotificationMultiple,
    UnconfirmedAuditNotification,
    WhoAmI,
    YouAre,
}

impl UnconfirmedService {
    pub fn from_code(code: u32) -> Option<Self> {
        use UnconfirmedService::*;
        Some(match code {
            0 => IAm,
            1 => IHave,
            2 => UnconfirmedCovNotification,
            3 => UnconfirmedEventNotification,
            4 => UnconfirmedPrivateTransfer,
            5 => UnconfirmedTextMessage,
            6 => TimeSynchronization,
            7 => WhoHas,
            8 => WhoIs,
            9 => UtcTimeSynchronization,
            10 => WriteGroup,
            11 => UnconfirmedCovNotificationMultiple,
            12 => UnconfirmedAuditNotification,
            13 => WhoAmI,
            14 => YouAre,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use UnconfirmedService::*;
        match self {
            IAm => "i-Am",
            IHave => "i-Have",
            UnconfirmedCovNotification => "unconfirmedCOVNotification",
            UnconfirmedEventNotification => "unconfirmedEventNotification",
            UnconfirmedPrivateTransfer => "unconfirmedPrivateTransfer",
            UnconfirmedTextMessage => "unconfirmedTextMessage",
            TimeSynchronization => "timeSynchronization",
            WhoHas => "who-Has",
            WhoIs => "who-Is",
            UtcTimeSynchronization => "utcTimeSynchronization",
            WriteGroup => "writeGroup",
            UnconfirmedCovNotificationMultiple => "unconfirmedCOVNotificationMultiple",
            UnconfirmedAuditNotification => "unconfirmedAuditNotification",
            WhoAmI => "who-Am-I",
            YouAre => "you-Are",
        }
    }
}

/// Service carried by a frame, as far as the detail map tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Confirmed(ConfirmedService),
    Unconfirmed(UnconfirmedService),
    /// A code outside the tables; `confirmed` tells which table was tried.
    Unknown { confirmed: bool, code: u32 },
}

impl ServiceKind {
    pub fn is_identity_announcement(self) -> bool {
        matches!(self, ServiceKind::Unconfirmed(UnconfirmedService::IAm))
    }

    pub fn name(self) -> String {
        match self {
            ServiceKind::Confirmed(service) => service.name().to_string(),
            ServiceKind::Unconfirmed(service) => service.name().to_string(),
            ServiceKind::Unknown { confirmed, code } => {
                let table = if confirmed { "confirmed" } else { "unconfirmed" };
                format!("{table}({code})")
            }
        }
    }
}

/// Extract the service code from a decorated or raw service string.
///
/// `readProperty(12)` and `12` both yield 12. A parenthesised number wins
/// over any other digits; otherwise the first run of digits is used.
pub fn extract_service_code(text: &str) -> Option<u32> {
    if let Some(open) = text.rfind('(') {
        if let Some(code) = first_digit_run(&text[open + 1..]) {
            return code.parse().ok();
        }
    }
    first_digit_run(text)?.parse().ok()
}

fn first_digit_run(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Classify the service of a frame from its detail map.
pub fn classify_service(details: &DetailMap) -> Option<ServiceKind> {
    if let Some(code) = details.unconfirmed_service().and_then(extract_service_code) {
        return Some(
            UnconfirmedService::from_code(code)
                .map(ServiceKind::Unconfirmed)
                .unwrap_or(ServiceKind::Unknown {
                    confirmed: false,
                    code,
                }),
        );
    }
    let code = details.confirmed_service().and_then(extract_service_code)?;
    Some(
        ConfirmedService::from_code(code)
            .map(ServiceKind::Confirmed)
            .unwrap_or(ServiceKind::Unknown {
                confirmed: true,
                code,
            }),
    )
}

/// Label a BACnet frame for the per-service counts: the service name when
/// one is present, else the APDU type (acks, errors, rejects and aborts).
pub fn service_label(details: &DetailMap) -> Option<String> {
    if let Some(kind) = classify_service(details) {
        return Some(kind.name());
    }
    let code = details.apdu_type().and_then(extract_service_code)?;
    Some(match ApduType::from_code(code) {
        Some(apdu) => apdu.name().to_string(),
        None => format!("apdu({code})"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::keys;

    #[test]
    fn extracts_codes_from_decorated_and_raw_strings() {
        assert_eq!(extract_service_code("readProperty(12)"), Some(12));
        assert_eq!(extract_service_code("12"), Some(12));
        assert_eq!(extract_service_code(" 8 "), Some(8));
        assert_eq!(extract_service_code("who-Is (8)"), Some(8));
        assert_eq!(extract_service_code("i-Am"), None);
        assert_eq!(extract_service_code(""), None);
    }

    #[test]
    fn tables_match_reference_codes() {
        assert_eq!(UnconfirmedService::from_code(0), Some(UnconfirmedService::IAm));
        assert_eq!(UnconfirmedService::from_code(8), Some(UnconfirmedService::WhoIs));
        assert_eq!(ConfirmedService::from_code(5), Some(ConfirmedService::SubscribeCov));
        assert_eq!(ConfirmedService::from_code(12), Some(ConfirmedService::ReadProperty));
        assert_eq!(ConfirmedService::from_code(15), Some(ConfirmedService::WriteProperty));
        assert_eq!(ConfirmedService::from_code(34), None);
        assert_eq!(ApduType::from_code(1), Some(ApduType::UnconfirmedRequest));
        assert_eq!(ApduType::from_code(8), None);
    }

    #[test]
    fn classify_prefers_unconfirmed_field() {
        let details: DetailMap = [(keys::UNCONFIRMED_SERVICE, "0")].into_iter().collect();
        let kind = classify_service(&details).unwrap();
        assert!(kind.is_identity_announcement());
        assert_eq!(kind.name(), "i-Am");

        let details: DetailMap = [(keys::CONFIRMED_SERVICE, "readProperty(12)")]
            .into_iter()
            .collect();
        assert_eq!(
            classify_service(&details),
            Some(ServiceKind::Confirmed(ConfirmedService::ReadProperty))
        );

        let details: DetailMap = [(keys::CONFIRMED_SERVICE, "99")].into_iter().collect();
        assert_eq!(classify_service(&details).unwrap().name(), "confirmed(99)");
    }

    #[test]
    fn service_label_falls_back_to_apdu_type() {
        let details: DetailMap = [(keys::APDU_TYPE, "0"), (keys::CONFIRMED_SERVICE, "15")]
            .into_iter()
            .collect();
        assert_eq!(service_label(&details).as_deref(), Some("writeProperty"));

        let details: DetailMap = [(keys::APDU_TYPE, "2")].into_iter().collect();
        assert_eq!(service_label(&details).as_deref(), Some("simpleACK"));

        let details: DetailMap = [(keys::APDU_TYPE, "9")].into_iter().collect();
        assert_eq!(service_label(&details).as_deref(), Some("apdu(9)"));

        let details: DetailMap = [(keys::INVOKE_ID, "4")].into_iter().collect();
        assert_eq!(service_label(&details), None);
    }
}
