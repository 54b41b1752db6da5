//! Protocol versions and the actions each one defines
//!
//! The registry is what separates "not implemented" (the version defines the
//! action but nothing handles it) from "not supported" (the version has no
//! such action).

use crate::error::OcppError;

/// Negotiated OCPP protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V16,
    V20,
    V201,
}

impl ProtocolVersion {
    /// WebSocket subprotocol offered during the handshake
    pub fn subprotocol(&self) -> &'static str {
        match self {
            ProtocolVersion::V16 => "ocpp1.6",
            ProtocolVersion::V20 => "ocpp2.0",
            ProtocolVersion::V201 => "ocpp2.0.1",
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolVersion::V16 => write!(f, "1.6"),
            ProtocolVersion::V20 => write!(f, "2.0"),
            ProtocolVersion::V201 => write!(f, "2.0.1"),
        }
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = OcppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("ocpp") {
            "1.6" => Ok(ProtocolVersion::V16),
            "2.0" => Ok(ProtocolVersion::V20),
            "2.0.1" => Ok(ProtocolVersion::V201),
            other => Err(OcppError::InvalidFormat(format!(
                "unknown protocol version: {}",
                other
            ))),
        }
    }
}

/// Knows which actions belong to which protocol version
pub trait ActionRegistry: Send + Sync {
    fn is_known(&self, action: &str, version: ProtocolVersion) -> bool;
}

/// Resolve a routing miss into the error the peer should see
pub fn resolve_unrouted(
    registry: &dyn ActionRegistry,
    action: &str,
    version: ProtocolVersion,
) -> OcppError {
    if registry.is_known(action, version) {
        OcppError::NotImplemented {
            action: action.to_string(),
        }
    } else {
        OcppError::NotSupported {
            action: action.to_string(),
            version,
        }
    }
}

/// OCPP 1.6 actions, security whitepaper extension included
pub const V16_ACTIONS: &[&str] = &[
    "Authorize",
    "BootNotification",
    "CancelReservation",
    "CertificateSigned",
    "ChangeAvailability",
    "ChangeConfiguration",
    "ClearCache",
    "ClearChargingProfile",
    "DataTransfer",
    "DeleteCertificate",
    "DiagnosticsStatusNotification",
    "ExtendedTriggerMessage",
    "FirmwareStatusNotification",
    "GetCompositeSchedule",
    "GetConfiguration",
    "GetDiagnostics",
    "GetInstalledCertificateIds",
    "GetLocalListVersion",
    "GetLog",
    "Heartbeat",
    "InstallCertificate",
    "LogStatusNotification",
    "MeterValues",
    "RemoteStartTransaction",
    "RemoteStopTransaction",
    "ReserveNow",
    "Reset",
    "SecurityEventNotification",
    "SendLocalList",
    "SetChargingProfile",
    "SignCertificate",
    "SignedFirmwareStatusNotification",
    "SignedUpdateFirmware",
    "StartTransaction",
    "StatusNotification",
    "StopTransaction",
    "TriggerMessage",
    "UnlockConnector",
    "UpdateFirmware",
];

/// OCPP 2.0.1 actions (also used for 2.0)
pub const V201_ACTIONS: &[&str] = &[
    "Authorize",
    "BootNotification",
    "CancelReservation",
    "CertificateSigned",
    "ChangeAvailability",
    "ClearCache",
    "ClearChargingProfile",
    "ClearDisplayMessage",
    "ClearedChargingLimit",
    "ClearVariableMonitoring",
    "CostUpdated",
    "CustomerInformation",
    "DataTransfer",
    "DeleteCertificate",
    "FirmwareStatusNotification",
    "Get15118EVCertificate",
    "GetBaseReport",
    "GetCertificateStatus",
    "GetChargingProfiles",
    "GetCompositeSchedule",
    "GetDisplayMessages",
    "GetInstalledCertificateIds",
    "GetLocalListVersion",
    "GetLog",
    "GetMonitoringReport",
    "GetReport",
    "GetTransactionStatus",
    "GetVariables",
    "Heartbeat",
    "InstallCertificate",
    "LogStatusNotification",
    "MeterValues",
    "NotifyChargingLimit",
    "NotifyCustomerInformation",
    "NotifyDisplayMessages",
    "NotifyEVChargingNeeds",
    "NotifyEVChargingSchedule",
    "NotifyEvent",
    "NotifyMonitoringReport",
    "NotifyReport",
    "PublishFirmware",
    "PublishFirmwareStatusNotification",
    "ReportChargingProfiles",
    "RequestStartTransaction",
    "RequestStopTransaction",
    "ReservationStatusUpdate",
    "ReserveNow",
    "Reset",
    "SecurityEventNotification",
    "SendLocalList",
    "SetChargingProfile",
    "SetDisplayMessage",
    "SetMonitoringBase",
    "SetMonitoringLevel",
    "SetNetworkProfile",
    "SetVariableMonitoring",
    "SetVariables",
    "SignCertificate",
    "StatusNotification",
    "TransactionEvent",
    "TriggerMessage",
    "UnlockConnector",
    "UnpublishFirmware",
    "UpdateFirmware",
];

/// Registry backed by the published action lists
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardActions;

impl ActionRegistry for StandardActions {
    fn is_known(&self, action: &str, version: ProtocolVersion) -> bool {
        let actions = match version {
            ProtocolVersion::V16 => V16_ACTIONS,
            ProtocolVersion::V20 | ProtocolVersion::V201 => V201_ACTIONS,
        };
        actions.contains(&action)
    }
}
