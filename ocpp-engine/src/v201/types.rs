//! OCPP 2.0.1 enumerations and datatypes
//!
//! Field names use internal (snake_case) naming; the engine converts keys to
//! and from wire naming. Enumeration values go over the wire unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Enumerations
// ============================================================================

/// Connector status reported in StatusNotification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Available,
    Occupied,
    Reserved,
    Unavailable,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingProfilePurpose {
    ChargingStationExternalConstraints,
    ChargingStationMaxProfile,
    TxDefaultProfile,
    TxProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingProfileKind {
    Absolute,
    Recurring,
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingRateUnit {
    W,
    A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrencyKind {
    Daily,
    Weekly,
}

/// Accepted/Rejected answer shared by many responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenericStatus {
    Accepted,
    Rejected,
}

/// Answer to SetChargingProfile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingProfileStatus {
    Accepted,
    Rejected,
}

/// Answer to RequestStartTransaction / RequestStopTransaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStartStopStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Blocked,
    ConcurrentTx,
    Expired,
    Invalid,
    NoCredit,
    NotAllowedTypeEVSE,
    NotAtThisLocation,
    NotAtThisTime,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataTransferStatus {
    Accepted,
    Rejected,
    UnknownMessageId,
    UnknownVendorId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    Immediate,
    OnIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetStatus {
    Accepted,
    Rejected,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootReason {
    ApplicationReset,
    FirmwareUpdate,
    LocalReset,
    PowerUp,
    RemoteReset,
    ScheduledReset,
    Triggered,
    Unknown,
    Watchdog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdTokenType {
    Central,
    #[serde(rename = "eMAID")]
    EMaid,
    ISO14443,
    ISO15693,
    KeyCode,
    Local,
    MacAddress,
    NoAuthorization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurand {
    #[serde(rename = "Current.Import")]
    CurrentImport,
    #[serde(rename = "Current.Export")]
    CurrentExport,
    #[serde(rename = "Energy.Active.Import.Register")]
    EnergyActiveImportRegister,
    #[serde(rename = "Energy.Active.Export.Register")]
    EnergyActiveExportRegister,
    #[serde(rename = "Power.Active.Import")]
    PowerActiveImport,
    #[serde(rename = "Power.Active.Export")]
    PowerActiveExport,
    Voltage,
    SoC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingContext {
    #[serde(rename = "Interruption.Begin")]
    InterruptionBegin,
    #[serde(rename = "Interruption.End")]
    InterruptionEnd,
    Other,
    #[serde(rename = "Sample.Clock")]
    SampleClock,
    #[serde(rename = "Sample.Periodic")]
    SamplePeriodic,
    #[serde(rename = "Transaction.Begin")]
    TransactionBegin,
    #[serde(rename = "Transaction.End")]
    TransactionEnd,
    Trigger,
}

// ============================================================================
// Datatypes
// ============================================================================

/// Identification token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdToken {
    pub id_token: String,
    #[serde(rename = "type")]
    pub token_type: IdTokenType,
}

impl IdToken {
    pub fn central(id: impl Into<String>) -> Self {
        Self {
            id_token: id.into(),
            token_type: IdTokenType::Central,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenInfo {
    pub status: AuthorizationStatus,
    pub cache_expiry_date_time: Option<DateTime<Utc>>,
    pub charging_priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub reason_code: String,
    pub additional_info: Option<String>,
}

impl StatusInfo {
    pub fn new(reason_code: impl Into<String>) -> Self {
        Self {
            reason_code: reason_code.into(),
            additional_info: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modem {
    pub iccid: Option<String>,
    pub imsi: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub model: String,
    pub vendor_name: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub modem: Option<Modem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSchedulePeriod {
    pub start_period: i32,
    pub limit: f64,
    pub number_phases: Option<i32>,
    pub phase_to_use: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSchedule {
    pub id: i32,
    pub charging_rate_unit: ChargingRateUnit,
    pub charging_schedule_period: Vec<ChargingSchedulePeriod>,
    pub start_schedule: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub min_charging_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingProfile {
    pub id: i32,
    pub stack_level: i32,
    pub charging_profile_purpose: ChargingProfilePurpose,
    pub charging_profile_kind: ChargingProfileKind,
    pub charging_schedule: Vec<ChargingSchedule>,
    pub recurrency_kind: Option<RecurrencyKind>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
}

impl ChargingProfile {
    /// Limit of the first period of the first schedule
    pub fn initial_limit(&self) -> Option<(f64, ChargingRateUnit)> {
        let schedule = self.charging_schedule.first()?;
        let period = schedule.charging_schedule_period.first()?;
        Some((period.limit, schedule.charging_rate_unit))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledValue {
    pub value: f64,
    pub context: Option<ReadingContext>,
    pub measurand: Option<Measurand>,
    pub phase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub sampled_value: Vec<SampledValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{remove_absent, serialize_payload, to_internal_naming, to_wire_naming};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn profile() -> ChargingProfile {
        ChargingProfile {
            id: 1,
            stack_level: 0,
            charging_profile_purpose: ChargingProfilePurpose::TxDefaultProfile,
            charging_profile_kind: ChargingProfileKind::Absolute,
            charging_schedule: vec![ChargingSchedule {
                id: 1,
                charging_rate_unit: ChargingRateUnit::W,
                charging_schedule_period: vec![ChargingSchedulePeriod {
                    start_period: 0,
                    limit: 22000.0,
                    number_phases: Some(3),
                    phase_to_use: None,
                }],
                start_schedule: None,
                duration: None,
                min_charging_rate: None,
            }],
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
        }
    }

    #[test]
    fn test_charging_profile_wire_form() {
        let wire = to_wire_naming(remove_absent(serialize_payload(&profile()).unwrap()));

        assert_eq!(
            wire,
            json!({
                "id": 1,
                "stackLevel": 0,
                "chargingProfilePurpose": "TxDefaultProfile",
                "chargingProfileKind": "Absolute",
                "chargingSchedule": [{
                    "id": 1,
                    "chargingRateUnit": "W",
                    "chargingSchedulePeriod": [
                        { "startPeriod": 0, "limit": 22000.0, "numberPhases": 3 }
                    ]
                }]
            })
        );

        let parsed: ChargingProfile = serde_json::from_value(to_internal_naming(wire)).unwrap();
        assert_eq!(parsed, profile());
        assert_eq!(parsed.initial_limit(), Some((22000.0, ChargingRateUnit::W)));
    }

    #[test]
    fn test_id_token_type_key() {
        let token: IdToken =
            serde_json::from_value(to_internal_naming(json!({ "idToken": "AB12", "type": "eMAID" })))
                .unwrap();
        assert_eq!(token.token_type, IdTokenType::EMaid);
        assert_eq!(token.id_token, "AB12");
    }
}
