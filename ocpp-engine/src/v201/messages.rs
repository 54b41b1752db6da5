//! OCPP 2.0.1 request and response payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::*;
use crate::charge_point::OcppRequest;

// ============================================================================
// Charging station -> CSMS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootNotificationRequest {
    pub charging_station: ChargingStation,
    pub reason: BootReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootNotificationResponse {
    pub current_time: DateTime<Utc>,
    /// Heartbeat interval when accepted, retry delay otherwise (seconds)
    pub interval: i32,
    pub status: RegistrationStatus,
    pub status_info: Option<StatusInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusNotificationRequest {
    pub timestamp: DateTime<Utc>,
    pub connector_status: ConnectorStatus,
    pub evse_id: i32,
    pub connector_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusNotificationResponse {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterValuesRequest {
    pub evse_id: i32,
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterValuesResponse {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub id_token: IdToken,
    pub certificate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub id_token_info: IdTokenInfo,
}

// ============================================================================
// Either direction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransferRequest {
    pub vendor_id: String,
    pub message_id: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransferResponse {
    pub status: DataTransferStatus,
    pub data: Option<Value>,
    pub status_info: Option<StatusInfo>,
}

// ============================================================================
// CSMS -> charging station
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStartTransactionRequest {
    pub id_token: IdToken,
    pub remote_start_id: i32,
    pub evse_id: Option<i32>,
    pub charging_profile: Option<ChargingProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStartTransactionResponse {
    pub status: RequestStartStopStatus,
    pub transaction_id: Option<String>,
    pub status_info: Option<StatusInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStopTransactionRequest {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStopTransactionResponse {
    pub status: RequestStartStopStatus,
    pub status_info: Option<StatusInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetChargingProfileRequest {
    pub evse_id: i32,
    pub charging_profile: ChargingProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetChargingProfileResponse {
    pub status: ChargingProfileStatus,
    pub status_info: Option<StatusInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(rename = "type")]
    pub reset_type: ResetType,
    pub evse_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: ResetStatus,
    pub status_info: Option<StatusInfo>,
}

macro_rules! ocpp_request {
    ($($request:ty => $response:ty, $action:literal;)*) => {
        $(
            impl OcppRequest for $request {
                const ACTION: &'static str = $action;
                type Response = $response;
            }
        )*
    };
}

ocpp_request! {
    BootNotificationRequest => BootNotificationResponse, "BootNotification";
    HeartbeatRequest => HeartbeatResponse, "Heartbeat";
    StatusNotificationRequest => StatusNotificationResponse, "StatusNotification";
    MeterValuesRequest => MeterValuesResponse, "MeterValues";
    AuthorizeRequest => AuthorizeResponse, "Authorize";
    DataTransferRequest => DataTransferResponse, "DataTransfer";
    RequestStartTransactionRequest => RequestStartTransactionResponse, "RequestStartTransaction";
    RequestStopTransactionRequest => RequestStopTransactionResponse, "RequestStopTransaction";
    SetChargingProfileRequest => SetChargingProfileResponse, "SetChargingProfile";
    ResetRequest => ResetResponse, "Reset";
}
