//! OCPP-J message framing
//!
//! OCPP carries JSON arrays over the connection:
//! - CALL: [2, messageId, action, payload]
//! - CALLRESULT: [3, messageId, payload]
//! - CALLERROR: [4, messageId, errorCode, errorDescription, errorDetails]

use serde_json::Value;

use crate::error::{ErrorCode, OcppError};

/// OCPP message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// OCPP CALL message (request)
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub message_id: String,
    pub action: String,
    pub payload: Value,
}

impl Call {
    pub fn new(message_id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self {
            message_id: message_id.into(),
            action: action.into(),
            payload,
        }
    }

    /// Build the CALLRESULT answering this call
    pub fn create_call_result(&self, payload: Value) -> CallResult {
        CallResult {
            message_id: self.message_id.clone(),
            payload,
        }
    }

    /// Build the CALLERROR answering this call
    pub fn create_call_error(&self, error: &OcppError) -> CallError {
        CallError {
            message_id: self.message_id.clone(),
            error_code: error.code(),
            error_description: error.description(),
            error_details: error.details(),
        }
    }

    /// Serialize to OCPP wire format: [2, messageId, action, payload]
    pub fn to_frame(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::Call as i32,
            &self.message_id,
            &self.action,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// OCPP CALLRESULT message (success response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub message_id: String,
    pub payload: Value,
}

impl CallResult {
    /// Serialize to OCPP wire format: [3, messageId, payload]
    pub fn to_frame(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::CallResult as i32,
            &self.message_id,
            &self.payload
        ]);
        Ok(serde_json::to_string(&array)?)
    }
}

/// OCPP CALLERROR message (error response)
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub message_id: String,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub error_details: Value,
}

impl CallError {
    /// Serialize to OCPP wire format: [4, messageId, errorCode, errorDescription, errorDetails]
    pub fn to_frame(&self) -> Result<String, OcppError> {
        let array = serde_json::json!([
            MessageType::CallError as i32,
            &self.message_id,
            self.error_code.to_string(),
            &self.error_description,
            &self.error_details
        ]);
        Ok(serde_json::to_string(&array)?)
    }

    /// The error value a caller sees for this response
    pub fn to_error(&self) -> OcppError {
        OcppError::RemoteError {
            code: self.error_code,
            description: self.error_description.clone(),
            details: self.error_details.clone(),
        }
    }
}

/// Parsed OCPP message (any type)
#[derive(Debug, Clone, PartialEq)]
pub enum OcppMessage {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

impl OcppMessage {
    /// Parse an OCPP message from a text frame
    pub fn parse(frame: &str) -> Result<Self, OcppError> {
        let array: Vec<Value> = serde_json::from_str(frame)?;

        let msg_type = array
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| OcppError::InvalidFormat("missing message type".into()))?;

        let message_id = || -> Result<String, OcppError> {
            array
                .get(1)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| OcppError::InvalidFormat("missing message id".into()))
        };

        match msg_type {
            2 => {
                if array.len() != 4 {
                    return Err(OcppError::InvalidFormat(format!(
                        "CALL must have 4 elements, got {}",
                        array.len()
                    )));
                }

                let action = array[2]
                    .as_str()
                    .ok_or_else(|| OcppError::InvalidFormat("action must be a string".into()))?
                    .to_string();

                Ok(OcppMessage::Call(Call {
                    message_id: message_id()?,
                    action,
                    payload: array[3].clone(),
                }))
            }
            3 => {
                if array.len() != 3 {
                    return Err(OcppError::InvalidFormat(format!(
                        "CALLRESULT must have 3 elements, got {}",
                        array.len()
                    )));
                }

                Ok(OcppMessage::CallResult(CallResult {
                    message_id: message_id()?,
                    payload: array[2].clone(),
                }))
            }
            4 => {
                if array.len() != 5 {
                    return Err(OcppError::InvalidFormat(format!(
                        "CALLERROR must have 5 elements, got {}",
                        array.len()
                    )));
                }

                let error_code = array[2]
                    .as_str()
                    .and_then(|code| code.parse().ok())
                    .unwrap_or(ErrorCode::GenericError);

                let error_description = array[3].as_str().unwrap_or("").to_string();

                Ok(OcppMessage::CallError(CallError {
                    message_id: message_id()?,
                    error_code,
                    error_description,
                    error_details: array[4].clone(),
                }))
            }
            _ => Err(OcppError::UnknownMessageType(msg_type)),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            OcppMessage::Call(_) => MessageType::Call,
            OcppMessage::CallResult(_) => MessageType::CallResult,
            OcppMessage::CallError(_) => MessageType::CallError,
        }
    }

    /// Get the message ID
    pub fn message_id(&self) -> &str {
        match self {
            OcppMessage::Call(c) => &c.message_id,
            OcppMessage::CallResult(r) => &r.message_id,
            OcppMessage::CallError(e) => &e.message_id,
        }
    }

    /// Action name, only known for CALL messages
    pub fn action(&self) -> Option<&str> {
        match self {
            OcppMessage::Call(c) => Some(&c.action),
            _ => None,
        }
    }

    /// Payload, or the error details for a CALLERROR
    pub fn payload(&self) -> &Value {
        match self {
            OcppMessage::Call(c) => &c.payload,
            OcppMessage::CallResult(r) => &r.payload,
            OcppMessage::CallError(e) => &e.error_details,
        }
    }

    /// Serialize to a text frame
    pub fn to_frame(&self) -> Result<String, OcppError> {
        match self {
            OcppMessage::Call(c) => c.to_frame(),
            OcppMessage::CallResult(r) => r.to_frame(),
            OcppMessage::CallError(e) => e.to_frame(),
        }
    }
}
