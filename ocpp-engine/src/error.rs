//! Error taxonomy for the OCPP engine
//!
//! Every [`OcppError`] maps onto an OCPP-J [`ErrorCode`], a description and a
//! details object. That mapping is what turns a failure on the inbound side
//! into the CALLERROR sent back to the peer.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::registry::ProtocolVersion;

/// OCPP-J error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// OCPP 1.6 spells this code "FormationViolation"; both decode here.
    #[serde(alias = "FormationViolation")]
    FormatViolation,
    GenericError,
    InternalError,
    MessageTypeNotSupported,
    NotImplemented,
    NotSupported,
    OccurrenceConstraintViolation,
    PropertyConstraintViolation,
    ProtocolError,
    RpcFrameworkError,
    SecurityError,
    TypeConstraintViolation,
}

impl ErrorCode {
    /// Description used when an error carries none of its own
    pub fn default_description(&self) -> &'static str {
        match self {
            ErrorCode::FormatViolation => {
                "Payload for Action is syntactically incorrect or structure for Action"
            }
            ErrorCode::GenericError => "Any other error not all other OCPP defined errors",
            ErrorCode::InternalError => {
                "An internal error occurred and the receiver was not able to process \
                 the requested Action successfully"
            }
            ErrorCode::MessageTypeNotSupported => {
                "A message with a Message Type Number received that is not supported \
                 by this implementation."
            }
            ErrorCode::NotImplemented => {
                "Request Action is recognized but not supported by the receiver"
            }
            ErrorCode::NotSupported => "Requested Action is not known by receiver",
            ErrorCode::OccurrenceConstraintViolation => {
                "Payload for Action is syntactically correct but at least one of the \
                 fields violates occurrence constraints"
            }
            ErrorCode::PropertyConstraintViolation => {
                "Payload is syntactically correct but at least one field contains an \
                 invalid value"
            }
            ErrorCode::ProtocolError => "Payload for Action is incomplete",
            ErrorCode::RpcFrameworkError => {
                "Content of the call is not a valid RPC Request, for example: MessageId \
                 could not be read."
            }
            ErrorCode::SecurityError => {
                "During the processing of Action a security issue occurred preventing \
                 receiver from completing the Action successfully"
            }
            ErrorCode::TypeConstraintViolation => {
                "Payload for Action is syntactically correct but at least one of the \
                 fields violates data type constraints"
            }
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = OcppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_value(Value::String(s.to_string()))?)
    }
}

/// Errors in OCPP message handling
#[derive(Debug, Error)]
pub enum OcppError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(i64),

    #[error("No route registered for action {0}")]
    ActionNotRegistered(String),

    #[error("No handler for {action} registered")]
    NotImplemented { action: String },

    #[error("{action} not supported by OCPP {version}")]
    NotSupported {
        action: String,
        version: ProtocolVersion,
    },

    #[error("Payload for {action} failed schema validation: {description}")]
    SchemaValidation {
        action: String,
        code: ErrorCode,
        description: String,
    },

    /// Raised by a handler that wants the peer to see a specific error code
    #[error("{code}: {description}")]
    Call {
        code: ErrorCode,
        description: String,
        details: Value,
    },

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("OCPP error from peer: {code} - {description}")]
    RemoteError {
        code: ErrorCode,
        description: String,
        details: Value,
    },

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Invalid route for {action}: {reason}")]
    InvalidRoute { action: String, reason: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl OcppError {
    /// Wrap an arbitrary handler failure
    pub fn handler(err: impl std::fmt::Display) -> Self {
        OcppError::Handler(err.to_string())
    }

    /// Error with an explicit code, for handlers
    pub fn call(code: ErrorCode, description: impl Into<String>) -> Self {
        OcppError::Call {
            code,
            description: description.into(),
            details: json!({}),
        }
    }

    /// The OCPP error code reported to the peer
    pub fn code(&self) -> ErrorCode {
        match self {
            OcppError::Json(_) | OcppError::InvalidFormat(_) => ErrorCode::FormatViolation,
            OcppError::UnknownMessageType(_) => ErrorCode::MessageTypeNotSupported,
            OcppError::ActionNotRegistered(_) | OcppError::NotImplemented { .. } => {
                ErrorCode::NotImplemented
            }
            OcppError::NotSupported { .. } => ErrorCode::NotSupported,
            OcppError::SchemaValidation { code, .. }
            | OcppError::Call { code, .. }
            | OcppError::RemoteError { code, .. } => *code,
            OcppError::Io(_)
            | OcppError::Handler(_)
            | OcppError::Timeout
            | OcppError::InvalidRoute { .. }
            | OcppError::ConnectionClosed
            | OcppError::Transport(_) => ErrorCode::InternalError,
        }
    }

    /// Description reported to the peer. Internal failures only ever expose
    /// the generic text of their code.
    pub fn description(&self) -> String {
        match self {
            OcppError::SchemaValidation { description, .. }
            | OcppError::Call { description, .. }
            | OcppError::RemoteError { description, .. } => description.clone(),
            other => other.code().default_description().to_string(),
        }
    }

    /// Details object reported to the peer
    pub fn details(&self) -> Value {
        match self {
            OcppError::NotImplemented { action } | OcppError::ActionNotRegistered(action) => {
                json!({ "cause": format!("No handler for {} registered.", action) })
            }
            OcppError::NotSupported { action, version } => {
                json!({ "cause": format!("{} not supported by OCPP{}.", action, version) })
            }
            OcppError::SchemaValidation { action, .. } => json!({ "action": action }),
            OcppError::Call { details, .. } | OcppError::RemoteError { details, .. } => {
                details.clone()
            }
            OcppError::Json(e) => json!({ "cause": e.to_string() }),
            OcppError::InvalidFormat(cause) => json!({ "cause": cause }),
            _ => json!({}),
        }
    }

    /// Whether the error means the connection itself is gone
    pub fn is_fatal(&self) -> bool {
        matches!(self, OcppError::ConnectionClosed | OcppError::Transport(_))
    }
}
