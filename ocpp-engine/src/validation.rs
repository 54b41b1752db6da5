//! Schema validation seam
//!
//! Schema sets per protocol version live outside this crate. The engine only
//! asks a [`SchemaValidator`] whether a wire-named payload conforms, before a
//! request is handled and before any response leaves.

use serde_json::Value;

use crate::error::OcppError;
use crate::registry::ProtocolVersion;

/// Which half of an exchange a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Request,
    Response,
}

/// Validates wire-named payloads against the schema of an action
pub trait SchemaValidator: Send + Sync {
    /// Fails with [`OcppError::SchemaValidation`] when `payload` does not
    /// conform to the schema of `action` for `version`.
    fn validate(
        &self,
        action: &str,
        kind: PayloadKind,
        payload: &Value,
        version: ProtocolVersion,
    ) -> Result<(), OcppError>;
}

/// Validator that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn validate(
        &self,
        _action: &str,
        _kind: PayloadKind,
        _payload: &Value,
        _version: ProtocolVersion,
    ) -> Result<(), OcppError> {
        Ok(())
    }
}
