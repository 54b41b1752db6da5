//! Session configuration
//!
//! Plain settings of a charge point session. Collaborators (transport,
//! validator, registry, audit sink, id generator) are injected through
//! [`crate::ChargePointBuilder`].

use std::time::Duration;

use crate::registry::ProtocolVersion;

/// What an outbound call resolves to when its deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Resolve to `Ok(None)`, the same outcome as a suppressed CALLERROR
    #[default]
    NoResponse,
    /// Fail with [`crate::OcppError::Timeout`]
    Error,
}

/// Charge point session configuration
#[derive(Debug, Clone)]
pub struct ChargePointConfig {
    /// Identity of the peer this session talks for
    pub id: String,

    /// Negotiated protocol version
    pub protocol_version: ProtocolVersion,

    /// How long an outbound call waits for its response
    pub response_timeout: Duration,

    pub timeout_policy: TimeoutPolicy,
}

impl Default for ChargePointConfig {
    fn default() -> Self {
        Self {
            id: "EK3-001".to_string(),
            protocol_version: ProtocolVersion::V201,
            response_timeout: Duration::from_secs(30),
            timeout_policy: TimeoutPolicy::NoResponse,
        }
    }
}

impl ChargePointConfig {
    /// Create config with basic parameters
    pub fn new(id: impl Into<String>, protocol_version: ProtocolVersion) -> Self {
        Self {
            id: id.into(),
            protocol_version,
            ..Default::default()
        }
    }

    /// Set the response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the timeout policy
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }
}
