//! Audit observers for inbound traffic
//!
//! Every decoded inbound message is offered to an [`AuditSink`] exactly once.
//! Sinks never influence message processing: a failing sink is logged and
//! the message is handled as if nothing happened.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::OcppError;
use crate::messages::OcppMessage;

/// One inbound message as seen by the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub peer_id: String,
    pub message_type: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub payload: Value,
}

impl AuditEvent {
    pub fn from_message(peer_id: &str, message: &OcppMessage) -> Self {
        Self {
            timestamp: Utc::now(),
            peer_id: peer_id.to_string(),
            message_type: message.message_type().to_string(),
            message_id: message.message_id().to_string(),
            action: message.action().map(str::to_string),
            payload: message.payload().clone(),
        }
    }
}

/// Observer receiving every decoded inbound message
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), OcppError>;
}

/// Emits each event as a structured `tracing` event on target `ocpp::audit`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), OcppError> {
        debug!(
            target: "ocpp::audit",
            peer_id = %event.peer_id,
            message_type = %event.message_type,
            message_id = %event.message_id,
            action = event.action.as_deref().unwrap_or("-"),
            payload = %event.payload,
            "inbound message"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file
pub struct JsonlAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    /// Open (or create) the audit file for appending
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Audit: appending to {:?}", path);

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), OcppError> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
