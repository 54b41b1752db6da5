//! Shared harness: a charge point wired to an in-memory peer

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ocpp_engine::{
    AuditEvent, AuditSink, Call, CallError, CallResult, ChannelTransport, ChargePoint,
    ChargePointBuilder, ChargePointConfig, ErrorCode, OcppError, OcppMessage, PayloadKind,
    ProtocolVersion, SchemaValidator, Transport,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

pub struct Session {
    pub cp: Arc<ChargePoint>,
    pub peer: ChannelTransport,
    pub receive_loop: JoinHandle<Result<(), OcppError>>,
}

pub fn config() -> ChargePointConfig {
    ChargePointConfig::new("CS001", ProtocolVersion::V201)
}

/// Start a session whose outbound ids are `msg-1`, `msg-2`, ...
pub fn start_session<F>(config: ChargePointConfig, setup: F) -> Session
where
    F: FnOnce(ChargePointBuilder) -> ChargePointBuilder,
{
    let (local, peer) = ChannelTransport::pair();
    let counter = AtomicUsize::new(0);

    let builder = ChargePoint::builder(config, Arc::new(local))
        .id_generator(move || format!("msg-{}", counter.fetch_add(1, Ordering::SeqCst) + 1));
    let cp = Arc::new(setup(builder).build());

    let runner = cp.clone();
    let receive_loop = tokio::spawn(async move { runner.start().await });

    Session {
        cp,
        peer,
        receive_loop,
    }
}

impl Session {
    pub async fn send(&self, frame: impl Into<String>) {
        self.peer.send(frame.into()).await.unwrap();
    }

    pub async fn next(&self) -> OcppMessage {
        let frame = self.peer.recv().await.unwrap();
        OcppMessage::parse(&frame).unwrap()
    }

    pub async fn next_call(&self) -> Call {
        match self.next().await {
            OcppMessage::Call(call) => call,
            other => panic!("expected CALL, got {:?}", other),
        }
    }

    pub async fn next_result(&self) -> CallResult {
        match self.next().await {
            OcppMessage::CallResult(result) => result,
            other => panic!("expected CALLRESULT, got {:?}", other),
        }
    }

    pub async fn next_error(&self) -> CallError {
        match self.next().await {
            OcppMessage::CallError(error) => error,
            other => panic!("expected CALLERROR, got {:?}", other),
        }
    }

    pub async fn reply(&self, call: &Call, payload: Value) {
        self.send(call.create_call_result(payload).to_frame().unwrap())
            .await;
    }

    pub async fn reply_error(&self, call: &Call, code: ErrorCode, description: &str) {
        self.send(
            call.create_call_error(&OcppError::call(code, description))
                .to_frame()
                .unwrap(),
        )
        .await;
    }

    /// True when the charge point sends nothing for `window`
    pub async fn silent_for(&self, window: Duration) -> bool {
        tokio::time::timeout(window, self.peer.recv()).await.is_err()
    }
}

/// Rejects one action's payloads of one kind
pub struct RejectPayloads {
    pub action: &'static str,
    pub kind: PayloadKind,
}

impl SchemaValidator for RejectPayloads {
    fn validate(
        &self,
        action: &str,
        kind: PayloadKind,
        _payload: &Value,
        _version: ProtocolVersion,
    ) -> Result<(), OcppError> {
        if action == self.action && kind == self.kind {
            return Err(OcppError::SchemaValidation {
                action: action.to_string(),
                code: ErrorCode::OccurrenceConstraintViolation,
                description: "required property missing".into(),
            });
        }
        Ok(())
    }
}

/// Keeps every audit event in memory
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for RecordingSink {
    fn record(&self, event: &AuditEvent) -> Result<(), OcppError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Audit sink that always fails
pub struct BrokenSink;

impl AuditSink for BrokenSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), OcppError> {
        Err(OcppError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }
}

/// Transport that raises a flag once a CALLRESULT has left the charge point
pub struct ResultSentFlag {
    inner: ChannelTransport,
    pub result_sent: Arc<AtomicBool>,
}

impl ResultSentFlag {
    pub fn new(inner: ChannelTransport) -> Self {
        Self {
            inner,
            result_sent: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Transport for ResultSentFlag {
    async fn recv(&self) -> Result<String, OcppError> {
        self.inner.recv().await
    }

    async fn send(&self, frame: String) -> Result<(), OcppError> {
        let is_result = frame.starts_with("[3");
        self.inner.send(frame).await?;
        if is_result {
            self.result_sent.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}
