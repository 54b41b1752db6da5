//! Charge point session
//!
//! A [`ChargePoint`] is one protocol peer bound to one connection. It runs
//! the receive loop, answers inbound CALLs through its [`RouteMap`], and sends
//! outbound CALLs one at a time.
//!
//! ## Inbound CALL pipeline
//!
//! ```text
//! route lookup ─► validate request ─► wire→internal ─► on_action
//!      │                                                  │
//!      └─ NotImplemented / NotSupported                   ▼
//!                      send ◄─ validate response ◄─ strip absent, internal→wire
//!                        │
//!                        └─► after_action (detached task)
//! ```
//!
//! Any failure along the way becomes a CALLERROR for the peer; only a broken
//! connection ends the receive loop.
//!
//! ## Outbound calls
//!
//! At most one CALL is awaiting its response at any time. Callers queue on
//! the correlator lock. The receive loop must be running for a call to ever
//! see its response, so a handler that issues a call from `on_action` blocks
//! the loop until that call times out; issue such calls from `after_action`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::config::{ChargePointConfig, TimeoutPolicy};
use crate::correlator::{PendingCall, ResponseCorrelator};
use crate::error::OcppError;
use crate::messages::{Call, CallResult, OcppMessage};
use crate::naming::{remove_absent, serialize_payload, to_internal_naming, to_wire_naming};
use crate::registry::{resolve_unrouted, ActionRegistry, ProtocolVersion, StandardActions};
use crate::routing::{CallContext, RouteMap};
use crate::transport::Transport;
use crate::validation::{AcceptAll, PayloadKind, SchemaValidator};

/// Produces message ids for outbound calls
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// A typed outbound request. The action name comes from the type.
pub trait OcppRequest: Serialize {
    const ACTION: &'static str;
    type Response: DeserializeOwned;
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Resolve a CALLERROR response to `Ok(None)` instead of failing
    pub suppress: bool,
    /// Use this message id instead of a generated one
    pub message_id: Option<String>,
    /// Skip request and response schema validation
    pub skip_schema_validation: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            suppress: true,
            message_id: None,
            skip_schema_validation: false,
        }
    }
}

impl CallOptions {
    /// Fail with [`OcppError::RemoteError`] when the peer answers with a CALLERROR
    pub fn unsuppressed(mut self) -> Self {
        self.suppress = false;
        self
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    pub fn skip_schema_validation(mut self) -> Self {
        self.skip_schema_validation = true;
        self
    }
}

/// One protocol peer on one connection
pub struct ChargePoint {
    config: ChargePointConfig,
    transport: Arc<dyn Transport>,
    routes: RouteMap,
    correlator: ResponseCorrelator,
    validator: Arc<dyn SchemaValidator>,
    registry: Arc<dyn ActionRegistry>,
    audit: Arc<dyn AuditSink>,
    id_generator: IdGenerator,
    span: Span,
}

impl ChargePoint {
    /// Session with default collaborators
    pub fn new(config: ChargePointConfig, transport: Arc<dyn Transport>, routes: RouteMap) -> Self {
        Self::builder(config, transport).routes(routes).build()
    }

    pub fn builder(config: ChargePointConfig, transport: Arc<dyn Transport>) -> ChargePointBuilder {
        ChargePointBuilder::new(config, transport)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.config.protocol_version
    }

    pub fn routes(&self) -> &RouteMap {
        &self.routes
    }

    /// Run the receive loop until the connection goes away.
    ///
    /// Frames are handled one at a time, in arrival order. A closed
    /// connection ends the loop with `Ok(())`, any other transport failure
    /// with `Err`.
    pub async fn start(&self) -> Result<(), OcppError> {
        async {
            info!("Receive loop started");
            loop {
                let frame = match self.transport.recv().await {
                    Ok(frame) => frame,
                    Err(OcppError::ConnectionClosed) => {
                        info!("Connection closed, receive loop stopped");
                        return Ok(());
                    }
                    Err(e) => {
                        error!("Receive failed: {}", e);
                        return Err(e);
                    }
                };

                debug!("Received: {}", frame);
                self.route_message(&frame).await?;
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Route one inbound frame.
    ///
    /// CALLs go through the inbound pipeline; CALLRESULTs and CALLERRORs are
    /// queued for the call in flight. Only a broken connection is returned as
    /// an error; everything else is answered or logged here.
    pub async fn route_message(&self, frame: &str) -> Result<(), OcppError> {
        let message = match OcppMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Unable to parse message: '{}', it doesn't seem to be valid OCPP: {}",
                    frame, e
                );
                return Ok(());
            }
        };

        self.record(&message);

        match message {
            OcppMessage::Call(call) => {
                if let Err(error) = self.handle_call(&call).await {
                    if error.is_fatal() {
                        return Err(error);
                    }

                    warn!(
                        "Error while handling request {} ({}): {}",
                        call.action, call.message_id, error
                    );
                    match call.create_call_error(&error).to_frame() {
                        Ok(frame) => self.send(frame).await?,
                        Err(e) => error!("Failed to serialize CALLERROR: {}", e),
                    }
                }
            }
            response => {
                debug!(
                    "Queueing {} for message id {}",
                    response.message_type(),
                    response.message_id()
                );
                self.correlator.deliver(response);
            }
        }

        Ok(())
    }

    /// Run the inbound pipeline for one CALL.
    ///
    /// On success the returned CALLRESULT has already been sent and the
    /// `after_action` hook, if any, has been spawned. On failure nothing has
    /// been sent yet: the error is what the peer should receive.
    pub async fn handle_call(&self, call: &Call) -> Result<CallResult, OcppError> {
        let version = self.config.protocol_version;

        let bundle = match self.routes.get(&call.action) {
            Ok(bundle) => bundle,
            Err(_) => return Err(resolve_unrouted(self.registry.as_ref(), &call.action, version)),
        };

        if !bundle.skip_schema_validation {
            self.validator
                .validate(&call.action, PayloadKind::Request, &call.payload, version)?;
        }

        let payload = to_internal_naming(call.payload.clone());
        let ctx = CallContext {
            message_id: call.message_id.clone(),
            action: call.action.clone(),
        };

        let outcome = AssertUnwindSafe(bundle.on_action.invoke(payload.clone(), ctx.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(OcppError::Handler("handler panicked".into())));

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                error!("Handler for {} ({}) failed: {}", call.action, call.message_id, e);
                // A dead connection seen by the handler is not this session's
                if e.is_fatal() {
                    return Err(OcppError::handler(e));
                }
                return Err(e);
            }
        };

        let result = call.create_call_result(to_wire_naming(remove_absent(response)));

        if !bundle.skip_schema_validation {
            self.validator
                .validate(&call.action, PayloadKind::Response, &result.payload, version)?;
        }

        self.send(result.to_frame()?).await?;

        if let Some(after_action) = &bundle.after_action {
            let hook = after_action.invoke(payload, ctx);
            let action = call.action.clone();
            tokio::spawn(
                async move {
                    if let Err(e) = hook.await {
                        warn!("after_action hook for {} failed: {}", action, e);
                    }
                }
                .instrument(self.span.clone()),
            );
        }

        Ok(result)
    }

    /// Send a typed request and wait for its typed response.
    ///
    /// `Ok(None)` means no usable response: a suppressed CALLERROR, or a
    /// timeout under [`TimeoutPolicy::NoResponse`].
    pub async fn call<R: OcppRequest>(
        &self,
        request: &R,
        options: CallOptions,
    ) -> Result<Option<R::Response>, OcppError> {
        let payload = serialize_payload(request)?;

        match self.call_raw(R::ACTION, payload, options).await? {
            Some(response) => Ok(Some(serde_json::from_value(response)?)),
            None => Ok(None),
        }
    }

    /// Send an internal-naming payload as a CALL for `action` and return the
    /// internal-naming response payload.
    pub async fn call_raw(
        &self,
        action: &str,
        payload: Value,
        options: CallOptions,
    ) -> Result<Option<Value>, OcppError> {
        let version = self.config.protocol_version;
        let timeout = self.config.response_timeout;

        async move {
            let message_id = options
                .message_id
                .unwrap_or_else(|| (self.id_generator)());
            let call = Call::new(message_id, action, to_wire_naming(remove_absent(payload)));

            if !options.skip_schema_validation {
                self.validator
                    .validate(action, PayloadKind::Request, &call.payload, version)?;
            }

            let frame = call.to_frame()?;

            let response = {
                let mut in_flight = self.correlator.acquire().await;
                in_flight.discard_stale();

                self.send(frame).await?;

                let pending = PendingCall::new(&call.message_id, timeout);
                in_flight.wait_for(&pending).await
            };

            let response = match response {
                Some(response) => response,
                None => {
                    error!(
                        "Waited {:?} for response on {} ({})",
                        timeout, call.action, call.message_id
                    );
                    return match self.config.timeout_policy {
                        TimeoutPolicy::NoResponse => Ok(None),
                        TimeoutPolicy::Error => Err(OcppError::Timeout),
                    };
                }
            };

            match response {
                OcppMessage::CallResult(result) => {
                    if !options.skip_schema_validation {
                        self.validator
                            .validate(action, PayloadKind::Response, &result.payload, version)?;
                    }
                    Ok(Some(to_internal_naming(result.payload)))
                }
                OcppMessage::CallError(error) => {
                    warn!("Received a CALLERROR: {:?}", error);
                    if options.suppress {
                        Ok(None)
                    } else {
                        Err(error.to_error())
                    }
                }
                OcppMessage::Call(unexpected) => Err(OcppError::InvalidFormat(format!(
                    "CALL {} queued as a response",
                    unexpected.message_id
                ))),
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn send(&self, frame: String) -> Result<(), OcppError> {
        debug!("Sending: {}", frame);
        self.transport.send(frame).await
    }

    fn record(&self, message: &OcppMessage) {
        let event = AuditEvent::from_message(&self.config.id, message);
        if let Err(e) = self.audit.record(&event) {
            warn!("Audit sink failed for message {}: {}", message.message_id(), e);
        }
    }
}

/// Assembles a [`ChargePoint`] and its collaborators
pub struct ChargePointBuilder {
    config: ChargePointConfig,
    transport: Arc<dyn Transport>,
    routes: RouteMap,
    validator: Arc<dyn SchemaValidator>,
    registry: Arc<dyn ActionRegistry>,
    audit: Arc<dyn AuditSink>,
    id_generator: IdGenerator,
    span: Option<Span>,
}

impl ChargePointBuilder {
    pub fn new(config: ChargePointConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            routes: RouteMap::default(),
            validator: Arc::new(AcceptAll),
            registry: Arc::new(StandardActions),
            audit: Arc::new(TracingAuditSink),
            id_generator: Arc::new(|| Uuid::new_v4().to_string()),
            span: None,
        }
    }

    pub fn routes(mut self, routes: RouteMap) -> Self {
        self.routes = routes;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(mut self, registry: Arc<dyn ActionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replace the random message id generator, e.g. for predictable ids in tests
    pub fn id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Span every log line of this session is recorded in
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> ChargePoint {
        let span = self
            .span
            .unwrap_or_else(|| info_span!("charge_point", id = %self.config.id));

        ChargePoint {
            config: self.config,
            transport: self.transport,
            routes: self.routes,
            correlator: ResponseCorrelator::new(),
            validator: self.validator,
            registry: self.registry,
            audit: self.audit,
            id_generator: self.id_generator,
            span,
        }
    }
}
