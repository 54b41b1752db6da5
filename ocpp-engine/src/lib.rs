//! # OCPP Engine
//!
//! Transport-agnostic OCPP-J message engine for one protocol peer.
//!
//! The engine frames and parses CALL / CALLRESULT / CALLERROR messages,
//! dispatches inbound CALLs to registered handlers, and sends outbound CALLs
//! with at most one request in flight per connection. Payload keys are
//! converted between the wire's camelCase and the internal snake_case naming
//! at the boundary.
//!
//! ## Architecture
//!
//! ```text
//! CSMS / charging station
//!       │ OCPP-J text frames
//!       ▼
//! ┌──────────────────────────────────────────┐
//! │ Transport (WebSocket, in-memory channel) │
//! └─────────────┬────────────────────────────┘
//!               │ recv / send
//!               ▼
//! ┌──────────────────────────────────────────┐
//! │ ChargePoint                              │
//! │  receive loop ─► CALL ─► RouteMap        │
//! │      │                   on / after      │
//! │      └─► CALLRESULT / CALLERROR          │
//! │              ▼                           │
//! │        ResponseCorrelator ◄── call()     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ocpp_engine::{
//!     CallOptions, ChargePoint, ChargePointConfig, Handler, ProtocolVersion, RouteMap,
//!     WebSocketTransport,
//! };
//! use ocpp_engine::v201::{HeartbeatRequest, ResetRequest, ResetResponse, ResetStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChargePointConfig::new("CS001", ProtocolVersion::V201);
//!     let transport = WebSocketTransport::connect(
//!         "ws://localhost:8180/steve/websocket/CentralSystemService",
//!         &config.id,
//!         config.protocol_version,
//!     )
//!     .await?;
//!
//!     let routes = RouteMap::builder()
//!         .on(
//!             "Reset",
//!             Handler::typed(|_: ResetRequest| async {
//!                 Ok(ResetResponse { status: ResetStatus::Accepted, status_info: None })
//!             }),
//!         )
//!         .build()?;
//!
//!     let cp = Arc::new(ChargePoint::new(config, Arc::new(transport), routes));
//!     let receiver = cp.clone();
//!     tokio::spawn(async move { receiver.start().await });
//!
//!     let beat = cp.call(&HeartbeatRequest {}, CallOptions::default()).await?;
//!     println!("CSMS time: {:?}", beat.map(|b| b.current_time));
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod charge_point;
pub mod config;
pub mod correlator;
pub mod error;
pub mod messages;
pub mod naming;
pub mod registry;
pub mod routing;
pub mod transport;
pub mod v201;
pub mod validation;
pub mod websocket;

pub use audit::{AuditEvent, AuditSink, JsonlAuditSink, TracingAuditSink};
pub use charge_point::{CallOptions, ChargePoint, ChargePointBuilder, IdGenerator, OcppRequest};
pub use config::{ChargePointConfig, TimeoutPolicy};
pub use error::{ErrorCode, OcppError};
pub use messages::{Call, CallError, CallResult, MessageType, OcppMessage};
pub use registry::{ActionRegistry, ProtocolVersion, StandardActions};
pub use routing::{CallContext, Handler, HandlerBundle, Routable, RouteBuilder, RouteMap};
pub use transport::{ChannelTransport, Transport};
pub use validation::{AcceptAll, PayloadKind, SchemaValidator};
pub use websocket::WebSocketTransport;
