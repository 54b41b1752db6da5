//! OCPP-J WebSocket transport
//!
//! Connects to a CSMS as a charging station:
//! - the station id is appended to the CSMS URL path
//! - the negotiated OCPP version is offered as the WebSocket subprotocol
//! - text frames carry OCPP messages; pings are answered by tungstenite

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{
        client::IntoClientRequest,
        http::{header, HeaderValue},
        protocol::WebSocketConfig,
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::OcppError;
use crate::registry::ProtocolVersion;
use crate::transport::Transport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Charging-station side of an OCPP-J WebSocket connection
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl WebSocketTransport {
    /// Connect to `csms_url/station_id`, offering the subprotocol of `version`
    pub async fn connect(
        csms_url: &str,
        station_id: &str,
        version: ProtocolVersion,
    ) -> Result<Self, OcppError> {
        let url = build_ocpp_url(csms_url, station_id);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| OcppError::InvalidFormat(format!("bad CSMS url {}: {}", url, e)))?;
        request.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(version.subprotocol()),
        );

        let ws_config = WebSocketConfig {
            max_message_size: Some(64 * 1024),
            max_frame_size: Some(16 * 1024),
            ..Default::default()
        };

        let (ws_stream, response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| {
                error!("WebSocket connection failed: {}", e);
                OcppError::Transport(e.to_string())
            })?;

        let accepted_protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());

        if accepted_protocol != Some(version.subprotocol()) {
            warn!(
                "CSMS did not accept the {} subprotocol, got: {:?}",
                version.subprotocol(),
                accepted_protocol
            );
        }

        info!("WebSocket connected to {}", url);

        let (sink, stream) = ws_stream.split();
        Ok(Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn recv(&self) -> Result<String, OcppError> {
        let mut stream = self.stream.lock().await;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Close(_))) => {
                    info!("WebSocket closed by server");
                    return Err(OcppError::ConnectionClosed);
                }
                Some(Ok(Message::Ping(_))) => debug!("Received ping"),
                Some(Ok(other)) => debug!("Ignoring non-text frame: {:?}", other),
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return Err(OcppError::Transport(e.to_string()));
                }
                None => {
                    info!("WebSocket stream ended");
                    return Err(OcppError::ConnectionClosed);
                }
            }
        }
    }

    async fn send(&self, frame: String) -> Result<(), OcppError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| {
                error!("Failed to send WebSocket message: {}", e);
                OcppError::Transport(e.to_string())
            })
    }
}

/// Build the full OCPP WebSocket URL
pub fn build_ocpp_url(base_url: &str, station_id: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), station_id)
}
