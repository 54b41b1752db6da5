//! OCPP Node - charging station CLI
//!
//! Connects to a CSMS as an OCPP 2.0.1 charging station, registers with
//! BootNotification and keeps the connection alive with Heartbeats while
//! answering remote start/stop, charging profile, reset and data transfer
//! requests.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! ocpp-node --station CS001
//!
//! # Connect to a specific CSMS with two EVSEs
//! ocpp-node --station CS001 --evse-count 2 \
//!     --csms-url ws://localhost:8180/steve/websocket/CentralSystemService
//!
//! # Keep an audit trail of every inbound message
//! ocpp-node --station CS001 --audit-log audit.jsonl
//! ```

mod lifecycle;
mod station;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ocpp_engine::v201::ChargingStation;
use ocpp_engine::{
    ChargePoint, ChargePointConfig, JsonlAuditSink, ProtocolVersion, RouteMap, WebSocketTransport,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use station::Station;

/// OCPP 2.0.1 charging station node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// OCPP station ID
    #[arg(short, long, default_value = "EK3-001")]
    station: String,

    /// CSMS WebSocket URL (the station ID is appended)
    #[arg(long, default_value = "ws://localhost:8180/steve/websocket/CentralSystemService")]
    csms_url: String,

    /// Number of EVSEs
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u16).range(1..))]
    evse_count: u16,

    /// Vendor name
    #[arg(long, default_value = "Elektrokombinacija")]
    vendor: String,

    /// Model name
    #[arg(long, default_value = "EK3-OCPP")]
    model: String,

    /// Serial number reported at boot
    #[arg(long)]
    serial: Option<String>,

    /// Seconds to wait for a CSMS response
    #[arg(long, default_value = "30")]
    response_timeout: u64,

    /// Append every inbound message to this JSON Lines file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║            OCPP Node - OCPP 2.0.1 Charging Station           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Station:  {:<50} ║", args.station);
    println!("║  CSMS URL: {:<50} ║", truncate(&args.csms_url, 50));
    println!("║  EVSEs:    {:<50} ║", args.evse_count);
    println!("║  Audit:    {:<50} ║", audit_label(&args.audit_log));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let config = ChargePointConfig::new(&args.station, ProtocolVersion::V201)
        .with_response_timeout(Duration::from_secs(args.response_timeout));

    let station = Arc::new(Station::new(
        ChargingStation {
            model: args.model.clone(),
            vendor_name: args.vendor.clone(),
            serial_number: args.serial.clone(),
            firmware_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            modem: None,
        },
        args.evse_count,
    ));
    let routes = RouteMap::from_source(station.clone()).context("invalid route table")?;

    let transport = WebSocketTransport::connect(&args.csms_url, &config.id, config.protocol_version)
        .await
        .with_context(|| format!("connecting to {}", args.csms_url))?;

    let mut builder = ChargePoint::builder(config, Arc::new(transport)).routes(routes);
    if let Some(path) = &args.audit_log {
        let sink = JsonlAuditSink::open(path)
            .with_context(|| format!("opening audit log {}", path.display()))?;
        builder = builder.audit(Arc::new(sink));
    }

    let cp = Arc::new(builder.build());
    station.attach(&cp);

    info!("Starting charge point {}", cp.id());

    tokio::select! {
        result = cp.start() => match result {
            Ok(()) => info!("CSMS closed the connection"),
            Err(e) => {
                error!("Receive loop failed: {}", e);
                return Err(e.into());
            }
        },
        result = lifecycle::run(&cp, &station) => {
            if let Err(e) = result {
                error!("Station lifecycle failed: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    Ok(())
}

fn audit_label(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => truncate(&path.display().to_string(), 50),
        None => "off".to_string(),
    }
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
