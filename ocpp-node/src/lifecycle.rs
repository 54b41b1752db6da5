//! Station lifecycle: BootNotification until accepted, then Heartbeats
//!
//! The receive loop must be running while these run, otherwise no response
//! ever reaches the outbound calls.

use std::time::Duration;

use ocpp_engine::v201::{BootReason, HeartbeatRequest, RegistrationStatus};
use ocpp_engine::{CallOptions, ChargePoint, OcppError};
use tracing::{debug, info, warn};

use crate::station::Station;

/// Retry delay when the CSMS gives no usable interval
const DEFAULT_RETRY: Duration = Duration::from_secs(30);

fn seconds_or(interval: i32, fallback: Duration) -> Duration {
    if interval > 0 {
        Duration::from_secs(interval as u64)
    } else {
        fallback
    }
}

/// Send BootNotification until the CSMS accepts it.
///
/// Returns the heartbeat interval the CSMS asked for, or the station
/// default when it asked for none.
pub async fn register(cp: &ChargePoint, station: &Station) -> Result<Duration, OcppError> {
    loop {
        let request = station.boot_request(BootReason::PowerUp);

        let delay = match cp.call(&request, CallOptions::default()).await? {
            Some(response) => {
                station.on_boot_response(&response);
                match response.status {
                    RegistrationStatus::Accepted => {
                        let interval = station.heartbeat_interval();
                        info!("Registered with CSMS, heartbeat every {}s", interval);
                        return Ok(Duration::from_secs(interval as u64));
                    }
                    RegistrationStatus::Pending | RegistrationStatus::Rejected => {
                        warn!(
                            "BootNotification {:?}, retrying in {}s",
                            response.status, response.interval
                        );
                        seconds_or(response.interval, DEFAULT_RETRY)
                    }
                }
            }
            None => {
                warn!("BootNotification got no answer, retrying in {:?}", DEFAULT_RETRY);
                DEFAULT_RETRY
            }
        };

        tokio::time::sleep(delay).await;
    }
}

/// Send a Heartbeat every `interval`. Only returns on a connection failure.
pub async fn heartbeat(cp: &ChargePoint, interval: Duration) -> Result<(), OcppError> {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match cp.call(&HeartbeatRequest {}, CallOptions::default()).await? {
            Some(response) => debug!("Heartbeat acknowledged at {}", response.current_time),
            None => warn!("Heartbeat got no answer"),
        }
    }
}

/// Register, then keep the registration alive
pub async fn run(cp: &ChargePoint, station: &Station) -> Result<(), OcppError> {
    let interval = register(cp, station).await?;
    heartbeat(cp, interval).await
}
