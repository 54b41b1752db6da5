//! In-memory charging station model
//!
//! Tracks registration, EVSE status, transactions and charging profiles,
//! and answers the CSMS requests this node supports:
//! - RequestStartTransaction / RequestStopTransaction, followed by a
//!   StatusNotification for the affected EVSE
//! - SetChargingProfile
//! - Reset
//! - DataTransfer

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, Utc};
use ocpp_engine::v201::*;
use ocpp_engine::{CallOptions, ChargePoint, Handler, OcppError, Routable, RouteBuilder};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Registration with the CSMS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No BootNotification answered yet
    Unregistered,
    /// CSMS asked to retry later
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: String,
    pub remote_start_id: i32,
    pub id_token: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Evse {
    pub evse_id: i32,
    pub connector_id: i32,
    pub status: ConnectorStatus,
    pub transaction: Option<Transaction>,
    /// Id of the transaction that ended last on this EVSE
    pub last_transaction_id: Option<String>,
    pub charging_profiles: Vec<ChargingProfile>,
}

impl Evse {
    fn new(evse_id: i32) -> Self {
        Self {
            evse_id,
            connector_id: 1,
            status: ConnectorStatus::Available,
            transaction: None,
            last_transaction_id: None,
            charging_profiles: Vec::new(),
        }
    }

    /// Limit in kW of the highest stack level profile
    pub fn active_power_limit_kw(&self) -> Option<f64> {
        let profile = self.charging_profiles.iter().max_by_key(|p| p.stack_level)?;

        profile.initial_limit().map(|(limit, unit)| match unit {
            ChargingRateUnit::W => limit / 1000.0,
            // 3-phase 230 V estimate
            ChargingRateUnit::A => limit * 230.0 * 3.0 / 1000.0,
        })
    }

    fn is_free(&self) -> bool {
        self.status == ConnectorStatus::Available && self.transaction.is_none()
    }
}

struct StationState {
    registration: Registration,
    heartbeat_interval: i32,
    evses: BTreeMap<i32, Evse>,
}

/// Charging station served by one charge point session
pub struct Station {
    info: ChargingStation,
    state: Mutex<StationState>,
    peer: OnceLock<Weak<ChargePoint>>,
}

impl Station {
    pub fn new(info: ChargingStation, evse_count: u16) -> Self {
        let evses = (1..=i32::from(evse_count))
            .map(|id| (id, Evse::new(id)))
            .collect();

        Self {
            info,
            state: Mutex::new(StationState {
                registration: Registration::Unregistered,
                heartbeat_interval: 300,
                evses,
            }),
            peer: OnceLock::new(),
        }
    }

    /// Bind the session used for station-initiated requests
    pub fn attach(&self, cp: &Arc<ChargePoint>) {
        if self.peer.set(Arc::downgrade(cp)).is_err() {
            warn!("Station already attached to a charge point");
        }
    }

    pub fn registration(&self) -> Registration {
        self.state.lock().registration
    }

    pub fn heartbeat_interval(&self) -> i32 {
        self.state.lock().heartbeat_interval
    }

    pub fn evse(&self, evse_id: i32) -> Option<Evse> {
        self.state.lock().evses.get(&evse_id).cloned()
    }

    pub fn boot_request(&self, reason: BootReason) -> BootNotificationRequest {
        BootNotificationRequest {
            charging_station: self.info.clone(),
            reason,
        }
    }

    /// Record the CSMS answer to a BootNotification
    pub fn on_boot_response(&self, response: &BootNotificationResponse) {
        let mut state = self.state.lock();
        state.registration = match response.status {
            RegistrationStatus::Accepted => Registration::Accepted,
            RegistrationStatus::Pending => Registration::Pending,
            RegistrationStatus::Rejected => Registration::Rejected,
        };
        if response.status == RegistrationStatus::Accepted && response.interval > 0 {
            state.heartbeat_interval = response.interval;
        }
        info!(
            "Registration {:?}, interval {}s",
            state.registration, response.interval
        );
    }

    pub fn start_transaction(
        &self,
        request: &RequestStartTransactionRequest,
    ) -> RequestStartTransactionResponse {
        let mut state = self.state.lock();

        let evse_id = request.evse_id.or_else(|| {
            state
                .evses
                .values()
                .find(|evse| evse.is_free())
                .map(|evse| evse.evse_id)
        });

        let evse = match evse_id {
            Some(id) => state.evses.get_mut(&id),
            None => None,
        };

        let evse = match evse {
            Some(evse) if evse.is_free() => evse,
            Some(evse) => {
                warn!("EVSE {} busy, rejecting remote start", evse.evse_id);
                return start_rejected("EVSEBusy");
            }
            None => {
                warn!("No EVSE available for remote start {}", request.remote_start_id);
                return start_rejected("NoEVSEAvailable");
            }
        };

        let transaction_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        evse.transaction = Some(Transaction {
            transaction_id: transaction_id.clone(),
            remote_start_id: request.remote_start_id,
            id_token: request.id_token.id_token.clone(),
            started_at: Utc::now(),
        });
        evse.status = ConnectorStatus::Occupied;

        if let Some(profile) = &request.charging_profile {
            evse.charging_profiles.retain(|p| p.id != profile.id);
            evse.charging_profiles.push(profile.clone());
        }

        info!(
            "Started transaction {} on EVSE {} for token {}",
            transaction_id, evse.evse_id, request.id_token.id_token
        );

        RequestStartTransactionResponse {
            status: RequestStartStopStatus::Accepted,
            transaction_id: Some(transaction_id),
            status_info: None,
        }
    }

    pub fn stop_transaction(&self, transaction_id: &str) -> RequestStopTransactionResponse {
        let mut state = self.state.lock();

        let evse = state.evses.values_mut().find(|evse| {
            evse.transaction
                .as_ref()
                .is_some_and(|tx| tx.transaction_id == transaction_id)
        });

        match evse {
            Some(evse) => {
                if let Some(tx) = evse.transaction.take() {
                    info!(
                        "Stopped transaction {} on EVSE {} for token {} after {}s",
                        tx.transaction_id,
                        evse.evse_id,
                        tx.id_token,
                        (Utc::now() - tx.started_at).num_seconds()
                    );
                }
                evse.last_transaction_id = Some(transaction_id.to_string());
                evse.status = ConnectorStatus::Available;
                evse.charging_profiles
                    .retain(|p| p.charging_profile_purpose != ChargingProfilePurpose::TxProfile);

                RequestStopTransactionResponse {
                    status: RequestStartStopStatus::Accepted,
                    status_info: None,
                }
            }
            None => {
                warn!("Transaction {} not found", transaction_id);
                RequestStopTransactionResponse {
                    status: RequestStartStopStatus::Rejected,
                    status_info: Some(StatusInfo::new("UnknownTransaction")),
                }
            }
        }
    }

    /// EVSE id 0 applies the profile to every EVSE
    pub fn set_charging_profile(
        &self,
        request: &SetChargingProfileRequest,
    ) -> SetChargingProfileResponse {
        let mut state = self.state.lock();
        let profile = &request.charging_profile;

        let targets: Vec<&mut Evse> = if request.evse_id == 0 {
            state.evses.values_mut().collect()
        } else {
            state.evses.get_mut(&request.evse_id).into_iter().collect()
        };

        if targets.is_empty() {
            warn!("Unknown EVSE {}", request.evse_id);
            return SetChargingProfileResponse {
                status: ChargingProfileStatus::Rejected,
                status_info: Some(StatusInfo::new("UnknownEVSE")),
            };
        }

        for evse in targets {
            evse.charging_profiles.retain(|p| p.id != profile.id);
            evse.charging_profiles.push(profile.clone());
            info!(
                "Charging profile {} on EVSE {}, limit: {:?} kW",
                profile.id,
                evse.evse_id,
                evse.active_power_limit_kw()
            );
        }

        SetChargingProfileResponse {
            status: ChargingProfileStatus::Accepted,
            status_info: None,
        }
    }

    /// Immediate resets end running transactions; idle resets wait for them
    pub fn reset(&self, request: &ResetRequest) -> ResetResponse {
        let mut state = self.state.lock();

        let evses: Vec<&mut Evse> = match request.evse_id {
            Some(id) => state.evses.get_mut(&id).into_iter().collect(),
            None => state.evses.values_mut().collect(),
        };

        if evses.is_empty() {
            return ResetResponse {
                status: ResetStatus::Rejected,
                status_info: Some(StatusInfo::new("UnknownEVSE")),
            };
        }

        let busy = evses.iter().any(|evse| evse.transaction.is_some());
        let status = match (request.reset_type, busy) {
            (ResetType::OnIdle, true) => ResetStatus::Scheduled,
            (ResetType::Immediate, _) => {
                for evse in evses {
                    if let Some(tx) = evse.transaction.take() {
                        info!("Reset ends transaction {} on EVSE {}", tx.transaction_id, evse.evse_id);
                        evse.last_transaction_id = Some(tx.transaction_id);
                        evse.status = ConnectorStatus::Available;
                    }
                }
                ResetStatus::Accepted
            }
            (ResetType::OnIdle, false) => ResetStatus::Accepted,
        };

        info!("Reset {:?} -> {:?}", request.reset_type, status);
        ResetResponse {
            status,
            status_info: None,
        }
    }

    /// Vendor-specific data addressed to this station's vendor is echoed back
    pub fn data_transfer(&self, request: &DataTransferRequest) -> DataTransferResponse {
        if request.vendor_id != self.info.vendor_name {
            debug!("DataTransfer for unknown vendor {}", request.vendor_id);
            return DataTransferResponse {
                status: DataTransferStatus::UnknownVendorId,
                data: None,
                status_info: None,
            };
        }

        DataTransferResponse {
            status: DataTransferStatus::Accepted,
            data: request.data.clone(),
            status_info: None,
        }
    }

    pub fn status_notification(&self, evse_id: i32) -> Option<StatusNotificationRequest> {
        let evse = self.evse(evse_id)?;
        Some(StatusNotificationRequest {
            timestamp: Utc::now(),
            connector_status: evse.status,
            evse_id: evse.evse_id,
            connector_id: evse.connector_id,
        })
    }

    /// Send a StatusNotification for `evse_id` to the CSMS
    pub async fn notify_status(&self, evse_id: i32) -> Result<(), OcppError> {
        let cp = self
            .peer
            .get()
            .and_then(Weak::upgrade)
            .ok_or(OcppError::ConnectionClosed)?;

        let Some(notification) = self.status_notification(evse_id) else {
            warn!("No EVSE {} to report", evse_id);
            return Ok(());
        };

        cp.call(&notification, CallOptions::default()).await?;
        Ok(())
    }

    fn evse_of_remote_start(&self, remote_start_id: i32) -> Option<i32> {
        self.state
            .lock()
            .evses
            .values()
            .find(|evse| {
                evse.transaction
                    .as_ref()
                    .is_some_and(|tx| tx.remote_start_id == remote_start_id)
            })
            .map(|evse| evse.evse_id)
    }

    fn evse_of_ended_transaction(&self, transaction_id: &str) -> Option<i32> {
        self.state
            .lock()
            .evses
            .values()
            .find(|evse| evse.last_transaction_id.as_deref() == Some(transaction_id))
            .map(|evse| evse.evse_id)
    }
}

fn start_rejected(reason: &str) -> RequestStartTransactionResponse {
    RequestStartTransactionResponse {
        status: RequestStartStopStatus::Rejected,
        transaction_id: None,
        status_info: Some(StatusInfo::new(reason)),
    }
}

impl Routable for Station {
    fn routes(self: Arc<Self>, routes: RouteBuilder) -> RouteBuilder {
        let station = self;

        routes
            .on("RequestStartTransaction", {
                let station = station.clone();
                Handler::typed(move |req: RequestStartTransactionRequest| {
                    let response = station.start_transaction(&req);
                    async move { Ok(response) }
                })
            })
            .after("RequestStartTransaction", {
                let station = station.clone();
                Handler::typed(move |req: RequestStartTransactionRequest| {
                    let station = station.clone();
                    async move {
                        if let Some(evse_id) = station.evse_of_remote_start(req.remote_start_id) {
                            station.notify_status(evse_id).await?;
                        }
                        Ok(())
                    }
                })
            })
            .on("RequestStopTransaction", {
                let station = station.clone();
                Handler::typed(move |req: RequestStopTransactionRequest| {
                    let response = station.stop_transaction(&req.transaction_id);
                    async move { Ok(response) }
                })
            })
            .after("RequestStopTransaction", {
                let station = station.clone();
                Handler::typed(move |req: RequestStopTransactionRequest| {
                    let station = station.clone();
                    async move {
                        if let Some(evse_id) = station.evse_of_ended_transaction(&req.transaction_id) {
                            station.notify_status(evse_id).await?;
                        }
                        Ok(())
                    }
                })
            })
            .on("SetChargingProfile", {
                let station = station.clone();
                Handler::typed(move |req: SetChargingProfileRequest| {
                    let response = station.set_charging_profile(&req);
                    async move { Ok(response) }
                })
            })
            .on("Reset", {
                let station = station.clone();
                Handler::typed(move |req: ResetRequest| {
                    let response = station.reset(&req);
                    async move { Ok(response) }
                })
            })
            .on(
                "DataTransfer",
                Handler::typed(move |req: DataTransferRequest| {
                    let response = station.data_transfer(&req);
                    async move { Ok(response) }
                }),
            )
    }
}
