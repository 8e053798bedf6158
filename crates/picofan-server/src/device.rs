//! Hardware seams: the Wi-Fi radio and the reset line.
//!
//! The services only talk to these traits. The ESP32 crate implements them
//! on the real radio; the host binary uses the simulated versions below.

use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::info;

use picofan_core::WifiCredentials;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadioError {
    #[error("Network scan failed: {0}")]
    Scan(String),

    #[error("Access point failed to start: {0}")]
    AccessPoint(String),

    #[error("Failed to join '{ssid}': {reason}")]
    Station { ssid: String, reason: String },

    #[error("Failed to deactivate radio: {0}")]
    Deactivate(String),
}

/// Access point brought up while the device has no credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub password: String,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: "picoventi".to_string(),
            password: "raspberry".to_string(),
        }
    }
}

/// The Wi-Fi radio.
pub trait Radio: Send + Sync {
    /// Raw SSIDs of networks in range, in scan order.
    fn scan(&self) -> Result<Vec<Vec<u8>>, RadioError>;

    /// Start the access point and return its address.
    fn start_access_point(&self, config: &AccessPointConfig) -> Result<Ipv4Addr, RadioError>;

    /// Join a network in station mode and return the assigned address.
    fn connect_station(
        &self,
        credentials: &WifiCredentials,
        hostname: Option<&str>,
    ) -> Result<Ipv4Addr, RadioError>;

    /// Turn off both interfaces.
    fn deactivate(&self) -> Result<(), RadioError>;
}

/// Whole-device reset.
pub trait Device: Send + Sync + 'static {
    fn restart(&self);
}

/// Radio stand-in for running on a host.
///
/// Scans return a fixed list. Interfaces only record their state.
#[derive(Debug, Default)]
pub struct SimulatedRadio {
    networks: Vec<Vec<u8>>,
    state: Mutex<RadioState>,
}

/// What a [`SimulatedRadio`] currently has up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RadioState {
    #[default]
    Idle,
    AccessPoint(String),
    Station(String),
}

impl SimulatedRadio {
    pub fn new(networks: impl IntoIterator<Item = impl Into<Vec<u8>>>) -> Self {
        Self {
            networks: networks.into_iter().map(Into::into).collect(),
            state: Mutex::default(),
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: RadioState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl Radio for SimulatedRadio {
    fn scan(&self) -> Result<Vec<Vec<u8>>, RadioError> {
        Ok(self.networks.clone())
    }

    fn start_access_point(&self, config: &AccessPointConfig) -> Result<Ipv4Addr, RadioError> {
        self.set_state(RadioState::AccessPoint(config.ssid.clone()));
        Ok(Ipv4Addr::new(192, 168, 4, 1))
    }

    fn connect_station(
        &self,
        credentials: &WifiCredentials,
        hostname: Option<&str>,
    ) -> Result<Ipv4Addr, RadioError> {
        info!(
            "Simulated join of '{}' as {}",
            credentials.ssid,
            hostname.unwrap_or("<default hostname>")
        );
        self.set_state(RadioState::Station(credentials.ssid.clone()));
        Ok(Ipv4Addr::LOCALHOST)
    }

    fn deactivate(&self) -> Result<(), RadioError> {
        self.set_state(RadioState::Idle);
        Ok(())
    }
}

/// Restart on a host: wakes whoever is waiting to re-run boot.
#[derive(Debug, Default)]
pub struct HostDevice {
    restart: Notify,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes on the next restart request, or immediately if one is
    /// already pending.
    pub fn restarted(&self) -> Notified<'_> {
        self.restart.notified()
    }
}

impl Device for HostDevice {
    fn restart(&self) {
        info!("Device restart requested");
        self.restart.notify_one();
    }
}
