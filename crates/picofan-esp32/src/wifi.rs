//! The ESP32 Wi-Fi radio behind the server's `Radio` trait.

use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::peripheral,
    nvs::EspDefaultNvsPartition,
    sys::EspError,
    wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration, Configuration,
        EspWifi,
    },
};
use log::{info, warn};

use picofan_core::WifiCredentials;
use picofan_server::{AccessPointConfig, Radio, RadioError};

type Wifi = BlockingWifi<EspWifi<'static>>;

/// Both Wi-Fi interfaces of the ESP32.
pub struct EspRadio {
    wifi: Mutex<Wifi>,
}

impl EspRadio {
    pub fn new(
        modem: impl peripheral::Peripheral<P = esp_idf_svc::hal::modem::Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self {
            wifi: Mutex::new(wifi),
        })
    }

    fn with_wifi<T>(
        &self,
        f: impl FnOnce(&mut Wifi) -> Result<T, EspError>,
    ) -> Result<T, EspError> {
        let mut wifi = self.wifi.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut wifi)
    }
}

impl Radio for EspRadio {
    fn scan(&self) -> Result<Vec<Vec<u8>>, RadioError> {
        self.with_wifi(|wifi| {
            if !wifi.is_started()? {
                wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
                wifi.start()?;
            }
            info!("Scanning for WiFi networks...");
            let found = wifi.scan()?;
            Ok(found
                .into_iter()
                .map(|ap| ap.ssid.as_bytes().to_vec())
                .collect())
        })
        .map_err(|e| RadioError::Scan(e.to_string()))
    }

    fn start_access_point(&self, config: &AccessPointConfig) -> Result<Ipv4Addr, RadioError> {
        let ap_error = |reason: &str| RadioError::AccessPoint(reason.to_string());
        let ap = AccessPointConfiguration {
            ssid: config
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ap_error("SSID too long (max 32 chars)"))?,
            password: config
                .password
                .as_str()
                .try_into()
                .map_err(|_| ap_error("Password too long (max 64 chars)"))?,
            auth_method: if config.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        self.with_wifi(|wifi| {
            // Keep the station interface so scans still work
            wifi.set_configuration(&Configuration::Mixed(ClientConfiguration::default(), ap))?;
            if !wifi.is_started()? {
                wifi.start()?;
            }
            wifi.wait_netif_up()?;
            Ok(wifi.wifi().ap_netif().get_ip_info()?.ip)
        })
        .map_err(|e| ap_error(&e.to_string()))
    }

    fn connect_station(
        &self,
        credentials: &WifiCredentials,
        hostname: Option<&str>,
    ) -> Result<Ipv4Addr, RadioError> {
        let station_error = |reason: String| RadioError::Station {
            ssid: credentials.ssid.clone(),
            reason,
        };
        let client = ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| station_error("SSID too long (max 32 chars)".into()))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| station_error("Password too long (max 64 chars)".into()))?,
            auth_method: if credentials.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        };

        self.with_wifi(|wifi| {
            if let Some(hostname) = hostname {
                if let Err(e) = wifi.wifi_mut().sta_netif_mut().set_hostname(hostname) {
                    warn!("Failed to set hostname '{}': {}", hostname, e);
                }
            }
            wifi.set_configuration(&Configuration::Client(client))?;
            if !wifi.is_started()? {
                wifi.start()?;
            }

            info!("Connecting to '{}'...", credentials.ssid);
            wifi.connect()?;
            info!("Waiting for DHCP lease...");
            wifi.wait_netif_up()?;

            let ip_info = wifi.wifi().sta_netif().get_ip_info()?;
            info!("WiFi connected!");
            info!("  IP address: {}", ip_info.ip);
            info!("  Gateway:    {}", ip_info.subnet.gateway);
            Ok(ip_info.ip)
        })
        .map_err(|e| station_error(e.to_string()))
    }

    fn deactivate(&self) -> Result<(), RadioError> {
        self.with_wifi(|wifi| wifi.stop())
            .map_err(|e| RadioError::Deactivate(e.to_string()))
    }
}
