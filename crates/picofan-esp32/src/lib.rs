//! ESP32 backend for the PicoFan control plane.
//!
//! Implements the server's hardware seams on ESP-IDF:
//! - `wifi::EspRadio`: scanning, the provisioning access point and station
//!   mode
//! - `EspDevice`: full chip reset
//!
//! The flash filesystem must be mounted (e.g. LittleFS) before building a
//! `DeviceContext` on its mount point.
//!
//! # Example
//!
//! ```ignore
//! use picofan_esp32::{wifi::EspRadio, EspDevice};
//!
//! let radio = Arc::new(EspRadio::new(peripherals.modem, sysloop, Some(nvs))?);
//! let device = Arc::new(EspDevice);
//! ```

pub mod wifi;

use log::info;
use picofan_server::Device;

/// Restarts the chip.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspDevice;

impl Device for EspDevice {
    fn restart(&self) {
        info!("Restarting");
        esp_idf_svc::hal::reset::restart();
    }
}
