//! # picofan-server
//!
//! The device's web server on tokio.
//!
//! One listener serves one of two modes per boot:
//! - `provisioning`: access point with a login page, until Wi-Fi
//!   credentials are stored
//! - `management`: settings page plus file upload and deletion, in station
//!   mode
//!
//! Radio and reset are reached through the traits in `device`, so the same
//! services run on the ESP32 and on a host.

pub mod assets;
pub mod connection;
pub mod context;
pub mod device;
pub mod error;
pub mod management;
pub mod provisioning;
pub mod server;
pub mod tls;

pub use connection::Connection;
pub use context::DeviceContext;
pub use device::{AccessPointConfig, Device, HostDevice, Radio, RadioError, SimulatedRadio};
pub use error::ServerError;
pub use management::ManagementService;
pub use provisioning::{ProvisioningService, ProvisioningState};
pub use server::{Handled, Server, ServerConfig, Service, Session};
