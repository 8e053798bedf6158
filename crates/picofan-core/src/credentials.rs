//! Wi-Fi credentials captured during provisioning.
//!
//! Stored in `ssid_credentials` as base64 of the UTF-8 JSON
//! `{"ssid": ..., "password": ...}`. The file is written once at the end of
//! provisioning and its absence is what makes the device provision again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// File name of the credentials blob in the flash root.
pub const CREDENTIALS_FILE: &str = "ssid_credentials";

/// Errors that can occur while reading or writing credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Credentials are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Credentials are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Network name and password for station mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    /// WiFi network SSID.
    pub ssid: String,

    /// WiFi network password (empty for open networks).
    pub password: String,
}

impl WifiCredentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    /// Encode as base64 of the JSON object.
    pub fn encode(&self) -> Result<String, CredentialsError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a stored blob. Whitespace such as a trailing newline is ignored.
    pub fn decode(data: &[u8]) -> Result<Self, CredentialsError> {
        let compact: Vec<u8> = data
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let json = STANDARD.decode(compact)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Reads and writes `ssid_credentials` in the flash root.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(CREDENTIALS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether credentials have been captured. `false` means the device
    /// needs provisioning.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<WifiCredentials, CredentialsError> {
        let data = fs::read(&self.path).map_err(|source| CredentialsError::Io {
            path: self.path.clone(),
            source,
        })?;
        WifiCredentials::decode(&data)
    }

    /// Overwrite any previously stored credentials.
    pub fn save(&self, credentials: &WifiCredentials) -> Result<(), CredentialsError> {
        let encoded = credentials.encode()?;
        fs::write(&self.path, encoded).map_err(|source| CredentialsError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!("Saved WiFi credentials for '{}'", credentials.ssid);
        Ok(())
    }
}
