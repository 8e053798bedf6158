//! # picofan-core
//!
//! Flash-backed state for the PicoFan controller.
//!
//! This crate provides:
//! - Form decoding and shared HTML helpers (`codec`)
//! - The order-preserving configuration document and its store (`config`)
//! - Wi-Fi credentials captured during provisioning (`credentials`)
//! - File listing, deletion and upload pages (`files`)
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both a host (tokio) and ESP32 (esp-idf) targets.
//! All filesystem access is synchronous.

pub mod codec;
pub mod config;
pub mod credentials;
pub mod files;

pub use config::{ConfigDocument, ConfigError, ConfigStore, ConfigValue, Section};
pub use credentials::{CredentialStore, CredentialsError, WifiCredentials};
pub use files::{FileError, FileManager, FileManifest};
