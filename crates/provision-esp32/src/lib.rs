//! ESP32-specific components for device provisioning.
//!
//! This crate provides the platform side of the bootstrap controller on
//! ESP-IDF:
//! - NVS-backed durable storage
//! - GPIO reset input
//! - SoftAP pairing through the ESP-IDF provisioning manager
//! - WiFi station join driver
//! - `EspHttpServer` config service with mDNS discovery
//!
//! # Example
//!
//! ```ignore
//! use provision_esp32::nvs::NvsStorage;
//! use provision_esp32::wifi::WifiJoin;
//!
//! let secrets = NvsStorage::open(nvs.clone(), SECRETS_NAMESPACE)?;
//! let wifi = WifiJoin::new(peripherals.modem, sysloop, nvs, events)?;
//! ```

pub mod http;
pub mod nvs;
pub mod pairing;
pub mod reset;
pub mod wifi;

use esp_idf_svc::sys::EspError;
use provision_core::{ProvisionError, Reboot, StorageError};

/// Device restart through `esp_restart`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspRestart;

impl Reboot for EspRestart {
    fn restart(&self) {
        log::info!("Restarting...");
        esp_idf_svc::hal::reset::restart();
    }
}

pub(crate) fn storage_error(operation: &str, err: EspError) -> StorageError {
    StorageError::with_code(operation, err.code())
}

pub(crate) fn transport_error(operation: &str, err: EspError) -> ProvisionError {
    ProvisionError::TransportFailure {
        message: format!("{} failed: {}", operation, err),
        code: Some(err.code()),
    }
}

pub(crate) fn configuration_error(operation: &str, err: EspError) -> ProvisionError {
    ProvisionError::ConfigurationFailure {
        message: format!("{} failed: {}", operation, err),
        code: Some(err.code()),
    }
}
