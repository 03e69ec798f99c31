//! # provision-core
//!
//! Provisioning and secure credential bootstrap for a network-connected device.
//!
//! This crate provides:
//! - Secret store for the API key and API endpoint override (cache + durable backing)
//! - Pairing verifier material and out-of-band pairing payloads
//! - Reset signal sampling
//! - Single-permit notification channel between the config service and the control thread
//! - Framework-agnostic config service handler logic and the discovery seam
//! - The provisioning state machine and the bootstrap controller driving it
//!
//! This crate is intentionally runtime-agnostic and contains no async code,
//! making it usable on both Linux (tokio) and ESP32 (esp-idf) targets.

pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod machine;
pub mod network;
pub mod notify;
pub mod pairing;
pub mod reset;
pub mod secrets;
pub mod storage;

pub use config::{DiscoveryConfig, ProvisioningConfig};
pub use controller::{BootstrapController, Collaborators, ConfigServiceControl, Provisioned};
pub use discovery::ServiceDiscovery;
pub use error::{ErrorKind, ProvisionError};
pub use handlers::{ConfigHandlers, Reboot, INDEX_HTML};
pub use machine::{Effect, Event, Machine, ProvisioningState, TransitionError};
pub use network::{JoinDriver, NetworkCredentials, NetworkEvent, NetworkProfileStore, RetryCounter};
pub use notify::NotificationChannel;
pub use pairing::{
    LogRenderer, PairingOutcome, PairingPayload, PairingSession, PairingTransport, PairingVerifier,
    PayloadRenderer,
};
pub use reset::{DigitalInput, NoResetInput, Polarity, ResetButton, ResetCheck};
pub use secrets::{RemoteCredentials, SecretName, SecretStore, DEFAULT_API_URI};
pub use storage::{DurableStorage, MemoryStorage, StorageError};
