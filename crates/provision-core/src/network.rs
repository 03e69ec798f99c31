//! Network join support: credentials, the persisted network profile,
//! link events and the bounded reconnect counter.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ProvisionError;
use crate::storage::DurableStorage;

/// Durable namespace holding the network profile.
pub const NETWORK_NAMESPACE: &str = "network";

/// Default ceiling of automatic reconnect attempts.
pub const DEFAULT_MAX_JOIN_RETRIES: u8 = 5;

const PAIRED_KEY: &str = "paired";
const SSID_KEY: &str = "ssid";
const PASSPHRASE_KEY: &str = "passphrase";

/// Local-network credentials received during pairing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCredentials {
    pub ssid: String,
    /// Empty for open networks.
    pub passphrase: String,
}

impl NetworkCredentials {
    pub fn new(ssid: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.passphrase.is_empty()
    }
}

impl std::fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Events delivered by the network join driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The link layer dropped or failed to associate.
    Disconnected { reason: Option<u16> },
    /// The interface obtained an address.
    AddressAssigned { ip: IpAddr },
}

/// Network join driver.
///
/// Link events are delivered asynchronously through the
/// `std::sync::mpsc::Sender<NetworkEvent>` the driver was built with.
pub trait JoinDriver: Send {
    /// Start joining the network described by `credentials`.
    fn connect(&mut self, credentials: &NetworkCredentials) -> Result<(), ProvisionError>;

    /// Immediately retry the last join request.
    fn reconnect(&mut self) -> Result<(), ProvisionError>;
}

/// Bounded counter of reconnect attempts for one join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    attempts: u8,
    ceiling: u8,
}

impl RetryCounter {
    pub fn new(ceiling: u8) -> Self {
        Self {
            attempts: 0,
            ceiling,
        }
    }

    /// Count one more attempt; `None` once the ceiling has been reached.
    pub fn try_increment(&mut self) -> Option<u8> {
        if self.attempts < self.ceiling {
            self.attempts += 1;
            Some(self.attempts)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn ceiling(&self) -> u8 {
        self.ceiling
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.ceiling
    }
}

impl Default for RetryCounter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_JOIN_RETRIES)
    }
}

/// Persisted pairing marker and network credentials.
pub struct NetworkProfileStore {
    storage: Box<dyn DurableStorage>,
}

impl NetworkProfileStore {
    pub fn new(storage: Box<dyn DurableStorage>) -> Self {
        Self { storage }
    }

    /// Whether a previous pairing completed.
    pub fn is_paired(&self) -> Result<bool, ProvisionError> {
        Ok(self.storage.read(PAIRED_KEY)?.as_deref() == Some("1"))
    }

    /// Stored credentials, `None` before the first pairing.
    pub fn load(&self) -> Result<Option<NetworkCredentials>, ProvisionError> {
        let Some(ssid) = self.storage.read(SSID_KEY)?.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let passphrase = self.storage.read(PASSPHRASE_KEY)?.unwrap_or_default();
        Ok(Some(NetworkCredentials { ssid, passphrase }))
    }

    /// Persist `credentials` and the pairing marker in one commit.
    pub fn save(&self, credentials: &NetworkCredentials) -> Result<(), ProvisionError> {
        if credentials.ssid.is_empty() {
            return Err(ProvisionError::InvalidArgument(
                "network name must not be empty".to_string(),
            ));
        }
        self.storage.write(SSID_KEY, &credentials.ssid)?;
        self.storage.write(PASSPHRASE_KEY, &credentials.passphrase)?;
        self.storage.write(PAIRED_KEY, "1")?;
        self.storage.commit()?;
        info!("Stored network profile for '{}'", credentials.ssid);
        Ok(())
    }
}

impl std::fmt::Debug for NetworkProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProfileStore").finish_non_exhaustive()
    }
}
