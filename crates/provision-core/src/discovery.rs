//! Local service discovery for the config service.
//!
//! Advertises `<hostname>.local` and an `_http._tcp` record on the config
//! service port so the operator can reach it by name.

use crate::error::ProvisionError;

/// Advertises the config service on the local network.
pub trait ServiceDiscovery: Send {
    /// Publish the host name and the service record for `port`.
    fn advertise(&mut self, port: u16) -> Result<(), ProvisionError>;

    /// Remove the published record. Idempotent.
    fn withdraw(&mut self) -> Result<(), ProvisionError>;
}
