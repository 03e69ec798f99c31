//! mDNS advertisement of the config service on hosts.

use std::collections::HashMap;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use provision_core::{DiscoveryConfig, ProvisionError, ServiceDiscovery};
use tracing::{debug, info, warn};

/// mDNS responder publishing `<hostname>.local` and the service record.
pub struct MdnsDiscovery {
    config: DiscoveryConfig,
    daemon: Option<ServiceDaemon>,
    /// Full name of the registered record.
    registered: Option<String>,
}

impl MdnsDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            daemon: None,
            registered: None,
        }
    }

    fn daemon(&mut self) -> Result<&ServiceDaemon, ProvisionError> {
        if self.daemon.is_none() {
            let daemon = ServiceDaemon::new().map_err(|err| mdns_error("start responder", err))?;
            self.daemon = Some(daemon);
        }
        self.daemon
            .as_ref()
            .ok_or_else(|| ProvisionError::configuration("mDNS responder unavailable"))
    }
}

/// Record for the config service on `port`; addresses are filled in by the
/// responder from the host interfaces.
pub(crate) fn service_info(
    config: &DiscoveryConfig,
    port: u16,
) -> Result<ServiceInfo, ProvisionError> {
    let service_type = format!("{}.{}.local.", config.service_type, config.protocol);
    let host_name = format!("{}.local.", config.hostname);
    ServiceInfo::new(
        &service_type,
        &config.instance_name,
        &host_name,
        "",
        port,
        HashMap::<String, String>::new(),
    )
    .map(ServiceInfo::enable_addr_auto)
    .map_err(|err| mdns_error("build service record", err))
}

impl ServiceDiscovery for MdnsDiscovery {
    fn advertise(&mut self, port: u16) -> Result<(), ProvisionError> {
        if self.registered.is_some() {
            return Ok(());
        }
        let info = service_info(&self.config, port)?;
        let fullname = info.get_fullname().to_string();
        self.daemon()?
            .register(info)
            .map_err(|err| mdns_error("register", err))?;

        info!(
            "mDNS: {}.local advertising '{}' on port {}",
            self.config.hostname, fullname, port
        );
        self.registered = Some(fullname);
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), ProvisionError> {
        let Some(fullname) = self.registered.take() else {
            return Ok(());
        };
        let Some(daemon) = &self.daemon else {
            return Ok(());
        };
        daemon
            .unregister(&fullname)
            .map_err(|err| mdns_error("unregister", err))?;
        debug!("mDNS: withdrew '{}'", fullname);
        Ok(())
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        if let Err(err) = self.withdraw() {
            warn!("Failed to withdraw mDNS record: {}", err);
        }
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.shutdown();
        }
    }
}

impl std::fmt::Debug for MdnsDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdnsDiscovery")
            .field("config", &self.config)
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

fn mdns_error(operation: &str, err: mdns_sd::Error) -> ProvisionError {
    ProvisionError::configuration(format!("mDNS {} failed: {}", operation, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_record_uses_discovery_config() {
        let config = DiscoveryConfig {
            hostname: "kitchen-speaker".to_string(),
            ..DiscoveryConfig::default()
        };
        let info = service_info(&config, 8080).unwrap();

        assert_eq!(info.get_type(), "_http._tcp.local.");
        assert_eq!(
            info.get_fullname(),
            "Realtime Device Configurator._http._tcp.local."
        );
        assert_eq!(info.get_hostname(), "kitchen-speaker.local.");
        assert_eq!(info.get_port(), 8080);
    }

    #[test]
    fn test_withdraw_without_advertise_is_noop() {
        let mut discovery = MdnsDiscovery::new(DiscoveryConfig::default());
        discovery.withdraw().unwrap();
        discovery.withdraw().unwrap();
    }
}
