//! Host network join driver.
//!
//! The host's interfaces are managed by the operating system. Joining only
//! records the requested network and reports the address of the interface
//! that routes outbound traffic.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::mpsc::Sender;

use provision_core::{JoinDriver, NetworkCredentials, NetworkEvent, ProvisionError};
use tracing::{info, warn};

/// Any routable address; no packet is sent to it.
const ROUTE_PROBE: &str = "192.0.2.1:9";

pub struct HostNetwork {
    events: Sender<NetworkEvent>,
    ssid: Option<String>,
}

impl HostNetwork {
    pub fn new(events: Sender<NetworkEvent>) -> Self {
        Self { events, ssid: None }
    }

    fn report_address(&self) -> Result<(), ProvisionError> {
        let ip = outbound_address().unwrap_or_else(|| {
            warn!("No routed interface found, using the loopback address");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        self.events
            .send(NetworkEvent::AddressAssigned { ip })
            .map_err(|_| ProvisionError::transport("network event receiver dropped"))
    }
}

impl JoinDriver for HostNetwork {
    fn connect(&mut self, credentials: &NetworkCredentials) -> Result<(), ProvisionError> {
        info!(
            "Using host network for '{}' ({})",
            credentials.ssid,
            if credentials.is_open() { "open" } else { "secured" }
        );
        self.ssid = Some(credentials.ssid.clone());
        self.report_address()
    }

    fn reconnect(&mut self) -> Result<(), ProvisionError> {
        if self.ssid.is_none() {
            return Err(ProvisionError::transport("reconnect before connect"));
        }
        self.report_address()
    }
}

fn outbound_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(ROUTE_PROBE).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_connect_reports_an_address() {
        let (sender, receiver) = mpsc::channel();
        let mut network = HostNetwork::new(sender);

        network
            .connect(&NetworkCredentials::new("HomeNet", "hunter22"))
            .unwrap();
        assert!(matches!(
            receiver.try_recv().unwrap(),
            NetworkEvent::AddressAssigned { .. }
        ));

        network.reconnect().unwrap();
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn test_reconnect_requires_a_prior_join() {
        let (sender, _receiver) = mpsc::channel();
        let mut network = HostNetwork::new(sender);
        assert!(network.reconnect().is_err());
    }
}
