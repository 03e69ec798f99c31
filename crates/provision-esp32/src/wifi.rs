//! WiFi station join driver for ESP32.
//!
//! Link events come from the system event loop: a station disconnect is
//! forwarded as `NetworkEvent::Disconnected` and a DHCP lease as
//! `NetworkEvent::AddressAssigned`.

use std::net::IpAddr;
use std::sync::mpsc::Sender;

use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripheral;
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use log::{debug, info, warn};
use provision_core::{JoinDriver, NetworkCredentials, NetworkEvent, ProvisionError};

use crate::{configuration_error, transport_error};

/// Station-mode join driver.
///
/// Owns the WiFi driver; keep it alive for as long as the link is needed.
pub struct WifiJoin {
    wifi: Box<EspWifi<'static>>,
    _link: EspSubscription<'static, System>,
    _address: EspSubscription<'static, System>,
}

impl WifiJoin {
    pub fn new(
        modem: impl peripheral::Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        events: Sender<NetworkEvent>,
    ) -> Result<Self, ProvisionError> {
        let wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))
            .map_err(|err| configuration_error("esp_wifi_init", err))?;

        let link_events = events.clone();
        let link = sysloop
            .subscribe::<WifiEvent, _>(move |event| {
                if let WifiEvent::StaDisconnected(..) = event {
                    debug!("Station disconnected");
                    let _ = link_events.send(NetworkEvent::Disconnected { reason: None });
                }
            })
            .map_err(|err| configuration_error("esp_event_handler_register", err))?;

        let address = sysloop
            .subscribe::<IpEvent, _>(move |event| {
                if let IpEvent::DhcpIpAssigned(assignment) = event {
                    let ip = IpAddr::V4(assignment.ip());
                    let _ = events.send(NetworkEvent::AddressAssigned { ip });
                }
            })
            .map_err(|err| configuration_error("esp_event_handler_register", err))?;

        Ok(Self {
            wifi: Box::new(wifi),
            _link: link,
            _address: address,
        })
    }

    /// The underlying driver, e.g. for reading the station address.
    pub fn wifi(&self) -> &EspWifi<'static> {
        &self.wifi
    }
}

impl JoinDriver for WifiJoin {
    fn connect(&mut self, credentials: &NetworkCredentials) -> Result<(), ProvisionError> {
        let auth_method = if credentials.is_open() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let client = ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ProvisionError::configuration("SSID too long (max 32 chars)"))?,
            password: credentials
                .passphrase
                .as_str()
                .try_into()
                .map_err(|_| ProvisionError::configuration("Password too long (max 64 chars)"))?,
            auth_method,
            ..Default::default()
        };

        self.wifi
            .set_configuration(&Configuration::Client(client))
            .map_err(|err| configuration_error("esp_wifi_set_config", err))?;

        let started = self
            .wifi
            .is_started()
            .map_err(|err| transport_error("esp_wifi_get_mode", err))?;
        if !started {
            self.wifi
                .start()
                .map_err(|err| transport_error("esp_wifi_start", err))?;
        }

        info!("Connecting to '{}'...", credentials.ssid);
        self.wifi
            .connect()
            .map_err(|err| transport_error("esp_wifi_connect", err))
    }

    fn reconnect(&mut self) -> Result<(), ProvisionError> {
        self.wifi.connect().map_err(|err| {
            warn!("Reconnect request failed: {}", err);
            transport_error("esp_wifi_connect", err)
        })
    }
}
