//! Provisioning agent for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//! It will not compile with the standard Rust toolchain.
//!
//! Boot flow and secret handling are identical to Linux; only the
//! collaborators differ (NVS, SoftAP pairing, station WiFi, esp httpd).

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::IOPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{info, warn};
use provision_core::network::NETWORK_NAMESPACE;
use provision_core::secrets::SECRETS_NAMESPACE;
use provision_core::{
    BootstrapController, Collaborators, ConfigHandlers, LogRenderer, NetworkProfileStore,
    NotificationChannel, Polarity, ProvisioningConfig, ResetButton, ResetCheck, SecretStore,
};
use provision_esp32::http::{EspConfigService, MdnsDiscovery};
use provision_esp32::nvs::NvsStorage;
use provision_esp32::pairing::SoftApPairing;
use provision_esp32::reset::GpioInput;
use provision_esp32::wifi::WifiJoin;
use provision_esp32::EspRestart;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Provisioning agent starting...");

    let config = ProvisioningConfig {
        disable_configurator_after_provisioned: cfg!(
            feature = "disable-configurator-after-provisioned"
        ),
        ..ProvisioningConfig::default()
    };

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let secrets = Arc::new(SecretStore::new(
        Box::new(NvsStorage::open(nvs.clone(), SECRETS_NAMESPACE)?),
        config.default_api_uri.clone(),
    ));
    let profile = NetworkProfileStore::new(Box::new(NvsStorage::open(
        nvs.clone(),
        NETWORK_NAMESPACE,
    )?));
    let notifications = Arc::new(NotificationChannel::new());

    let (events, network_events) = mpsc::channel();
    let wifi = WifiJoin::new(peripherals.modem, sysloop, nvs, events)?;

    let reset: Box<dyn ResetCheck> = if cfg!(feature = "no-reset-button") {
        Box::new(false)
    } else {
        Box::new(ResetButton::new(
            GpioInput::new(peripherals.pins.gpio0.downgrade()),
            Polarity::ActiveLow,
        ))
    };

    let service = EspConfigService::new(
        config.http_port,
        ConfigHandlers::new(secrets.clone(), notifications.clone()),
        Arc::new(EspRestart),
        Box::new(MdnsDiscovery::new(config.discovery.clone())),
    );

    let collaborators = Collaborators {
        pairing: Box::new(SoftApPairing::new()),
        join: Box::new(wifi),
        network_events,
        reset,
        config_service: Box::new(service),
        renderer: Box::new(LogRenderer),
    };

    let controller =
        BootstrapController::new(config, secrets.clone(), profile, notifications, collaborators);
    let provisioned = controller.run()?;

    let remote = secrets.remote_credentials()?;
    info!("Ready!");
    info!("   Endpoint: {}", remote.api_uri);
    if provisioned.degraded {
        warn!("   Network join was degraded before an address was assigned");
    }

    // Keep the config service and WiFi driver alive
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
