//! Provisioning configuration.
//!
//! Shared by every target. The host binary loads it from TOML; the device
//! build uses the defaults compiled into the firmware.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::DEFAULT_MAX_JOIN_RETRIES;
use crate::secrets::DEFAULT_API_URI;

/// Provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProvisioningConfig {
    /// Name of the pairing service (SoftAP SSID).
    pub service_name: String,

    /// Passphrase protecting the pairing service itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_passphrase: Option<String>,

    /// Username of the pairing security scheme.
    pub pairing_username: String,

    /// Password shown in the pairing payload. `None` omits username and
    /// password from the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_password: Option<String>,

    /// Endpoint used while no `api_uri` override is stored.
    pub default_api_uri: String,

    /// Keep the config service down once an API key is available.
    pub disable_configurator_after_provisioned: bool,

    /// Config service HTTP port.
    pub http_port: u16,

    /// Local service discovery record.
    pub discovery: DiscoveryConfig,

    /// Automatic reconnect attempts after a link-layer disconnect.
    pub max_join_retries: u8,

    /// Pause before retrying a pairing transport that failed to start.
    pub pairing_retry_delay_ms: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            service_name: "PROV_RT_WIFI".to_string(),
            service_passphrase: None,
            pairing_username: "wifiprov".to_string(),
            pairing_password: Some("abcd1234".to_string()),
            default_api_uri: DEFAULT_API_URI.to_string(),
            disable_configurator_after_provisioned: false,
            http_port: 80,
            discovery: DiscoveryConfig::default(),
            max_join_retries: DEFAULT_MAX_JOIN_RETRIES,
            pairing_retry_delay_ms: 1000,
        }
    }
}

impl ProvisioningConfig {
    pub fn pairing_retry_delay(&self) -> Duration {
        Duration::from_millis(self.pairing_retry_delay_ms)
    }
}

/// Service discovery record advertised while the config service runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DiscoveryConfig {
    pub hostname: String,
    pub instance_name: String,
    pub service_type: String,
    pub protocol: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            hostname: "provision-agent".to_string(),
            instance_name: "Realtime Device Configurator".to_string(),
            service_type: "_http".to_string(),
            protocol: "_tcp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: ProvisioningConfig = serde_json::from_str(
            r#"{"http_port": 8080, "discovery": {"hostname": "kitchen-speaker"}}"#,
        )
        .unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.discovery.hostname, "kitchen-speaker");
        assert_eq!(config.discovery.service_type, "_http");
        assert_eq!(config.max_join_retries, 5);
        assert_eq!(config.default_api_uri, DEFAULT_API_URI);
        assert!(!config.disable_configurator_after_provisioned);
    }

    #[test]
    fn test_null_password_disables_payload_credentials() {
        let config: ProvisioningConfig =
            serde_json::from_str(r#"{"pairing_password": null}"#).unwrap();
        assert_eq!(config.pairing_password, None);
        assert_eq!(config.pairing_retry_delay(), Duration::from_secs(1));
    }
}
