//! Pairing verifier and out-of-band pairing payload.
//!
//! Pairing uses a single security scheme: an SRP6a-style exchange in which
//! the device holds a salt and verifier derived from the operator's
//! username and password. The operator's tool learns the username and
//! password out of band, from a code rendered by the device.
//!
//! # Payload
//!
//! ```json
//! {"ver":"v1","name":"PROV_RT_WIFI","username":"wifiprov","pop":"abcd1234","transport":"softap"}
//! ```
//!
//! Without a password the `username` and `pop` fields are omitted.

use serde::Serialize;
use tracing::info;

use crate::error::ProvisionError;
use crate::network::NetworkCredentials;

/// Version tag of the pairing payload.
pub const PAYLOAD_VERSION: &str = "v1";

/// Transport the pairing service runs over.
pub const PAIRING_TRANSPORT: &str = "softap";

/// Page that renders a payload passed in its `data` query parameter.
pub const FALLBACK_BASE_URL: &str = "https://espressif.github.io/esp-jumpstart/qrcode.html";

/// Salt generated for username `wifiprov` and password `abcd1234`.
// TODO: read salt and verifier from the manufacturing partition once
// per-device material is provisioned at the factory.
pub const PAIRING_SALT: [u8; 16] = [
    0x03, 0x6e, 0xe0, 0xc7, 0xbc, 0xb9, 0xed, 0xa8, 0x4c, 0x9e, 0xac, 0x97, 0xd9, 0x3d, 0xec, 0xf4,
];

/// Verifier generated for username `wifiprov` and password `abcd1234`.
pub const PAIRING_VERIFIER: [u8; 384] = [
    0x7c, 0x7c, 0x85, 0x47, 0x65, 0x08, 0x94, 0x6d, 0xd6, 0x36, 0xaf, 0x37, 0xd7, 0xe8, 0x91, 0x43,
    0x78, 0xcf, 0xfd, 0x61, 0x6c, 0x59, 0xd2, 0xf8, 0x39, 0x08, 0x12, 0x72, 0x38, 0xde, 0x9e, 0x24,
    0xa4, 0x70, 0x26, 0x1c, 0xdf, 0xa9, 0x03, 0xc2, 0xb2, 0x70, 0xe7, 0xb1, 0x32, 0x24, 0xda, 0x11,
    0x1d, 0x97, 0x18, 0xdc, 0x60, 0x72, 0x08, 0xcc, 0x9a, 0xc9, 0x0c, 0x48, 0x27, 0xe2, 0xae, 0x89,
    0xaa, 0x16, 0x25, 0xb8, 0x04, 0xd2, 0x1a, 0x9b, 0x3a, 0x8f, 0x37, 0xf6, 0xe4, 0x3a, 0x71, 0x2e,
    0xe1, 0x27, 0x86, 0x6e, 0xad, 0xce, 0x28, 0xff, 0x54, 0x46, 0x60, 0x1f, 0xb9, 0x96, 0x87, 0xdc,
    0x57, 0x40, 0xa7, 0xd4, 0x6c, 0xc9, 0x77, 0x54, 0xdc, 0x16, 0x82, 0xf0, 0xed, 0x35, 0x6a, 0xc4,
    0x70, 0xad, 0x3d, 0x90, 0xb5, 0x81, 0x94, 0x70, 0xd7, 0xbc, 0x65, 0xb2, 0xd5, 0x18, 0xe0, 0x2e,
    0xc3, 0xa5, 0xf9, 0x68, 0xdd, 0x64, 0x7b, 0xb8, 0xb7, 0x3c, 0x9c, 0xfc, 0x00, 0xd8, 0x71, 0x7e,
    0xb7, 0x9a, 0x7c, 0xb1, 0xb7, 0xc2, 0xc3, 0x18, 0x34, 0x29, 0x32, 0x43, 0x3e, 0x00, 0x99, 0xe9,
    0x82, 0x94, 0xe3, 0xd8, 0x2a, 0xb0, 0x96, 0x29, 0xb7, 0xdf, 0x0e, 0x5f, 0x08, 0x33, 0x40, 0x76,
    0x52, 0x91, 0x32, 0x00, 0x9f, 0x97, 0x2c, 0x89, 0x6c, 0x39, 0x1e, 0xc8, 0x28, 0x05, 0x44, 0x17,
    0x3f, 0x68, 0x02, 0x8a, 0x9f, 0x44, 0x61, 0xd1, 0xf5, 0xa1, 0x7e, 0x5a, 0x70, 0xd2, 0xc7, 0x23,
    0x81, 0xcb, 0x38, 0x68, 0xe4, 0x2c, 0x20, 0xbc, 0x40, 0x57, 0x76, 0x17, 0xbd, 0x08, 0xb8, 0x96,
    0xbc, 0x26, 0xeb, 0x32, 0x46, 0x69, 0x35, 0x05, 0x8c, 0x15, 0x70, 0xd9, 0x1b, 0xe9, 0xbe, 0xcc,
    0xa9, 0x38, 0xa6, 0x67, 0xf0, 0xad, 0x50, 0x13, 0x19, 0x72, 0x64, 0xbf, 0x52, 0xc2, 0x34, 0xe2,
    0x1b, 0x11, 0x79, 0x74, 0x72, 0xbd, 0x34, 0x5b, 0xb1, 0xe2, 0xfd, 0x66, 0x73, 0xfe, 0x71, 0x64,
    0x74, 0xd0, 0x4e, 0xbc, 0x51, 0x24, 0x19, 0x40, 0x87, 0x0e, 0x92, 0x40, 0xe6, 0x21, 0xe7, 0x2d,
    0x4e, 0x37, 0x76, 0x2f, 0x2e, 0xe2, 0x68, 0xc7, 0x89, 0xe8, 0x32, 0x13, 0x42, 0x06, 0x84, 0x84,
    0x53, 0x4a, 0xb3, 0x0c, 0x1b, 0x4c, 0x8d, 0x1c, 0x51, 0x97, 0x19, 0xab, 0xae, 0x77, 0xff, 0xdb,
    0xec, 0xf0, 0x10, 0x95, 0x34, 0x33, 0x6b, 0xcb, 0x3e, 0x84, 0x0f, 0xb9, 0xd8, 0x5f, 0xb8, 0xa0,
    0xb8, 0x55, 0x53, 0x3e, 0x70, 0xf7, 0x18, 0xf5, 0xce, 0x7b, 0x4e, 0xbf, 0x27, 0xce, 0xce, 0xa8,
    0xb3, 0xbe, 0x40, 0xc5, 0xc5, 0x32, 0x29, 0x3e, 0x71, 0x64, 0x9e, 0xde, 0x8c, 0xf6, 0x75, 0xa1,
    0xe6, 0xf6, 0x53, 0xc8, 0x31, 0xa8, 0x78, 0xde, 0x50, 0x40, 0xf7, 0x62, 0xde, 0x36, 0xb2, 0xba,
];

/// Security schemes the pairing transport supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityScheme {
    /// SRP6a salt/verifier exchange with a username.
    Sec2,
}

/// Parameters of one pairing attempt.
///
/// Lives from entering `AwaitingPairing` until the attempt completes or fails.
#[derive(Clone)]
pub struct PairingSession {
    pub scheme: SecurityScheme,
    pub service_name: String,
    pub service_passphrase: Option<String>,
    pub username: String,
    pub proof_of_possession: Option<String>,
    pub salt: &'static [u8],
    pub verifier: &'static [u8],
}

impl std::fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingSession")
            .field("scheme", &self.scheme)
            .field("service_name", &self.service_name)
            .field("username", &self.username)
            .field("salt_len", &self.salt.len())
            .field("verifier_len", &self.verifier.len())
            .finish_non_exhaustive()
    }
}

/// Result reported by the pairing transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The operator's tool delivered working network credentials.
    Succeeded(NetworkCredentials),
    /// The attempt ended without credentials.
    Failed { reason: String },
}

/// Transport running the pairing exchange (e.g. a SoftAP service).
pub trait PairingTransport: Send {
    /// Start advertising the pairing service for `session`.
    fn start(&mut self, session: &PairingSession) -> Result<(), ProvisionError>;

    /// Block until the attempt started by `start` completes.
    fn wait(&mut self) -> PairingOutcome;
}

/// Structured out-of-band pairing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingPayload {
    pub ver: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pop: Option<String>,
    pub transport: String,
}

impl PairingPayload {
    /// Compact JSON text handed to the code renderer.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// URL that renders the payload when no code can be displayed.
    pub fn fallback_url(&self) -> String {
        format!(
            "{}?data={}",
            FALLBACK_BASE_URL,
            urlencoding::encode(&self.to_text())
        )
    }
}

/// Consumer of pairing payloads, e.g. a QR code renderer.
pub trait PayloadRenderer: Send {
    fn render(&self, payload: &PairingPayload);
}

/// Renderer that writes the payload and fallback URL to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRenderer;

impl PayloadRenderer for LogRenderer {
    fn render(&self, payload: &PairingPayload) {
        info!("Scan the pairing code from the provisioning application");
        info!("Pairing payload: {}", payload.to_text());
        info!(
            "If the code is not visible, open this URL in a browser: {}",
            payload.fallback_url()
        );
    }
}

/// Holder of the proof-of-possession material.
#[derive(Debug, Clone, Copy)]
pub struct PairingVerifier {
    salt: &'static [u8],
    verifier: &'static [u8],
}

impl PairingVerifier {
    /// Verifier backed by the material built into the firmware.
    pub fn builtin() -> Self {
        Self {
            salt: &PAIRING_SALT,
            verifier: &PAIRING_VERIFIER,
        }
    }

    pub fn new(salt: &'static [u8], verifier: &'static [u8]) -> Self {
        Self { salt, verifier }
    }

    pub fn salt(&self) -> &'static [u8] {
        self.salt
    }

    pub fn verifier(&self) -> &'static [u8] {
        self.verifier
    }

    /// Build the session handed to the pairing transport.
    pub fn session(
        &self,
        service_name: &str,
        service_passphrase: Option<&str>,
        username: &str,
        proof_of_possession: Option<&str>,
    ) -> PairingSession {
        PairingSession {
            scheme: SecurityScheme::Sec2,
            service_name: service_name.to_string(),
            service_passphrase: service_passphrase.map(str::to_string),
            username: username.to_string(),
            proof_of_possession: proof_of_possession.map(str::to_string),
            salt: self.salt,
            verifier: self.verifier,
        }
    }

    /// Payload for the external code renderer.
    ///
    /// `username` and `passphrase` are only included when a passphrase is given.
    pub fn describe_payload(
        &self,
        service_name: &str,
        username: &str,
        passphrase: Option<&str>,
    ) -> PairingPayload {
        PairingPayload {
            ver: PAYLOAD_VERSION.to_string(),
            name: service_name.to_string(),
            username: passphrase.map(|_| username.to_string()),
            pop: passphrase.map(str::to_string),
            transport: PAIRING_TRANSPORT.to_string(),
        }
    }
}

impl Default for PairingVerifier {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_payload_with_passphrase() {
        let payload = PairingVerifier::builtin().describe_payload(
            "PROV_RT_WIFI",
            "wifiprov",
            Some("abcd1234"),
        );
        assert_eq!(
            payload.to_text(),
            r#"{"ver":"v1","name":"PROV_RT_WIFI","username":"wifiprov","pop":"abcd1234","transport":"softap"}"#
        );
    }

    #[test]
    fn test_payload_without_passphrase_omits_credentials() {
        let payload = PairingVerifier::builtin().describe_payload("PROV_RT_WIFI", "wifiprov", None);
        assert_eq!(
            payload.to_text(),
            r#"{"ver":"v1","name":"PROV_RT_WIFI","transport":"softap"}"#
        );
    }

    #[test]
    fn test_fallback_url_embeds_encoded_payload() {
        let payload = PairingVerifier::builtin().describe_payload("dev 1", "wifiprov", None);
        let url = payload.fallback_url();
        assert!(url.starts_with(
            "https://espressif.github.io/esp-jumpstart/qrcode.html?data=%7B%22ver%22"
        ));
        assert!(url.contains("dev%201"));
        assert!(!url.contains('"'));
    }

    #[test]
    fn test_session_carries_verifier_material() {
        let session = PairingVerifier::builtin().session(
            "PROV_RT_WIFI",
            None,
            "wifiprov",
            Some("abcd1234"),
        );
        assert_eq!(session.scheme, SecurityScheme::Sec2);
        assert_eq!(session.salt.len(), 16);
        assert_eq!(session.verifier.len(), 384);
        assert_eq!(session.service_passphrase, None);
        assert!(!format!("{:?}", session).contains("abcd1234"));
    }
}
