//! Config service handler logic (framework-agnostic).
//!
//! These functions contain the behaviour of the config service endpoints.
//! Framework-specific code (Axum, esp-idf-http) wraps them with their
//! request/response types.
//!
//! | Method | Path | Behaviour |
//! |---|---|---|
//! | GET | `/`, `/index.html` | operator UI |
//! | GET | `/api_key`, `/api_uri` | current value as `text/plain` |
//! | POST | `/api_key` | store, then signal the control thread |
//! | POST | `/api_uri` | store |
//! | POST | `/reboot` | restart the device |

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::ProvisionError;
use crate::notify::NotificationChannel;
use crate::secrets::{SecretName, SecretStore};

/// Operator UI document served at `/` and `/index.html`.
pub const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Device restart primitive.
pub trait Reboot: Send + Sync {
    /// Restart the device. On hardware this does not return.
    fn restart(&self);
}

/// Endpoint logic shared by the HTTP front-ends.
#[derive(Debug, Clone)]
pub struct ConfigHandlers {
    secrets: Arc<SecretStore>,
    notifications: Arc<NotificationChannel>,
}

impl ConfigHandlers {
    pub fn new(secrets: Arc<SecretStore>, notifications: Arc<NotificationChannel>) -> Self {
        Self {
            secrets,
            notifications,
        }
    }

    pub fn secrets(&self) -> &Arc<SecretStore> {
        &self.secrets
    }

    /// Body for `GET /api_key` and `GET /api_uri`.
    ///
    /// An absent secret reads as the empty string; only storage failures
    /// are errors.
    pub fn read_secret(&self, name: SecretName) -> Result<String, ProvisionError> {
        match self.secrets.get(name) {
            Ok(value) => Ok(value),
            Err(err) if err.is_not_found() => Ok(String::new()),
            Err(err) => {
                error!(
                    "GET /{} failed - kind={} code={:?}: {}",
                    name,
                    err.kind(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Handle `POST /api_key` and `POST /api_uri` with the raw request body.
    ///
    /// The value is durably stored before the control thread is signalled,
    /// so a woken waiter always observes it. Only the API key signals.
    pub fn write_secret(&self, name: SecretName, body: &[u8]) -> Result<(), ProvisionError> {
        let value = match parse_body(body) {
            Ok(value) => value,
            Err(err) => {
                warn!("Rejected POST /{} - kind={}: {}", name, err.kind(), err);
                return Err(err);
            }
        };
        info!("Received {} ({} bytes)", name, value.len());

        if let Err(err) = self.secrets.set(name, value) {
            error!(
                "Failed to store the {} - kind={} code={:?}: {}",
                name,
                err.kind(),
                err.code(),
                err
            );
            return Err(err);
        }

        if name == SecretName::ApiKey {
            self.notifications.signal();
        }
        Ok(())
    }

    /// Handle `POST /reboot`.
    pub fn reboot(&self, rebooter: &dyn Reboot) {
        info!("Rebooting the device...");
        rebooter.restart();
    }
}

/// Decode a secret from a request body, dropping one trailing line ending.
pub fn parse_body(body: &[u8]) -> Result<&str, ProvisionError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| ProvisionError::InvalidArgument("body is not valid UTF-8".to_string()))?;
    if text.contains('\0') {
        return Err(ProvisionError::InvalidArgument(
            "body contains a NUL byte".to_string(),
        ));
    }
    let text = text.strip_suffix('\n').unwrap_or(text);
    Ok(text.strip_suffix('\r').unwrap_or(text))
}
