//! Secret store for the application credential.
//!
//! Two secrets are kept: the API key and an optional API endpoint override.
//! Each has an in-memory cache in front of durable storage. A populated cache
//! is authoritative; writes reach the cache only after the durable write and
//! its commit have both succeeded.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, error};

use crate::error::ProvisionError;
use crate::storage::DurableStorage;

/// Endpoint used when no override has been stored.
pub const DEFAULT_API_URI: &str = "https://api.openai.com/v1/realtime";

/// Durable namespace holding the secrets.
pub const SECRETS_NAMESPACE: &str = "provision";

/// The secrets managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretName {
    ApiKey,
    ApiUri,
}

impl SecretName {
    /// Durable key for this secret.
    pub fn key(self) -> &'static str {
        match self {
            SecretName::ApiKey => "api_key",
            SecretName::ApiUri => "api_uri",
        }
    }
}

impl std::fmt::Display for SecretName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Credentials consumed by the outbound request glue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub api_key: String,
    pub api_uri: String,
}

impl RemoteCredentials {
    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

/// Cached, durably backed store of the two secrets.
pub struct SecretStore {
    storage: Box<dyn DurableStorage>,
    cache: RwLock<HashMap<SecretName, String>>,
    default_api_uri: String,
}

impl SecretStore {
    pub fn new(storage: Box<dyn DurableStorage>, default_api_uri: impl Into<String>) -> Self {
        Self {
            storage,
            cache: RwLock::new(HashMap::new()),
            default_api_uri: default_api_uri.into(),
        }
    }

    pub fn default_api_uri(&self) -> &str {
        &self.default_api_uri
    }

    /// True iff a non-empty value exists in the cache or in durable storage.
    ///
    /// The `api_uri` default does not count as present.
    pub fn has(&self, name: SecretName) -> Result<bool, ProvisionError> {
        if self.cached(name).is_some() {
            return Ok(true);
        }
        Ok(self.read_durable(name)?.is_some())
    }

    /// Current value of `name`.
    ///
    /// `api_key` yields `NotFound` when nothing is stored; `api_uri` falls
    /// back to the compiled default instead.
    pub fn get(&self, name: SecretName) -> Result<String, ProvisionError> {
        if let Some(value) = self.cached(name) {
            return Ok(value);
        }

        match self.read_durable(name)? {
            Some(value) => {
                self.cache_write().insert(name, value.clone());
                Ok(value)
            }
            None if name == SecretName::ApiUri => Ok(self.default_api_uri.clone()),
            None => Err(ProvisionError::NotFound(name.key().to_string())),
        }
    }

    /// Store `value` under `name`.
    ///
    /// The cache is updated only after the durable write and commit succeed;
    /// on failure the previous cached value is left untouched.
    pub fn set(&self, name: SecretName, value: &str) -> Result<(), ProvisionError> {
        if name == SecretName::ApiKey && value.is_empty() {
            return Err(ProvisionError::InvalidArgument(format!(
                "{} must not be empty",
                name
            )));
        }

        // Held across the durable write so concurrent writers to the same
        // store cannot interleave cache and storage updates.
        let mut cache = self.cache_write();

        let persisted = self
            .storage
            .write(name.key(), value)
            .and_then(|()| self.storage.commit());
        if let Err(err) = persisted {
            let err = ProvisionError::from(err);
            error!(
                "Failed to store {} - kind={} code={:?}: {}",
                name,
                err.kind(),
                err.code(),
                err
            );
            return Err(err);
        }

        cache.insert(name, value.to_string());
        debug!("Stored {} ({} bytes)", name, value.len());
        Ok(())
    }

    pub fn api_key(&self) -> Result<String, ProvisionError> {
        self.get(SecretName::ApiKey)
    }

    pub fn api_uri(&self) -> Result<String, ProvisionError> {
        self.get(SecretName::ApiUri)
    }

    /// API key and endpoint, read at call time.
    pub fn remote_credentials(&self) -> Result<RemoteCredentials, ProvisionError> {
        Ok(RemoteCredentials {
            api_key: self.api_key()?,
            api_uri: self.api_uri()?,
        })
    }

    fn cached(&self, name: SecretName) -> Option<String> {
        self.cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&name)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn cache_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SecretName, String>> {
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Zero-length durable entries are treated as absent.
    fn read_durable(&self, name: SecretName) -> Result<Option<String>, ProvisionError> {
        match self.storage.read(name.key()) {
            Ok(value) => Ok(value.filter(|v| !v.is_empty())),
            Err(err) => {
                let err = ProvisionError::from(err);
                error!(
                    "Failed to read {} - kind={} code={:?}: {}",
                    name,
                    err.kind(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("default_api_uri", &self.default_api_uri)
            .finish_non_exhaustive()
    }
}
