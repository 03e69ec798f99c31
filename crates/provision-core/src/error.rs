//! Error taxonomy shared by every provisioning component.

use thiserror::Error;

use crate::storage::StorageError;

/// Coarse error classification used in log lines and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    StorageFailure,
    TransportFailure,
    ConfigurationFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::StorageFailure => "StorageFailure",
            ErrorKind::TransportFailure => "TransportFailure",
            ErrorKind::ConfigurationFailure => "ConfigurationFailure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while provisioning the device.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Rejected input, e.g. an empty credential write.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No value exists for the named entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Durable layer I/O error.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    /// Pairing or network join error.
    #[error("transport failure: {message}")]
    TransportFailure { message: String, code: Option<i32> },

    /// HTTP listener or discovery service failed to start.
    #[error("configuration failure: {message}")]
    ConfigurationFailure { message: String, code: Option<i32> },
}

impl ProvisionError {
    pub fn transport(message: impl Into<String>) -> Self {
        ProvisionError::TransportFailure {
            message: message.into(),
            code: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ProvisionError::ConfigurationFailure {
            message: message.into(),
            code: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ProvisionError::NotFound(_) => ErrorKind::NotFound,
            ProvisionError::StorageFailure(_) => ErrorKind::StorageFailure,
            ProvisionError::TransportFailure { .. } => ErrorKind::TransportFailure,
            ProvisionError::ConfigurationFailure { .. } => ErrorKind::ConfigurationFailure,
        }
    }

    /// Low-level status code reported by the platform, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            ProvisionError::StorageFailure(err) => err.code,
            ProvisionError::TransportFailure { code, .. }
            | ProvisionError::ConfigurationFailure { code, .. } => *code,
            _ => None,
        }
    }

    /// HTTP status the config service answers with when a handler fails.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidArgument => 400,
            _ => 500,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_code() {
        let err = ProvisionError::from(StorageError::with_code("nvs_commit", 0x1102));
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert_eq!(err.code(), Some(0x1102));
        assert_eq!(err.http_status(), 500);

        let err = ProvisionError::InvalidArgument("api_key must not be empty".into());
        assert_eq!(err.kind().as_str(), "InvalidArgument");
        assert_eq!(err.code(), None);
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn test_not_found_is_distinguished() {
        assert!(ProvisionError::NotFound("api_key".into()).is_not_found());
        assert!(!ProvisionError::transport("link down").is_not_found());
    }
}
