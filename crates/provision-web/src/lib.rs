//! # provision-web
//!
//! Config service for device provisioning, built on Axum.
//!
//! This crate provides:
//! - The HTTP surface for reading and writing the API key and endpoint
//! - The operator UI document
//! - A reboot endpoint
//! - Listener lifecycle with mDNS service discovery
//!
//! ## Usage
//!
//! ```rust,ignore
//! use provision_web::{ConfigService, ConfigState, MdnsDiscovery};
//!
//! let state = ConfigState::new(handlers, rebooter);
//! let discovery = Box::new(MdnsDiscovery::new(discovery));
//! let mut service = ConfigService::new(bind, state, discovery, handle);
//! service.start()?;
//! ```

pub mod discovery;
pub mod routes;
pub mod service;

// Re-exports
pub use discovery::MdnsDiscovery;
pub use provision_core::ServiceDiscovery;
pub use routes::create_router;
pub use service::ConfigService;

use std::sync::Arc;

use provision_core::{ConfigHandlers, Reboot};

/// Shared state for all route handlers.
pub struct ConfigState {
    pub handlers: ConfigHandlers,
    pub rebooter: Arc<dyn Reboot>,
}

impl ConfigState {
    pub fn new(handlers: ConfigHandlers, rebooter: Arc<dyn Reboot>) -> AppState {
        Arc::new(Self { handlers, rebooter })
    }
}

impl std::fmt::Debug for ConfigState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigState")
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Type alias for shared state in Axum handlers.
pub type AppState = Arc<ConfigState>;
