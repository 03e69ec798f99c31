//! Config service on the ESP-IDF HTTP server, advertised over mDNS.
//!
//! Routes mirror the host build: `/`, `/index.html`, `/api_key`,
//! `/api_uri` and `/reboot`. Anything else, including a known path with
//! the wrong method, answers 404.

use std::sync::Arc;

use embedded_svc::io::{Read, Write};
use esp_idf_svc::handle::RawHandle;
use esp_idf_svc::http::server::{Configuration, EspHttpConnection, EspHttpServer, Request};
use esp_idf_svc::http::Method;
use esp_idf_svc::mdns::EspMdns;
use esp_idf_svc::sys::{self, esp};
use log::{debug, error, info, warn};
use provision_core::{
    ConfigHandlers, ConfigServiceControl, DiscoveryConfig, ProvisionError, Reboot, SecretName,
    ServiceDiscovery, INDEX_HTML,
};

use crate::configuration_error;

/// Largest accepted request body.
const MAX_BODY_LEN: usize = 1024;

/// mDNS responder for the config service.
pub struct MdnsDiscovery {
    config: DiscoveryConfig,
    mdns: Option<EspMdns>,
}

impl MdnsDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config, mdns: None }
    }
}

impl ServiceDiscovery for MdnsDiscovery {
    fn advertise(&mut self, port: u16) -> Result<(), ProvisionError> {
        if self.mdns.is_some() {
            return Ok(());
        }
        let mut mdns = EspMdns::take().map_err(|err| configuration_error("mdns_init", err))?;
        mdns.set_hostname(&self.config.hostname)
            .map_err(|err| configuration_error("mdns_hostname_set", err))?;
        mdns.set_instance_name(&self.config.instance_name)
            .map_err(|err| configuration_error("mdns_instance_name_set", err))?;
        mdns.add_service(
            None,
            &self.config.service_type,
            &self.config.protocol,
            port,
            &[],
        )
        .map_err(|err| configuration_error("mdns_service_add", err))?;

        info!(
            "mDNS: {}.local advertising {}.{} on port {}",
            self.config.hostname, self.config.service_type, self.config.protocol, port
        );
        self.mdns = Some(mdns);
        Ok(())
    }

    fn withdraw(&mut self) -> Result<(), ProvisionError> {
        let Some(mut mdns) = self.mdns.take() else {
            return Ok(());
        };
        let removed = mdns
            .remove_service(&self.config.service_type, &self.config.protocol)
            .map_err(|err| configuration_error("mdns_service_remove", err));
        // Dropping the responder frees it.
        drop(mdns);
        removed
    }
}

/// Config service control for the device.
pub struct EspConfigService {
    port: u16,
    handlers: ConfigHandlers,
    rebooter: Arc<dyn Reboot>,
    discovery: Box<dyn ServiceDiscovery>,
    server: Option<EspHttpServer<'static>>,
}

impl EspConfigService {
    pub fn new(
        port: u16,
        handlers: ConfigHandlers,
        rebooter: Arc<dyn Reboot>,
        discovery: Box<dyn ServiceDiscovery>,
    ) -> Self {
        Self {
            port,
            handlers,
            rebooter,
            discovery,
            server: None,
        }
    }

    fn listen(&self) -> Result<EspHttpServer<'static>, ProvisionError> {
        let config = Configuration {
            http_port: self.port,
            ..Default::default()
        };
        let mut server =
            EspHttpServer::new(&config).map_err(|err| configuration_error("httpd_start", err))?;
        self.register(&mut server)
            .map_err(|err| configuration_error("httpd_register_uri_handler", err))?;
        esp!(unsafe {
            sys::httpd_register_err_handler(
                server.handle(),
                sys::httpd_err_code_t_HTTPD_405_METHOD_NOT_ALLOWED,
                Some(method_not_allowed),
            )
        })
        .map_err(|err| configuration_error("httpd_register_err_handler", err))?;
        Ok(server)
    }

    fn register(
        &self,
        server: &mut EspHttpServer<'static>,
    ) -> Result<(), esp_idf_svc::sys::EspError> {
        for uri in ["/", "/index.html"] {
            server.fn_handler::<anyhow::Error, _>(uri, Method::Get, |req| {
                req.into_response(200, Some("OK"), &[("Content-Type", "text/html")])?
                    .write_all(INDEX_HTML.as_bytes())?;
                Ok(())
            })?;
        }

        for name in [SecretName::ApiKey, SecretName::ApiUri] {
            let uri = format!("/{}", name);

            let handlers = self.handlers.clone();
            server.fn_handler::<anyhow::Error, _>(&uri, Method::Get, move |req| {
                match handlers.read_secret(name) {
                    Ok(value) => {
                        req.into_response(200, Some("OK"), &[("Content-Type", "text/plain")])?
                            .write_all(value.as_bytes())?;
                    }
                    Err(err) => respond_error(req, &err)?,
                }
                Ok(())
            })?;

            let handlers = self.handlers.clone();
            server.fn_handler::<anyhow::Error, _>(&uri, Method::Post, move |mut req| {
                let body = match read_body(&mut req) {
                    Ok(body) => body,
                    Err(err) => return respond_error(req, &err),
                };
                match handlers.write_secret(name, &body) {
                    Ok(()) => {
                        req.into_ok_response()?;
                    }
                    Err(err) => respond_error(req, &err)?,
                }
                Ok(())
            })?;
        }

        let handlers = self.handlers.clone();
        let rebooter = self.rebooter.clone();
        server.fn_handler::<anyhow::Error, _>("/reboot", Method::Post, move |_req| {
            reboot(&handlers, rebooter.as_ref());
            Ok(())
        })?;

        Ok(())
    }
}

impl ConfigServiceControl for EspConfigService {
    fn start(&mut self) -> Result<(), ProvisionError> {
        if self.server.is_some() {
            debug!("Config service already running");
            return Ok(());
        }

        let server = self.listen()?;
        info!("Config service listening on port {}", self.port);

        if let Err(err) = self.discovery.advertise(self.port) {
            error!(
                "Failed to start service discovery - kind={} code={:?}: {}",
                err.kind(),
                err.code(),
                err
            );
            drop(server);
            return Err(err);
        }

        self.server = Some(server);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProvisionError> {
        let Some(server) = self.server.take() else {
            debug!("Config service already stopped");
            return Ok(());
        };

        let withdrawn = self.discovery.withdraw();
        if let Err(err) = &withdrawn {
            warn!(
                "Failed to withdraw service discovery - kind={} code={:?}: {}",
                err.kind(),
                err.code(),
                err
            );
        }
        drop(server);
        info!("Config service stopped");
        withdrawn
    }

    fn is_running(&self) -> bool {
        self.server.is_some()
    }
}

/// `POST /reboot`. The restart does not return, so no response is sent.
fn reboot(handlers: &ConfigHandlers, rebooter: &dyn Reboot) {
    handlers.reboot(rebooter);
}

fn read_body(req: &mut Request<&mut EspHttpConnection<'_>>) -> Result<Vec<u8>, ProvisionError> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_BODY_LEN {
        return Err(ProvisionError::InvalidArgument(format!(
            "body of {} bytes exceeds {} bytes",
            len, MAX_BODY_LEN
        )));
    }

    let mut body = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let read = req
            .read(&mut body[filled..])
            .map_err(|err| ProvisionError::transport(format!("httpd_req_recv failed: {:?}", err)))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    body.truncate(filled);
    Ok(body)
}

fn respond_error(
    req: Request<&mut EspHttpConnection<'_>>,
    err: &ProvisionError,
) -> anyhow::Result<()> {
    req.into_status_response(err.http_status())?
        .write_all(err.to_string().as_bytes())?;
    Ok(())
}

/// Status sent in place of the server's own error for `error`.
fn error_status(error: sys::httpd_err_code_t) -> sys::httpd_err_code_t {
    if error == sys::httpd_err_code_t_HTTPD_405_METHOD_NOT_ALLOWED {
        sys::httpd_err_code_t_HTTPD_404_NOT_FOUND
    } else {
        error
    }
}

unsafe extern "C" fn method_not_allowed(
    req: *mut sys::httpd_req_t,
    error: sys::httpd_err_code_t,
) -> sys::esp_err_t {
    sys::httpd_resp_send_err(req, error_status(error), std::ptr::null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provision_core::{MemoryStorage, NotificationChannel, SecretStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRestart(AtomicUsize);

    impl Reboot for CountingRestart {
        fn restart(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_reboot_restarts_without_touching_secrets() {
        let secrets = Arc::new(SecretStore::new(
            Box::new(MemoryStorage::new()),
            "https://api.example/realtime",
        ));
        let notifications = Arc::new(NotificationChannel::new());
        let handlers = ConfigHandlers::new(secrets, notifications.clone());
        let restart = CountingRestart::default();

        reboot(&handlers, &restart);

        assert_eq!(restart.0.load(Ordering::SeqCst), 1);
        assert!(!notifications.is_signalled());
    }

    #[test]
    fn test_wrong_method_answers_not_found() {
        assert_eq!(
            error_status(sys::httpd_err_code_t_HTTPD_405_METHOD_NOT_ALLOWED),
            sys::httpd_err_code_t_HTTPD_404_NOT_FOUND
        );
        assert_eq!(
            error_status(sys::httpd_err_code_t_HTTPD_400_BAD_REQUEST),
            sys::httpd_err_code_t_HTTPD_400_BAD_REQUEST
        );
    }
}
