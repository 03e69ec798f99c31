//! Config service listener lifecycle.
//!
//! The controller drives the service from a plain thread, so `start` and
//! `stop` are blocking and the server itself runs on a tokio runtime handed
//! in at construction.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::time::Duration;

use provision_core::{ConfigServiceControl, ProvisionError, ServiceDiscovery};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::routes::create_router;
use crate::AppState;

/// How long `stop` waits for in-flight requests to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    finished: mpsc::Receiver<()>,
}

/// HTTP config service with service discovery.
pub struct ConfigService {
    bind: SocketAddr,
    state: AppState,
    discovery: Box<dyn ServiceDiscovery>,
    runtime: Handle,
    running: Option<Running>,
}

impl ConfigService {
    pub fn new(
        bind: SocketAddr,
        state: AppState,
        discovery: Box<dyn ServiceDiscovery>,
        runtime: Handle,
    ) -> Self {
        Self {
            bind,
            state,
            discovery,
            runtime,
            running: None,
        }
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    fn listen(&mut self) -> Result<Running, ProvisionError> {
        let listener = std::net::TcpListener::bind(self.bind)
            .and_then(|listener| listener.set_nonblocking(true).map(|()| listener))
            .map_err(|err| listener_error("bind", &err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| listener_error("local_addr", &err))?;

        let listener = {
            let _guard = self.runtime.enter();
            tokio::net::TcpListener::from_std(listener)
                .map_err(|err| listener_error("register", &err))?
        };

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let (finished_tx, finished) = mpsc::channel();
        let app = create_router(self.state.clone());

        self.runtime.spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = result {
                error!(
                    "Config service stopped with an error - kind=ConfigurationFailure: {}",
                    err
                );
            }
            let _ = finished_tx.send(());
        });

        Ok(Running {
            local_addr,
            shutdown,
            finished,
        })
    }

    fn shutdown(running: Running) {
        let _ = running.shutdown.send(());
        if running.finished.recv_timeout(SHUTDOWN_GRACE).is_err() {
            warn!(
                "Config service on {} did not stop within {:?}",
                running.local_addr, SHUTDOWN_GRACE
            );
        }
    }
}

impl ConfigServiceControl for ConfigService {
    fn start(&mut self) -> Result<(), ProvisionError> {
        if let Some(running) = &self.running {
            debug!("Config service already running on {}", running.local_addr);
            return Ok(());
        }

        let running = self.listen()?;
        let port = running.local_addr.port();
        info!("Config service listening on {}", running.local_addr);

        if let Err(err) = self.discovery.advertise(port) {
            error!(
                "Failed to start service discovery - kind={} code={:?}: {}",
                err.kind(),
                err.code(),
                err
            );
            Self::shutdown(running);
            return Err(err);
        }

        self.running = Some(running);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ProvisionError> {
        let Some(running) = self.running.take() else {
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
        Self::shutdown(running);
        info!("Config service stopped");
        withdrawn
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigService")
            .field("bind", &self.bind)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

fn listener_error(operation: &str, err: &std::io::Error) -> ProvisionError {
    ProvisionError::ConfigurationFailure {
        message: format!("config service {} failed: {}", operation, err),
        code: err.raw_os_error(),
    }
}
