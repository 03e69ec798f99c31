//! Bootstrap controller.
//!
//! Runs the provisioning state machine on the calling thread and executes
//! its effects against the platform collaborators. The two indefinite waits
//! (pairing outcome and credential notification) block this thread only;
//! the config service keeps answering requests on its own runtime.

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::config::ProvisioningConfig;
use crate::error::ProvisionError;
use crate::machine::{Effect, Event, Machine, ProvisioningState};
use crate::network::{JoinDriver, NetworkCredentials, NetworkEvent, NetworkProfileStore};
use crate::notify::NotificationChannel;
use crate::pairing::{PairingOutcome, PairingTransport, PairingVerifier, PayloadRenderer};
use crate::reset::ResetCheck;
use crate::secrets::{SecretName, SecretStore};

/// Lifecycle of the config service as seen by the controller.
pub trait ConfigServiceControl: Send {
    /// Start serving and advertising. Calling it while running is a no-op.
    fn start(&mut self) -> Result<(), ProvisionError>;

    /// Withdraw the advertisement, then stop serving. Idempotent.
    fn stop(&mut self) -> Result<(), ProvisionError>;

    fn is_running(&self) -> bool;
}

/// Platform services the controller drives.
pub struct Collaborators {
    pub pairing: Box<dyn PairingTransport>,
    pub join: Box<dyn JoinDriver>,
    /// Link events emitted by the join driver.
    pub network_events: Receiver<NetworkEvent>,
    pub reset: Box<dyn ResetCheck>,
    pub config_service: Box<dyn ConfigServiceControl>,
    pub renderer: Box<dyn PayloadRenderer>,
}

/// Handed back once the device is operational.
pub struct Provisioned {
    /// Config service handle; running unless it was disabled after
    /// provisioning.
    pub config_service: Box<dyn ConfigServiceControl>,
    /// Join driver owning the link; dropping it may take the link down.
    pub join: Box<dyn JoinDriver>,
    /// The join spent its reconnect budget before an address arrived.
    pub degraded: bool,
}

impl std::fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioned")
            .field("config_service_running", &self.config_service.is_running())
            .field("degraded", &self.degraded)
            .finish()
    }
}

/// Drives a device from boot to `Operational`.
pub struct BootstrapController {
    config: ProvisioningConfig,
    machine: Machine,
    verifier: PairingVerifier,
    secrets: Arc<SecretStore>,
    profile: NetworkProfileStore,
    notifications: Arc<NotificationChannel>,
    collaborators: Collaborators,
    credentials: Option<NetworkCredentials>,
    /// Link events synthesized from failed join requests.
    pending: VecDeque<NetworkEvent>,
    pairing_attempts: u32,
}

impl BootstrapController {
    pub fn new(
        config: ProvisioningConfig,
        secrets: Arc<SecretStore>,
        profile: NetworkProfileStore,
        notifications: Arc<NotificationChannel>,
        collaborators: Collaborators,
    ) -> Self {
        let machine = Machine::new(
            !config.disable_configurator_after_provisioned,
            config.max_join_retries,
        );
        Self {
            config,
            machine,
            verifier: PairingVerifier::builtin(),
            secrets,
            profile,
            notifications,
            collaborators,
            credentials: None,
            pending: VecDeque::new(),
            pairing_attempts: 0,
        }
    }

    /// Use `verifier` instead of the material built into the firmware.
    pub fn with_verifier(mut self, verifier: PairingVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn state(&self) -> ProvisioningState {
        self.machine.state()
    }

    /// Run until `Operational`.
    ///
    /// Blocks indefinitely while waiting for pairing or for the operator to
    /// store an API key.
    pub fn run(mut self) -> Result<Provisioned, ProvisionError> {
        let reset_requested = self.collaborators.reset.check();
        let paired = self.load_profile();
        info!(
            "Starting provisioning (paired: {}, reset requested: {})",
            paired, reset_requested
        );

        let mut queue: VecDeque<Effect> = self
            .apply(Event::Boot {
                reset_requested,
                paired,
            })?
            .into();

        while let Some(effect) = queue.pop_front() {
            debug!("Executing {:?}", effect);
            if effect == Effect::Release {
                info!("Device provisioned, handing over control");
                return Ok(Provisioned {
                    degraded: self.machine.is_degraded(),
                    config_service: self.collaborators.config_service,
                    join: self.collaborators.join,
                });
            }
            if let Some(event) = self.execute(effect)? {
                queue.extend(self.apply(event)?);
            }
        }

        error!(
            "Provisioning stalled in state {:?} - kind=ConfigurationFailure",
            self.machine.state()
        );
        Err(ProvisionError::configuration(
            "provisioning ended without reaching the operational state",
        ))
    }

    fn apply(&mut self, event: Event) -> Result<Vec<Effect>, ProvisionError> {
        self.machine.handle(event).map_err(|err| {
            error!("Provisioning defect - kind=ConfigurationFailure: {}", err);
            ProvisionError::configuration(err.to_string())
        })
    }

    /// Whether a usable network profile exists. A marker without stored
    /// credentials counts as unpaired.
    fn load_profile(&mut self) -> bool {
        let paired = match self.profile.is_paired() {
            Ok(paired) => paired,
            Err(err) => {
                error!(
                    "Failed to read the pairing marker - kind={} code={:?}: {}",
                    err.kind(),
                    err.code(),
                    err
                );
                return false;
            }
        };
        if !paired {
            return false;
        }
        match self.profile.load() {
            Ok(Some(credentials)) => {
                self.credentials = Some(credentials);
                true
            }
            Ok(None) => {
                warn!("Pairing marker set but no network stored, pairing again");
                false
            }
            Err(err) => {
                error!(
                    "Failed to read the network profile - kind={} code={:?}: {}",
                    err.kind(),
                    err.code(),
                    err
                );
                false
            }
        }
    }

    fn execute(&mut self, effect: Effect) -> Result<Option<Event>, ProvisionError> {
        match effect {
            Effect::BeginPairing => Ok(Some(self.pair())),
            Effect::PersistNetwork(credentials) => {
                if let Err(err) = self.profile.save(&credentials) {
                    error!(
                        "Failed to store the network profile - kind={} code={:?}: {}",
                        err.kind(),
                        err.code(),
                        err
                    );
                }
                self.credentials = Some(credentials);
                Ok(None)
            }
            Effect::Join => {
                self.discard_stale_events();
                let credentials = self
                    .credentials
                    .as_ref()
                    .ok_or_else(|| ProvisionError::NotFound("network credentials".to_string()))?;
                info!("Joining network '{}'", credentials.ssid);
                if let Err(err) = self.collaborators.join.connect(credentials) {
                    self.join_failed("connect", &err);
                }
                Ok(None)
            }
            Effect::Reconnect { attempt } => {
                debug!("Reconnect attempt {}", attempt);
                if let Err(err) = self.collaborators.join.reconnect() {
                    self.join_failed("reconnect", &err);
                }
                Ok(None)
            }
            Effect::ReportDegraded { attempts } => {
                warn!(
                    "ConnectionDegraded: failed to connect after {} attempts, waiting for an address - kind=TransportFailure",
                    attempts
                );
                Ok(None)
            }
            Effect::AwaitNetwork => self.next_network_event().map(Some),
            Effect::CheckCredential => {
                let present = match self.secrets.has(SecretName::ApiKey) {
                    Ok(present) => present,
                    Err(err) => {
                        error!(
                            "Failed to query the API key - kind={} code={:?}: {}",
                            err.kind(),
                            err.code(),
                            err
                        );
                        false
                    }
                };
                info!(
                    "API key {}",
                    if present { "present" } else { "not configured" }
                );
                Ok(Some(Event::CredentialChecked { present }))
            }
            Effect::StartConfigService => {
                self.collaborators.config_service.start().map_err(|err| {
                    error!(
                        "Failed to start the config service - kind={} code={:?}: {}",
                        err.kind(),
                        err.code(),
                        err
                    );
                    err
                })?;
                Ok(None)
            }
            Effect::StopConfigService => {
                if let Err(err) = self.collaborators.config_service.stop() {
                    warn!(
                        "Failed to stop the config service - kind={} code={:?}: {}",
                        err.kind(),
                        err.code(),
                        err
                    );
                }
                Ok(None)
            }
            Effect::AwaitCredential => {
                info!("Waiting for the API key to be configured...");
                self.notifications.wait();
                let key = self.secrets.api_key().map_err(|err| {
                    error!(
                        "API key missing after notification - kind={} code={:?}: {}",
                        err.kind(),
                        err.code(),
                        err
                    );
                    err
                })?;
                info!("API key configured ({} bytes)", key.len());
                Ok(Some(Event::CredentialSignalled))
            }
            Effect::Release => Ok(None),
        }
    }

    /// One pairing attempt; always yields an outcome event.
    fn pair(&mut self) -> Event {
        self.pairing_attempts += 1;
        let config = &self.config;
        let session = self.verifier.session(
            &config.service_name,
            config.service_passphrase.as_deref(),
            &config.pairing_username,
            config.pairing_password.as_deref(),
        );
        let payload = self.verifier.describe_payload(
            &config.service_name,
            &config.pairing_username,
            config.pairing_password.as_deref(),
        );

        info!(
            "Starting pairing service '{}' (attempt {})",
            session.service_name, self.pairing_attempts
        );
        if let Err(err) = self.collaborators.pairing.start(&session) {
            error!(
                "Failed to start the pairing service - kind={} code={:?}: {}",
                err.kind(),
                err.code(),
                err
            );
            thread::sleep(self.config.pairing_retry_delay());
            return Event::PairingFailed {
                reason: err.to_string(),
            };
        }
        self.collaborators.renderer.render(&payload);

        match self.collaborators.pairing.wait() {
            PairingOutcome::Succeeded(credentials) => {
                info!("Received network credentials for '{}'", credentials.ssid);
                Event::PairingSucceeded(credentials)
            }
            PairingOutcome::Failed { reason } => Event::PairingFailed { reason },
        }
    }

    /// A failed join request is treated like a link-layer disconnect so
    /// that it counts against the reconnect budget.
    fn join_failed(&mut self, operation: &str, err: &ProvisionError) {
        error!(
            "Network {} failed - kind={} code={:?}: {}",
            operation,
            err.kind(),
            err.code(),
            err
        );
        self.pending
            .push_back(NetworkEvent::Disconnected { reason: None });
    }

    /// Drop link events raised before this join request, e.g. by the
    /// pairing transport driving the radio.
    fn discard_stale_events(&mut self) {
        let stale = self.collaborators.network_events.try_iter().count() + self.pending.len();
        self.pending.clear();
        if stale > 0 {
            debug!("Discarded {} link events queued before the join", stale);
        }
    }

    fn next_network_event(&mut self) -> Result<Event, ProvisionError> {
        let event = match self.pending.pop_front() {
            Some(event) => event,
            None => self.collaborators.network_events.recv().map_err(|_| {
                error!("Network event source closed - kind=TransportFailure");
                ProvisionError::transport("network event source closed")
            })?,
        };
        Ok(match event {
            NetworkEvent::Disconnected { reason } => Event::Disconnected { reason },
            NetworkEvent::AddressAssigned { ip } => Event::AddressAssigned { ip },
        })
    }
}

impl std::fmt::Debug for BootstrapController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapController")
            .field("state", &self.machine.state())
            .field("pairing_attempts", &self.pairing_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pairing::{PairingPayload, PairingSession};
    use crate::storage::MemoryStorage;
    use pretty_assertions::assert_eq;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    fn note(journal: &Journal, entry: impl Into<String>) {
        journal.lock().unwrap().push(entry.into());
    }

    fn address() -> NetworkEvent {
        NetworkEvent::AddressAssigned {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)),
        }
    }

    struct FakePairing {
        journal: Journal,
        start_failures: usize,
        outcomes: VecDeque<PairingOutcome>,
    }

    impl PairingTransport for FakePairing {
        fn start(&mut self, session: &PairingSession) -> Result<(), ProvisionError> {
            note(&self.journal, format!("pairing start {}", session.service_name));
            if self.start_failures > 0 {
                self.start_failures -= 1;
                return Err(ProvisionError::TransportFailure {
                    message: "wifi_prov_mgr_start_provisioning".to_string(),
                    code: Some(0x103),
                });
            }
            Ok(())
        }

        fn wait(&mut self) -> PairingOutcome {
            self.outcomes
                .pop_front()
                .expect("pairing retried more often than scripted")
        }
    }

    struct FakeJoin {
        journal: Journal,
        events: Option<Sender<NetworkEvent>>,
        fail_connect: bool,
        on_connect: Vec<NetworkEvent>,
        on_reconnect: Vec<NetworkEvent>,
        hang_up: bool,
    }

    impl FakeJoin {
        fn emit(&mut self, events: Vec<NetworkEvent>) {
            if self.hang_up {
                self.events = None;
                return;
            }
            if let Some(sender) = &self.events {
                for event in events {
                    sender.send(event).unwrap();
                }
            }
        }
    }

    impl JoinDriver for FakeJoin {
        fn connect(&mut self, credentials: &NetworkCredentials) -> Result<(), ProvisionError> {
            note(&self.journal, format!("connect {}", credentials.ssid));
            if self.fail_connect {
                return Err(ProvisionError::TransportFailure {
                    message: "esp_wifi_connect".to_string(),
                    code: Some(0x3007),
                });
            }
            let events = std::mem::take(&mut self.on_connect);
            self.emit(events);
            Ok(())
        }

        fn reconnect(&mut self) -> Result<(), ProvisionError> {
            note(&self.journal, "reconnect");
            let events = std::mem::take(&mut self.on_reconnect);
            self.emit(events);
            Ok(())
        }
    }

    struct FakeService {
        journal: Journal,
        running: bool,
        fail_start: bool,
        operator: Option<Box<dyn FnMut() + Send>>,
    }

    impl ConfigServiceControl for FakeService {
        fn start(&mut self) -> Result<(), ProvisionError> {
            if self.fail_start {
                return Err(ProvisionError::ConfigurationFailure {
                    message: "httpd_start".to_string(),
                    code: Some(0x103),
                });
            }
            if !self.running {
                note(&self.journal, "service start");
                self.running = true;
                if let Some(operator) = self.operator.as_mut() {
                    operator();
                }
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), ProvisionError> {
            if self.running {
                note(&self.journal, "service stop");
                self.running = false;
            }
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    struct FakeRenderer(Journal);

    impl PayloadRenderer for FakeRenderer {
        fn render(&self, payload: &PairingPayload) {
            note(&self.0, format!("payload {}", payload.to_text()));
        }
    }

    struct Rig {
        config: ProvisioningConfig,
        journal: Journal,
        secrets: Arc<SecretStore>,
        network: Arc<MemoryStorage>,
        notifications: Arc<NotificationChannel>,
        reset: bool,
        pairing: Vec<PairingOutcome>,
        pairing_start_failures: usize,
        fail_connect: bool,
        on_connect: Vec<NetworkEvent>,
        on_reconnect: Vec<NetworkEvent>,
        hang_up: bool,
        /// Link events already queued when the controller starts.
        queued: Vec<NetworkEvent>,
        fail_service_start: bool,
        operator: Option<Box<dyn FnMut() + Send>>,
    }

    impl Rig {
        fn new() -> Self {
            let config = ProvisioningConfig {
                pairing_retry_delay_ms: 1,
                ..ProvisioningConfig::default()
            };
            Self {
                config,
                journal: Journal::default(),
                secrets: Arc::new(SecretStore::new(
                    Box::new(MemoryStorage::new()),
                    "https://api.example/realtime",
                )),
                network: Arc::new(MemoryStorage::new()),
                notifications: Arc::new(NotificationChannel::new()),
                reset: false,
                pairing: Vec::new(),
                pairing_start_failures: 0,
                fail_connect: false,
                on_connect: vec![address()],
                on_reconnect: Vec::new(),
                hang_up: false,
                queued: Vec::new(),
                fail_service_start: false,
                operator: None,
            }
        }

        fn paired(self) -> Self {
            NetworkProfileStore::new(Box::new(self.network.clone()))
                .save(&NetworkCredentials::new("HomeNet", "hunter22"))
                .unwrap();
            self
        }

        fn with_api_key(self, key: &str) -> Self {
            self.secrets.set(SecretName::ApiKey, key).unwrap();
            self
        }

        /// The operator posts `key` as soon as the config service is up.
        fn operator_posts(mut self, key: &str) -> Self {
            let secrets = self.secrets.clone();
            let notifications = self.notifications.clone();
            let key = key.to_string();
            self.operator = Some(Box::new(move || {
                secrets.set(SecretName::ApiKey, &key).unwrap();
                notifications.signal();
            }));
            self
        }

        fn run(self) -> (Result<Provisioned, ProvisionError>, Vec<String>) {
            let (sender, receiver) = mpsc::channel();
            for event in self.queued {
                sender.send(event).unwrap();
            }
            let collaborators = Collaborators {
                pairing: Box::new(FakePairing {
                    journal: self.journal.clone(),
                    start_failures: self.pairing_start_failures,
                    outcomes: self.pairing.into(),
                }),
                join: Box::new(FakeJoin {
                    journal: self.journal.clone(),
                    events: Some(sender),
                    fail_connect: self.fail_connect,
                    on_connect: self.on_connect,
                    on_reconnect: self.on_reconnect,
                    hang_up: self.hang_up,
                }),
                network_events: receiver,
                reset: Box::new(self.reset),
                config_service: Box::new(FakeService {
                    journal: self.journal.clone(),
                    running: false,
                    fail_start: self.fail_service_start,
                    operator: self.operator,
                }),
                renderer: Box::new(FakeRenderer(self.journal.clone())),
            };
            let controller = BootstrapController::new(
                self.config,
                self.secrets,
                NetworkProfileStore::new(Box::new(self.network)),
                self.notifications,
                collaborators,
            );
            let result = controller.run();
            let journal = self.journal.lock().unwrap().clone();
            (result, journal)
        }
    }

    fn succeeded() -> PairingOutcome {
        PairingOutcome::Succeeded(NetworkCredentials::new("HomeNet", "hunter22"))
    }

    #[test]
    fn test_fresh_device_pairs_joins_and_waits_for_key() {
        let mut rig = Rig::new().operator_posts("sk-test123");
        rig.pairing = vec![succeeded()];
        let network = rig.network.clone();
        let secrets = rig.secrets.clone();

        let (result, journal) = rig.run();
        let provisioned = result.unwrap();

        assert_eq!(
            journal,
            vec![
                "pairing start PROV_RT_WIFI".to_string(),
                r#"payload {"ver":"v1","name":"PROV_RT_WIFI","username":"wifiprov","pop":"abcd1234","transport":"softap"}"#.to_string(),
                "connect HomeNet".to_string(),
                "service start".to_string(),
            ]
        );
        assert!(provisioned.config_service.is_running());
        assert!(!provisioned.degraded);
        assert_eq!(secrets.api_key().unwrap(), "sk-test123");

        let profile = NetworkProfileStore::new(Box::new(network));
        assert!(profile.is_paired().unwrap());
        assert_eq!(
            profile.load().unwrap(),
            Some(NetworkCredentials::new("HomeNet", "hunter22"))
        );
    }

    #[test]
    fn test_provisioned_device_goes_straight_to_operational() {
        let (result, journal) = Rig::new().paired().with_api_key("sk-live").run();

        let provisioned = result.unwrap();
        assert_eq!(
            journal,
            vec!["connect HomeNet".to_string(), "service start".to_string()]
        );
        assert!(provisioned.config_service.is_running());
    }

    #[test]
    fn test_configurator_suppressed_after_provisioning() {
        let mut rig = Rig::new().paired().with_api_key("sk-live");
        rig.config.disable_configurator_after_provisioned = true;

        let (result, journal) = rig.run();
        assert!(!result.unwrap().config_service.is_running());
        assert_eq!(journal, vec!["connect HomeNet".to_string()]);
    }

    #[test]
    fn test_configurator_stopped_once_key_arrives() {
        let mut rig = Rig::new().paired().operator_posts("sk-test123");
        rig.config.disable_configurator_after_provisioned = true;

        let (result, journal) = rig.run();
        assert!(!result.unwrap().config_service.is_running());
        assert_eq!(
            journal,
            vec![
                "connect HomeNet".to_string(),
                "service start".to_string(),
                "service stop".to_string(),
            ]
        );
    }

    #[test]
    fn test_reset_reopens_config_service_for_existing_key() {
        let mut rig = Rig::new()
            .paired()
            .with_api_key("sk-old")
            .operator_posts("sk-new");
        rig.reset = true;
        rig.pairing = vec![succeeded()];
        let secrets = rig.secrets.clone();

        let (result, journal) = rig.run();
        result.unwrap();

        assert!(journal.contains(&"pairing start PROV_RT_WIFI".to_string()));
        assert!(journal.contains(&"service start".to_string()));
        assert_eq!(secrets.api_key().unwrap(), "sk-new");
    }

    #[test]
    fn test_pairing_retries_until_success() {
        let mut rig = Rig::new().with_api_key("sk-live");
        rig.pairing_start_failures = 1;
        rig.pairing = vec![
            PairingOutcome::Failed {
                reason: "authentication error".to_string(),
            },
            succeeded(),
        ];

        let (result, journal) = rig.run();
        result.unwrap();

        let starts = journal
            .iter()
            .filter(|entry| entry.starts_with("pairing start"))
            .count();
        let payloads = journal
            .iter()
            .filter(|entry| entry.starts_with("payload"))
            .count();
        assert_eq!(starts, 3);
        assert_eq!(payloads, 2);
    }

    #[test]
    fn test_payload_omits_credentials_without_password() {
        let mut rig = Rig::new().with_api_key("sk-live");
        rig.config.pairing_password = None;
        rig.pairing = vec![succeeded()];

        let (_, journal) = rig.run();
        assert!(journal.contains(
            &r#"payload {"ver":"v1","name":"PROV_RT_WIFI","transport":"softap"}"#.to_string()
        ));
    }

    #[test]
    fn test_reconnects_are_bounded_and_degradation_reported() {
        let mut rig = Rig::new().paired().with_api_key("sk-live");
        let mut events = vec![NetworkEvent::Disconnected { reason: Some(201) }; 7];
        events.push(address());
        rig.on_connect = events;

        let (result, journal) = rig.run();
        let provisioned = result.unwrap();

        let reconnects = journal.iter().filter(|entry| *entry == "reconnect").count();
        assert_eq!(reconnects, 5);
        assert!(provisioned.degraded);
    }

    #[test]
    fn test_link_events_queued_before_join_are_ignored() {
        let mut rig = Rig::new().paired().with_api_key("sk-live");
        rig.queued = vec![NetworkEvent::Disconnected { reason: Some(8) }; 6];

        let (result, journal) = rig.run();
        let provisioned = result.unwrap();

        assert_eq!(
            journal,
            vec!["connect HomeNet".to_string(), "service start".to_string()]
        );
        assert!(!provisioned.degraded);
    }

    #[test]
    fn test_stale_address_does_not_complete_pairing_join() {
        let mut rig = Rig::new().operator_posts("sk-live");
        rig.pairing = vec![succeeded()];
        rig.queued = vec![address()];
        rig.on_connect = vec![NetworkEvent::Disconnected { reason: None }];
        rig.on_reconnect = vec![address()];

        let (result, journal) = rig.run();
        result.unwrap();
        let connect = journal.iter().position(|entry| entry == "connect HomeNet");
        let reconnect = journal.iter().position(|entry| entry == "reconnect");
        assert!(connect.is_some());
        assert!(reconnect > connect);
    }

    #[test]
    fn test_failed_join_request_counts_as_disconnect() {
        let mut rig = Rig::new().paired().with_api_key("sk-live");
        rig.fail_connect = true;
        rig.on_connect = Vec::new();
        rig.on_reconnect = vec![address()];

        let (result, journal) = rig.run();
        result.unwrap();
        assert_eq!(
            journal,
            vec![
                "connect HomeNet".to_string(),
                "reconnect".to_string(),
                "service start".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_key_after_signal_is_a_defect() {
        let mut rig = Rig::new().paired();
        let notifications = rig.notifications.clone();
        rig.operator = Some(Box::new(move || notifications.signal()));

        let (result, _) = rig.run();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_config_service_start_failure_is_escalated() {
        let mut rig = Rig::new().paired();
        rig.fail_service_start = true;

        let (result, _) = rig.run();
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationFailure);
        assert_eq!(err.code(), Some(0x103));
    }

    #[test]
    fn test_closed_event_source_fails_join() {
        let mut rig = Rig::new().paired();
        rig.hang_up = true;

        let (result, _) = rig.run();
        assert_eq!(result.unwrap_err().kind(), ErrorKind::TransportFailure);
    }
}
