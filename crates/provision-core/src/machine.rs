//! Provisioning state machine.
//!
//! The machine is a pure function from (state, event) to (state, effects).
//! It performs no I/O: the bootstrap controller executes the effects and
//! feeds their outcome back as events, so the transition logic is testable
//! without a network stack.
//!
//! ```text
//! Unprovisioned ──Boot──▶ AwaitingPairing ──PairingSucceeded──▶ JoiningNetwork
//!       │                   ▲     │ PairingFailed                  │ AddressAssigned
//!       │ paired, no reset  └─────┘                                 ▼
//!       └──────────────────────────────────────────────────▶ NetworkReady
//!                                                                   │ CredentialChecked
//!                          Operational ◀──CredentialSignalled── AwaitingCredential
//! ```

use std::net::IpAddr;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::network::{NetworkCredentials, RetryCounter, DEFAULT_MAX_JOIN_RETRIES};

/// Provisioning progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisioningState {
    Unprovisioned,
    AwaitingPairing,
    JoiningNetwork,
    NetworkReady,
    AwaitingCredential,
    Operational,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Boot-time inputs: reset signal and pairing marker.
    Boot { reset_requested: bool, paired: bool },
    /// The pairing transport delivered network credentials.
    PairingSucceeded(NetworkCredentials),
    /// The pairing attempt ended without credentials.
    PairingFailed { reason: String },
    /// The link dropped or a join request failed.
    Disconnected { reason: Option<u16> },
    /// The interface obtained an address.
    AddressAssigned { ip: IpAddr },
    /// Result of querying the secret store for the API key.
    CredentialChecked { present: bool },
    /// The config service stored an API key and signalled.
    CredentialSignalled,
    /// Forget progress and start over.
    ForceReset,
}

/// Work the controller must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a pairing session, emit the payload, start the transport and
    /// wait for its outcome.
    BeginPairing,
    /// Persist the pairing marker and received credentials.
    PersistNetwork(NetworkCredentials),
    /// Issue a join request with the stored credentials.
    Join,
    /// Immediately repeat the join request.
    Reconnect { attempt: u8 },
    /// The reconnect budget is spent; stop retrying but keep waiting.
    ReportDegraded { attempts: u8 },
    /// Block until the next network event.
    AwaitNetwork,
    /// Query the secret store for the API key.
    CheckCredential,
    StartConfigService,
    StopConfigService,
    /// Block on the notification channel.
    AwaitCredential,
    /// Hand control to the rest of the system.
    Release,
}

/// Event that is not valid in the current state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("event {event} is not valid in state {state:?}")]
pub struct TransitionError {
    pub state: ProvisioningState,
    pub event: &'static str,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Boot { .. } => "Boot",
            Event::PairingSucceeded(_) => "PairingSucceeded",
            Event::PairingFailed { .. } => "PairingFailed",
            Event::Disconnected { .. } => "Disconnected",
            Event::AddressAssigned { .. } => "AddressAssigned",
            Event::CredentialChecked { .. } => "CredentialChecked",
            Event::CredentialSignalled => "CredentialSignalled",
            Event::ForceReset => "ForceReset",
        }
    }
}

/// Provisioning state machine.
#[derive(Debug, Clone)]
pub struct Machine {
    state: ProvisioningState,
    reset_requested: bool,
    keep_configurator: bool,
    retries: RetryCounter,
    degraded: bool,
}

impl Machine {
    /// `keep_configurator` keeps the config service up once operational.
    pub fn new(keep_configurator: bool, max_join_retries: u8) -> Self {
        Self {
            state: ProvisioningState::Unprovisioned,
            reset_requested: false,
            keep_configurator,
            retries: RetryCounter::new(max_join_retries),
            degraded: false,
        }
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    /// The reconnect budget was spent before the last join obtained an
    /// address. Cleared only when a new join starts.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn retries(&self) -> &RetryCounter {
        &self.retries
    }

    /// Apply `event`, returning the effects to execute in order.
    pub fn handle(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        use ProvisioningState::*;

        let from = self.state;
        let effects = match (from, event) {
            (_, Event::ForceReset) => {
                self.state = Unprovisioned;
                self.reset_requested = false;
                self.retries.reset();
                self.degraded = false;
                Vec::new()
            }

            (
                Unprovisioned,
                Event::Boot {
                    reset_requested,
                    paired,
                },
            ) => {
                self.reset_requested = reset_requested;
                if paired && !reset_requested {
                    self.enter_joining();
                    vec![Effect::Join, Effect::AwaitNetwork]
                } else {
                    self.state = AwaitingPairing;
                    vec![Effect::BeginPairing]
                }
            }

            (AwaitingPairing, Event::PairingSucceeded(credentials)) => {
                self.enter_joining();
                vec![
                    Effect::PersistNetwork(credentials),
                    Effect::Join,
                    Effect::AwaitNetwork,
                ]
            }
            (AwaitingPairing, Event::PairingFailed { reason }) => {
                warn!("Pairing failed, retrying: {}", reason);
                vec![Effect::BeginPairing]
            }

            (JoiningNetwork, Event::Disconnected { reason }) => match self.retries.try_increment() {
                Some(attempt) => {
                    info!(
                        "Disconnected (reason {:?}), retry {}/{} to connect",
                        reason,
                        attempt,
                        self.retries.ceiling()
                    );
                    vec![Effect::Reconnect { attempt }, Effect::AwaitNetwork]
                }
                None if !self.degraded => {
                    self.degraded = true;
                    vec![
                        Effect::ReportDegraded {
                            attempts: self.retries.attempts(),
                        },
                        Effect::AwaitNetwork,
                    ]
                }
                None => vec![Effect::AwaitNetwork],
            },
            (JoiningNetwork, Event::AddressAssigned { ip }) => {
                info!("Got address {}", ip);
                self.retries.reset();
                self.state = NetworkReady;
                vec![Effect::CheckCredential]
            }

            // Link churn after the join is the radio driver's concern.
            (
                NetworkReady | AwaitingCredential | Operational,
                event @ (Event::Disconnected { .. } | Event::AddressAssigned { .. }),
            ) => {
                debug!("Ignoring {} in state {:?}", event.name(), from);
                Vec::new()
            }

            (NetworkReady, Event::CredentialChecked { present }) => {
                if present && !self.reset_requested {
                    self.state = Operational;
                    if self.keep_configurator {
                        vec![Effect::StartConfigService, Effect::Release]
                    } else {
                        vec![Effect::Release]
                    }
                } else {
                    self.state = AwaitingCredential;
                    vec![Effect::StartConfigService, Effect::AwaitCredential]
                }
            }

            (AwaitingCredential, Event::CredentialSignalled) => {
                self.state = Operational;
                if self.keep_configurator {
                    vec![Effect::Release]
                } else {
                    vec![Effect::StopConfigService, Effect::Release]
                }
            }

            (state, event) => {
                return Err(TransitionError {
                    state,
                    event: event.name(),
                })
            }
        };

        if self.state != from {
            debug!("Provisioning state {:?} -> {:?}", from, self.state);
        }
        Ok(effects)
    }

    fn enter_joining(&mut self) {
        self.state = ProvisioningState::JoiningNetwork;
        self.retries.reset();
        self.degraded = false;
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(true, DEFAULT_MAX_JOIN_RETRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 4, 20))
    }

    fn creds() -> NetworkCredentials {
        NetworkCredentials::new("HomeNet", "hunter22")
    }

    fn joined(machine: &mut Machine) {
        machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: true,
            })
            .unwrap();
        machine.handle(Event::AddressAssigned { ip: ip() }).unwrap();
    }

    #[test]
    fn test_fresh_device_pairs_first() {
        let mut machine = Machine::default();
        let effects = machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: false,
            })
            .unwrap();

        assert_eq!(effects, vec![Effect::BeginPairing]);
        assert_eq!(machine.state(), ProvisioningState::AwaitingPairing);
    }

    #[test]
    fn test_paired_device_skips_pairing() {
        let mut machine = Machine::default();
        let effects = machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: true,
            })
            .unwrap();

        assert_eq!(effects, vec![Effect::Join, Effect::AwaitNetwork]);
        assert_eq!(machine.state(), ProvisioningState::JoiningNetwork);
    }

    #[test]
    fn test_reset_forces_pairing_even_when_paired() {
        let mut machine = Machine::default();
        let effects = machine
            .handle(Event::Boot {
                reset_requested: true,
                paired: true,
            })
            .unwrap();

        assert_eq!(effects, vec![Effect::BeginPairing]);
        assert!(machine.reset_requested());
    }

    #[test]
    fn test_pairing_failure_retries_pairing() {
        let mut machine = Machine::default();
        machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: false,
            })
            .unwrap();

        for _ in 0..10 {
            let effects = machine
                .handle(Event::PairingFailed {
                    reason: "auth error".to_string(),
                })
                .unwrap();
            assert_eq!(effects, vec![Effect::BeginPairing]);
            assert_eq!(machine.state(), ProvisioningState::AwaitingPairing);
        }

        let effects = machine.handle(Event::PairingSucceeded(creds())).unwrap();
        assert_eq!(
            effects,
            vec![
                Effect::PersistNetwork(creds()),
                Effect::Join,
                Effect::AwaitNetwork
            ]
        );
        assert_eq!(machine.state(), ProvisioningState::JoiningNetwork);
    }

    #[test]
    fn test_no_sixth_reconnect_after_five_disconnects() {
        let mut machine = Machine::default();
        machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: true,
            })
            .unwrap();

        let mut reconnects = 0;
        let mut degraded_reports = 0;
        for _ in 0..8 {
            for effect in machine.handle(Event::Disconnected { reason: Some(201) }).unwrap() {
                match effect {
                    Effect::Reconnect { .. } => reconnects += 1,
                    Effect::ReportDegraded { attempts } => {
                        assert_eq!(attempts, 5);
                        degraded_reports += 1;
                    }
                    Effect::AwaitNetwork => {}
                    other => panic!("unexpected effect {:?}", other),
                }
            }
        }

        assert_eq!(reconnects, 5);
        assert_eq!(degraded_reports, 1);
        assert!(machine.is_degraded());
        assert_eq!(machine.state(), ProvisioningState::JoiningNetwork);

        // A late address assignment still completes the join.
        let effects = machine.handle(Event::AddressAssigned { ip: ip() }).unwrap();
        assert_eq!(effects, vec![Effect::CheckCredential]);
        assert_eq!(machine.retries().attempts(), 0);
        assert!(machine.is_degraded());
    }

    #[test]
    fn test_address_resets_retry_budget() {
        let mut machine = Machine::default();
        machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: true,
            })
            .unwrap();
        machine.handle(Event::Disconnected { reason: None }).unwrap();
        machine.handle(Event::Disconnected { reason: None }).unwrap();
        assert_eq!(machine.retries().attempts(), 2);

        machine.handle(Event::AddressAssigned { ip: ip() }).unwrap();
        assert_eq!(machine.retries().attempts(), 0);
        assert_eq!(machine.state(), ProvisioningState::NetworkReady);
    }

    #[test]
    fn test_missing_credential_starts_config_service() {
        let mut machine = Machine::new(false, 5);
        joined(&mut machine);

        let effects = machine
            .handle(Event::CredentialChecked { present: false })
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::StartConfigService, Effect::AwaitCredential]
        );
        assert_eq!(machine.state(), ProvisioningState::AwaitingCredential);

        let effects = machine.handle(Event::CredentialSignalled).unwrap();
        assert_eq!(effects, vec![Effect::StopConfigService, Effect::Release]);
        assert_eq!(machine.state(), ProvisioningState::Operational);
    }

    #[test]
    fn test_present_credential_goes_operational() {
        let mut machine = Machine::new(true, 5);
        joined(&mut machine);
        let effects = machine
            .handle(Event::CredentialChecked { present: true })
            .unwrap();
        assert_eq!(effects, vec![Effect::StartConfigService, Effect::Release]);
        assert_eq!(machine.state(), ProvisioningState::Operational);

        let mut machine = Machine::new(false, 5);
        joined(&mut machine);
        let effects = machine
            .handle(Event::CredentialChecked { present: true })
            .unwrap();
        assert_eq!(effects, vec![Effect::Release]);
    }

    #[test]
    fn test_reset_allows_overwriting_existing_credential() {
        let mut machine = Machine::new(false, 5);
        machine
            .handle(Event::Boot {
                reset_requested: true,
                paired: true,
            })
            .unwrap();
        machine.handle(Event::PairingSucceeded(creds())).unwrap();
        machine.handle(Event::AddressAssigned { ip: ip() }).unwrap();

        let effects = machine
            .handle(Event::CredentialChecked { present: true })
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::StartConfigService, Effect::AwaitCredential]
        );
    }

    #[test]
    fn test_keep_configurator_after_signal() {
        let mut machine = Machine::new(true, 5);
        joined(&mut machine);
        machine
            .handle(Event::CredentialChecked { present: false })
            .unwrap();
        let effects = machine.handle(Event::CredentialSignalled).unwrap();
        assert_eq!(effects, vec![Effect::Release]);
    }

    #[test]
    fn test_force_reset_returns_to_unprovisioned() {
        let mut machine = Machine::default();
        joined(&mut machine);
        machine
            .handle(Event::CredentialChecked { present: true })
            .unwrap();
        assert_eq!(machine.state(), ProvisioningState::Operational);

        assert!(machine.handle(Event::ForceReset).unwrap().is_empty());
        assert_eq!(machine.state(), ProvisioningState::Unprovisioned);
        assert!(machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: false
            })
            .is_ok());
    }

    #[test]
    fn test_out_of_order_events_are_rejected() {
        let mut machine = Machine::default();
        let err = machine.handle(Event::CredentialSignalled).unwrap_err();
        assert_eq!(err.state, ProvisioningState::Unprovisioned);
        assert_eq!(err.event, "CredentialSignalled");
        assert_eq!(machine.state(), ProvisioningState::Unprovisioned);

        machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: false,
            })
            .unwrap();
        assert!(machine
            .handle(Event::Boot {
                reset_requested: false,
                paired: false
            })
            .is_err());
    }

    #[test]
    fn test_link_churn_after_join_is_ignored() {
        let mut machine = Machine::default();
        joined(&mut machine);
        let effects = machine.handle(Event::Disconnected { reason: Some(8) }).unwrap();
        assert!(effects.is_empty());
        assert_eq!(machine.state(), ProvisioningState::NetworkReady);
    }
}
