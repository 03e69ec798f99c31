//! Console pairing transport.
//!
//! A host has no SoftAP radio, so the operator pairs by typing the network
//! name and passphrase on the agent's standard input.

use std::io::BufRead;

use provision_core::{
    NetworkCredentials, PairingOutcome, PairingSession, PairingTransport, ProvisionError,
};
use tracing::{info, warn};

pub struct ConsolePairing<R> {
    input: R,
    closed: bool,
}

impl<R: BufRead + Send> ConsolePairing<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            closed: false,
        }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(err) => {
                warn!("Failed to read pairing input: {}", err);
                None
            }
        }
    }
}

impl<R: BufRead + Send> PairingTransport for ConsolePairing<R> {
    fn start(&mut self, session: &PairingSession) -> Result<(), ProvisionError> {
        if self.closed {
            return Err(ProvisionError::transport("pairing console closed"));
        }
        info!(
            "Pairing service '{}' ready, enter the network name then the passphrase",
            session.service_name
        );
        Ok(())
    }

    fn wait(&mut self) -> PairingOutcome {
        let Some(ssid) = self.read_line() else {
            self.closed = true;
            return PairingOutcome::Failed {
                reason: "pairing console closed".to_string(),
            };
        };
        if ssid.is_empty() {
            return PairingOutcome::Failed {
                reason: "empty network name".to_string(),
            };
        }
        let passphrase = self.read_line().unwrap_or_default();
        PairingOutcome::Succeeded(NetworkCredentials::new(ssid, passphrase))
    }
}
