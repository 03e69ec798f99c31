//! SoftAP pairing through the ESP-IDF WiFi provisioning manager.
//!
//! The manager runs its own SoftAP and protocomm endpoints; this module
//! only drives its lifecycle and turns `WIFI_PROV_EVENT` notifications
//! into a `PairingOutcome`.

use std::ffi::{c_void, CString};
use std::sync::mpsc::{self, Receiver, Sender};

use esp_idf_svc::sys::{self, esp, EspError};
use log::{debug, info, warn};
use provision_core::{
    NetworkCredentials, PairingOutcome, PairingSession, PairingTransport, ProvisionError,
};

use crate::transport_error;

#[derive(Debug)]
enum ProvMessage {
    Received(NetworkCredentials),
    Failed(&'static str),
    Succeeded,
}

struct Attempt {
    events: Receiver<ProvMessage>,
    // Handler argument; must outlive the registration.
    _sender: Box<Sender<ProvMessage>>,
    // Sec2 parameters and strings are read by the manager until it stops.
    _params: Box<sys::wifi_prov_security2_params_t>,
    _service_name: CString,
    _service_key: Option<CString>,
}

/// Pairing transport backed by `wifi_prov_mgr` with the SoftAP scheme.
#[derive(Default)]
pub struct SoftApPairing {
    attempt: Option<Attempt>,
}

// The raw pointers in `Attempt` only reference data it owns.
unsafe impl Send for SoftApPairing {}

impl SoftApPairing {
    pub fn new() -> Self {
        Self::default()
    }

    fn teardown(&mut self, completed: bool) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        unsafe {
            if completed {
                sys::wifi_prov_mgr_wait();
            } else {
                sys::wifi_prov_mgr_stop_provisioning();
            }
            sys::wifi_prov_mgr_deinit();
            if let Err(err) = esp!(sys::esp_event_handler_unregister(
                sys::WIFI_PROV_EVENT,
                sys::ESP_EVENT_ANY_ID,
                Some(prov_event_handler),
            )) {
                warn!("Failed to unregister provisioning handler: {}", err);
            }
        }
        drop(attempt);
        debug!("Provisioning manager released");
    }
}

impl PairingTransport for SoftApPairing {
    fn start(&mut self, session: &PairingSession) -> Result<(), ProvisionError> {
        self.teardown(false);

        let service_name = CString::new(session.service_name.as_str())
            .map_err(|_| ProvisionError::configuration("service name contains a NUL byte"))?;
        let service_key = session
            .service_passphrase
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|_| ProvisionError::configuration("service passphrase contains a NUL byte"))?;
        let params = Box::new(sys::wifi_prov_security2_params_t {
            salt: session.salt.as_ptr().cast(),
            salt_len: session.salt.len() as u16,
            verifier: session.verifier.as_ptr().cast(),
            verifier_len: session.verifier.len() as u16,
        });

        let (tx, events) = mpsc::channel();
        let sender = Box::new(tx);

        let config = sys::wifi_prov_mgr_config_t {
            scheme: unsafe { sys::wifi_prov_scheme_softap },
            ..Default::default()
        };
        esp!(unsafe { sys::wifi_prov_mgr_init(config) })
            .map_err(|err| transport_error("wifi_prov_mgr_init", err))?;

        let registered: Result<(), EspError> = esp!(unsafe {
            sys::esp_event_handler_register(
                sys::WIFI_PROV_EVENT,
                sys::ESP_EVENT_ANY_ID,
                Some(prov_event_handler),
                &*sender as *const Sender<ProvMessage> as *mut c_void,
            )
        });
        if let Err(err) = registered {
            unsafe { sys::wifi_prov_mgr_deinit() };
            return Err(transport_error("esp_event_handler_register", err));
        }

        let started = esp!(unsafe {
            sys::wifi_prov_mgr_start_provisioning(
                sys::wifi_prov_security_WIFI_PROV_SECURITY_2,
                &*params as *const sys::wifi_prov_security2_params_t as *const c_void,
                service_name.as_ptr(),
                service_key
                    .as_ref()
                    .map_or(std::ptr::null(), |key| key.as_ptr()),
            )
        });

        self.attempt = Some(Attempt {
            events,
            _sender: sender,
            _params: params,
            _service_name: service_name,
            _service_key: service_key,
        });

        if let Err(err) = started {
            self.teardown(false);
            return Err(transport_error("wifi_prov_mgr_start_provisioning", err));
        }

        info!(
            "Provisioning started as '{}' (user '{}')",
            session.service_name, session.username
        );
        Ok(())
    }

    fn wait(&mut self) -> PairingOutcome {
        let Some(attempt) = &self.attempt else {
            return PairingOutcome::Failed {
                reason: "pairing was not started".to_string(),
            };
        };

        let mut received = None;
        let outcome = loop {
            match attempt.events.recv() {
                Ok(ProvMessage::Received(credentials)) => {
                    info!("Received Wi-Fi credentials for '{}'", credentials.ssid);
                    received = Some(credentials);
                }
                Ok(ProvMessage::Failed(reason)) => {
                    break Err(reason.to_string());
                }
                Ok(ProvMessage::Succeeded) => match received.take() {
                    Some(credentials) => break Ok(credentials),
                    None => break Err("credentials were not received".to_string()),
                },
                Err(_) => break Err("provisioning event source closed".to_string()),
            }
        };

        match outcome {
            Ok(credentials) => {
                info!("Provisioning successful");
                self.teardown(true);
                PairingOutcome::Succeeded(credentials)
            }
            Err(reason) => {
                warn!("Provisioning failed: {}", reason);
                self.teardown(false);
                PairingOutcome::Failed { reason }
            }
        }
    }
}

impl Drop for SoftApPairing {
    fn drop(&mut self) {
        self.teardown(false);
    }
}

unsafe extern "C" fn prov_event_handler(
    arg: *mut c_void,
    _event_base: sys::esp_event_base_t,
    event_id: i32,
    event_data: *mut c_void,
) {
    let sender = &*(arg as *const Sender<ProvMessage>);
    let message = match event_id as u32 {
        sys::wifi_prov_cb_event_t_WIFI_PROV_START => {
            info!("Provisioning started");
            return;
        }
        sys::wifi_prov_cb_event_t_WIFI_PROV_CRED_RECV => {
            let config = &*(event_data as *const sys::wifi_sta_config_t);
            ProvMessage::Received(NetworkCredentials::new(
                c_field(&config.ssid),
                c_field(&config.password),
            ))
        }
        sys::wifi_prov_cb_event_t_WIFI_PROV_CRED_FAIL => {
            let reason = *(event_data as *const sys::wifi_prov_sta_fail_reason_t);
            if reason == sys::wifi_prov_sta_fail_reason_t_WIFI_PROV_STA_AUTH_ERROR {
                ProvMessage::Failed("Wi-Fi station authentication failed")
            } else {
                ProvMessage::Failed("Wi-Fi station DHCP client failed")
            }
        }
        sys::wifi_prov_cb_event_t_WIFI_PROV_CRED_SUCCESS => ProvMessage::Succeeded,
        _ => return,
    };
    let _ = sender.send(message);
}

fn c_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
