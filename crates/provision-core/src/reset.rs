//! Reset signal sampled at boot to force re-provisioning.

use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::error::ProvisionError;

/// Settle time between configuring the input and sampling it.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Level at which the reset button counts as pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Pressed pulls the line low (input uses a pull-up).
    #[default]
    ActiveLow,
    ActiveHigh,
}

/// Digital input line the reset button is wired to.
pub trait DigitalInput: Send {
    /// Configure the line as an input with the bias matching `polarity`.
    fn configure(&mut self, polarity: Polarity) -> Result<(), ProvisionError>;

    /// Sample the current level.
    fn is_high(&mut self) -> bool;
}

/// Source of the "force re-provisioning" request.
pub trait ResetCheck: Send {
    /// Whether re-provisioning was requested. Never fails.
    fn check(&mut self) -> bool;
}

/// Physical reset button.
#[derive(Debug)]
pub struct ResetButton<I> {
    input: I,
    polarity: Polarity,
}

impl<I: DigitalInput> ResetButton<I> {
    pub fn new(input: I, polarity: Polarity) -> Self {
        Self { input, polarity }
    }
}

impl<I: DigitalInput> ResetCheck for ResetButton<I> {
    /// A line that cannot be configured reads as "not pressed".
    fn check(&mut self) -> bool {
        if let Err(err) = self.input.configure(self.polarity) {
            error!(
                "Failed to configure reset provisioning input - kind={} code={:?}: {}",
                err.kind(),
                err.code(),
                err
            );
            return false;
        }

        thread::sleep(SETTLE_DELAY);

        let high = self.input.is_high();
        let pressed = match self.polarity {
            Polarity::ActiveLow => !high,
            Polarity::ActiveHigh => high,
        };
        info!(
            "Reset provisioning button {}",
            if pressed { "pressed" } else { "not pressed" }
        );
        pressed
    }
}

/// Board without a reset input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetInput;

impl ResetCheck for NoResetInput {
    fn check(&mut self) -> bool {
        false
    }
}

/// Reset request fixed at construction, e.g. from a command-line flag.
impl ResetCheck for bool {
    fn check(&mut self) -> bool {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct FakeLine {
        high: bool,
        configure_error: bool,
        configured_with: Option<Polarity>,
    }

    impl FakeLine {
        fn at(high: bool) -> Self {
            Self {
                high,
                configure_error: false,
                configured_with: None,
            }
        }
    }

    impl DigitalInput for FakeLine {
        fn configure(&mut self, polarity: Polarity) -> Result<(), ProvisionError> {
            if self.configure_error {
                return Err(ProvisionError::ConfigurationFailure {
                    message: "gpio_config".to_string(),
                    code: Some(0x102),
                });
            }
            self.configured_with = Some(polarity);
            Ok(())
        }

        fn is_high(&mut self) -> bool {
            self.high
        }
    }

    #[test]
    fn test_active_low_pressed_when_line_low() {
        let mut button = ResetButton::new(FakeLine::at(false), Polarity::ActiveLow);
        let started = Instant::now();
        assert!(button.check());
        assert!(started.elapsed() >= SETTLE_DELAY);
        assert_eq!(button.input.configured_with, Some(Polarity::ActiveLow));

        let mut button = ResetButton::new(FakeLine::at(true), Polarity::ActiveLow);
        assert!(!button.check());
    }

    #[test]
    fn test_active_high_pressed_when_line_high() {
        let mut button = ResetButton::new(FakeLine::at(true), Polarity::ActiveHigh);
        assert!(button.check());
    }

    #[test]
    fn test_configuration_failure_reads_not_pressed() {
        let mut line = FakeLine::at(false);
        line.configure_error = true;
        let mut button = ResetButton::new(line, Polarity::ActiveLow);
        assert!(!button.check());
    }

    #[test]
    fn test_fixed_sources() {
        assert!(!NoResetInput.check());
        assert!(true.check());
    }
}
