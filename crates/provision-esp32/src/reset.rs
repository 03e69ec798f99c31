//! GPIO reset provisioning input.

use esp_idf_svc::hal::gpio::{AnyIOPin, Input, PinDriver, Pull};
use provision_core::{DigitalInput, Polarity, ProvisionError};

use crate::configuration_error;

/// Reset button wired to a GPIO.
///
/// The pin is claimed on the first `configure`; later calls only update
/// the bias.
pub struct GpioInput {
    pin: Option<AnyIOPin>,
    driver: Option<PinDriver<'static, AnyIOPin, Input>>,
}

impl GpioInput {
    pub fn new(pin: AnyIOPin) -> Self {
        Self {
            pin: Some(pin),
            driver: None,
        }
    }
}

impl DigitalInput for GpioInput {
    fn configure(&mut self, polarity: Polarity) -> Result<(), ProvisionError> {
        let pull = match polarity {
            Polarity::ActiveLow => Pull::Up,
            Polarity::ActiveHigh => Pull::Down,
        };

        let driver = match self.driver.as_mut() {
            Some(driver) => driver,
            None => {
                let pin = self
                    .pin
                    .take()
                    .ok_or_else(|| ProvisionError::configuration("reset pin already released"))?;
                let driver =
                    PinDriver::input(pin).map_err(|err| configuration_error("gpio_config", err))?;
                self.driver.insert(driver)
            }
        };
        driver
            .set_pull(pull)
            .map_err(|err| configuration_error("gpio_set_pull_mode", err))
    }

    fn is_high(&mut self) -> bool {
        self.driver.as_ref().map_or(false, |driver| driver.is_high())
    }
}
