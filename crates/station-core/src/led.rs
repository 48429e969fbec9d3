//! Single LED on a push-pull output pin

use embedded_hal::digital::OutputPin;
use log::info;

/// An LED that remembers the level it was last driven to.
///
/// `toggle` flips the remembered state instead of reading the pin back, so
/// it works on outputs that cannot be read.
pub struct Led<P> {
    pin: P,
    on: bool,
}

impl<P: OutputPin> Led<P> {
    /// Take ownership of `pin` and drive it low.
    pub fn new(mut pin: P) -> Result<Self, P::Error> {
        pin.set_low()?;
        Ok(Self { pin, on: false })
    }

    pub fn set(&mut self, on: bool) -> Result<(), P::Error> {
        if on {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        self.on = on;
        info!("LED {}", if on { "ON" } else { "OFF" });
        Ok(())
    }

    pub fn on(&mut self) -> Result<(), P::Error> {
        self.set(true)
    }

    pub fn off(&mut self) -> Result<(), P::Error> {
        self.set(false)
    }

    pub fn toggle(&mut self) -> Result<(), P::Error> {
        self.set(!self.on)
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn release(self) -> P {
        self.pin
    }
}
