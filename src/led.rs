//! Status LED handling.
//!
//! The drive signals bus activity on an LED: solid between operations,
//! toggling while a transfer streams.  This is fire-and-forget - nothing
//! in the protocol depends on it.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

/// What the dispatch layer needs from an LED.
pub trait StatusLed {
    fn set(&mut self, on: bool);
    fn toggle(&mut self);
}

/// No LED attached (host tests, headless use).
#[derive(Default)]
pub struct NullLed;

impl StatusLed for NullLed {
    fn set(&mut self, _on: bool) {}
    fn toggle(&mut self) {}
}

/// The board LED.
#[cfg(feature = "hw")]
pub struct ActivityLed {
    pin: embassy_rp::gpio::Output<'static>,
    lit: bool,
}

#[cfg(feature = "hw")]
impl ActivityLed {
    pub fn new(pin: embassy_rp::gpio::Output<'static>) -> Self {
        Self { pin, lit: false }
    }
}

#[cfg(feature = "hw")]
impl StatusLed for ActivityLed {
    fn set(&mut self, on: bool) {
        self.lit = on;
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }

    fn toggle(&mut self) {
        self.set(!self.lit);
    }
}
