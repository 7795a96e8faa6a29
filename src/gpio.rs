//! This file handles the IEC bus GPIO lines.
//!
//! The source code serves as the master list of pin assignments for the
//! hardware.  Each bus line uses a pair of pins: an input with a pull-up,
//! read directly from the bus, and an output driving an inverting
//! open-collector stage - so driving the output pin high pulls the bus
//! line low.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::fmt::{debug, info, trace, warn};

use embassy_rp::gpio::{Flex, Pull};

use crate::protocol::{BusPort, IecLine, LineState};

/// Pin assignments.
pub mod pins {
    pub const ATN_IN: u8 = 17;
    pub const ATN_OUT: u8 = 12;
    pub const CLOCK_IN: u8 = 19;
    pub const CLOCK_OUT: u8 = 11;
    pub const DATA_IN: u8 = 20;
    pub const DATA_OUT: u8 = 13;
    pub const SRQ_IN: u8 = 16;
    pub const SRQ_OUT: u8 = 14;
    pub const LED: u8 = 25;
}

/// A single bidirectional IEC bus line over separate input/output pins.
pub struct Line {
    input: Flex<'static>,
    output: Flex<'static>,
}

impl Line {
    /// Create a new Line.  The input gets a pull-up; the output starts
    /// low, which is the released state after the inverting driver.
    pub fn new(input: Flex<'static>, output: Flex<'static>) -> Self {
        let mut input = input;
        input.set_as_input();
        input.set_pull(Pull::Up);

        let mut output = output;
        output.set_as_output();
        output.set_low();

        Self { input, output }
    }

    /// Drive the bus line low - inverted stage, so the pin goes high.
    fn pull(&mut self) {
        self.output.set_high();
    }

    /// Stop driving; the external pull-up floats the bus line high.
    fn release(&mut self) {
        self.output.set_low();
    }

    /// Sample the wire.  Low reads as pulled.
    fn status(&self) -> LineState {
        if self.input.is_low() {
            LineState::Pulled
        } else {
            LineState::Released
        }
    }
}

/// The physical IEC bus port: one [`Line`] per signal.
pub struct IecPort {
    atn: Line,
    clock: Line,
    data: Line,
    srq: Line,
}

impl IecPort {
    pub fn new(atn: Line, clock: Line, data: Line, srq: Line) -> Self {
        Self {
            atn,
            clock,
            data,
            srq,
        }
    }

    fn line(&self, line: IecLine) -> &Line {
        match line {
            IecLine::Atn => &self.atn,
            IecLine::Clock => &self.clock,
            IecLine::Data => &self.data,
            IecLine::Srq => &self.srq,
        }
    }

    fn line_mut(&mut self, line: IecLine) -> &mut Line {
        match line {
            IecLine::Atn => &mut self.atn,
            IecLine::Clock => &mut self.clock,
            IecLine::Data => &mut self.data,
            IecLine::Srq => &mut self.srq,
        }
    }
}

impl BusPort for IecPort {
    fn pull(&mut self, line: IecLine) {
        self.line_mut(line).pull();
    }

    fn release(&mut self, line: IecLine) {
        self.line_mut(line).release();
    }

    fn status(&self, line: IecLine) -> LineState {
        self.line(line).status()
    }
}
