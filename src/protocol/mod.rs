//! This module implements the IEC serial-bus protocol: the line-level
//! abstraction the engine drives, the bus state flags, the ATN command
//! codes and the parsed ATN command record.  The engine itself lives in
//! [`iec`].

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

pub mod iec;

pub use iec::IecBus;

use bitflags::bitflags;
use heapless::Vec;

use crate::constants::ATN_CMD_MAX_LEN;

// ATN command codes.  The first byte of an ATN sequence is one of these,
// with the device number or channel OR'd into the low bits.
pub const ATN_GLOBAL: u8 = 0x00; // 0x00 + cmd (global command)
pub const ATN_LISTEN: u8 = 0x20; // 0x20 + device (LISTEN)
pub const ATN_UNLISTEN: u8 = 0x3F; // 0x3F (UNLISTEN)
pub const ATN_TALK: u8 = 0x40; // 0x40 + device (TALK)
pub const ATN_UNTALK: u8 = 0x5F; // 0x5F (UNTALK)
pub const ATN_DATA: u8 = 0x60; // 0x60 + channel (SECOND)
pub const ATN_CLOSE: u8 = 0xE0; // 0xE0 + channel (CLOSE)
pub const ATN_OPEN: u8 = 0xF0; // 0xF0 + channel (OPEN)

/// The four IEC bus signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IecLine {
    Atn,
    Clock,
    Data,
    Srq,
}

/// Observable state of a bus line.  The bus is open-collector: a line is
/// either actively driven low (`Pulled`) or floated and pulled high
/// externally (`Released`).  No other level exists at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineState {
    Pulled,
    Released,
}

/// Line-level access to one physical IEC bus.
///
/// `pull` drives a line low; `release` stops driving it, letting the
/// external pull-up float it high; `status` samples the wire, which may
/// differ from what we drive because any party can pull.
pub trait BusPort {
    fn pull(&mut self, line: IecLine);
    fn release(&mut self, line: IecLine);
    fn status(&self, line: IecLine) -> LineState;
}

bitflags! {
    /// Bus engine state, reset at the start of every receive and every
    /// attention cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BusFlags: u8 {
        /// The byte just transferred was the last of the transfer.
        const EOI = 1 << 0;
        /// ATN was pulled while the byte was transferred.
        const ATN = 1 << 1;
        /// A line wait timed out; the transaction is dead until the next
        /// attention cycle.
        const ERROR = 1 << 2;
    }
}

/// Result of one attention check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtnCheck {
    /// Nothing on the bus concerns us.
    Idle,
    /// A command was received and is complete.
    Command,
    /// A command was received and the computer will now send data.
    CommandListen,
    /// A command was received and we must talk now.
    CommandTalk,
}

/// A parsed ATN command sequence.
///
/// One instance lives in the device-dispatch layer and is overwritten on
/// each new attention sequence; the string buffer is fixed-size and
/// overflow is a protocol error, never a truncation.
#[derive(Debug, Default)]
pub struct AtnCommand {
    /// Raw first ATN byte.
    pub code: u8,
    /// Upper nibble of the second byte: one of [`ATN_DATA`],
    /// [`ATN_CLOSE`], [`ATN_OPEN`].
    pub command: u8,
    /// Lower nibble of the second byte, 0-15.  15 is the command channel.
    pub channel: u8,
    /// Target device number from the LISTEN/TALK byte.
    pub device: u8,
    /// Command text (e.g. a filename) when the sequence carries more than
    /// the two-byte header.
    pub string: Vec<u8, ATN_CMD_MAX_LEN>,
}

impl AtnCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command-string byte.  Returns false on overflow.
    pub fn push_byte(&mut self, b: u8) -> bool {
        self.string.push(b).is_ok()
    }

    pub fn clear_string(&mut self) {
        self.string.clear();
    }

    /// The command string as text.  Non-UTF8 content (arbitrary PETSCII
    /// graphics bytes) reads as empty rather than panicking.
    pub fn text(&self) -> &str {
        core::str::from_utf8(&self.string).unwrap_or("")
    }
}
