//! This file defines the BusDriver trait, the byte-level capability set a
//! peripheral-bus engine exposes to the device-dispatch layer.
//!
//! The dispatch layer (OPEN/CLOSE/DATA decode, listing generation) is
//! generic over this trait, so each physical bus variant implements the
//! handshake details once and the device logic is shared by composition.
//! The IEC implementation is [`crate::protocol::IecBus`].

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use crate::protocol::{AtnCheck, AtnCommand, BusFlags};

/// Defines errors for BusDriver implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// A bounded line wait expired - no response within expected time.
    /// The bus is in an ambiguous state only the computer can recover.
    Timeout,
    /// More command-string bytes arrived than the fixed buffer holds.
    BufferOverflow,
    /// A transfer failed mid-byte (e.g. missing acknowledgement).
    Io,
}

/// The interface a bus engine provides to the device layer.
///
/// The device layer never touches lines directly - these primitives are
/// the only route to the bus, which is what keeps the line-level protocol
/// in one place per bus variant.
pub trait BusDriver {
    /// Check for and process an attention sequence.  Blocks for the whole
    /// sequence (including any data phase it triggers) when one is in
    /// flight; returns immediately when ATN is idle, without touching any
    /// line.
    fn check_attention(&mut self, cmd: &mut AtnCommand) -> Result<AtnCheck, DriverError>;

    /// Receive one data byte as listener.  Flags (EOI/ATN) for the byte
    /// are readable via [`BusDriver::flags`] afterwards.
    fn receive(&mut self) -> Result<u8, DriverError>;

    /// Send one data byte as talker.
    fn send(&mut self, byte: u8) -> Result<(), DriverError>;

    /// Send the final byte of a transfer, EOI-marked, and hand the bus
    /// back to the computer.
    fn send_eoi(&mut self, byte: u8) -> Result<(), DriverError>;

    /// Signal file-not-found: release the bus and stay silent.  The
    /// protocol has no explicit negative acknowledgement.
    fn send_fnf(&mut self);

    /// Bus state flags from the most recent operation.
    fn flags(&self) -> BusFlags;

    /// Let this engine answer for `device`.
    fn enable_device(&mut self, device: u8);

    /// Stop answering for `device`.
    fn disable_device(&mut self, device: u8);

    fn is_device_enabled(&self, device: u8) -> bool;
}
