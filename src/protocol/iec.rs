//! This file implements the Commodore IEC protocol engine for the
//! peripheral (device) side of the bus: byte-level receive and send, the
//! ATN command-negotiation sequence, and bus-direction turnaround.
//!
//! Everything here is bit-banged over the [`BusPort`] line abstraction.
//! The engine is strictly half-duplex and single-transaction: an
//! attention check blocks until the sequence it started is complete, and
//! nothing else touches the lines meanwhile.
//!
//! Every line wait is bounded except two, both deliberate: after a
//! timeout, and after an attention sequence that does not concern us, we
//! wait for ATN to release with no bound of our own.  ATN belongs to the
//! computer; if it is held forever the bus is dead anyway and only the
//! computer can revive it.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::fmt::{debug, info, trace, warn};

use crate::constants::{CMD_CHANNEL, MAX_DEVICE_NUMBER};
use crate::driver::{BusDriver, DriverError};
use crate::protocol::{
    ATN_DATA, ATN_LISTEN, ATN_TALK, ATN_UNLISTEN, ATN_UNTALK, AtnCheck, AtnCommand, BusFlags,
    BusPort, IecLine, LineState,
};
use crate::util::time::iec::{
    ATN_DELAY, ATN_PREDELAY, BIT_TIME, EOI_POLL_TICK, EOI_THRESH_TICKS, EOI_WAIT, FNF_DELAY,
    NO_EOI_DELAY, STABLE_WAIT, WAIT_POLL_TICK, WAIT_TIMEOUT_TICKS,
};
use crate::util::time::{block_us, iec_delay};

use IecLine::{Atn, Clock, Data};
use LineState::{Pulled, Released};

/// The IEC bus engine.
///
/// One long-lived instance is owned by the drive that services the bus -
/// there is no global.  The flags field carries per-operation state
/// (EOI/ATN/ERROR) and is reset at the start of every receive and every
/// attention cycle.
pub struct IecBus<P: BusPort> {
    port: P,
    flags: BusFlags,
    enabled: u32,
}

impl<P: BusPort> IecBus<P> {
    /// Create a new engine over a line port.  Ports initialize with all
    /// lines released; the engine does not touch them until the bus does.
    pub fn new(port: P) -> Self {
        Self {
            port,
            flags: BusFlags::empty(),
            enabled: 0,
        }
    }

    /// Bounded wait for `line` to reach `target`.
    ///
    /// Polls every ~3us for up to [`WAIT_TIMEOUT_TICKS`] ticks.  On
    /// timeout: releases CLOCK and DATA, sets the error flag, then waits -
    /// without a bound - for the computer to release ATN, since a timeout
    /// mid-handshake leaves the bus in a state only the computer can end.
    fn timeout_wait(&mut self, line: IecLine, target: LineState) -> Result<(), DriverError> {
        let mut ticks = 0u32;
        while ticks < WAIT_TIMEOUT_TICKS {
            if self.port.status(line) == target {
                return Ok(());
            }
            block_us!(WAIT_POLL_TICK);
            ticks += 1;
        }

        self.port.release(Clock);
        self.port.release(Data);
        self.flags.insert(BusFlags::ERROR);
        warn!("line wait timed out");

        self.wait_atn_release();
        Err(DriverError::Timeout)
    }

    // Unbounded: see the module comment.
    fn wait_atn_release(&mut self) {
        while self.port.status(Atn) == Pulled {
            iec_delay!();
        }
    }

    /// Receive one byte as listener.
    ///
    /// Detects the talker's EOI signalling (CLOCK left released past the
    /// detection window) and acknowledges it with a DATA pulse before the
    /// bit transfer.  Bits arrive LSB first, sampled while CLOCK is
    /// released; DATA released means 1.
    pub fn receive_byte(&mut self) -> Result<u8, DriverError> {
        self.flags = BusFlags::empty();

        if self.port.status(Atn) == Pulled {
            self.flags.insert(BusFlags::ATN);
        }

        // Wait for the talker to signal ready-to-send.
        self.timeout_wait(Clock, Released)?;

        // Say we're ready, and wait for any other listeners to agree.
        self.port.release(Data);
        self.timeout_wait(Data, Released)?;

        // Record how long CLOCK stays released - past the window means
        // EOI.
        let mut ticks = 0u32;
        while self.port.status(Clock) == Released {
            if ticks >= EOI_THRESH_TICKS {
                self.flags.insert(BusFlags::EOI);
                trace!("EOI signalled");

                // Acknowledge by holding DATA down for a bit time.
                self.port.pull(Data);
                block_us!(BIT_TIME);
                self.port.release(Data);

                // The talker resumes by taking CLOCK back.
                self.timeout_wait(Clock, Pulled)?;
                break;
            }
            block_us!(EOI_POLL_TICK);
            ticks += 1;
        }

        // Get the bits, sampling while CLOCK is released.
        let mut byte = 0u8;
        for _bit in 0..8 {
            byte >>= 1;
            self.timeout_wait(Clock, Released)?;
            if self.port.status(Data) == Released {
                byte |= 0x80;
            }
            self.timeout_wait(Clock, Pulled)?;
        }

        // Signal we accepted the byte.  Between bytes DATA stays held -
        // that is the listener-busy convention - but after the final byte
        // the bus goes back to idle.
        self.port.pull(Data);
        if self.flags.contains(BusFlags::EOI) {
            block_us!(STABLE_WAIT);
            self.port.release(Clock);
            self.port.release(Data);
        }

        trace!("received 0x{:02x}", byte);
        Ok(byte)
    }

    /// Send one byte as talker, optionally signalling EOI.
    fn send_byte(&mut self, byte: u8, signal_eoi: bool) -> Result<(), DriverError> {
        self.flags = BusFlags::empty();

        // Say we're ready.
        self.port.release(Clock);

        // Wait for the listener to be ready.
        self.timeout_wait(Data, Released)?;

        if signal_eoi {
            // Signal EOI by sitting out the detection window, then take
            // the listener's acknowledgement pulse.
            block_us!(EOI_WAIT);
            self.timeout_wait(Data, Pulled)?;
            self.timeout_wait(Data, Released)?;
        }

        block_us!(NO_EOI_DELAY);

        // Clock out the bits, LSB first.  Each half of the bit cell is
        // held for a full bit time; DATA released means 1.
        let mut data = byte;
        for _bit in 0..8 {
            self.port.pull(Clock);
            if data & 1 == 0 {
                self.port.pull(Data);
            } else {
                self.port.release(Data);
            }
            block_us!(BIT_TIME);
            self.port.release(Clock);
            block_us!(BIT_TIME);
            data >>= 1;
        }

        // Mark the end of the byte and wait for the listener to accept.
        self.port.pull(Clock);
        self.port.release(Data);
        self.timeout_wait(Data, Pulled)?;

        if signal_eoi {
            block_us!(STABLE_WAIT);
            self.port.release(Clock);
            self.port.release(Data);
        }

        trace!("sent 0x{:02x}", byte);
        Ok(())
    }

    /// Reverse the bus so we become talker.  Called once the computer has
    /// released ATN after a TALK command.
    fn turn_around(&mut self) -> Result<(), DriverError> {
        debug!("turnaround");

        // The computer hands CLOCK over before we may grab it.
        self.timeout_wait(Clock, Released)?;

        self.port.release(Data);
        block_us!(BIT_TIME);
        self.port.pull(Clock);
        block_us!(BIT_TIME);
        Ok(())
    }

    /// Put the bus direction back the way the computer expects it - we
    /// return to listener, the computer to talker.
    fn undo_turn_around(&mut self) -> Result<(), DriverError> {
        debug!("undo turnaround");

        self.port.pull(Data);
        block_us!(BIT_TIME);
        self.port.release(Clock);
        block_us!(BIT_TIME);

        // Wait until the computer takes the CLOCK line back.
        self.timeout_wait(Clock, Pulled)
    }

    /// Handle a LISTEN addressed to us.
    ///
    /// A DATA command outside the command channel announces a payload too
    /// big to buffer here - the caller streams it byte by byte.  Anything
    /// else (OPEN, CLOSE, command-channel traffic) carries a bounded
    /// command string which is accumulated until the computer marks the
    /// end: the EOI-flagged final byte, or an UNLISTEN under ATN (which is
    /// a terminator, not part of the string).
    fn device_listen(&mut self, cmd: &mut AtnCommand) -> Result<AtnCheck, DriverError> {
        debug!("LISTEN device {}", cmd.device);

        if cmd.command == ATN_DATA && cmd.channel != CMD_CHANNEL {
            debug!("data phase follows on channel {}", cmd.channel);
            return Ok(AtnCheck::CommandListen);
        }

        loop {
            let b = self.receive_byte()?;

            if self.flags.contains(BusFlags::ATN) && b == ATN_UNLISTEN {
                break;
            }

            if !cmd.push_byte(b) {
                warn!("ATN command string overflow");
                return Err(DriverError::BufferOverflow);
            }

            if self.flags.contains(BusFlags::EOI) {
                break;
            }
        }

        debug!("command string complete, {} bytes", cmd.string.len());
        Ok(AtnCheck::Command)
    }

    /// Handle a TALK addressed to us: collect any further secondary bytes
    /// for as long as the computer holds ATN, then reverse the bus.
    fn device_talk(&mut self, cmd: &mut AtnCommand) -> Result<AtnCheck, DriverError> {
        debug!("TALK device {} channel {}", cmd.device, cmd.channel);

        while self.port.status(Atn) == Pulled {
            if self.port.status(Clock) == Released {
                // The computer releases ATN before it hands CLOCK over;
                // seeing CLOCK free means the command phase may already
                // be over.
                if self.port.status(Atn) == Released {
                    break;
                }
                let b = self.receive_byte()?;
                if !cmd.push_byte(b) {
                    warn!("secondary address overflow");
                    return Err(DriverError::BufferOverflow);
                }
            }
            iec_delay!();
        }

        // ATN has just been released - do the bus turnaround, after which
        // we are expected to talk.
        self.turn_around()?;
        Ok(AtnCheck::CommandTalk)
    }
}

impl<P: BusPort> BusDriver for IecBus<P> {
    /// Check for and deal with an attention sequence.
    ///
    /// Idle bus: returns immediately and touches nothing.  Active ATN:
    /// grabs the bus in listener mode (speed matters - the computer is
    /// watching for it), receives and decodes the command bytes, and
    /// dispatches LISTEN/TALK addressed to an enabled device.  Anything
    /// else releases the bus and sits out the rest of the sequence.
    fn check_attention(&mut self, cmd: &mut AtnCommand) -> Result<AtnCheck, DriverError> {
        if self.port.status(Atn) == Released {
            return Ok(AtnCheck::Idle);
        }

        self.flags = BusFlags::empty();
        cmd.clear_string();

        self.port.pull(Data);
        self.port.release(Clock);
        block_us!(ATN_PREDELAY);

        // First byte: LISTEN, TALK, or a global command.
        let code = self.receive_byte()?;
        trace!("ATN code 0x{:02x}", code);
        cmd.code = code;

        let mut mode = code;
        if code != ATN_UNTALK && code != ATN_UNLISTEN {
            if code & ATN_LISTEN != 0 {
                mode = ATN_LISTEN;
                cmd.device = code ^ ATN_LISTEN;
            } else {
                mode = ATN_TALK;
                cmd.device = code ^ ATN_TALK;
            }

            // Second byte: the command itself in the upper nibble, the
            // channel in the lower.
            let second = self.receive_byte()?;
            cmd.command = second & 0xF0;
            cmd.channel = second & 0x0F;
            trace!(
                "ATN command 0x{:02x} channel {}",
                cmd.command, cmd.channel
            );
        }

        let ret = if mode == ATN_LISTEN && self.is_device_enabled(cmd.device) {
            self.device_listen(cmd)?
        } else if mode == ATN_TALK && self.is_device_enabled(cmd.device) {
            self.device_talk(cmd)?
        } else {
            // Either the message is not for us, or insignificant, like
            // UNLISTEN.  Let the lines go and wait out the sequence.
            block_us!(ATN_DELAY);
            self.port.release(Data);
            self.port.release(Clock);
            self.wait_atn_release();
            trace!("ATN released");
            AtnCheck::Idle
        };

        // Some delay is required before more ATN business can take place.
        block_us!(ATN_DELAY);

        Ok(ret)
    }

    fn receive(&mut self) -> Result<u8, DriverError> {
        self.receive_byte()
    }

    fn send(&mut self, byte: u8) -> Result<(), DriverError> {
        self.send_byte(byte, false)
    }

    /// Send the final byte EOI-marked, then hand the bus back.
    fn send_eoi(&mut self, byte: u8) -> Result<(), DriverError> {
        self.send_byte(byte, true)?;
        self.undo_turn_around()
    }

    /// File not found is signalled by just releasing the lines - the
    /// protocol has no negative acknowledgement, so "no response" is the
    /// message.
    fn send_fnf(&mut self) {
        self.port.release(Data);
        self.port.release(Clock);
        block_us!(FNF_DELAY);
        debug!("file not found signalled");
    }

    fn flags(&self) -> BusFlags {
        self.flags
    }

    fn enable_device(&mut self, device: u8) {
        if device <= MAX_DEVICE_NUMBER {
            self.enabled |= 1 << device;
        }
    }

    fn disable_device(&mut self, device: u8) {
        if device <= MAX_DEVICE_NUMBER {
            self.enabled &= !(1 << device);
        }
    }

    fn is_device_enabled(&self, device: u8) -> bool {
        device <= MAX_DEVICE_NUMBER && (self.enabled & (1 << device)) != 0
    }
}
