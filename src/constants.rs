//! This module contains product constants for picodisk.
//!
//! Wire-level protocol timings live in [`crate::util::time::iec`]; what is
//! here is the device-level configuration: device numbering, channel
//! assignments, buffer bounds and the firmware loop cadence.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use embassy_time::Duration;
use static_assertions::const_assert;

/// The device number this drive answers to by default.  8 is the first
/// Commodore drive number; the firmware may enable further numbers at
/// runtime via the bus engine's device mask.
pub const DEFAULT_DEVICE_NUMBER: u8 = 8;

/// Highest device number the bus supports (5 bits in the LISTEN/TALK
/// address byte, 31 reserved for open-ended addressing).
pub const MAX_DEVICE_NUMBER: u8 = 30;

//
// Channel assignments.  A channel is the 4-bit secondary address
// multiplexing logical streams over one device address.
//

/// Channel the computer LOADs through.
pub const READ_CHANNEL: u8 = 0;

/// Channel the computer SAVEs through.
pub const WRITE_CHANNEL: u8 = 1;

/// The command/status channel.
pub const CMD_CHANNEL: u8 = 15;

/// Start of BASIC memory on the C64; directory listings and program
/// streams begin with this address, little-endian.
pub const C64_BASIC_START: u16 = 0x0801;

/// Fixed status-channel response.  The last byte goes out EOI-marked.
pub const STATUS_OK: &str = "00, OK, 00, 08";

/// Block count reported on the listing footer line.  A real drive reports
/// free blocks on the mounted disk; with a pluggable backing filesystem
/// there is no fixed geometry, so the footer advertises the maximum.
pub const DIR_FREE_BLOCKS: u16 = 65535;

//
// Buffer bounds.  All protocol-facing buffers are fixed-size with explicit
// overflow errors - no heap, no silent truncation.
//

/// Maximum ATN command string length (e.g. a filename following OPEN).
/// Overflow is a hard protocol error.
pub const ATN_CMD_MAX_LEN: usize = 40;

/// Maximum filename length the dispatch layer tracks.
pub const FILENAME_MAX: usize = 40;

/// Maximum file-type (extension) length.
pub const FILETYPE_MAX: usize = 8;

/// Maximum mount URL length.
pub const URL_MAX: usize = 64;

/// Maximum mount path length.
pub const PATH_MAX: usize = 128;

/// Maximum resolved path + filename length.
pub const FULLPATH_MAX: usize = PATH_MAX + FILENAME_MAX;

/// Formatted listing line bound: quoted 16-char filename plus padding and
/// the 3-char type column fit well inside this.
pub const LINE_MAX: usize = 80;

/// Chunk size for file streaming between the filesystem collaborator and
/// the bus.
pub const TRANSFER_CHUNK: usize = 256;

/// Number of device records the DeviceDB holds; records are assigned to
/// consecutive device numbers starting at [`DEVICE_DB_BASE`].
pub const DEVICE_DB_SLOTS: usize = 4;

/// First device number with a DeviceDB record.
pub const DEVICE_DB_BASE: u8 = 8;

/// Image file extensions that mount rather than LOAD.
pub const IMAGE_TYPES: &[&str] = &[
    "D64", "D71", "D80", "D81", "D82", "G64", "X64", "Z64", "TAP", "T64", "CRT", "M2I",
];

/// How many streamed bytes between activity-LED toggles.
pub const LED_TOGGLE_BYTES: usize = 50;

/// How long the firmware loop yields to the executor between idle bus
/// polls.  Short, so the ATN response stays well inside the computer's
/// 1ms attention window.
pub const SERVICE_LOOP_TIMER: Duration = Duration::from_micros(50);

// A filename must fit in the ATN command buffer that carries it, and a
// full command string must fit in one transfer chunk.
const_assert!(FILENAME_MAX >= ATN_CMD_MAX_LEN);
const_assert!(TRANSFER_CHUNK >= ATN_CMD_MAX_LEN);
