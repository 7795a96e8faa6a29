//! picodisk
//!
//! This implements a Commodore IEC serial-bus peripheral - a virtual disk
//! drive.  It attaches to the bus as a numbered device, answers the
//! computer's ATN command sequences, serves directory listings in the C64
//! BASIC tokenized-listing format, and LOADs/SAVEs files against a
//! pluggable filesystem.
//!
//! The protocol core (everything except [`gpio`], [`led`]'s hardware half
//! and the firmware binary) is hardware-free and unit-tests on the host
//! against a simulated bus.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#![cfg_attr(not(test), no_std)]

// Provide some feature guidance when compiling the library.
#[cfg(all(feature = "pico", feature = "pico2"))]
compile_error!("Features 'pico' and 'pico2' cannot be enabled simultaneously");
#[cfg(all(feature = "hw", not(any(feature = "pico", feature = "pico2"))))]
compile_error!("The 'hw' feature requires either 'pico' or 'pico2'");

// Declare all of this library's modules.
pub(crate) mod fmt;

pub mod built;
pub mod constants;
pub mod devicedb;
pub mod drive;
pub mod driver;
pub mod fs;
#[cfg(feature = "hw")]
pub mod gpio;
pub mod led;
pub mod protocol;
pub mod util;

#[cfg(test)]
mod test;
