//! picodisk firmware entry point.
//!
//! Brings up the IEC port, builds the drive over the built-in ROM volume
//! and polls the bus.  The loop yields briefly between idle polls;
//! everything inside a bus transaction blocks, as the protocol timing
//! requires.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#![no_std]
#![no_main]

use defmt::info;
use defmt_rtt as _;
use panic_probe as _;

use embassy_executor::Spawner;
use embassy_rp::gpio::{Flex, Level, Output};
use embassy_time::Timer;

use picodisk_rs::constants::{DEFAULT_DEVICE_NUMBER, SERVICE_LOOP_TIMER};
use picodisk_rs::drive::Drive;
use picodisk_rs::fs::{RomEntry, RomFileSystem};
use picodisk_rs::gpio::{IecPort, Line};
use picodisk_rs::led::ActivityLed;
use picodisk_rs::protocol::IecBus;

// Extra binary information that picotool can read.
#[unsafe(link_section = ".bi_entries")]
#[used]
pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
    embassy_rp::binary_info::rp_program_name!(c"picodisk"),
    embassy_rp::binary_info::rp_program_description!(
        c"A Commodore IEC serial-bus disk drive emulator."
    ),
    embassy_rp::binary_info::rp_cargo_version!(),
    embassy_rp::binary_info::rp_program_build_attribute!(),
];

// The built-in volume, served until external storage is wired in.
// HELLO is `10 PRINT "PICODISK"` as a tokenized BASIC program.
static ROM_VOLUME: &[RomEntry] = &[RomEntry {
    name: "HELLO",
    data: &[
        0x01, 0x08, 0x12, 0x08, 0x0A, 0x00, 0x99, 0x20, 0x22, 0x50, 0x49, 0x43, 0x4F, 0x44, 0x49,
        0x53, 0x4B, 0x22, 0x00, 0x00, 0x00,
    ],
}];

#[embassy_executor::main]
async fn main(_spawner: Spawner) -> ! {
    let p = embassy_rp::init(Default::default());

    picodisk_rs::built::log_fw_info();

    // IEC lines as input/output pin pairs - see gpio::pins for the map.
    let atn = Line::new(Flex::new(p.PIN_17), Flex::new(p.PIN_12));
    let clock = Line::new(Flex::new(p.PIN_19), Flex::new(p.PIN_11));
    let data = Line::new(Flex::new(p.PIN_20), Flex::new(p.PIN_13));
    let srq = Line::new(Flex::new(p.PIN_16), Flex::new(p.PIN_14));
    let port = IecPort::new(atn, clock, data, srq);

    let led = ActivityLed::new(Output::new(p.PIN_25, Level::Low));
    let fs = RomFileSystem::new(ROM_VOLUME);

    let mut drive = Drive::new(IecBus::new(port), fs, led, DEFAULT_DEVICE_NUMBER);

    info!("serving as device {}", DEFAULT_DEVICE_NUMBER);

    loop {
        drive.service();
        Timer::after(SERVICE_LOOP_TIMER).await;
    }
}
