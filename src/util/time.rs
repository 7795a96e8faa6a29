//! Blocking timing primitives used by the protocol engine.
//!
//! The IEC protocol is bit-banged: every delay below is a busy-wait over
//! the monotonic microsecond clock, never a yield to an executor.  A yield
//! could return late by whatever else was scheduled, and the bus timing
//! contracts (60us bit cells, 200us EOI window) do not tolerate that
//! jitter.  The firmware loop only yields *between* transactions.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use embassy_time::{Duration, Instant};

/// Block until a specific instant.
///
/// Always inlined to reduce call/return overhead, as this is used in
/// timing critical paths.
#[inline(always)]
pub fn block_until(expires: Instant) {
    while Instant::now() < expires {
        core::hint::spin_loop();
    }
}

/// Block for a specific Duration.
///
/// Always inlined to reduce call/return overhead, as this is used in
/// timing critical paths.
#[inline(always)]
pub fn block_for(duration: Duration) {
    block_until(Instant::now() + duration);
}

/// Block for a specific number of microseconds.
macro_rules! block_us {
    ($us:expr) => {
        crate::util::time::block_for(embassy_time::Duration::from_micros($us))
    };
}
pub(crate) use block_us;

/// Block for a specific number of milliseconds.
#[allow(unused_macros)]
macro_rules! block_ms {
    ($ms:expr) => {
        crate::util::time::block_for(embassy_time::Duration::from_millis($ms))
    };
}
#[allow(unused_imports)]
pub(crate) use block_ms;

/// Brief pause to let a bus line settle after driving or releasing it.
macro_rules! iec_delay {
    () => {
        crate::util::time::block_for(embassy_time::Duration::from_micros(2))
    };
}
pub(crate) use iec_delay;

pub mod iec {
    //! IEC protocol timings.
    //!
    //! These values are the wire contract with Commodore-compatible hosts
    //! and must not be tuned: a 1541, a C64 KERNAL and this firmware all
    //! count the same microseconds.

    /// Bit cell hold time - CLOCK is held in each half of a bit cell for
    /// this long (us).
    pub const BIT_TIME: u64 = 60;

    /// Talker delay between the ready handshake and the first bit when not
    /// signalling EOI (us).
    pub const NO_EOI_DELAY: u64 = 20;

    /// How long a talker leaves CLOCK released to signal EOI (us).
    pub const EOI_WAIT: u64 = 200;

    /// Listener-side EOI detection: CLOCK still released after this many
    /// polls of [`EOI_POLL_TICK`] means the talker is signalling EOI.
    pub const EOI_THRESH_TICKS: u32 = 20;

    /// Poll granularity for the EOI detection window (us).
    pub const EOI_POLL_TICK: u64 = 10;

    /// Line stabilization wait after the final byte of a transfer (us).
    pub const STABLE_WAIT: u64 = 20;

    /// Delay after grabbing the bus in response to ATN (us).
    pub const ATN_PREDELAY: u64 = 50;

    /// Delay required after an ATN sequence before more ATN business can
    /// take place (us).
    pub const ATN_DELAY: u64 = 100;

    /// Hold-back after signalling file-not-found by releasing the bus (us).
    pub const FNF_DELAY: u64 = 100;

    /// Poll granularity of the bounded line wait (us).  One tick of
    /// [`WAIT_TIMEOUT_TICKS`].
    pub const WAIT_POLL_TICK: u64 = 3;

    /// Bounded line-wait limit, in ticks of [`WAIT_POLL_TICK`] - just
    /// under 200ms.  A line transition that has not happened by then is
    /// never coming.
    pub const WAIT_TIMEOUT_TICKS: u32 = 65500;
}
