//! Logging macros that forward to defmt when the `defmt` feature is
//! enabled (firmware builds, RTT transport) and compile to nothing
//! otherwise, so the protocol core links on the host without a global
//! logger.  This is the same shim idiom the embassy crates use.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($($arg)*);
    }};
}
pub(crate) use trace;

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($($arg)*);
    }};
}
pub(crate) use debug;

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($($arg)*);
    }};
}
pub(crate) use info;

macro_rules! warn_ {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($($arg)*);
    }};
}
pub(crate) use warn_ as warn;

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)*);
        #[cfg(not(feature = "defmt"))]
        let _ = ($($arg)*);
    }};
}
#[allow(unused_imports)]
pub(crate) use error;
