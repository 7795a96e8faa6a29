//! This file handles build-time information.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::fmt::{debug, info, trace, warn};

// Import the build-time information from the `built.rs` output file
// generated during the build process by `build.rs`.
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Expose version information so it can be used in the application - the
// startup log and the device-info page both report it.
pub use built_info::PKG_VERSION;
pub use built_info::PROFILE;
pub use built_info::RUSTC_VERSION;
pub use built_info::TARGET;

/// Log build-time information to the console.
#[allow(dead_code)]
pub fn log_fw_info() {
    info!("{} V{}", built_info::PKG_NAME, built_info::PKG_VERSION);
    info!("Git commit: {}", built_info::GIT_COMMIT_HASH.unwrap_or("unknown"));
    info!("Built: {}", built_info::BUILT_TIME_UTC);
    info!("Rust version: {}", built_info::RUSTC_VERSION);
    info!("Target triple: {}", built_info::TARGET);
    info!("Build profile: {}", built_info::PROFILE);
}
