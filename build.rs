//! This build script handles:
//! - Exposing build-time information to the application.
//! - Copying `memory.x` to the output directory to allow the firmware to be
//!   created.
//!
//! The memory.x and linker argument handling only applies to firmware
//! builds (`pico`/`pico2` features); host builds of the protocol core need
//! neither.

// memory.x handling derived from embassy-rs examples.

#[cfg(any(feature = "pico", feature = "pico2"))]
use std::{env, fs::File, io::Write, path::PathBuf};

fn main() {
    // Re-run this build script if anything in git changes.
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");

    // Re-run this build script if DEFMT_LOG changes.
    println!("cargo:rerun-if-env-changed=DEFMT_LOG");

    // Get build-time information
    built::write_built_file().expect("Failed to acquire build-time information");

    // RP2040 and RP235X use different memory.x files.  Neither file is
    // called memory.x in-tree, as then the linker would pick up that file
    // from the root directory instead of the version we put in OUT_DIR.
    #[cfg(feature = "pico")]
    let memory_x = {
        println!("cargo:rerun-if-changed=link/memory.rp2040.x");
        include_bytes!("link/memory.rp2040.x").as_slice()
    };
    #[cfg(all(feature = "pico2", not(feature = "pico")))]
    let memory_x = {
        println!("cargo:rerun-if-changed=link/memory.rp235x.x");
        include_bytes!("link/memory.rp235x.x").as_slice()
    };

    #[cfg(any(feature = "pico", feature = "pico2"))]
    {
        // Put `memory.x` in our output directory and ensure it's on the
        // linker search path.
        let out = &PathBuf::from(env::var_os("OUT_DIR").unwrap());
        File::create(out.join("memory.x"))
            .unwrap()
            .write_all(memory_x)
            .unwrap();
        println!("cargo:rustc-link-search={}", out.display());

        // Set embassy linker arguments for the firmware binary.
        println!("cargo:rustc-link-arg-bins=--nmagic");
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
        println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

        // Only RP2040 uses this linker file.
        #[cfg(feature = "pico")]
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    }
}
