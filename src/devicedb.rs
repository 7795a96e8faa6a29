//! Per-device mount records.
//!
//! Each device number this firmware answers for has a record describing
//! what it is currently serving: a partition, an optional mount URL, the
//! working path and an optional mounted image.  The dispatch layer
//! selects the record addressed by each ATN sequence and reads/writes it
//! through the accessors here - this is the contract a persistence layer
//! would implement behind the same surface.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::fmt::{debug, info, trace, warn};

use heapless::String;

use crate::constants::{DEVICE_DB_BASE, DEVICE_DB_SLOTS, FILENAME_MAX, PATH_MAX, URL_MAX};

/// One device's mount context.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    device: u8,
    drive: u8,
    partition: u8,
    url: String<URL_MAX>,
    path: String<PATH_MAX>,
    image: String<FILENAME_MAX>,
}

impl DeviceRecord {
    fn new(device: u8) -> Self {
        let mut path = String::new();
        let _ = path.push('/');
        Self {
            device,
            drive: 0,
            partition: 0,
            url: String::new(),
            path,
            image: String::new(),
        }
    }
}

/// The record table.  Records cover device numbers
/// [`DEVICE_DB_BASE`]..[`DEVICE_DB_BASE`]+[`DEVICE_DB_SLOTS`]; selecting a
/// number outside that range falls back to the first record.
pub struct DeviceDb {
    records: [DeviceRecord; DEVICE_DB_SLOTS],
    current: usize,
}

impl DeviceDb {
    pub fn new() -> Self {
        Self {
            records: core::array::from_fn(|i| DeviceRecord::new(DEVICE_DB_BASE + i as u8)),
            current: 0,
        }
    }

    /// Select the record for a device number.
    pub fn select(&mut self, device: u8) {
        let slot = device.wrapping_sub(DEVICE_DB_BASE) as usize;
        if slot < DEVICE_DB_SLOTS {
            self.current = slot;
        } else {
            warn!("no record for device {}, using first", device);
            self.current = 0;
        }
    }

    fn rec(&self) -> &DeviceRecord {
        &self.records[self.current]
    }

    fn rec_mut(&mut self) -> &mut DeviceRecord {
        &mut self.records[self.current]
    }

    pub fn device(&self) -> u8 {
        self.rec().device
    }

    pub fn drive(&self) -> u8 {
        self.rec().drive
    }

    pub fn partition(&self) -> u8 {
        self.rec().partition
    }

    pub fn set_partition(&mut self, partition: u8) {
        self.rec_mut().partition = partition;
    }

    pub fn url(&self) -> &str {
        self.rec().url.as_str()
    }

    /// Set the mount URL.  Overlong values are rejected, not truncated.
    pub fn set_url(&mut self, url: &str) -> bool {
        let rec = self.rec_mut();
        rec.url.clear();
        rec.url.push_str(url).is_ok()
    }

    pub fn path(&self) -> &str {
        self.rec().path.as_str()
    }

    pub fn set_path(&mut self, path: &str) -> bool {
        let rec = self.rec_mut();
        rec.path.clear();
        rec.path.push_str(path).is_ok()
    }

    pub fn image(&self) -> &str {
        self.rec().image.as_str()
    }

    pub fn set_image(&mut self, image: &str) -> bool {
        let rec = self.rec_mut();
        rec.image.clear();
        rec.image.push_str(image).is_ok()
    }

    /// Descend into a subdirectory: append `name/` to the path.
    pub fn enter_dir(&mut self, name: &str) -> bool {
        let rec = self.rec_mut();
        let ok = rec.path.push_str(name).is_ok() && rec.path.push('/').is_ok();
        if !ok {
            warn!("path too long entering directory");
        }
        ok
    }

    /// Go up one directory.  At the root this is a no-op.
    pub fn leave_dir(&mut self) {
        let rec = self.rec_mut();
        let p = rec.path.as_str();
        // Find the slash that ends the parent, skipping the trailing one.
        let trimmed = p.strip_suffix('/').unwrap_or(p);
        let cut = match trimmed.rfind('/') {
            Some(pos) => pos + 1,
            None => return,
        };
        rec.path.truncate(cut);
        if rec.path.is_empty() {
            let _ = rec.path.push('/');
        }
    }

    /// Reset the path to the root.
    pub fn root(&mut self) {
        let rec = self.rec_mut();
        rec.path.clear();
        let _ = rec.path.push('/');
    }
}

impl Default for DeviceDb {
    fn default() -> Self {
        Self::new()
    }
}
