//! The virtual drive: decodes the bus engine's command primitives into
//! filesystem operations and generates the byte streams the computer
//! expects back.
//!
//! [`Drive::service`] is called from a tight poll loop.  Each call checks
//! for an attention sequence and, when one addressed us, runs the whole
//! resulting transaction (OPEN classification, a TALK data phase, a save,
//! a close) before returning.  The drive never touches bus lines - it
//! only speaks through the [`BusDriver`] primitives - and holds no file
//! handles across calls.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

#[allow(unused_imports)]
use crate::fmt::{debug, info, trace, warn};

use core::fmt::Write;
use heapless::String;

use crate::built;
use crate::constants::{
    C64_BASIC_START, CMD_CHANNEL, DIR_FREE_BLOCKS, FILENAME_MAX, FILETYPE_MAX, FULLPATH_MAX,
    IMAGE_TYPES, LED_TOGGLE_BYTES, LINE_MAX, PATH_MAX, STATUS_OK, TRANSFER_CHUNK, URL_MAX,
    WRITE_CHANNEL,
};
use crate::devicedb::DeviceDb;
use crate::driver::{BusDriver, DriverError};
use crate::fs::FileSystem;
use crate::led::StatusLed;
use crate::protocol::{ATN_CLOSE, ATN_DATA, ATN_OPEN, AtnCheck, AtnCommand, BusFlags};
use crate::util::{extension, starts_with, trim};

/// What the next TALK on a data channel will stream.  Single-slot: one
/// open logical file context at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenState {
    Nothing,
    Info,
    File,
    Dir,
    FileError,
    SaveReplace,
    DeviceInfo,
    DeviceStatus,
}

/// DOS status queued for the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DosStatus {
    Ok,
    /// Power-up state, nothing dispatched yet.
    Intro,
    NotFound,
    WriteProtect,
    Comm,
}

/// A virtual IEC disk drive over a bus engine, a filesystem and an LED.
pub struct Drive<B, F, L> {
    bus: B,
    fs: F,
    led: L,
    db: DeviceDb,
    cmd: AtnCommand,
    open_state: OpenState,
    queued: DosStatus,
    filename: String<FILENAME_MAX>,
    filetype: String<FILETYPE_MAX>,
}

impl<B: BusDriver, F: FileSystem, L: StatusLed> Drive<B, F, L> {
    pub fn new(mut bus: B, fs: F, led: L, device_number: u8) -> Self {
        bus.enable_device(device_number);
        Self {
            bus,
            fs,
            led,
            db: DeviceDb::new(),
            cmd: AtnCommand::new(),
            open_state: OpenState::Nothing,
            queued: DosStatus::Intro,
            filename: String::new(),
            filetype: String::new(),
        }
    }

    /// Clear per-transaction state after an error or a close.
    pub fn reset(&mut self) {
        self.open_state = OpenState::Nothing;
        self.queued = DosStatus::Intro;
    }

    pub fn open_state(&self) -> OpenState {
        self.open_state
    }

    pub fn queued_status(&self) -> DosStatus {
        self.queued
    }

    /// Poll the bus once.  Returns quickly when idle; otherwise blocks
    /// for the full transaction the attention sequence started.
    pub fn service(&mut self) {
        let check = match self.bus.check_attention(&mut self.cmd) {
            Ok(c) => c,
            Err(_) => {
                debug!("attention error, resetting");
                self.reset();
                return;
            }
        };

        if check == AtnCheck::Idle {
            return;
        }

        match self.cmd.command {
            ATN_OPEN => {
                debug!("OPEN channel {}", self.cmd.channel);
                self.handle_open();
            }

            ATN_DATA => match check {
                AtnCheck::CommandTalk => {
                    // Command-channel reads may carry a command of their
                    // own; dispatch it before answering.
                    if self.cmd.channel == CMD_CHANNEL && !self.cmd.string.is_empty() {
                        self.handle_open();
                    }
                    self.handle_data_talk(self.cmd.channel);
                }
                AtnCheck::CommandListen => self.handle_data_listen(),
                AtnCheck::Command => self.handle_open(),
                AtnCheck::Idle => {}
            },

            ATN_CLOSE => {
                debug!("CLOSE channel {}", self.cmd.channel);
                self.handle_close();
            }

            other => {
                trace!("no action for command 0x{:02x}", other);
            }
        }
    }

    /// Decode an OPEN: parse the filename out of the command string and
    /// classify what the subsequent TALK or LISTEN should do.
    fn handle_open(&mut self) {
        self.db.select(self.cmd.device);

        let mut name: String<FILENAME_MAX> = String::new();
        let _ = name.push_str(trim(self.cmd.text()));

        let mut ext_buf = [0u8; FILETYPE_MAX];
        let ext = extension(&name, &mut ext_buf);
        self.filetype.clear();
        let _ = self.filetype.push_str(ext);

        self.filename.clear();
        let _ = self.filename.push_str(&name);

        if name.starts_with('$') {
            self.open_state = OpenState::Dir;
        } else if !ext.is_empty() && IMAGE_TYPES.contains(&ext) {
            info!("mount image");
            let _ = self.db.set_image(&name);
            self.open_state = OpenState::Dir;
        } else if starts_with(&name, "HTTP://") || starts_with(&name, "TNFS://") {
            info!("mount url");
            self.db.set_partition(0);
            let _ = self.db.set_url(&name[7..]);
            let _ = self.db.set_path("/");
            let _ = self.db.set_image("");
            self.open_state = OpenState::Dir;
        } else if starts_with(&name, "CD") {
            self.handle_cd(&name, ext);
            if self.cmd.channel == 0 {
                self.open_state = OpenState::Dir;
            }
        } else if starts_with(&name, "@INFO") {
            self.filename.clear();
            self.open_state = OpenState::DeviceInfo;
        } else if starts_with(&name, "@STAT") {
            self.filename.clear();
            self.open_state = OpenState::DeviceStatus;
        } else if let Some(rest) = name.strip_prefix("@:") {
            // Save-with-replace.
            self.filename.clear();
            let _ = self.filename.push_str(rest);
            self.open_state = OpenState::SaveReplace;
        } else if name.is_empty() {
            self.open_state = OpenState::Info;
        } else if self.cmd.channel == WRITE_CHANNEL {
            self.open_state = OpenState::File;
        } else {
            let path = self.resolve_path();
            self.open_state = if name.ends_with('*') || self.fs.exists(&path) {
                OpenState::File
            } else {
                self.queued = DosStatus::NotFound;
                OpenState::FileError
            };
        }

        if self.open_state == OpenState::Dir {
            self.filename.clear();
            let _ = self.filename.push('$');
            self.filetype.clear();
            self.cmd.clear_string();
        }

        debug!("open state {:?}", self.open_state);
    }

    /// `CD` navigation: `CD_` backs out of an image, a mount or a
    /// directory; `CD//` returns to the root first; `CD:<name>` enters a
    /// directory or mounts an image by extension.
    fn handle_cd(&mut self, name: &str, ext: &str) {
        if name.ends_with('_') {
            if !self.db.image().is_empty() {
                let _ = self.db.set_image("");
            } else if !self.db.url().is_empty() && self.db.path() == "/" {
                let _ = self.db.set_url("");
            } else {
                self.db.leave_dir();
            }
            return;
        }

        if name.len() <= 3 {
            return;
        }

        let rest = if starts_with(name, "CD//") {
            self.db.root();
            let _ = self.db.set_image("");
            &name[4..]
        } else {
            &name[3..]
        };

        if !ext.is_empty() && IMAGE_TYPES.contains(&ext) {
            let _ = self.db.set_image(rest);
        } else if !rest.is_empty() {
            let _ = self.db.enter_dir(rest);
        }
    }

    /// A TALK data phase: status on the command channel, otherwise
    /// whatever the preceding OPEN selected.
    fn handle_data_talk(&mut self, channel: u8) {
        debug!("data talk, channel {} state {:?}", channel, self.open_state);

        if channel == CMD_CHANNEL {
            if let Err(_e) = self.send_status() {
                debug!("status send failed");
            }
            // The error has been dispatched to the computer.
            self.queued = DosStatus::Ok;
            return;
        }

        let result = match self.open_state {
            OpenState::Nothing | OpenState::FileError | OpenState::SaveReplace => {
                self.bus.send_fnf();
                Ok(())
            }
            OpenState::Info => {
                self.reset();
                self.send_listing()
            }
            OpenState::File => self.send_file(),
            OpenState::Dir => self.send_listing(),
            OpenState::DeviceInfo => self.send_device_info(),
            OpenState::DeviceStatus => self.send_device_status(),
        };

        if result.is_err() {
            debug!("data talk aborted");
        }
    }

    /// A LISTEN data phase: receive a save payload until EOI and write it
    /// out.
    fn handle_data_listen(&mut self) {
        let replace = self.open_state == OpenState::SaveReplace;
        let path = self.resolve_path();
        debug!("save, open state {:?}", self.open_state);

        if self.filename.is_empty() {
            warn!("save with no filename");
            self.queued = DosStatus::NotFound;
            self.drain_payload();
            return;
        }

        if replace {
            let _ = self.fs.remove(&path);
        }

        if self.fs.create(&path).is_err() {
            warn!("save target not writable");
            self.queued = DosStatus::WriteProtect;
            self.drain_payload();
            return;
        }

        self.led.set(true);
        let mut buf = [0u8; TRANSFER_CHUNK];
        let mut fill = 0usize;
        let mut count = 0usize;

        let status = loop {
            match self.bus.receive() {
                Ok(b) => {
                    buf[fill] = b;
                    fill += 1;
                    count += 1;

                    if fill == buf.len() {
                        if self.fs.append(&path, &buf).is_err() {
                            break DosStatus::WriteProtect;
                        }
                        fill = 0;
                    }

                    if count % LED_TOGGLE_BYTES == 0 {
                        self.led.toggle();
                    }

                    if self.bus.flags().contains(BusFlags::EOI) {
                        break DosStatus::Ok;
                    }
                }
                Err(_) => {
                    warn!("save aborted mid-stream");
                    break DosStatus::Comm;
                }
            }
        };

        if fill > 0 && status == DosStatus::Ok && self.fs.append(&path, &buf[..fill]).is_err() {
            self.queued = DosStatus::WriteProtect;
        } else {
            self.queued = status;
        }

        info!("saved {} bytes", count);
        self.led.set(true);
    }

    fn handle_close(&mut self) {
        self.filename.clear();
        self.filetype.clear();
        self.open_state = OpenState::Nothing;
    }

    // A failed save still has to let the computer finish its transfer;
    // consume and discard the payload.
    fn drain_payload(&mut self) {
        loop {
            match self.bus.receive() {
                Ok(_) => {
                    if self.bus.flags().contains(BusFlags::EOI) {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// The fixed status-channel string, last byte EOI-marked.
    fn send_status(&mut self) -> Result<(), DriverError> {
        debug!("send status");
        let status = STATUS_OK.as_bytes();
        for b in &status[..status.len() - 1] {
            self.bus.send(*b)?;
        }
        self.bus.send_eoi(status[status.len() - 1])
    }

    /// Send one BASIC line: next-line pointer, line-number field, text,
    /// terminator.  The pointer advances by text length plus the five
    /// framing bytes.
    fn send_line(&mut self, basic_ptr: &mut u16, blocks: u16, text: &str) -> Result<(), DriverError> {
        *basic_ptr += text.len() as u16 + 5;

        self.bus.send((*basic_ptr & 0xFF) as u8)?;
        self.bus.send((*basic_ptr >> 8) as u8)?;
        self.bus.send((blocks & 0xFF) as u8)?;
        self.bus.send((blocks >> 8) as u8)?;

        for b in text.bytes() {
            self.bus.send(b)?;
        }

        self.bus.send(0)
    }

    /// The reverse-video volume banner plus any mount info lines.
    fn send_header(&mut self, basic_ptr: &mut u16) -> Result<(), DriverError> {
        let mut line: String<LINE_MAX> = String::new();
        let _ = write!(line, "\x12\"{:<16}\" {:02} 2A", "PICODISK", self.db.device());
        self.send_line(basic_ptr, 0, &line)?;

        let url: String<URL_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(self.db.url());
            s
        };
        let path: String<PATH_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(self.db.path());
            s
        };

        if !url.is_empty() {
            for text in ["[URL]", url.as_str()] {
                line.clear();
                let _ = write!(line, "{:3}\"{:<16.16}\" NFO", "", text);
                self.send_line(basic_ptr, 0, &line)?;
            }
        }
        if path.len() > 1 {
            for text in ["[PATH]", path.as_str()] {
                line.clear();
                let _ = write!(line, "{:3}\"{:<16.16}\" NFO", "", text);
                self.send_line(basic_ptr, 0, &line)?;
            }
        }
        if !url.is_empty() || path.len() > 1 {
            line.clear();
            let _ = write!(line, "{:3}\"----------------\" NFO", "");
            self.send_line(basic_ptr, 0, &line)?;
        }

        Ok(())
    }

    fn send_footer(&mut self, basic_ptr: &mut u16) -> Result<(), DriverError> {
        self.send_line(basic_ptr, DIR_FREE_BLOCKS, "BLOCKS FREE.")
    }

    /// Stream the working directory as a BASIC program listing.
    fn send_listing(&mut self) -> Result<(), DriverError> {
        info!("send listing");
        self.led.set(true);

        let mut basic_ptr = C64_BASIC_START;
        self.bus.send((C64_BASIC_START & 0xFF) as u8)?;
        self.bus.send((C64_BASIC_START >> 8) as u8)?;

        self.send_header(&mut basic_ptr)?;

        let path: String<PATH_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(self.db.path());
            s
        };

        let mut index = 0;
        loop {
            let entry = match self.fs.dir_entry(&path, index) {
                Ok(Some(e)) => e,
                Ok(None) => break,
                Err(_) => {
                    warn!("directory enumeration failed");
                    break;
                }
            };
            index += 1;

            let blocks = (entry.size / 256).min(u16::MAX as u32) as u16;
            let mut block_spc = 3usize;
            if blocks > 9 {
                block_spc -= 1;
            }
            if blocks > 99 {
                block_spc -= 1;
            }
            if blocks > 999 {
                block_spc -= 1;
            }

            let space_cnt = 21usize.saturating_sub(entry.name.len() + 5);

            let mut ext_buf = [0u8; FILETYPE_MAX];
            let ext = if entry.size == 0 {
                "DIR"
            } else {
                match extension(&entry.name, &mut ext_buf) {
                    "" => "PRG",
                    e => e,
                }
            };

            let mut line: String<LINE_MAX> = String::new();
            let _ = write!(
                line,
                "{:bw$}\"{}\"{:sw$} {:>3}",
                "",
                entry.name,
                "",
                ext,
                bw = block_spc,
                sw = space_cnt,
            );
            self.send_line(&mut basic_ptr, blocks, &line)?;
            self.led.toggle();
        }

        self.send_footer(&mut basic_ptr)?;

        // End the program with two zeros; the last goes out with EOI.
        self.bus.send(0)?;
        self.bus.send_eoi(0)?;

        self.led.set(true);
        Ok(())
    }

    /// Stream the opened file.  A missing or empty file answers with the
    /// file-not-found silence.
    fn send_file(&mut self) -> Result<(), DriverError> {
        if self.filename.ends_with('*') {
            // Wildcard: the first thing in the working directory.
            let path: String<PATH_MAX> = {
                let mut s = String::new();
                let _ = s.push_str(self.db.path());
                s
            };
            if let Ok(Some(first)) = self.fs.dir_entry(&path, 0) {
                self.filename = first.name;
            }
        }

        let path = self.resolve_path();
        let len = match self.fs.file_size(&path) {
            Ok(0) | Err(_) => {
                info!("file not found");
                self.queued = DosStatus::NotFound;
                self.bus.send_fnf();
                return Ok(());
            }
            Ok(len) => len,
        };

        info!("send file, {} bytes", len);
        self.led.set(true);

        let mut buf = [0u8; TRANSFER_CHUNK];
        let mut sent: u32 = 0;
        while sent < len {
            let n = match self.fs.read_at(&path, sent, &mut buf) {
                Ok(0) | Err(_) => {
                    warn!("read failed mid-file at {}", sent);
                    return Err(DriverError::Io);
                }
                Ok(n) => n,
            };

            for (i, b) in buf[..n].iter().enumerate() {
                let at = sent + i as u32;
                if at == len - 1 {
                    self.bus.send_eoi(*b)?;
                } else {
                    self.bus.send(*b)?;
                }
                if at as usize % LED_TOGGLE_BYTES == 0 {
                    self.led.toggle();
                }
            }
            sent += n as u32;
        }

        info!("sent {} bytes", sent);
        self.led.set(true);
        Ok(())
    }

    /// The `@INFO` page: firmware build information as a BASIC listing.
    fn send_device_info(&mut self) -> Result<(), DriverError> {
        info!("send device info");

        let mut basic_ptr = C64_BASIC_START;
        self.bus.send((C64_BASIC_START & 0xFF) as u8)?;
        self.bus.send((C64_BASIC_START >> 8) as u8)?;

        let mut line: String<LINE_MAX> = String::new();
        let _ = write!(line, "\x12 PICODISK V{} ", built::PKG_VERSION);
        self.send_line(&mut basic_ptr, 0, &line)?;

        self.send_line(&mut basic_ptr, 0, "SYSTEM ---")?;
        for (label, value) in [
            ("RUSTC  ", built::RUSTC_VERSION),
            ("TARGET ", built::TARGET),
            ("PROFILE", built::PROFILE),
        ] {
            line.clear();
            let _ = write!(line, "{} : {}", label, value);
            self.send_line(&mut basic_ptr, 0, &line)?;
        }

        self.bus.send(0)?;
        self.bus.send_eoi(0)?;

        self.led.set(true);
        Ok(())
    }

    /// The `@STAT` page: the selected device record and open context.
    fn send_device_status(&mut self) -> Result<(), DriverError> {
        info!("send device status");

        let mut basic_ptr = C64_BASIC_START;
        self.bus.send((C64_BASIC_START & 0xFF) as u8)?;
        self.bus.send((C64_BASIC_START >> 8) as u8)?;

        let mut line: String<LINE_MAX> = String::new();
        let _ = write!(line, "\x12 PICODISK V{} ", built::PKG_VERSION);
        self.send_line(&mut basic_ptr, 0, &line)?;

        let device = self.db.device();
        let drive = self.db.drive();
        let partition = self.db.partition();
        let url: String<URL_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(self.db.url());
            s
        };
        let path: String<PATH_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(self.db.path());
            s
        };
        let image: String<FILENAME_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(self.db.image());
            s
        };
        let filename: String<FILENAME_MAX> = {
            let mut s = String::new();
            let _ = s.push_str(&self.filename);
            s
        };

        for (label, value) in [
            ("DEVICE   ", device),
            ("DRIVE    ", drive),
            ("PARTITION", partition),
        ] {
            line.clear();
            let _ = write!(line, "{}: {}", label, value);
            self.send_line(&mut basic_ptr, 0, &line)?;
        }
        for (label, value) in [
            ("URL      ", url.as_str()),
            ("PATH     ", path.as_str()),
            ("IMAGE    ", image.as_str()),
            ("FILENAME ", filename.as_str()),
        ] {
            line.clear();
            let _ = write!(line, "{}: {:.64}", label, value);
            self.send_line(&mut basic_ptr, 0, &line)?;
        }

        self.bus.send(0)?;
        self.bus.send_eoi(0)?;

        self.led.set(true);
        Ok(())
    }

    fn resolve_path(&self) -> String<FULLPATH_MAX> {
        let mut path = String::new();
        let _ = path.push_str(self.db.path());
        let _ = path.push_str(&self.filename);
        path
    }
}
