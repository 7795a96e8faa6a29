//! Various test objects for picodisk.
//!
//! The protocol engine is exercised on the host against a simulated
//! open-collector bus: each line is a wired-AND of per-party driver bits,
//! so a line reads pulled while *any* party drives it.  The computer side
//! of every handshake is scripted by a [`Controller`] running on its own
//! thread - the two threads stand in for the two ends of the cable, and
//! all synchronization happens through the bus lines themselves, exactly
//! as on real hardware.
//!
//! Timings are real: the controller holds the same 60us bit cells and
//! 200us EOI windows as a C64 would, and both sides spin-poll rather than
//! sleep so the handshakes stay inside their windows.

// Copyright (c) 2025 picodisk-rs contributors
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use embassy_time::{Duration, Instant};

use crate::fs::{DirEntry, FileSystem, FsError};
use crate::protocol::{BusPort, IecLine, LineState};
use crate::util::time::block_us;

// Driver bits: who is currently pulling a line low.
const DEVICE: u8 = 1 << 0;
const HOST: u8 = 1 << 1;

// How long a scripted wait may block before the test is declared dead.
const SCRIPT_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct SimLines {
    atn: AtomicU8,
    clock: AtomicU8,
    data: AtomicU8,
    srq: AtomicU8,
}

impl SimLines {
    fn cell(&self, line: IecLine) -> &AtomicU8 {
        match line {
            IecLine::Atn => &self.atn,
            IecLine::Clock => &self.clock,
            IecLine::Data => &self.data,
            IecLine::Srq => &self.srq,
        }
    }

    fn drive(&self, line: IecLine, who: u8) {
        self.cell(line).fetch_or(who, Ordering::SeqCst);
    }

    fn float(&self, line: IecLine, who: u8) {
        self.cell(line).fetch_and(!who, Ordering::SeqCst);
    }

    fn state(&self, line: IecLine) -> LineState {
        if self.cell(line).load(Ordering::SeqCst) != 0 {
            LineState::Pulled
        } else {
            LineState::Released
        }
    }

    fn held_by(&self, line: IecLine, who: u8) -> bool {
        self.cell(line).load(Ordering::SeqCst) & who != 0
    }
}

/// A simulated IEC bus shared between the engine under test and the
/// scripted controller.
pub struct SimBus {
    lines: Arc<SimLines>,
    device_mutations: Arc<AtomicUsize>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(SimLines::default()),
            device_mutations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The line port handed to the engine under test.
    pub fn device_port(&self) -> DevicePort {
        DevicePort {
            lines: self.lines.clone(),
            mutations: self.device_mutations.clone(),
        }
    }

    /// A controller handle for the computer side.
    pub fn host(&self) -> Controller {
        Controller {
            lines: self.lines.clone(),
        }
    }

    /// How many pull/release calls the device side has made.
    pub fn device_mutations(&self) -> usize {
        self.device_mutations.load(Ordering::SeqCst)
    }

    pub fn device_holds_clock(&self) -> bool {
        self.lines.held_by(IecLine::Clock, DEVICE)
    }

    pub fn device_holds_data(&self) -> bool {
        self.lines.held_by(IecLine::Data, DEVICE)
    }
}

/// The device side of the simulated bus - implements [`BusPort`] and
/// counts every line mutation so tests can assert non-interference.
pub struct DevicePort {
    lines: Arc<SimLines>,
    mutations: Arc<AtomicUsize>,
}

impl BusPort for DevicePort {
    fn pull(&mut self, line: IecLine) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.lines.drive(line, DEVICE);
    }

    fn release(&mut self, line: IecLine) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.lines.float(line, DEVICE);
    }

    fn status(&self, line: IecLine) -> LineState {
        self.lines.state(line)
    }
}

/// The computer side of the bus, with the line-level protocol a C64
/// KERNAL would drive.  All waits spin-poll with a hard deadline: a
/// handshake the device never completes panics the controller thread and
/// fails the test at join time.
#[derive(Clone)]
pub struct Controller {
    lines: Arc<SimLines>,
}

impl Controller {
    fn pull(&self, line: IecLine) {
        self.lines.drive(line, HOST);
    }

    fn release(&self, line: IecLine) {
        self.lines.float(line, HOST);
    }

    fn status(&self, line: IecLine) -> LineState {
        self.lines.state(line)
    }

    /// Spin until `line` reads `state`; panic when the deadline passes.
    fn wait_for(&self, line: IecLine, state: LineState) -> Instant {
        let deadline = Instant::now() + SCRIPT_DEADLINE;
        while self.status(line) != state {
            assert!(
                Instant::now() < deadline,
                "controller gave up waiting for {line:?} to go {state:?}"
            );
            std::hint::spin_loop();
        }
        Instant::now()
    }

    pub fn atn_pulled(&self) -> bool {
        self.status(IecLine::Atn) == LineState::Pulled
    }

    /// Start an attention sequence: assert ATN and CLOCK, then wait for a
    /// device to announce itself by pulling DATA.
    pub fn atn_begin(&self) {
        self.pull(IecLine::Atn);
        self.pull(IecLine::Clock);
        self.wait_for(IecLine::Data, LineState::Pulled);
    }

    /// End the attention phase but stay talker (e.g. before sending an
    /// OPEN filename).
    pub fn atn_release(&self) {
        self.release(IecLine::Atn);
    }

    /// End the attention sequence entirely (after UNLISTEN/UNTALK).
    pub fn atn_end(&self) {
        self.release(IecLine::Atn);
        self.release(IecLine::Clock);
    }

    /// Abandon an attention sequence without sending anything further.
    pub fn atn_abort(&self) {
        self.release(IecLine::Atn);
        self.release(IecLine::Clock);
    }

    /// End the attention phase and become listener (after TALK): hand
    /// CLOCK to the device and hold DATA.
    pub fn atn_to_listener(&self) {
        self.release(IecLine::Atn);
        self.release(IecLine::Clock);
        self.pull(IecLine::Data);
    }

    /// Re-take the bus as talker after a transfer from the device.
    pub fn retake_bus(&self) {
        self.pull(IecLine::Clock);
    }

    /// Observe the device grabbing CLOCK (turnaround).
    pub fn wait_for_clock_pulled(&self) {
        self.wait_for(IecLine::Clock, LineState::Pulled);
    }

    /// Observe the device letting CLOCK go (file-not-found silence).
    pub fn wait_for_clock_released(&self) {
        self.wait_for(IecLine::Clock, LineState::Released);
    }

    /// Stop driving everything.
    pub fn abandon(&self) {
        self.release(IecLine::Atn);
        self.release(IecLine::Clock);
        self.release(IecLine::Data);
    }

    /// Send one byte as talker, optionally signalling EOI first.  Assumes
    /// we currently hold CLOCK (from `atn_begin` or the previous byte).
    ///
    /// When signalling EOI this also *verifies* the listener's
    /// acknowledgement: DATA must pulse low for at least 40us before the
    /// transfer may continue.
    pub fn talker_send(&self, byte: u8, eoi: bool) {
        // Ready to send.
        self.release(IecLine::Clock);

        // Wait for all listeners to be ready.
        self.wait_for(IecLine::Data, LineState::Released);

        if eoi {
            // Say nothing; the listener times out into EOI and pulses
            // DATA in acknowledgement.
            let t0 = self.wait_for(IecLine::Data, LineState::Pulled);
            let t1 = self.wait_for(IecLine::Data, LineState::Released);
            let pulse = t1 - t0;
            assert!(
                pulse >= Duration::from_micros(40),
                "EOI acknowledge pulse too short: {}us",
                pulse.as_micros()
            );
        }

        // Clock the bits out, LSB first, 60us per half cell; DATA
        // released means 1.
        let mut data = byte;
        for _ in 0..8 {
            self.pull(IecLine::Clock);
            if data & 1 == 0 {
                self.pull(IecLine::Data);
            } else {
                self.release(IecLine::Data);
            }
            block_us!(60);
            self.release(IecLine::Clock);
            block_us!(60);
            data >>= 1;
        }

        // Byte end: hold CLOCK, let DATA go, and require the listener's
        // acknowledgement.
        self.pull(IecLine::Clock);
        self.release(IecLine::Data);
        self.wait_for(IecLine::Data, LineState::Pulled);

        if eoi {
            self.release(IecLine::Clock);
        }
    }

    /// Receive one byte as listener.  Returns the byte and whether the
    /// talker signalled EOI for it.
    pub fn listener_receive(&self) -> (u8, bool) {
        // Talker ready?
        self.wait_for(IecLine::Clock, LineState::Released);

        // We're ready.
        self.release(IecLine::Data);

        // Watch for the talker to start; 200us of silence means EOI,
        // which we acknowledge with a DATA pulse.
        let mut eoi = false;
        let window = Instant::now() + Duration::from_micros(200);
        while self.status(IecLine::Clock) == LineState::Released {
            if !eoi && Instant::now() >= window {
                eoi = true;
                self.pull(IecLine::Data);
                block_us!(60);
                self.release(IecLine::Data);
            }
            std::hint::spin_loop();
        }

        // Clock in the bits, LSB first.
        let mut byte = 0u8;
        for bit in 0..8 {
            self.wait_for(IecLine::Clock, LineState::Released);
            if self.status(IecLine::Data) == LineState::Released {
                byte |= 1 << bit;
            }
            self.wait_for(IecLine::Clock, LineState::Pulled);
        }

        // Acknowledge.
        self.pull(IecLine::Data);

        if eoi {
            // Give the talker a moment to see the acknowledgement, then
            // let the bus go back to idle.
            block_us!(100);
            self.release(IecLine::Data);
        }

        (byte, eoi)
    }
}

/// Handle to a controller script thread.
pub struct ControllerHandle {
    thread: JoinHandle<()>,
    done: Arc<AtomicBool>,
}

impl ControllerHandle {
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Run a controller script on its own thread.  On the way out - panic
/// included - the guard releases every host line and sets the done flag,
/// so the engine never spins on an ATN a dead script left pulled, and
/// device-side poll loops gated on the flag always terminate (the panic
/// then surfaces at join).
pub fn spawn_controller(
    bus: &SimBus,
    script: impl FnOnce(Controller) + Send + 'static,
) -> ControllerHandle {
    let controller = bus.host();
    let done = Arc::new(AtomicBool::new(false));

    struct ScriptGuard(Controller, Arc<AtomicBool>);
    impl Drop for ScriptGuard {
        fn drop(&mut self) {
            self.0.abandon();
            self.1.store(true, Ordering::SeqCst);
        }
    }

    let guard = ScriptGuard(controller.clone(), done.clone());
    let thread = std::thread::spawn(move || {
        let _guard = guard;
        script(controller);
    });

    ControllerHandle { thread, done }
}

/// An in-memory filesystem for dispatch-layer tests.  Cloned handles
/// share the same backing map, so a test can inspect what the drive
/// wrote.
#[derive(Clone, Default)]
pub struct RamFileSystem {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl RamFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl FileSystem for RamFileSystem {
    fn exists(&mut self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn file_size(&mut self, path: &str) -> Result<u32, FsError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|d| d.len() as u32)
            .ok_or(FsError::NotFound)
    }

    fn read_at(&mut self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize, FsError> {
        let files = self.files.lock().unwrap();
        let data = files.get(path).ok_or(FsError::NotFound)?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn create(&mut self, path: &str) -> Result<(), FsError> {
        self.files.lock().unwrap().insert(path.to_string(), Vec::new());
        Ok(())
    }

    fn append(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut files = self.files.lock().unwrap();
        files
            .get_mut(path)
            .ok_or(FsError::NotFound)?
            .extend_from_slice(data);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), FsError> {
        self.files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }

    fn dir_entry(&mut self, path: &str, index: usize) -> Result<Option<DirEntry>, FsError> {
        let files = self.files.lock().unwrap();
        let entry = files
            .iter()
            .filter(|(name, _)| name.starts_with(path))
            .nth(index);

        Ok(entry.map(|(name, data)| {
            let mut short = heapless::String::new();
            let _ = short.push_str(&name[path.len()..]);
            DirEntry {
                name: short,
                size: data.len() as u32,
            }
        }))
    }
}
