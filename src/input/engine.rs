//! Input Engine (spec component D)
//!
//! One dedicated OS thread owns every device fd and the uinput fd. All
//! public operations communicate through locked state or channels, never
//! by blocking the loop (spec.md §4.D "Threading model", §5).

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use evdev::{Device, EventType, InputEvent};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info, warn};

use crate::catalogue;
use crate::constants::input;
use crate::hotkey::registry::Registry;
use crate::input::remap::RemapTable;
use crate::input::state::EngineState;
use crate::input::uinput::{UinputDevice, UinputWrite};

/// Mutable engine-wide knobs changed by public setters while the loop
/// runs (spec.md §4.D "public operations ... communicate through locked
/// structures").
pub struct EngineConfig {
    pub mouse_sensitivity: f32,
    pub scroll_speed: f32,
    pub emergency_key: Option<u16>,
    pub block_input: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            mouse_sensitivity: 1.0,
            scroll_speed: 1.0,
            emergency_key: None,
            block_input: false,
        }
    }
}

pub struct Engine {
    registry: Arc<Registry>,
    state: Mutex<EngineState>,
    remap: Mutex<RemapTable>,
    config: RwLock<EngineConfig>,
    running: Arc<AtomicBool>,
    shutdown_write: Mutex<Option<RawFd>>,
    pending_callbacks: Arc<AtomicUsize>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    uinput_tx: Mutex<Option<mpsc::Sender<UinputWrite>>>,
}

impl Engine {
    pub fn new(registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Engine {
            registry,
            state: Mutex::new(EngineState::default()),
            remap: Mutex::new(RemapTable::default()),
            config: RwLock::new(EngineConfig::default()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_write: Mutex::new(None),
            pending_callbacks: Arc::new(AtomicUsize::new(0)),
            thread: Mutex::new(None),
            uinput_tx: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_mouse_sensitivity(&self, sensitivity: f32) {
        self.config.write().unwrap().mouse_sensitivity = sensitivity;
    }

    pub fn set_scroll_speed(&self, speed: f32) {
        self.config.write().unwrap().scroll_speed = speed;
    }

    pub fn set_block_input(&self, block: bool) {
        self.config.write().unwrap().block_input = block;
    }

    pub fn set_emergency_key(&self, code: Option<u16>) {
        self.config.write().unwrap().emergency_key = code;
    }

    pub fn add_key_remap(&self, from: u16, to: u16) {
        self.remap.lock().unwrap().set(from, to);
    }

    pub fn remove_key_remap(&self, from: u16) {
        self.remap.lock().unwrap().remove(from);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn pending_callbacks(&self) -> usize {
        self.pending_callbacks.load(Ordering::SeqCst)
    }

    /// Open devices, set up the virtual uinput device, and launch the
    /// event loop thread (spec.md §4.D "Start-up").
    pub fn start(self: &Arc<Self>, device_paths: Vec<PathBuf>, grab_devices: bool) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut devices = Vec::new();
        for path in &device_paths {
            match Device::open(path) {
                Ok(mut device) => {
                    if grab_devices
                        && let Err(e) = device.grab()
                    {
                        warn!(path = %path.display(), error = %e, "failed to grab device, continuing ungrabbed");
                    }
                    info!(path = %path.display(), name = ?device.name(), "opened input device");
                    devices.push(device);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unopenable device");
                }
            }
        }

        if devices.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            anyhow::bail!("no input devices could be opened; aborting start-up");
        }

        let uinput = UinputDevice::create().context("uinput setup failed")?;

        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            self.running.store(false, Ordering::SeqCst);
            anyhow::bail!("failed to create shutdown pipe");
        }
        let (shutdown_read, shutdown_write) = (fds[0], fds[1]);
        unsafe {
            libc::fcntl(shutdown_read, libc::F_SETFL, libc::O_NONBLOCK);
        }
        *self.shutdown_write.lock().unwrap() = Some(shutdown_write);

        let (uinput_tx, uinput_rx) = mpsc::channel();
        *self.uinput_tx.lock().unwrap() = Some(uinput_tx);

        let engine = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let handle = std::thread::spawn(move || {
            engine.run_loop(devices, uinput, shutdown_read, uinput_rx);
            running.store(false, Ordering::SeqCst);
        });
        *self.thread.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// `Stop`: idempotent, safe from any thread (spec.md §7 "Shutdown").
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            // Still join a thread if one is mid-shutdown from the
            // emergency path, but don't double-signal.
        }
        if let Some(fd) = self.shutdown_write.lock().unwrap().take() {
            let byte = [1u8];
            unsafe {
                libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
                libc::close(fd);
            }
        }
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        while self.pending_callbacks.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn run_loop(
        self: Arc<Self>,
        mut devices: Vec<Device>,
        mut uinput: UinputDevice,
        shutdown_read: RawFd,
        uinput_rx: mpsc::Receiver<UinputWrite>,
    ) {
        info!(devices = devices.len(), "input engine event loop started");

        'outer: while self.running.load(Ordering::SeqCst) {
            while let Ok(write) = uinput_rx.try_recv() {
                if let Err(e) = uinput.emit(write.ev_type, write.code, write.value) {
                    error!(error = %e, "failed forwarding queued uinput write");
                }
            }

            // SAFETY: fds outlive the poll() call below; `devices` and
            // `shutdown_read` are not closed while it runs.
            let shutdown_borrowed = unsafe { BorrowedFd::borrow_raw(shutdown_read) };
            let mut poll_fds: Vec<PollFd> = Vec::with_capacity(devices.len() + 1);
            poll_fds.push(PollFd::new(shutdown_borrowed, PollFlags::POLLIN));
            for device in &devices {
                let borrowed = unsafe { BorrowedFd::borrow_raw(device.as_raw_fd()) };
                poll_fds.push(PollFd::new(borrowed, PollFlags::POLLIN));
            }

            let timeout = PollTimeout::from(crate::constants::timing::POLL_TIMEOUT_MS as u16);
            match poll(&mut poll_fds, timeout) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "poll() failed in event loop");
                    continue;
                }
            }

            if poll_fds[0].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                info!("shutdown signalled, exiting event loop");
                break 'outer;
            }

            for (i, device) in devices.iter_mut().enumerate() {
                let ready = poll_fds[i + 1].revents().is_some_and(|r| r.contains(PollFlags::POLLIN));
                if !ready {
                    continue;
                }
                let events: Vec<InputEvent> = match device.fetch_events() {
                    Ok(iter) => iter.collect(),
                    Err(e) => {
                        debug!(error = %e, "fetch_events failed, will retry next tick");
                        continue;
                    }
                };
                for event in events {
                    if self.handle_event(event, &mut uinput) {
                        info!("emergency shutdown key pressed");
                        self.running.store(false, Ordering::SeqCst);
                        break 'outer;
                    }
                }
            }
        }

        self.release_all_pressed_keys(&mut uinput);
        for device in &mut devices {
            let _ = device.ungrab();
        }
        unsafe {
            libc::close(shutdown_read);
        }
        info!("input engine event loop stopped, devices released");
    }

    /// Process one raw evdev event. Returns true if this was the
    /// emergency shutdown key being pressed.
    fn handle_event(&self, event: InputEvent, uinput: &mut UinputDevice) -> bool {
        match event.event_type() {
            EventType::KEY => self.process_key_event(event, uinput),
            EventType::RELATIVE => {
                self.process_relative_event(event, uinput);
                false
            }
            other => {
                let block = self.config.read().unwrap().block_input;
                if !block {
                    let _ = uinput.emit(other, event.code(), event.value());
                }
                false
            }
        }
    }

    fn process_key_event(&self, event: InputEvent, uinput: &mut UinputDevice) -> bool {
        let code = event.code();
        let value = event.value();
        let is_repeat = value == input::KEY_REPEAT;
        let is_down = value != input::KEY_RELEASE;

        if let Some(emergency) = self.config.read().unwrap().emergency_key
            && emergency == code
            && is_down
            && !is_repeat
        {
            return true;
        }

        let (modifiers, active_snapshot, is_modifier) = {
            let mut state = self.state.lock().unwrap();
            if !is_repeat {
                state.apply(code, is_down);
            }
            let is_modifier = catalogue::evdev_modifier_bit(code).is_some();
            (state.modifiers.matching_mask(), state.active_inputs.map().clone(), is_modifier)
        };

        let outcome = self.registry.evaluate(Some(code), &active_snapshot, modifiers, is_down, is_repeat, is_modifier);

        if !outcome.ids.is_empty() {
            self.spawn_callbacks(outcome.ids.clone());
        }

        // A grab suppresses the press but never the release, so held
        // modifiers can't get stuck on other applications.
        let blocked = outcome.grabbed && is_down;

        if !blocked {
            let mut remap = self.remap.lock().unwrap();
            let out_code = remap.resolve(code, is_down);
            let value = if is_repeat { input::KEY_REPEAT } else if is_down { input::KEY_PRESS } else { input::KEY_RELEASE };
            if let Err(e) = uinput.emit(EventType::KEY, out_code, value) {
                error!(error = %e, "failed forwarding key event");
            }
        }

        false
    }

    fn process_relative_event(&self, event: InputEvent, uinput: &mut UinputDevice) {
        let code = event.code();
        let raw = event.value();
        let config = self.config.read().unwrap();

        match code {
            c if c == evdev::RelativeAxisCode::REL_X.0 || c == evdev::RelativeAxisCode::REL_Y.0 => {
                let scaled = scale_nonzero(raw, config.mouse_sensitivity);
                if let Err(e) = uinput.emit(EventType::RELATIVE, code, scaled) {
                    error!(error = %e, "failed forwarding relative motion");
                }
            }
            c if c == evdev::RelativeAxisCode::REL_WHEEL.0 || c == evdev::RelativeAxisCode::REL_HWHEEL.0 => {
                let scaled = scale_nonzero(raw, config.scroll_speed);
                drop(config);

                let direction = if raw >= 0 { 1i8 } else { -1i8 };
                let matched = self.registry.wheel_matches(direction);
                if !matched.is_empty() {
                    self.spawn_callbacks(matched);
                }

                if let Err(e) = uinput.emit(EventType::RELATIVE, code, scaled) {
                    error!(error = %e, "failed forwarding wheel event");
                }
            }
            _ => {
                if !config.block_input {
                    let _ = uinput.emit(EventType::RELATIVE, code, raw);
                }
            }
        }
    }

    fn spawn_callbacks(&self, ids: Vec<u32>) {
        let registry = Arc::clone(&self.registry);
        let pending = Arc::clone(&self.pending_callbacks);
        pending.fetch_add(1, Ordering::SeqCst);
        std::thread::spawn(move || {
            registry.dispatch(&ids);
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    fn release_all_pressed_keys(&self, uinput: &mut UinputDevice) {
        let pressed: Vec<u16> = self.state.lock().unwrap().active_inputs.map().keys().copied().collect();
        for code in pressed {
            if let Err(e) = uinput.emit_key(code, false) {
                error!(error = %e, code, "failed releasing key during emergency/shutdown cleanup");
            }
        }
    }

    /// `EmergencyReleaseAllKeys`: explicit operation, also run
    /// automatically before device fds close (spec.md §2 supplement).
    pub fn emergency_release_all_keys(&self) {
        if let Some(tx) = self.uinput_tx.lock().unwrap().as_ref() {
            let pressed: Vec<u16> = self.state.lock().unwrap().active_inputs.map().keys().copied().collect();
            for code in pressed {
                let _ = tx.send(UinputWrite::key(code, false));
            }
        }
    }

    /// `Send(key, down)`: translate a universal name through the
    /// catalogue and emit on uinput (spec.md §4.D "Key-send path").
    pub fn send_key(&self, name: &str, down: bool) -> Result<()> {
        let key = catalogue::lookup(name).ok_or_else(|| anyhow::anyhow!("unknown key name `{name}`"))?;
        self.queue_write(UinputWrite::key(key.evdev, down))
    }

    /// Decompose a combo string like `"^!W"` into ordered press/release
    /// events, holding modifiers for the whole combo.
    pub fn send_combo(&self, parsed: &crate::hotkey::parser::ParsedHotkey) -> Result<()> {
        use crate::hotkey::binding::Trigger;

        let mut modifier_codes = Vec::new();
        for (bit, name) in [
            (crate::catalogue::ModifierBit::LCtrl, "lctrl"),
            (crate::catalogue::ModifierBit::LShift, "lshift"),
            (crate::catalogue::ModifierBit::LAlt, "lalt"),
            (crate::catalogue::ModifierBit::LMeta, "lmeta"),
        ] {
            if parsed.modifiers.has(bit) {
                modifier_codes.push(catalogue::lookup(name).unwrap().evdev);
            }
        }

        for &code in &modifier_codes {
            self.queue_write(UinputWrite::key(code, true))?;
        }

        match &parsed.trigger {
            Trigger::Key(code) | Trigger::MouseButton(code) => {
                self.queue_write(UinputWrite::key(*code, true))?;
                self.queue_write(UinputWrite::key(*code, false))?;
            }
            Trigger::Combo(codes) => {
                for &code in codes {
                    self.queue_write(UinputWrite::key(code, true))?;
                }
                for &code in codes.iter().rev() {
                    self.queue_write(UinputWrite::key(code, false))?;
                }
            }
            Trigger::Wheel(dir) => {
                self.queue_write(UinputWrite::rel(evdev::RelativeAxisCode::REL_WHEEL.0, *dir as i32))?;
            }
        }

        for &code in modifier_codes.iter().rev() {
            self.queue_write(UinputWrite::key(code, false))?;
        }

        Ok(())
    }

    /// `send(text)`: decompose plain text into per-character key taps,
    /// used by the Havel built-in of the same name.
    pub fn send_text(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let lower = ch.to_lowercase().next().unwrap_or(ch);
            let name = lower.to_string();
            let Some(key) = catalogue::lookup(&name) else {
                warn!(char = %ch, "no catalogue entry for character, skipping");
                continue;
            };
            let needs_shift = ch.is_uppercase();
            if needs_shift {
                self.queue_write(UinputWrite::key(catalogue::lookup("lshift").unwrap().evdev, true))?;
            }
            self.queue_write(UinputWrite::key(key.evdev, true))?;
            self.queue_write(UinputWrite::key(key.evdev, false))?;
            if needs_shift {
                self.queue_write(UinputWrite::key(catalogue::lookup("lshift").unwrap().evdev, false))?;
            }
        }
        Ok(())
    }

    pub fn move_mouse(&self, dx: i32, dy: i32) -> Result<()> {
        if dx != 0 {
            self.queue_write(UinputWrite::rel(evdev::RelativeAxisCode::REL_X.0, dx))?;
        }
        if dy != 0 {
            self.queue_write(UinputWrite::rel(evdev::RelativeAxisCode::REL_Y.0, dy))?;
        }
        Ok(())
    }

    pub fn click(&self, button: &str) -> Result<()> {
        let key = catalogue::lookup(button).ok_or_else(|| anyhow::anyhow!("unknown mouse button `{button}`"))?;
        self.queue_write(UinputWrite::key(key.evdev, true))?;
        self.queue_write(UinputWrite::key(key.evdev, false))
    }

    pub fn scroll(&self, amount: i32) -> Result<()> {
        self.queue_write(UinputWrite::rel(evdev::RelativeAxisCode::REL_WHEEL.0, amount))
    }

    fn queue_write(&self, write: UinputWrite) -> Result<()> {
        let guard = self.uinput_tx.lock().unwrap();
        let tx = guard.as_ref().context("input engine is not running")?;
        tx.send(write).context("uinput writer thread has exited")
    }
}

/// Scale a relative motion/scroll value, preserving sign and never
/// collapsing a non-zero input to zero (spec.md §4.D "Forwarding").
fn scale_nonzero(raw: i32, factor: f32) -> i32 {
    if raw == 0 {
        return 0;
    }
    let scaled = (raw as f32 * factor).round() as i32;
    if scaled == 0 {
        raw.signum()
    } else {
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_preserves_sign_and_never_zeroes_nonzero_input() {
        assert_eq!(scale_nonzero(1, 0.1), 1);
        assert_eq!(scale_nonzero(-1, 0.1), -1);
        assert_eq!(scale_nonzero(0, 5.0), 0);
        assert_eq!(scale_nonzero(10, 2.0), 20);
    }
}
