//! uinput virtual device (spec.md §6 "Uinput setup")
//!
//! Centralises every write to the virtual input device on the
//! event-loop thread (spec.md §9 "Shared uinput fd"). No other thread
//! touches `evdev::uinput::VirtualDevice` directly; callers outside the
//! event-loop thread send `(type, code, value)` triples through an
//! `UinputSink` channel instead.

use anyhow::{Context, Result};
use evdev::{uinput::VirtualDevice, uinput::VirtualDeviceBuilder, AttributeSet, InputEvent, InputId, KeyCode, RelativeAxisCode};
use tracing::info;

use crate::constants::{input, uinput as uinput_consts};

/// Owns the single uinput device fd. Lives on the event-loop thread.
pub struct UinputDevice {
    device: VirtualDevice,
}

impl UinputDevice {
    pub fn create() -> Result<Self> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for code in 1..input::KEY_MAX {
            keys.insert(KeyCode(code));
        }
        for code in input::BTN_FIRST..=input::BTN_LAST {
            keys.insert(KeyCode(code));
        }

        let mut rel_axes = AttributeSet::<RelativeAxisCode>::new();
        rel_axes.insert(RelativeAxisCode::REL_X);
        rel_axes.insert(RelativeAxisCode::REL_Y);
        rel_axes.insert(RelativeAxisCode::REL_WHEEL);
        rel_axes.insert(RelativeAxisCode::REL_HWHEEL);

        let input_id = InputId::new(
            evdev::BusType::BUS_VIRTUAL,
            uinput_consts::VENDOR_ID,
            uinput_consts::PRODUCT_ID,
            uinput_consts::VERSION,
        );

        let device = VirtualDeviceBuilder::new()
            .context("failed to open /dev/uinput")?
            .name(uinput_consts::DEVICE_NAME)
            .input_id(input_id)
            .with_keys(&keys)
            .context("failed to enable uinput key capabilities")?
            .with_relative_axes(&rel_axes)
            .context("failed to enable uinput relative axes")?
            .build()
            .context("failed to create uinput virtual device")?;

        info!(name = uinput_consts::DEVICE_NAME, "uinput virtual device created");
        Ok(UinputDevice { device })
    }

    /// Write one event and follow it with `SYN_REPORT`, per spec.md §4.D
    /// "Forwarding".
    pub fn emit(&mut self, ev_type: evdev::EventType, code: u16, value: i32) -> Result<()> {
        self.device
            .emit(&[InputEvent::new(ev_type, code, value)])
            .context("failed to write uinput event")
    }

    pub fn emit_key(&mut self, code: u16, down: bool) -> Result<()> {
        self.emit(
            evdev::EventType::KEY,
            code,
            if down { input::KEY_PRESS } else { input::KEY_RELEASE },
        )
    }

    pub fn emit_rel(&mut self, code: evdev::RelativeAxisCode, value: i32) -> Result<()> {
        self.emit(evdev::EventType::RELATIVE, code.0, value)
    }
}

/// A `(type, code, value)` triple queued for the uinput-owner thread,
/// used by callers that aren't the event-loop thread itself.
#[derive(Debug, Clone, Copy)]
pub struct UinputWrite {
    pub ev_type: evdev::EventType,
    pub code: u16,
    pub value: i32,
}

impl UinputWrite {
    pub fn key(code: u16, down: bool) -> Self {
        UinputWrite {
            ev_type: evdev::EventType::KEY,
            code,
            value: if down { input::KEY_PRESS } else { input::KEY_RELEASE },
        }
    }

    pub fn rel(code: u16, value: i32) -> Self {
        UinputWrite {
            ev_type: evdev::EventType::RELATIVE,
            code,
            value,
        }
    }
}
