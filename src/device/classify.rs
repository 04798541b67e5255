//! Device record construction and classification (spec component B)
//!
//! Builds the immutable `Device` record from a parsed inventory block,
//! merges devices that share (vendor, product) by OR-ing their
//! capability bitmasks, and scores the merged result as keyboard /
//! mouse / gamepad / joystick / other. The exact score weights are
//! implementation freedom per spec.md §1; this is one reasonable
//! scoring that satisfies the spec's invariants.

use super::inventory::{bit_set, RawDeviceBlock};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    Mouse,
    Gamepad,
    Joystick,
    Other,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceKind::Keyboard => "keyboard",
            DeviceKind::Mouse => "mouse",
            DeviceKind::Gamepad => "gamepad",
            DeviceKind::Joystick => "joystick",
            DeviceKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: DeviceKind,
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub name: String,
    pub sysfs_path: String,
    pub event_node: Option<String>,

    pub ev_bitmap: Vec<u64>,
    pub key_bitmap: Vec<u64>,
    pub rel_bitmap: Vec<u64>,
    pub abs_bitmap: Vec<u64>,

    pub total_keys: u32,
    pub letter_keys: u32,
    pub number_keys: u32,
    pub modifier_keys: u32,
    pub mouse_buttons: u32,
    pub gamepad_buttons: u32,
    pub joystick_buttons: u32,

    pub has_movement: bool,
    pub has_absolute: bool,
    pub has_relative: bool,
    pub has_analog_sticks: bool,
    pub has_dpad: bool,

    pub classification: Classification,
}

const LETTER_CODES: &[usize] = &[
    16, 17, 18, 19, 20, 21, 22, 23, 24, 25, // q..p
    30, 31, 32, 33, 34, 35, 36, 37, 38, // a..l
    44, 45, 46, 47, 48, 49, 50, // z..m
];
const NUMBER_CODES: &[usize] = &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const MODIFIER_CODES: &[usize] = &[29, 97, 42, 54, 56, 100, 125, 126];
const BTN_MOUSE_START: usize = 0x110;
const BTN_MOUSE_END: usize = 0x117;
const BTN_JOYSTICK_START: usize = 0x120;
const BTN_JOYSTICK_END: usize = 0x12f;
const BTN_GAMEPAD_START: usize = 0x130;
const BTN_GAMEPAD_END: usize = 0x13e;
const ABS_X: usize = 0;
const ABS_Y: usize = 1;
const ABS_RX: usize = 3;
const ABS_RY: usize = 4;
const ABS_HAT0X: usize = 16;
const REL_X: usize = 0;
const REL_Y: usize = 1;

fn count_bits_in_range(bitmap: &[u64], range: impl Iterator<Item = usize>) -> u32 {
    range.filter(|&b| bit_set(bitmap, b)).count() as u32
}

/// Build one `Device` record from a raw inventory block (no merging yet).
pub fn build_device(block: RawDeviceBlock) -> Device {
    let key_bitmap = block.capabilities.get("KEY").cloned().unwrap_or_default();
    let ev_bitmap = block.capabilities.get("EV").cloned().unwrap_or_default();
    let rel_bitmap = block.capabilities.get("REL").cloned().unwrap_or_default();
    let abs_bitmap = block.capabilities.get("ABS").cloned().unwrap_or_default();

    classify_from_parts(
        block.bus,
        block.vendor,
        block.product,
        block.version,
        block.name,
        block.sysfs,
        block.event_node,
        ev_bitmap,
        key_bitmap,
        rel_bitmap,
        abs_bitmap,
    )
}

/// Merge two device blocks sharing (vendor, product) by OR-ing bitmaps,
/// re-running classification over the merged capabilities.
pub fn merge(a: Device, b: Device) -> Device {
    let ev_bitmap = or_bitmaps(&a.ev_bitmap, &b.ev_bitmap);
    let key_bitmap = or_bitmaps(&a.key_bitmap, &b.key_bitmap);
    let rel_bitmap = or_bitmaps(&a.rel_bitmap, &b.rel_bitmap);
    let abs_bitmap = or_bitmaps(&a.abs_bitmap, &b.abs_bitmap);

    classify_from_parts(
        a.bus,
        a.vendor,
        a.product,
        a.version,
        a.name,
        a.sysfs_path,
        a.event_node.or(b.event_node),
        ev_bitmap,
        key_bitmap,
        rel_bitmap,
        abs_bitmap,
    )
}

fn or_bitmaps(a: &[u64], b: &[u64]) -> Vec<u64> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0) | b.get(i).copied().unwrap_or(0))
        .collect()
}

/// Group a flat list of blocks by (vendor, product), merging siblings,
/// and classify each resulting device.
pub fn merge_and_classify(blocks: Vec<RawDeviceBlock>) -> Vec<Device> {
    let mut groups: HashMap<(u16, u16), Device> = HashMap::new();
    let mut order: Vec<(u16, u16)> = Vec::new();

    for block in blocks {
        let key = (block.vendor, block.product);
        let device = build_device(block);
        groups
            .entry(key)
            .and_modify(|existing| {
                let merged = merge(existing.clone(), device.clone());
                *existing = merged;
            })
            .or_insert_with(|| {
                order.push(key);
                device
            });
    }

    order.into_iter().filter_map(|k| groups.remove(&k)).collect()
}

#[allow(clippy::too_many_arguments)]
fn classify_from_parts(
    bus: u16,
    vendor: u16,
    product: u16,
    version: u16,
    name: String,
    sysfs_path: String,
    event_node: Option<String>,
    ev_bitmap: Vec<u64>,
    key_bitmap: Vec<u64>,
    rel_bitmap: Vec<u64>,
    abs_bitmap: Vec<u64>,
) -> Device {
    let total_keys = count_bits_in_range(&key_bitmap, 1..0x2ff);
    let letter_keys = count_bits_in_range(&key_bitmap, LETTER_CODES.iter().copied());
    let number_keys = count_bits_in_range(&key_bitmap, NUMBER_CODES.iter().copied());
    let modifier_keys = count_bits_in_range(&key_bitmap, MODIFIER_CODES.iter().copied());
    let mouse_buttons = count_bits_in_range(&key_bitmap, BTN_MOUSE_START..=BTN_MOUSE_END);
    let joystick_buttons = count_bits_in_range(&key_bitmap, BTN_JOYSTICK_START..=BTN_JOYSTICK_END);
    let gamepad_buttons = count_bits_in_range(&key_bitmap, BTN_GAMEPAD_START..=BTN_GAMEPAD_END);

    let has_relative = bit_set(&rel_bitmap, REL_X) && bit_set(&rel_bitmap, REL_Y);
    let has_absolute = bit_set(&abs_bitmap, ABS_X) && bit_set(&abs_bitmap, ABS_Y);
    let has_analog_sticks = bit_set(&abs_bitmap, ABS_RX) || bit_set(&abs_bitmap, ABS_RY);
    let has_dpad = bit_set(&abs_bitmap, ABS_HAT0X);
    let has_movement = has_relative || has_absolute;

    let classification = classify(
        letter_keys,
        mouse_buttons,
        has_relative,
        joystick_buttons,
        gamepad_buttons,
        has_analog_sticks,
        has_dpad,
    );

    Device {
        bus,
        vendor,
        product,
        version,
        name,
        sysfs_path,
        event_node,
        ev_bitmap,
        key_bitmap,
        rel_bitmap,
        abs_bitmap,
        total_keys,
        letter_keys,
        number_keys,
        modifier_keys,
        mouse_buttons,
        gamepad_buttons,
        joystick_buttons,
        has_movement,
        has_absolute,
        has_relative,
        has_analog_sticks,
        has_dpad,
        classification,
    }
}

fn classify(
    letter_keys: u32,
    mouse_buttons: u32,
    has_relative: bool,
    joystick_buttons: u32,
    gamepad_buttons: u32,
    has_analog_sticks: bool,
    has_dpad: bool,
) -> Classification {
    // Gamepad/joystick signals take priority: a device with analog
    // sticks or a D-pad and buttons in the gamepad/joystick button
    // range is virtually never also a usable keyboard or mouse.
    if (gamepad_buttons > 0 || joystick_buttons > 0) && (has_analog_sticks || has_dpad) {
        let confidence = 0.6
            + 0.2 * (gamepad_buttons.min(4) as f32 / 4.0)
            + if has_analog_sticks { 0.1 } else { 0.0 }
            + if has_dpad { 0.1 } else { 0.0 };
        let kind = if gamepad_buttons >= joystick_buttons {
            DeviceKind::Gamepad
        } else {
            DeviceKind::Joystick
        };
        return Classification {
            kind,
            confidence: confidence.min(1.0),
            reason: format!(
                "{gamepad_buttons} gamepad buttons, {joystick_buttons} joystick buttons, analog_sticks={has_analog_sticks}, dpad={has_dpad}"
            ),
        };
    }

    if has_relative && mouse_buttons >= 1 {
        let confidence = 0.7 + 0.3 * (mouse_buttons.min(3) as f32 / 3.0);
        return Classification {
            kind: DeviceKind::Mouse,
            confidence: confidence.min(1.0),
            reason: format!("relative motion with {mouse_buttons} mouse buttons"),
        };
    }

    if letter_keys >= 20 {
        let confidence = 0.6 + 0.4 * (letter_keys.min(26) as f32 / 26.0);
        return Classification {
            kind: DeviceKind::Keyboard,
            confidence: confidence.min(1.0),
            reason: format!("{letter_keys} letter keys present"),
        };
    }

    if mouse_buttons >= 1 {
        return Classification {
            kind: DeviceKind::Mouse,
            confidence: 0.4,
            reason: format!("{mouse_buttons} mouse buttons without relative motion"),
        };
    }

    Classification {
        kind: DeviceKind::Other,
        confidence: 0.2,
        reason: "no recognizable keyboard, mouse, or gamepad signature".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::inventory::parse_inventory;

    #[test]
    fn classifies_keyboard_and_mouse() {
        let sample = "\
I: Bus=0003 Vendor=046d Product=c52b Version=0111
N: Name=\"Keyboard\"
P: Phys=usb0
S: Sysfs=/devices/kbd
H: Handlers=kbd event4
B: EV=120013
B: KEY=1000000000007 ff9f207ac14057ff febeffdfffefffff fffffffffffffffe

I: Bus=0003 Vendor=046d Product=c52e Version=0111
N: Name=\"Mouse\"
P: Phys=usb1
S: Sysfs=/devices/mouse
H: Handlers=mouse0 event5
B: EV=17
B: KEY=ffff0000000000000000000000000000
B: REL=143
";
        let blocks = parse_inventory(sample);
        let devices: Vec<Device> = blocks.into_iter().map(build_device).collect();
        assert_eq!(devices[0].classification.kind, DeviceKind::Keyboard);
        assert_eq!(devices[1].classification.kind, DeviceKind::Mouse);
        assert!(devices[0].classification.confidence > 0.0);
        assert!(devices[0].classification.confidence <= 1.0);
    }

    #[test]
    fn merges_sibling_nodes_by_vendor_product() {
        let sample = "\
I: Bus=0003 Vendor=1234 Product=5678 Version=1
N: Name=\"Combo A\"
P: Phys=usb0
S: Sysfs=/devices/a
H: Handlers=event4
B: EV=13
B: KEY=1000000000007 0 0 0

I: Bus=0003 Vendor=1234 Product=5678 Version=1
N: Name=\"Combo B\"
P: Phys=usb0
S: Sysfs=/devices/a
H: Handlers=event5
B: EV=12
B: KEY=0 0 0 0
B: REL=3
";
        let blocks = parse_inventory(sample);
        let devices = merge_and_classify(blocks);
        assert_eq!(devices.len(), 1);
        assert!(devices[0].has_relative);
    }
}
