//! Key Catalogue (spec component A)
//!
//! Bi-directional tables between symbolic key names, evdev codes, X11
//! keysyms and Windows VK codes, plus classification. Built once from
//! `tables.rs` and read-only afterwards; every other subsystem that
//! needs to turn a key name into something evdev or uinput understands
//! routes through here.

mod tables;

use std::collections::HashMap;
use std::sync::OnceLock;

/// Side-aware bit flags for the eight modifier keys, used by the hotkey
/// parser and the Input Engine's modifier mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModifierBit {
    LCtrl = 0b0000_0001,
    RCtrl = 0b0000_0010,
    LShift = 0b0000_0100,
    RShift = 0b0000_1000,
    LAlt = 0b0001_0000,
    RAlt = 0b0010_0000,
    LMeta = 0b0100_0000,
    RMeta = 0b1000_0000,
}

#[derive(Debug, Clone)]
pub struct UniversalKey {
    pub name: &'static str,
    pub evdev: u16,
    pub x11: u32,
    pub vk: u32,
    pub modifier: bool,
    pub mouse: bool,
    pub wheel: bool,
    pub joystick: bool,
}

struct Catalogue {
    by_name: HashMap<&'static str, UniversalKey>,
    alias_to_name: HashMap<String, &'static str>,
    by_evdev: HashMap<u16, &'static str>,
    by_x11: HashMap<u32, &'static str>,
    by_vk: HashMap<u32, &'static str>,
}

static CATALOGUE: OnceLock<Catalogue> = OnceLock::new();

fn catalogue() -> &'static Catalogue {
    CATALOGUE.get_or_init(|| {
        let mut by_name = HashMap::new();
        let mut alias_to_name = HashMap::new();
        let mut by_evdev = HashMap::new();
        let mut by_x11 = HashMap::new();
        let mut by_vk = HashMap::new();

        for row in tables::ROWS {
            let key = UniversalKey {
                name: row.name,
                evdev: row.evdev,
                x11: row.x11,
                vk: row.vk,
                modifier: row.modifier,
                mouse: row.mouse,
                wheel: row.wheel,
                joystick: row.joystick,
            };

            if row.evdev != 0 {
                by_evdev.insert(row.evdev, row.name);
            }
            if row.x11 != 0 {
                by_x11.insert(row.x11, row.name);
            }
            if row.vk != 0 {
                by_vk.insert(row.vk, row.name);
            }
            for alias in row.aliases {
                alias_to_name.insert(alias.to_lowercase(), row.name);
            }

            by_name.insert(row.name, key);
        }

        Catalogue {
            by_name,
            alias_to_name,
            by_evdev,
            by_x11,
            by_vk,
        }
    })
}

/// Resolve any name or alias (case-insensitively) to its canonical universal key.
pub fn lookup(name: &str) -> Option<&'static UniversalKey> {
    let lower = name.to_lowercase();
    let cat = catalogue();
    if let Some(key) = cat.by_name.get(lower.as_str()) {
        return Some(key);
    }
    let canonical = cat.alias_to_name.get(&lower)?;
    cat.by_name.get(canonical)
}

/// Primary (canonical) name for any alias; identity for canonical names.
pub fn primary_name(name: &str) -> Option<&'static str> {
    lookup(name).map(|k| k.name)
}

/// evdev code -> canonical name, or "unknown" if not in the catalogue.
pub fn evdev_to_name(code: u16) -> &'static str {
    catalogue().by_evdev.get(&code).copied().unwrap_or("unknown")
}

/// X11 keysym -> canonical name, or "unknown".
pub fn x11_to_name(keysym: u32) -> &'static str {
    catalogue().by_x11.get(&keysym).copied().unwrap_or("unknown")
}

/// Windows VK code -> canonical name, or "unknown".
pub fn vk_to_name(vk: u32) -> &'static str {
    catalogue().by_vk.get(&vk).copied().unwrap_or("unknown")
}

pub fn is_modifier(name: &str) -> bool {
    lookup(name).is_some_and(|k| k.modifier)
}

pub fn is_mouse(name: &str) -> bool {
    lookup(name).is_some_and(|k| k.mouse)
}

pub fn is_wheel(name: &str) -> bool {
    lookup(name).is_some_and(|k| k.wheel)
}

pub fn is_joystick(name: &str) -> bool {
    lookup(name).is_some_and(|k| k.joystick)
}

/// Which side-aware modifier bit an evdev code corresponds to, if any.
pub fn evdev_modifier_bit(code: u16) -> Option<ModifierBit> {
    modifier_bit(evdev_to_name(code))
}

/// Which side-aware modifier bit a modifier key name corresponds to, if any.
pub fn modifier_bit(name: &str) -> Option<ModifierBit> {
    let key = lookup(name)?;
    if !key.modifier {
        return None;
    }
    Some(match key.name {
        "lctrl" => ModifierBit::LCtrl,
        "rctrl" => ModifierBit::RCtrl,
        "lshift" => ModifierBit::LShift,
        "rshift" => ModifierBit::RShift,
        "lalt" => ModifierBit::LAlt,
        "ralt" => ModifierBit::RAlt,
        "lmeta" => ModifierBit::LMeta,
        "rmeta" => ModifierBit::RMeta,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_registered_name() {
        for row in tables::ROWS {
            let key = lookup(row.name).expect("row must resolve");
            if key.evdev != 0 {
                assert_eq!(evdev_to_name(key.evdev), row.name);
            }
            if key.x11 != 0 {
                assert_eq!(x11_to_name(key.x11), row.name);
            }
            if key.vk != 0 {
                assert_eq!(vk_to_name(key.vk), row.name);
            }
        }
    }

    #[test]
    fn alias_resolves_to_primary() {
        assert_eq!(primary_name("ctrl"), Some("lctrl"));
        assert_eq!(primary_name("Win"), Some("lmeta"));
        assert_eq!(primary_name("MOUSE1"), Some("lbutton"));
    }

    #[test]
    fn unknown_code_is_unknown() {
        assert_eq!(evdev_to_name(0xffff), "unknown");
    }

    #[test]
    fn classification_queries() {
        assert!(is_modifier("lctrl"));
        assert!(!is_modifier("a"));
        assert!(is_mouse("lbutton"));
        assert!(is_joystick("joybtn1"));
        assert!(is_wheel("wheelup"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("A").is_some());
        assert!(lookup("LCtrl").is_some());
    }
}
