//! Input Engine shared state (spec.md §3 "Active Input Table",
//! "Modifier State")
//!
//! Guarded by one short-held lock, updated once per processed event
//! before binding evaluation runs (spec.md §4.D "State update").

use std::collections::HashMap;
use std::time::Instant;

use crate::catalogue::{self, ModifierBit};
use crate::hotkey::ModMask;

#[derive(Debug, Clone, Copy, Default)]
struct ModifierSides {
    left: bool,
    right: bool,
}

impl ModifierSides {
    fn any(self) -> bool {
        self.left || self.right
    }
}

/// Eight independent booleans for the left/right variants of Ctrl,
/// Shift, Alt, Meta (spec.md §3 "Modifier State").
#[derive(Debug, Clone, Copy, Default)]
pub struct ModifierState {
    ctrl: ModifierSides,
    shift: ModifierSides,
    alt: ModifierSides,
    meta: ModifierSides,
}

impl ModifierState {
    /// Record a modifier key transition if `code` names one of the
    /// eight tracked keys; returns whether it did.
    pub fn update(&mut self, code: u16, down: bool) -> bool {
        let Some(bit) = catalogue::evdev_modifier_bit(code) else {
            return false;
        };
        let sides = match bit {
            ModifierBit::LCtrl | ModifierBit::RCtrl => &mut self.ctrl,
            ModifierBit::LShift | ModifierBit::RShift => &mut self.shift,
            ModifierBit::LAlt | ModifierBit::RAlt => &mut self.alt,
            ModifierBit::LMeta | ModifierBit::RMeta => &mut self.meta,
        };
        match bit {
            ModifierBit::LCtrl | ModifierBit::LShift | ModifierBit::LAlt | ModifierBit::LMeta => {
                sides.left = down;
            }
            _ => sides.right = down,
        }
        true
    }

    /// The exact, side-aware 8-bit mask of the current physical state.
    pub fn exact_mask(&self) -> ModMask {
        let mut mask = ModMask::EMPTY;
        if self.ctrl.left {
            mask = mask.set(ModifierBit::LCtrl);
        }
        if self.ctrl.right {
            mask = mask.set(ModifierBit::RCtrl);
        }
        if self.shift.left {
            mask = mask.set(ModifierBit::LShift);
        }
        if self.shift.right {
            mask = mask.set(ModifierBit::RShift);
        }
        if self.alt.left {
            mask = mask.set(ModifierBit::LAlt);
        }
        if self.alt.right {
            mask = mask.set(ModifierBit::RAlt);
        }
        if self.meta.left {
            mask = mask.set(ModifierBit::LMeta);
        }
        if self.meta.right {
            mask = mask.set(ModifierBit::RMeta);
        }
        mask
    }

    /// The mask used for binding matching: the hotkey DSL has no
    /// side-specific syntax (spec.md §4.C modifier chars `^+!#` bind the
    /// whole family), so "any Ctrl" collapses onto the left bit here —
    /// bindings parsed from the DSL only ever request left-side bits.
    pub fn matching_mask(&self) -> ModMask {
        let mut mask = ModMask::EMPTY;
        if self.ctrl.any() {
            mask = mask.set(ModifierBit::LCtrl);
        }
        if self.shift.any() {
            mask = mask.set(ModifierBit::LShift);
        }
        if self.alt.any() {
            mask = mask.set(ModifierBit::LAlt);
        }
        if self.meta.any() {
            mask = mask.set(ModifierBit::LMeta);
        }
        mask
    }
}

/// Mapping from universal key code to the instant it became pressed
/// (spec.md §3 "Active Input Table"). Entries are inserted on key-down,
/// removed on key-up; combo evaluation reads this directly.
#[derive(Debug, Default)]
pub struct ActiveInputs {
    pressed: HashMap<u16, Instant>,
}

impl ActiveInputs {
    pub fn press(&mut self, code: u16) {
        self.pressed.insert(code, Instant::now());
    }

    pub fn release(&mut self, code: u16) {
        self.pressed.remove(&code);
    }

    pub fn map(&self) -> &HashMap<u16, Instant> {
        &self.pressed
    }

    pub fn is_pressed(&self, code: u16) -> bool {
        self.pressed.contains_key(&code)
    }
}

/// Combined engine state behind one lock: per-key down/up, the active
/// input table, and modifier tracking.
#[derive(Default)]
pub struct EngineState {
    pub key_down: HashMap<u16, bool>,
    pub active_inputs: ActiveInputs,
    pub modifiers: ModifierState,
}

impl EngineState {
    /// Apply a key transition to all three pieces of state at once
    /// (spec.md §4.D "State update").
    pub fn apply(&mut self, code: u16, down: bool) {
        self.key_down.insert(code, down);
        if down {
            self.active_inputs.press(code);
        } else {
            self.active_inputs.release(code);
        }
        self.modifiers.update(code, down);
    }

    pub fn is_down(&self, code: u16) -> bool {
        self.key_down.get(&code).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_mask_collapses_sides() {
        let mut state = ModifierState::default();
        let rctrl = catalogue::lookup("rctrl").unwrap().evdev;
        state.update(rctrl, true);
        assert!(state.matching_mask().has(ModifierBit::LCtrl));
        assert!(!state.exact_mask().has(ModifierBit::LCtrl));
        assert!(state.exact_mask().has(ModifierBit::RCtrl));
    }

    #[test]
    fn active_inputs_insert_and_remove() {
        let mut active = ActiveInputs::default();
        active.press(10);
        assert!(active.is_pressed(10));
        active.release(10);
        assert!(!active.is_pressed(10));
    }
}
