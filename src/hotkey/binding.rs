//! Hotkey Binding data model (spec.md §3 "Hotkey Binding")

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::catalogue::ModifierBit;
use crate::hotkey::condition::Condition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Down,
    Up,
    Both,
}

/// What a binding fires on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Key(u16),
    MouseButton(u16),
    /// +1 for up/away, -1 for down/towards, matching `REL_WHEEL` sign.
    Wheel(i8),
    /// Sorted, deduplicated evdev codes that must all be held.
    Combo(Vec<u16>),
}

/// Side-aware modifier mask: 8 independent bits, one per spec.md §3
/// "Modifier State".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModMask(pub u8);

impl ModMask {
    pub const EMPTY: ModMask = ModMask(0);

    pub fn set(mut self, bit: ModifierBit) -> Self {
        self.0 |= bit as u8;
        self
    }

    pub fn has(self, bit: ModifierBit) -> bool {
        self.0 & (bit as u8) != 0
    }

    /// True if every bit set in `required` is also set in `self` (extras allowed).
    pub fn wildcard_matches(self, required: ModMask) -> bool {
        self.0 & required.0 == required.0
    }

    pub fn exact_matches(self, required: ModMask) -> bool {
        self.0 == required.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BindingFlags {
    /// `@` — evdev-level binding (only evdev-flagged bindings are matched
    /// by the Input Engine; this is the only kind this crate registers).
    pub evdev: bool,
    /// `~` — pass-through: don't grab, even if otherwise eligible.
    pub passthrough: bool,
    /// `|` — disable auto-repeat firing.
    pub no_repeat_fire: bool,
    /// `*` — wildcard modifiers: extra modifiers held are allowed.
    pub wildcard: bool,
    /// `$` — participates in suspend groups.
    pub suspend_group: bool,
    /// Whether a match should consume (grab) the event.
    pub grab: bool,
}

pub type Callback = Box<dyn Fn() + Send + Sync>;

/// The record the Input Engine matches against (spec.md §3).
pub struct HotkeyBinding {
    pub id: u32,
    pub source: String,
    pub trigger: Trigger,
    pub modifiers: ModMask,
    pub event_filter: EventFilter,
    pub flags: BindingFlags,
    pub repeat_interval_ms: u64,
    pub callback: Callback,
    pub condition: Option<Condition>,

    pub enabled: bool,
    pub grabbed: bool,
    pub last_trigger: Option<Instant>,
    pub last_condition_result: Option<bool>,
}

impl std::fmt::Debug for HotkeyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotkeyBinding")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("trigger", &self.trigger)
            .field("modifiers", &self.modifiers)
            .field("event_filter", &self.event_filter)
            .field("enabled", &self.enabled)
            .field("grabbed", &self.grabbed)
            .finish()
    }
}

impl HotkeyBinding {
    /// Combo bindings store their sequence sorted so matching does not
    /// depend on the order atoms were written in (spec.md §3 invariant).
    pub fn normalize(&mut self) {
        if let Trigger::Combo(keys) = &mut self.trigger {
            keys.sort_unstable();
            keys.dedup();
        }
    }
}

static NEXT_SYSTEM_ID: AtomicU32 = AtomicU32::new(1);
static NEXT_USER_ID: AtomicU32 = AtomicU32::new(crate::constants::timing::FIRST_USER_HOTKEY_ID);

/// Allocate the next system-level id (below the user-level floor).
pub fn next_system_id() -> u32 {
    NEXT_SYSTEM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocate the next user-level id (monotonic, starting at 1000).
pub fn next_user_id() -> u32 {
    NEXT_USER_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_extra_modifiers() {
        let required = ModMask::EMPTY.set(ModifierBit::LCtrl);
        let actual = ModMask::EMPTY.set(ModifierBit::LCtrl).set(ModifierBit::LShift);
        assert!(actual.wildcard_matches(required));
        assert!(!actual.exact_matches(required));
    }

    #[test]
    fn ids_are_monotonic_and_segregated() {
        let u1 = next_user_id();
        let u2 = next_user_id();
        assert!(u2 > u1);
        assert!(u1 >= crate::constants::timing::FIRST_USER_HOTKEY_ID);

        let s1 = next_system_id();
        assert!(s1 < crate::constants::timing::FIRST_USER_HOTKEY_ID);
    }
}
