//! Application-wide constants
//!
//! Magic numbers and string literals used throughout the daemon, kept in
//! one place the way the rest of the codebase expects.

/// Linux evdev protocol constants not already named by the `evdev` crate.
pub mod input {
    /// Key/button release event value.
    pub const KEY_RELEASE: i32 = 0;
    /// Key/button press event value.
    pub const KEY_PRESS: i32 = 1;
    /// Key/button auto-repeat event value.
    pub const KEY_REPEAT: i32 = 2;

    /// First mouse button code (`BTN_LEFT`).
    pub const BTN_FIRST: u16 = 0x110;
    /// Last mouse button code covered by the uinput virtual device (`BTN_TASK`).
    pub const BTN_LAST: u16 = 0x117;

    /// Highest key code the catalogue and uinput device cover.
    pub const KEY_MAX: u16 = 0x2ff;
}

/// Filesystem paths the daemon reads devices and persists state from.
pub mod paths {
    /// Directory containing evdev device nodes.
    pub const DEV_INPUT: &str = "/dev/input";
    /// Proc file listing the system's input device inventory.
    pub const PROC_BUS_INPUT_DEVICES: &str = "/proc/bus/input/devices";
}

/// Permission hints surfaced in error messages.
pub mod permissions {
    pub const INPUT_GROUP: &str = "input";
    pub const ADD_TO_INPUT_GROUP: &str = "sudo usermod -aG input $USER";
}

/// Timing defaults (all in milliseconds unless noted).
pub mod timing {
    /// Poll timeout for the unified device select loop.
    pub const POLL_TIMEOUT_MS: i32 = 1000;
    /// Conditional layer re-evaluation tick.
    pub const CONDITIONAL_TICK_MS: u64 = 50;
    /// Condition evaluation result cache lifetime.
    pub const CONDITION_CACHE_MS: u64 = 50;
    /// Combo window of 0 means unlimited / hold-based matching.
    pub const UNLIMITED_WINDOW_MS: u64 = 0;
    /// First user-level hotkey id; ids below this are reserved for system bindings.
    pub const FIRST_USER_HOTKEY_ID: u32 = 1000;
}

/// uinput virtual device identity.
pub mod uinput {
    pub const DEVICE_NAME: &str = "Havel Virtual Input";
    pub const VENDOR_ID: u16 = 0x4856; // "HV"
    pub const PRODUCT_ID: u16 = 0x0001;
    pub const VERSION: u16 = 1;
}
