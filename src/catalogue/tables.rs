//! Static key table data
//!
//! One row per universal key: canonical lowercase name, aliases, and
//! the platform codes it round-trips to. Ported from the evdev-code
//! side of `KeyMapData.cpp`; X11 keysyms and Windows VK codes are
//! filled in only for keys where the original assigned one.

pub struct KeyRow {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub evdev: u16,
    pub x11: u32,
    pub vk: u32,
    pub modifier: bool,
    pub mouse: bool,
    pub wheel: bool,
    pub joystick: bool,
}

macro_rules! row {
    ($name:expr, [$($alias:expr),* $(,)?], $evdev:expr, $x11:expr, $vk:expr, $modifier:expr, $mouse:expr, $wheel:expr, $joystick:expr) => {
        KeyRow {
            name: $name,
            aliases: &[$($alias),*],
            evdev: $evdev,
            x11: $x11,
            vk: $vk,
            modifier: $modifier,
            mouse: $mouse,
            wheel: $wheel,
            joystick: $joystick,
        }
    };
}

pub const ROWS: &[KeyRow] = &[
    row!("esc", ["escape"], 1, 0xff1b, 0x1b, false, false, false, false),
    row!("1", [], 2, 0x0031, 0x31, false, false, false, false),
    row!("2", [], 3, 0x0032, 0x32, false, false, false, false),
    row!("3", [], 4, 0x0033, 0x33, false, false, false, false),
    row!("4", [], 5, 0x0034, 0x34, false, false, false, false),
    row!("5", [], 6, 0x0035, 0x35, false, false, false, false),
    row!("6", [], 7, 0x0036, 0x36, false, false, false, false),
    row!("7", [], 8, 0x0037, 0x37, false, false, false, false),
    row!("8", [], 9, 0x0038, 0x38, false, false, false, false),
    row!("9", [], 10, 0x0039, 0x39, false, false, false, false),
    row!("0", [], 11, 0x0030, 0x30, false, false, false, false),
    row!("minus", ["-"], 12, 0x002d, 0xbd, false, false, false, false),
    row!("equal", ["="], 13, 0x003d, 0xbb, false, false, false, false),
    row!("backspace", ["bs"], 14, 0xff08, 0x08, false, false, false, false),
    row!("tab", [], 15, 0xff09, 0x09, false, false, false, false),
    row!("q", [], 16, 0x0071, 0x51, false, false, false, false),
    row!("w", [], 17, 0x0077, 0x57, false, false, false, false),
    row!("e", [], 18, 0x0065, 0x45, false, false, false, false),
    row!("r", [], 19, 0x0072, 0x52, false, false, false, false),
    row!("t", [], 20, 0x0074, 0x54, false, false, false, false),
    row!("y", [], 21, 0x0079, 0x59, false, false, false, false),
    row!("u", [], 22, 0x0075, 0x55, false, false, false, false),
    row!("i", [], 23, 0x0069, 0x49, false, false, false, false),
    row!("o", [], 24, 0x006f, 0x4f, false, false, false, false),
    row!("p", [], 25, 0x0070, 0x50, false, false, false, false),
    row!("enter", ["return"], 28, 0xff0d, 0x0d, false, false, false, false),
    row!("lctrl", ["leftcontrol", "ctrl"], 29, 0xffe3, 0xa2, true, false, false, false),
    row!("a", [], 30, 0x0061, 0x41, false, false, false, false),
    row!("s", [], 31, 0x0073, 0x53, false, false, false, false),
    row!("d", [], 32, 0x0064, 0x44, false, false, false, false),
    row!("f", [], 33, 0x0066, 0x46, false, false, false, false),
    row!("g", [], 34, 0x0067, 0x47, false, false, false, false),
    row!("h", [], 35, 0x0068, 0x48, false, false, false, false),
    row!("j", [], 36, 0x006a, 0x4a, false, false, false, false),
    row!("k", [], 37, 0x006b, 0x4b, false, false, false, false),
    row!("l", [], 38, 0x006c, 0x4c, false, false, false, false),
    row!("lshift", ["leftshift", "shift"], 42, 0xffe1, 0xa0, true, false, false, false),
    row!("z", [], 44, 0x007a, 0x5a, false, false, false, false),
    row!("x", [], 45, 0x0078, 0x58, false, false, false, false),
    row!("c", [], 46, 0x0063, 0x43, false, false, false, false),
    row!("v", [], 47, 0x0076, 0x56, false, false, false, false),
    row!("b", [], 48, 0x0062, 0x42, false, false, false, false),
    row!("n", [], 49, 0x006e, 0x4e, false, false, false, false),
    row!("m", [], 50, 0x006d, 0x4d, false, false, false, false),
    row!("rshift", ["rightshift"], 54, 0xffe2, 0xa1, true, false, false, false),
    row!("lalt", ["leftalt", "alt"], 56, 0xffe9, 0xa4, true, false, false, false),
    row!("space", [], 57, 0x0020, 0x20, false, false, false, false),
    row!("capslock", ["caps"], 58, 0xffe5, 0x14, false, false, false, false),
    row!("f1", [], 59, 0xffbe, 0x70, false, false, false, false),
    row!("f2", [], 60, 0xffbf, 0x71, false, false, false, false),
    row!("f3", [], 61, 0xffc0, 0x72, false, false, false, false),
    row!("f4", [], 62, 0xffc1, 0x73, false, false, false, false),
    row!("f5", [], 63, 0xffc2, 0x74, false, false, false, false),
    row!("f6", [], 64, 0xffc3, 0x75, false, false, false, false),
    row!("f7", [], 65, 0xffc4, 0x76, false, false, false, false),
    row!("f8", [], 66, 0xffc5, 0x77, false, false, false, false),
    row!("f9", [], 67, 0xffc6, 0x78, false, false, false, false),
    row!("f10", [], 68, 0xffc7, 0x79, false, false, false, false),
    row!("f11", [], 87, 0xffc8, 0x7a, false, false, false, false),
    row!("f12", [], 88, 0xffc9, 0x7b, false, false, false, false),
    row!("numlock", [], 69, 0xff7f, 0x90, false, false, false, false),
    row!("scrolllock", [], 70, 0xff14, 0x91, false, false, false, false),
    row!("home", [], 102, 0xff50, 0x24, false, false, false, false),
    row!("up", ["uparrow"], 103, 0xff52, 0x26, false, false, false, false),
    row!("pageup", ["pgup"], 104, 0xff55, 0x21, false, false, false, false),
    row!("left", ["leftarrow"], 105, 0xff51, 0x25, false, false, false, false),
    row!("right", ["rightarrow"], 106, 0xff53, 0x27, false, false, false, false),
    row!("end", [], 107, 0xff57, 0x23, false, false, false, false),
    row!("down", ["downarrow"], 108, 0xff54, 0x28, false, false, false, false),
    row!("pagedown", ["pgdn"], 109, 0xff56, 0x22, false, false, false, false),
    row!("insert", ["ins"], 110, 0xff63, 0x2d, false, false, false, false),
    row!("delete", ["del"], 111, 0xffff, 0x2e, false, false, false, false),
    row!("lmeta", ["leftmeta", "lwin", "super", "win"], 125, 0xffeb, 0x5b, true, false, false, false),
    row!("rmeta", ["rightmeta", "rwin"], 126, 0xffec, 0x5c, true, false, false, false),
    row!("rctrl", ["rightcontrol"], 97, 0xffe4, 0xa3, true, false, false, false),
    row!("ralt", ["rightalt", "altgr"], 100, 0xffea, 0xa5, true, false, false, false),
    row!("volumeup", [], 115, 0x1008ff13, 0xaf, false, false, false, false),
    row!("volumedown", [], 114, 0x1008ff11, 0xae, false, false, false, false),
    row!("mute", [], 113, 0x1008ff12, 0xad, false, false, false, false),
    row!("playpause", ["mediaplay"], 164, 0x1008ff14, 0xb3, false, false, false, false),
    row!("nextsong", ["medianext"], 163, 0x1008ff17, 0xb0, false, false, false, false),
    row!("previoussong", ["mediaprev"], 165, 0x1008ff16, 0xb1, false, false, false, false),
    // Mouse buttons
    row!("lbutton", ["leftbutton", "mouse1"], 0x110, 0, 0x01, false, true, false, false),
    row!("rbutton", ["rightbutton", "mouse2"], 0x111, 0, 0x02, false, true, false, false),
    row!("mbutton", ["middlebutton", "mouse3"], 0x112, 0, 0x04, false, true, false, false),
    row!("xbutton1", ["mouse4", "side1"], 0x113, 0, 0x05, false, true, false, false),
    row!("xbutton2", ["mouse5", "side2"], 0x114, 0, 0x06, false, true, false, false),
    // Wheel pseudo-keys (no evdev code of their own; carried as synthetic directions)
    row!("wheelup", [], 0, 0, 0, false, false, true, false),
    row!("wheeldown", [], 0, 0, 0, false, false, true, false),
    row!("wheelleft", [], 0, 0, 0, false, false, true, false),
    row!("wheelright", [], 0, 0, 0, false, false, true, false),
    // Gamepad / joystick buttons (BTN_JOYSTICK.. / BTN_GAMEPAD..)
    row!("joybtn1", ["btn_a", "btn_south"], 0x130, 0, 0, false, false, false, true),
    row!("joybtn2", ["btn_b", "btn_east"], 0x131, 0, 0, false, false, false, true),
    row!("joybtn3", ["btn_x", "btn_north"], 0x133, 0, 0, false, false, false, true),
    row!("joybtn4", ["btn_y", "btn_west"], 0x134, 0, 0, false, false, false, true),
    row!("joybtn5", ["btn_tl"], 0x136, 0, 0, false, false, false, true),
    row!("joybtn6", ["btn_tr"], 0x137, 0, 0, false, false, false, true),
    row!("joystart", ["btn_start"], 0x13b, 0, 0, false, false, false, true),
    row!("joyselect", ["btn_select"], 0x13a, 0, 0, false, false, false, true),
    row!("dpadup", [], 0x220, 0, 0, false, false, false, true),
    row!("dpaddown", [], 0x221, 0, 0, false, false, false, true),
    row!("dpadleft", [], 0x222, 0, 0, false, false, false, true),
    row!("dpadright", [], 0x223, 0, 0, false, false, false, true),
];
