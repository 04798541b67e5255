//! Hotkey String Parser (spec component C)
//!
//! Decodes the hotkey DSL (spec.md §4.C) into a normalized descriptor
//! ready for the registry: prefixes, held modifiers, a trigger atom or
//! combo, and suffixes (event-type filter, repeat interval).
//!
//! ```text
//! hotkey  := prefixes body suffixes
//! prefixes:= ('@' | '~' | '|' | '*' | '$')*
//! body    := modifier* atom ('&' atom)*
//! modifier:= '^' | '+' | '!' | '#'          # Ctrl, Shift, Alt, Meta
//! atom    := identifier                     # resolved via Key Catalogue
//! suffixes:= (':down' | ':up' | ':N')*      # N decimal ms
//! ```

use crate::catalogue;
use crate::error::HotkeyParseError;
use crate::hotkey::binding::{BindingFlags, EventFilter, ModMask, Trigger};

/// Normalized output of parsing a hotkey string; feeds the registry via
/// `HotkeyBinding` construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedHotkey {
    pub trigger: Trigger,
    pub modifiers: ModMask,
    pub event_filter: EventFilter,
    pub flags: BindingFlags,
    pub repeat_interval_ms: u64,
}

const PREFIX_CHARS: &[char] = &['@', '~', '|', '*', '$'];
const MODIFIER_CHARS: &[char] = &['^', '+', '!', '#'];

pub fn parse(input: &str) -> Result<ParsedHotkey, HotkeyParseError> {
    let mut chars: Vec<char> = input.trim().chars().collect();
    if chars.is_empty() {
        return Err(HotkeyParseError::at(1, 1, "empty hotkey string"));
    }

    let mut col = 1usize;
    let mut flags = BindingFlags::default();

    // Prefixes: any order, each at most meaningfully applied once.
    let mut i = 0;
    while i < chars.len() && PREFIX_CHARS.contains(&chars[i]) {
        match chars[i] {
            '@' => flags.evdev = true,
            '~' => flags.passthrough = true,
            '|' => flags.no_repeat_fire = true,
            '*' => flags.wildcard = true,
            '$' => flags.suspend_group = true,
            _ => unreachable!(),
        }
        i += 1;
        col += 1;
    }
    // evdev is this crate's only binding kind; a hotkey string with no
    // explicit prefix is still registered as evdev-level.
    flags.evdev = true;
    flags.grab = !flags.passthrough;
    chars.drain(..i);

    // Split off suffixes from the right (`:down`, `:up`, `:NNN`), which
    // may repeat; later wins per spec.md §9 open question.
    let body_and_suffixes: String = chars.into_iter().collect();
    let (body, suffixes) = split_suffixes(&body_and_suffixes);

    let mut event_filter = EventFilter::Both;
    let mut repeat_interval_ms = 0u64;
    for suffix in suffixes {
        match suffix.as_str() {
            "down" => event_filter = EventFilter::Down,
            "up" => event_filter = EventFilter::Up,
            other => {
                repeat_interval_ms = other
                    .parse::<u64>()
                    .map_err(|_| HotkeyParseError::at(1, col, format!("invalid suffix `:{other}`")))?;
            }
        }
    }

    // Body: leading modifier chars, then one or more `&`-joined atoms.
    let mut body_chars: Vec<char> = body.chars().collect();
    let mut modifiers = ModMask::EMPTY;
    let mut j = 0;
    while j < body_chars.len() && MODIFIER_CHARS.contains(&body_chars[j]) {
        modifiers = apply_modifier_char(modifiers, body_chars[j]);
        j += 1;
        col += 1;
    }
    body_chars.drain(..j);
    let atom_str: String = body_chars.into_iter().collect();

    if atom_str.trim().is_empty() {
        return Err(HotkeyParseError::at(1, col, "empty atom list"));
    }

    let atoms: Vec<&str> = atom_str.split('&').map(|s| s.trim()).collect();
    if atoms.iter().any(|a| a.is_empty()) {
        return Err(HotkeyParseError::at(1, col, "empty atom between `&`"));
    }

    let mut codes = Vec::with_capacity(atoms.len());
    let mut wheel_dir: Option<i8> = None;
    let mut mouse_code: Option<u16> = None;
    for atom in &atoms {
        let key = catalogue::lookup(atom)
            .ok_or_else(|| HotkeyParseError::at(1, col, format!("unknown atom `{atom}`")))?;
        if key.wheel {
            wheel_dir = Some(match key.name {
                "wheelup" | "wheelright" => -1,
                _ => 1,
            });
        } else if key.mouse {
            mouse_code = Some(key.evdev);
        } else {
            codes.push(key.evdev);
        }
    }

    let trigger = if atoms.len() > 1 {
        let mut all = codes;
        if let Some(m) = mouse_code {
            all.push(m);
        }
        Trigger::Combo(all)
    } else if let Some(dir) = wheel_dir {
        Trigger::Wheel(dir)
    } else if let Some(code) = mouse_code {
        Trigger::MouseButton(code)
    } else {
        Trigger::Key(codes[0])
    };

    Ok(ParsedHotkey {
        trigger,
        modifiers,
        event_filter,
        flags,
        repeat_interval_ms,
    })
}

fn apply_modifier_char(mask: ModMask, c: char) -> ModMask {
    use crate::catalogue::ModifierBit::*;
    match c {
        '^' => mask.set(LCtrl),
        '+' => mask.set(LShift),
        '!' => mask.set(LAlt),
        '#' => mask.set(LMeta),
        _ => mask,
    }
}

/// Split trailing `:suffix` tokens (possibly several) off the hotkey
/// body. Suffixes never contain `&` or modifier/prefix characters, so a
/// right-to-left scan on `:` is unambiguous.
fn split_suffixes(s: &str) -> (String, Vec<String>) {
    let mut rest = s;
    let mut suffixes = Vec::new();

    while let Some(pos) = rest.rfind(':') {
        let candidate = &rest[pos + 1..];
        if candidate == "down" || candidate == "up" || candidate.chars().all(|c| c.is_ascii_digit()) && !candidate.is_empty() {
            suffixes.push(candidate.to_string());
            rest = &rest[..pos];
        } else {
            break;
        }
    }

    suffixes.reverse();
    (rest.to_string(), suffixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evdev_ctrl_w_both_events() {
        let parsed = parse("@^W").unwrap();
        assert!(parsed.flags.evdev);
        assert_eq!(parsed.event_filter, EventFilter::Both);
        assert!(matches!(parsed.trigger, Trigger::Key(code) if code == catalogue::lookup("w").unwrap().evdev));
        assert!(parsed.modifiers.has(crate::catalogue::ModifierBit::LCtrl));
    }

    #[test]
    fn mouse_button_combo() {
        let parsed = parse("@LButton & RButton").unwrap();
        match parsed.trigger {
            Trigger::Combo(codes) => assert_eq!(codes.len(), 2),
            other => panic!("expected combo, got {other:?}"),
        }
    }

    #[test]
    fn repeat_interval_suffix() {
        let parsed = parse("@LAlt:850").unwrap();
        assert_eq!(parsed.repeat_interval_ms, 850);
    }

    #[test]
    fn prefix_order_is_irrelevant() {
        let a = parse("@~|*$W").unwrap();
        let b = parse("$*|~@W").unwrap();
        assert_eq!(a.flags.passthrough, b.flags.passthrough);
        assert_eq!(a.flags.wildcard, b.flags.wildcard);
        assert_eq!(a.flags.no_repeat_fire, b.flags.no_repeat_fire);
        assert_eq!(a.flags.suspend_group, b.flags.suspend_group);
    }

    #[test]
    fn unknown_atom_is_an_error() {
        assert!(parse("@NotAKey").is_err());
    }

    #[test]
    fn empty_atom_list_is_an_error() {
        assert!(parse("@^").is_err());
    }

    #[test]
    fn down_up_suffix_last_one_wins() {
        let parsed = parse("@W:down:up").unwrap();
        assert_eq!(parsed.event_filter, EventFilter::Up);
    }
}
