//! Parses the `/proc/bus/input/devices` inventory format
//!
//! Device blocks are separated by a blank line; each line begins with a
//! single-letter tag (`I`, `N`, `P`, `S`, `U`, `H`, `B`). See
//! spec.md §6 "Device enumeration".

use anyhow::{Context, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RawDeviceBlock {
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
    pub name: String,
    pub sysfs: String,
    pub event_node: Option<String>,
    /// Bitmap name (e.g. "EV", "KEY", "REL", "ABS") -> little-endian u64 words, least-significant first.
    pub capabilities: HashMap<String, Vec<u64>>,
}

/// Parse the full contents of a `/proc/bus/input/devices`-formatted inventory.
pub fn parse_inventory(contents: &str) -> Vec<RawDeviceBlock> {
    let mut blocks = Vec::new();
    let mut current = RawDeviceBlock::default();
    let mut has_content = false;

    for line in contents.lines() {
        if line.trim().is_empty() {
            if has_content {
                blocks.push(std::mem::take(&mut current));
                has_content = false;
            }
            continue;
        }
        has_content = true;
        parse_line(&mut current, line);
    }
    if has_content {
        blocks.push(current);
    }

    blocks
}

fn parse_line(block: &mut RawDeviceBlock, line: &str) {
    let Some((tag, rest)) = line.split_once(':') else {
        return;
    };
    let tag = tag.trim();
    let rest = rest.trim();

    match tag {
        "I" => parse_i_line(block, rest),
        "N" => {
            // N: Name="Some Device"
            if let Some(start) = rest.find('"') {
                let after = &rest[start + 1..];
                if let Some(end) = after.find('"') {
                    block.name = after[..end].to_string();
                }
            }
        }
        "P" => {
            block.sysfs = rest.to_string();
        }
        "S" => {
            block.sysfs = rest.to_string();
        }
        "H" => {
            // H: Handlers=kbd event4 js0
            for token in rest.split_whitespace() {
                if let Some(n) = token.strip_prefix("event") {
                    block.event_node = Some(format!("event{n}"));
                }
            }
        }
        "B" => {
            // B: <cap name>=<space separated hex words, most significant first on the line>
            if let Some((name, value)) = rest.split_once('=') {
                let words: Vec<u64> = value
                    .split_whitespace()
                    .filter_map(|w| u64::from_str_radix(w, 16).ok())
                    .collect();
                // Lines are written most-significant-word-first; store
                // little-endian (index 0 = least significant word).
                let mut words = words;
                words.reverse();
                block.capabilities.insert(name.to_string(), words);
            }
        }
        "U" => {}
        _ => {}
    }
}

fn parse_i_line(block: &mut RawDeviceBlock, rest: &str) {
    // I: Bus=0003 Vendor=046d Product=c52b Version=0111
    for field in rest.split_whitespace() {
        if let Some((key, value)) = field.split_once('=') {
            let parsed = u16::from_str_radix(value, 16).unwrap_or(0);
            match key {
                "Bus" => block.bus = parsed,
                "Vendor" => block.vendor = parsed,
                "Product" => block.product = parsed,
                "Version" => block.version = parsed,
                _ => {}
            }
        }
    }
}

/// Read and parse the system inventory file.
pub fn read_system_inventory(path: &str) -> Result<Vec<RawDeviceBlock>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input device inventory at {path}"))?;
    Ok(parse_inventory(&contents))
}

/// Test whether a capability bitmap has a given bit set.
pub fn bit_set(words: &[u64], bit: usize) -> bool {
    let word_ix = bit / 64;
    let bit_ix = bit % 64;
    words.get(word_ix).is_some_and(|w| (w >> bit_ix) & 1 == 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
I: Bus=0003 Vendor=046d Product=c52b Version=0111
N: Name=\"Logitech USB Receiver\"
P: Phys=usb-0000:00:14.0-1/input0
S: Sysfs=/devices/pci0000:00/0000:00:14.0/usb1/1-1/1-1:1.0/0003:046D:C52B.0001/input/input0
U: Uniq=
H: Handlers=sysrq kbd event4 leds
B: PROP=0
B: EV=120013
B: KEY=1000000000007 ff9f207ac14057ff febeffdfffefffff fffffffffffffffe
B: MSC=10

I: Bus=0003 Vendor=046d Product=c52e Version=0111
N: Name=\"Logitech USB Mouse\"
P: Phys=usb-0000:00:14.0-2/input0
S: Sysfs=/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/0003:046D:C52E.0001/input/input0
U: Uniq=
H: Handlers=mouse0 event5
B: PROP=0
B: EV=17
B: KEY=ffff0000000000000000000000000000
B: REL=143
";

    #[test]
    fn parses_two_blocks() {
        let blocks = parse_inventory(SAMPLE);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].vendor, 0x046d);
        assert_eq!(blocks[0].product, 0xc52b);
        assert_eq!(blocks[0].name, "Logitech USB Receiver");
        assert_eq!(blocks[0].event_node.as_deref(), Some("event4"));
        assert_eq!(blocks[1].product, 0xc52e);
        assert_eq!(blocks[1].event_node.as_deref(), Some("event5"));
    }

    #[test]
    fn capability_bits_parsed() {
        let blocks = parse_inventory(SAMPLE);
        let ev = &blocks[1].capabilities["EV"];
        // EV=17 -> bits 0,1,2,4 set (SYN, KEY, REL, MSC not included; just check a couple)
        assert!(bit_set(ev, 0));
        assert!(bit_set(ev, 1));
        assert!(bit_set(ev, 4));
        assert!(!bit_set(ev, 3));
    }
}
