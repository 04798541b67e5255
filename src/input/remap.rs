//! Key remap pipeline (spec.md §4.D "Key remap pipeline")
//!
//! A per-origin remap table maps an incoming code to another code. On
//! press, the mapping used is captured into `active` keyed by the
//! original code, so release emits the same mapped code even if the
//! table changes mid-press.

use std::collections::HashMap;

#[derive(Default)]
pub struct RemapTable {
    table: HashMap<u16, u16>,
    active: HashMap<u16, u16>,
}

impl RemapTable {
    pub fn set(&mut self, from: u16, to: u16) {
        self.table.insert(from, to);
    }

    pub fn remove(&mut self, from: u16) {
        self.table.remove(&from);
    }

    /// Resolve the outgoing code for an incoming press/release. On
    /// press, looks up (and records) the current mapping; on release,
    /// replays whatever was captured at press time, falling back to the
    /// original code if none was recorded (e.g. the remap was added
    /// after the key was already down).
    pub fn resolve(&mut self, origin: u16, down: bool) -> u16 {
        if down {
            let target = self.table.get(&origin).copied().unwrap_or(origin);
            self.active.insert(origin, target);
            target
        } else {
            self.active.remove(&origin).unwrap_or(origin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_across_table_mutation_mid_press() {
        let mut remap = RemapTable::default();
        remap.set(30, 31);

        assert_eq!(remap.resolve(30, true), 31);
        remap.set(30, 32); // table changes while the key is still held
        assert_eq!(remap.resolve(30, false), 31);
    }

    #[test]
    fn unmapped_key_passes_through() {
        let mut remap = RemapTable::default();
        assert_eq!(remap.resolve(10, true), 10);
        assert_eq!(remap.resolve(10, false), 10);
    }
}
