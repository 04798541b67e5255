//! Persisted profile/mapping data model (spec.md §3 "Profile / Mapping",
//! §6 "Persisted state")
//!
//! Serialized exactly as spec.md §6 describes: a JSON array of profile
//! objects with `id`, `name`, `mappings`, each mapping carrying `id`,
//! `name`, `type`, `sourceKey`, `targetKeys`, `action`, `autofire`,
//! `interval`, `conditions`.

use serde::{Deserialize, Serialize};

/// What a mapping does once its source fires (spec.md §4.H), persisted
/// under the `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Press,
    Hold,
    Toggle,
    Autofire,
    Turbo,
    Macro,
    MouseMove,
    Scroll,
}

/// A gate on a mapping's activation (spec.md §4.H "Conditions").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingCondition {
    pub kind: ConditionKind,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionKind {
    WindowTitle,
    WindowClass,
    ProcessName,
    Custom,
}

/// One recorded macro step: a key name and the delay (ms) before it
/// fires relative to the previous step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroStep {
    pub key: String,
    pub delay_ms: u64,
}

/// Persisted field names follow spec.md §6 verbatim (`sourceKey`,
/// `targetKeys`, `interval`); everything else uses snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: String,
    pub name: String,
    /// Free-form label for the source input kind (key-to-key, joy-axis,
    /// combo, macro, ...); the crate only acts on `source_key` +
    /// `action`, so this is carried through for GUI/diagnostic use.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "sourceKey")]
    pub source_key: String,
    #[serde(rename = "targetKeys", default)]
    pub target_keys: Vec<String>,
    pub action: ActionKind,
    #[serde(default)]
    pub autofire: bool,
    #[serde(rename = "interval", default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub turbo: bool,
    #[serde(default = "default_turbo_interval_ms")]
    pub turbo_interval_ms: u64,
    #[serde(default)]
    pub macro_sequence: Vec<MacroStep>,
    #[serde(default)]
    pub conditions: Vec<MappingCondition>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_interval_ms() -> u64 {
    100
}

fn default_turbo_interval_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

impl Profile {
    pub fn find_mapping(&self, source_key: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.source_key == source_key)
    }

    pub fn find_mapping_mut(&mut self, source_key: &str) -> Option<&mut Mapping> {
        self.mappings.iter_mut().find(|m| m.source_key == source_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_deserializes_from_persisted_shape() {
        let json = r#"{
            "id": "m1",
            "name": "autofire-space",
            "type": "key-to-key",
            "sourceKey": "space",
            "targetKeys": ["space"],
            "action": "autofire",
            "autofire": true,
            "interval": 80
        }"#;
        let mapping: Mapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.action, ActionKind::Autofire);
        assert_eq!(mapping.source_key, "space");
        assert!(mapping.autofire);
        assert_eq!(mapping.interval_ms, 80);
    }

    #[test]
    fn profile_round_trips_through_json() {
        let profile = Profile {
            id: "p1".into(),
            name: "Gaming".into(),
            mappings: vec![Mapping {
                id: "m1".into(),
                name: "toggle-mute".into(),
                kind: "key-to-key".into(),
                source_key: "f9".into(),
                target_keys: vec!["mute".into()],
                action: ActionKind::Toggle,
                autofire: false,
                interval_ms: 100,
                turbo: false,
                turbo_interval_ms: 50,
                macro_sequence: Vec::new(),
                conditions: Vec::new(),
                enabled: true,
            }],
        };
        let json = serde_json::to_string(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mappings[0].source_key, "f9");
    }
}
