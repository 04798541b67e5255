//! Map Manager (spec component H)
//!
//! Profiles of higher-level remappings — press/hold/toggle/autofire/
//! turbo/macro/mouse actions gated by conditions — layered on top of
//! the Hotkey Registry and Input Engine.

pub mod macro_recorder;
pub mod manager;
pub mod profile;
pub mod timer;

pub use macro_recorder::MacroRecorder;
pub use manager::MapManager;
pub use profile::{ActionKind, ConditionKind, MacroStep, Mapping, MappingCondition, Profile};
pub use timer::TimerWheel;
