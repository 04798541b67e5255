//! Hotkey Algebra: the DSL parser, binding data model, registry,
//! condition engine and conditional overlay (spec.md components C, E,
//! F, G).

pub mod binding;
pub mod condition;
pub mod conditional;
pub mod parser;
pub mod registry;

pub use binding::{BindingFlags, EventFilter, HotkeyBinding, ModMask, Trigger};
pub use condition::{Condition, ConditionEngine};
pub use conditional::ConditionalLayer;
pub use registry::Registry;
