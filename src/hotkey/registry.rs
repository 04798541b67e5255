//! Hotkey Registry (spec component E)
//!
//! Stores bindings by id and a parallel id list, exposes grab/ungrab and
//! registration, and matches/dispatches bindings against input events.
//! The registry lock is taken briefly: write for registration/grab state
//! changes, read for per-event evaluation (spec.md §5).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use tracing::{debug, info};

use crate::hotkey::binding::{BindingFlags, Callback, EventFilter, HotkeyBinding, ModMask, Trigger};
use crate::hotkey::condition::{Condition, ConditionEngine};

pub struct Registry {
    bindings: RwLock<HashMap<u32, HotkeyBinding>>,
    order: RwLock<Vec<u32>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            bindings: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Register a binding, allocating storage for it under its own id.
    /// `grabbed` mirrors the `grab` flag: bindings start grabbed iff
    /// they request it, never in conflict with their enabled state.
    pub fn register(&self, mut binding: HotkeyBinding) -> u32 {
        binding.normalize();
        binding.grabbed = binding.flags.grab;
        let id = binding.id;

        info!(id, source = %binding.source, "registering hotkey binding");

        self.bindings.write().unwrap().insert(id, binding);
        self.order.write().unwrap().push(id);
        id
    }

    /// Deregister a binding: ungrab first, then remove (spec.md §4.E).
    pub fn deregister(&self, id: u32) -> bool {
        self.ungrab(id);
        let removed = self.bindings.write().unwrap().remove(&id).is_some();
        if removed {
            self.order.write().unwrap().retain(|&x| x != id);
        }
        removed
    }

    pub fn grab(&self, id: u32) -> bool {
        if let Some(binding) = self.bindings.write().unwrap().get_mut(&id) {
            binding.grabbed = true;
            debug!(id, "grabbed hotkey");
            true
        } else {
            false
        }
    }

    pub fn ungrab(&self, id: u32) -> bool {
        if let Some(binding) = self.bindings.write().unwrap().get_mut(&id) {
            binding.grabbed = false;
            debug!(id, "ungrabbed hotkey");
            true
        } else {
            false
        }
    }

    pub fn set_enabled(&self, id: u32, enabled: bool) -> bool {
        if let Some(binding) = self.bindings.write().unwrap().get_mut(&id) {
            binding.enabled = enabled;
            true
        } else {
            false
        }
    }

    pub fn is_grabbed(&self, id: u32) -> Option<bool> {
        self.bindings.read().unwrap().get(&id).map(|b| b.grabbed)
    }

    /// Suspend/resume every `suspend_group` binding at once, per
    /// spec.md §4.F "Suspend/Resume checkpoints the current grab state".
    pub fn suspend_all(&self) -> Vec<(u32, bool)> {
        let mut bindings = self.bindings.write().unwrap();
        let mut checkpoint = Vec::new();
        for (&id, binding) in bindings.iter_mut() {
            if binding.flags.suspend_group {
                checkpoint.push((id, binding.grabbed));
                binding.grabbed = false;
            }
        }
        checkpoint
    }

    pub fn resume_all(&self, checkpoint: &[(u32, bool)]) {
        let mut bindings = self.bindings.write().unwrap();
        for &(id, was_grabbed) in checkpoint {
            if let Some(binding) = bindings.get_mut(&id) {
                binding.grabbed = was_grabbed;
            }
        }
    }

    /// Suspend every binding whose source expression starts with
    /// `prefix`, used by the Map Manager's profile switch.
    pub fn suspend_matching(&self, prefix: &str) {
        let mut bindings = self.bindings.write().unwrap();
        for binding in bindings.values_mut() {
            if binding.source.starts_with(prefix) {
                binding.grabbed = false;
            }
        }
    }

    pub fn resume_matching(&self, prefix: &str) {
        let mut bindings = self.bindings.write().unwrap();
        for binding in bindings.values_mut() {
            if binding.source.starts_with(prefix) {
                binding.grabbed = binding.flags.grab;
            }
        }
    }

    pub fn set_callback(&self, id: u32, callback: Callback) {
        if let Some(binding) = self.bindings.write().unwrap().get_mut(&id) {
            binding.callback = callback;
        }
    }

    pub fn set_condition(&self, id: u32, condition: Option<Condition>) {
        if let Some(binding) = self.bindings.write().unwrap().get_mut(&id) {
            binding.condition = condition;
        }
    }

    pub fn condition_expr(&self, id: u32) -> Option<String> {
        self.bindings.read().unwrap().get(&id).and_then(|b| match &b.condition {
            Some(Condition::Text(expr)) => Some(expr.clone()),
            _ => None,
        })
    }

    pub fn has_functional_condition(&self, id: u32) -> bool {
        self.bindings
            .read()
            .unwrap()
            .get(&id)
            .is_some_and(|b| matches!(b.condition, Some(Condition::Func(_))))
    }

    pub fn evaluate_functional_condition(&self, id: u32, engine: &ConditionEngine) -> Option<bool> {
        let bindings = self.bindings.read().unwrap();
        let binding = bindings.get(&id)?;
        let condition = binding.condition.as_ref()?;
        engine.evaluate(condition).ok()
    }

    /// All ids with a monitorable condition (textual or functional),
    /// for the Conditional Layer to track.
    pub fn conditioned_ids(&self) -> Vec<u32> {
        self.bindings
            .read()
            .unwrap()
            .iter()
            .filter(|(_, b)| b.condition.is_some())
            .map(|(&id, _)| id)
            .collect()
    }

    /// Match all evdev-flagged bindings against one logical event, per
    /// the evaluation order in spec.md §4.D "Binding evaluation". Returns
    /// the callbacks to run (not invoked here) and whether any matched
    /// binding requests a grab.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        trigger_key: Option<u16>,
        active_inputs: &HashMap<u16, Instant>,
        modifiers: ModMask,
        is_down: bool,
        is_repeat: bool,
        triggering_key_is_modifier: bool,
    ) -> MatchOutcome {
        let mut bindings = self.bindings.write().unwrap();
        let mut fired = Vec::new();
        let mut grabbed = false;
        let now = Instant::now();

        for binding in bindings.values_mut() {
            if !binding.enabled || !binding.flags.evdev {
                continue;
            }

            if !trigger_matches(&binding.trigger, trigger_key, active_inputs) {
                continue;
            }

            if is_repeat && binding.flags.no_repeat_fire {
                continue;
            }

            if !event_filter_matches(binding.event_filter, is_down) {
                continue;
            }

            let modifiers_ok = if triggering_key_is_modifier && binding.modifiers.is_empty() {
                true
            } else if binding.flags.wildcard {
                modifiers.wildcard_matches(binding.modifiers)
            } else {
                modifiers.exact_matches(binding.modifiers)
            };
            if !modifiers_ok {
                continue;
            }

            if binding.repeat_interval_ms > 0 {
                if is_repeat {
                    let elapsed = binding
                        .last_trigger
                        .map(|t| now.duration_since(t).as_millis() as u64)
                        .unwrap_or(u64::MAX);
                    if elapsed < binding.repeat_interval_ms {
                        continue;
                    }
                }
                binding.last_trigger = Some(now);
            }

            if binding.flags.grab {
                grabbed = true;
            }
            fired.push(binding.id);
        }

        drop(bindings);

        MatchOutcome {
            ids: fired,
            grabbed,
        }
    }

    /// Invoke the callbacks for a previously matched set of ids. Split
    /// from `evaluate` so the registry lock from evaluation is released
    /// before any user callback runs (spec.md §5 "no lock is held across
    /// callback invocation").
    pub fn dispatch(&self, ids: &[u32]) {
        let bindings = self.bindings.read().unwrap();
        for id in ids {
            if let Some(binding) = bindings.get(id) {
                (binding.callback)();
            }
        }
    }

    /// Scan enabled evdev bindings for a wheel trigger matching
    /// `direction`; wheel events aren't keyed the way key/button events
    /// are, so this is a direct scan instead of going through `evaluate`.
    pub fn wheel_matches(&self, direction: i8) -> Vec<u32> {
        self.bindings
            .read()
            .unwrap()
            .values()
            .filter(|b| b.enabled && wheel_matches(&b.flags, &b.trigger, direction))
            .map(|b| b.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct MatchOutcome {
    pub ids: Vec<u32>,
    pub grabbed: bool,
}

fn trigger_matches(trigger: &Trigger, trigger_key: Option<u16>, active_inputs: &HashMap<u16, Instant>) -> bool {
    match trigger {
        Trigger::Key(code) | Trigger::MouseButton(code) => Some(*code) == trigger_key,
        Trigger::Wheel(_) => false, // wheel bindings are matched separately by direction, see input::engine
        Trigger::Combo(keys) => keys.iter().all(|k| active_inputs.contains_key(k)),
    }
}

fn event_filter_matches(filter: EventFilter, is_down: bool) -> bool {
    match filter {
        EventFilter::Both => true,
        EventFilter::Down => is_down,
        EventFilter::Up => !is_down,
    }
}

/// Match a wheel-direction binding; called directly by the Input Engine
/// since wheel events aren't keyed the way key/button events are.
pub fn wheel_matches(flags: &BindingFlags, trigger: &Trigger, direction: i8) -> bool {
    flags.evdev && matches!(trigger, Trigger::Wheel(d) if *d == direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::ModifierBit;
    use crate::hotkey::binding::next_user_id;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn make_binding(id: u32, trigger: Trigger, modifiers: ModMask, wildcard: bool, counter: Arc<AtomicU32>) -> HotkeyBinding {
        HotkeyBinding {
            id,
            source: format!("test-{id}"),
            trigger,
            modifiers,
            event_filter: EventFilter::Both,
            flags: BindingFlags {
                evdev: true,
                wildcard,
                ..Default::default()
            },
            repeat_interval_ms: 0,
            callback: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            condition: None,
            enabled: true,
            grabbed: false,
            last_trigger: None,
            last_condition_result: None,
        }
    }

    #[test]
    fn wildcard_allows_extra_modifiers_to_fire() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let required = ModMask::EMPTY.set(ModifierBit::LCtrl);
        registry.register(make_binding(next_user_id(), Trigger::Key(17), required, true, counter.clone()));

        let actual_mods = ModMask::EMPTY.set(ModifierBit::LCtrl).set(ModifierBit::LShift);
        let outcome = registry.evaluate(Some(17), &HashMap::new(), actual_mods, true, false, false);
        assert_eq!(outcome.ids.len(), 1);
    }

    #[test]
    fn without_wildcard_extra_modifiers_block_match() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let required = ModMask::EMPTY.set(ModifierBit::LCtrl);
        registry.register(make_binding(next_user_id(), Trigger::Key(17), required, false, counter));

        let actual_mods = ModMask::EMPTY.set(ModifierBit::LCtrl).set(ModifierBit::LShift);
        let outcome = registry.evaluate(Some(17), &HashMap::new(), actual_mods, true, false, false);
        assert!(outcome.ids.is_empty());
    }

    #[test]
    fn combo_requires_all_keys_active() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicU32::new(0));
        registry.register(make_binding(
            next_user_id(),
            Trigger::Combo(vec![0x110, 0x111]),
            ModMask::EMPTY,
            false,
            counter,
        ));

        let mut active = HashMap::new();
        active.insert(0x110u16, Instant::now());
        let outcome = registry.evaluate(None, &active, ModMask::EMPTY, true, false, false);
        assert!(outcome.ids.is_empty());

        active.insert(0x111u16, Instant::now());
        let outcome = registry.evaluate(None, &active, ModMask::EMPTY, true, false, false);
        assert_eq!(outcome.ids.len(), 1);
    }

    #[test]
    fn grab_and_deregister() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let id = next_user_id();
        registry.register(make_binding(id, Trigger::Key(30), ModMask::EMPTY, false, counter));

        assert_eq!(registry.is_grabbed(id), Some(false));
        registry.grab(id);
        assert_eq!(registry.is_grabbed(id), Some(true));
        assert!(registry.deregister(id));
        assert_eq!(registry.is_grabbed(id), None);
    }

    #[test]
    fn repeat_interval_throttles_fires() {
        let registry = Registry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let mut binding = make_binding(next_user_id(), Trigger::Key(30), ModMask::EMPTY, false, counter);
        binding.repeat_interval_ms = 500;
        let id = binding.id;
        registry.register(binding);

        // A fresh (non-repeat) press always fires and stamps the timer.
        let first = registry.evaluate(Some(30), &HashMap::new(), ModMask::EMPTY, true, false, false);
        assert_eq!(first.ids, vec![id]);

        // An immediate auto-repeat is throttled.
        let second = registry.evaluate(Some(30), &HashMap::new(), ModMask::EMPTY, true, true, false);
        assert!(second.ids.is_empty());
    }
}
