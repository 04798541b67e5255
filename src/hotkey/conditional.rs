//! Conditional Layer (spec component F)
//!
//! A background thread that wakes every 50ms (or on demand) and
//! re-evaluates every monitored binding's condition, flipping its grab
//! state through the Registry when the result changes. Functional
//! conditions are called directly; textual ones go through the
//! Condition Engine, which keeps its own 50ms result cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::constants::timing;
use crate::hotkey::condition::ConditionEngine;
use crate::hotkey::registry::Registry;

struct MonitorState {
    last_result: Option<bool>,
}

pub struct ConditionalLayer {
    registry: Arc<Registry>,
    conditions: Arc<ConditionEngine>,
    monitored: Mutex<HashMap<u32, MonitorState>>,
    running: Arc<AtomicBool>,
    suspended: AtomicBool,
    suspend_checkpoint: Mutex<Vec<(u32, bool)>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ConditionalLayer {
    pub fn new(registry: Arc<Registry>, conditions: Arc<ConditionEngine>) -> Arc<Self> {
        Arc::new(ConditionalLayer {
            registry,
            conditions,
            monitored: Mutex::new(HashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
            suspended: AtomicBool::new(false),
            suspend_checkpoint: Mutex::new(Vec::new()),
            thread: Mutex::new(None),
        })
    }

    /// Start tracking `id`; first evaluation happens on the next tick.
    pub fn monitor(&self, id: u32) {
        self.monitored.lock().unwrap().insert(id, MonitorState { last_result: None });
    }

    pub fn unmonitor(&self, id: u32) {
        self.monitored.lock().unwrap().remove(&id);
    }

    /// Spawn the timer thread. Idempotent: calling twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let handle = thread::spawn(move || {
            info!("conditional layer timer started");
            while this.running.load(Ordering::SeqCst) {
                this.tick();
                thread::sleep(Duration::from_millis(timing::CONDITIONAL_TICK_MS));
            }
            info!("conditional layer timer stopped");
        });
        *self.thread.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Re-evaluate every monitored binding once. Public so callers can
    /// force an evaluation outside the timer cadence (e.g. right after a
    /// mode switch).
    pub fn tick(&self) {
        if self.suspended.load(Ordering::SeqCst) {
            return;
        }

        let ids: Vec<u32> = self.monitored.lock().unwrap().keys().copied().collect();
        for id in ids {
            let result = if self.registry.has_functional_condition(id) {
                self.registry.evaluate_functional_condition(id, &self.conditions)
            } else if let Some(expr) = self.registry.condition_expr(id) {
                self.conditions.evaluate_condition(&expr).ok()
            } else {
                None
            };

            let Some(result) = result else { continue };

            let mut monitored = self.monitored.lock().unwrap();
            let Some(state) = monitored.get_mut(&id) else { continue };
            if state.last_result == Some(result) {
                continue;
            }
            state.last_result = Some(result);
            drop(monitored);

            debug!(id, result, "condition result changed");
            if result {
                self.registry.grab(id);
            } else {
                self.registry.ungrab(id);
            }
        }
    }

    /// Checkpoint the current grab state of every suspend-group binding
    /// and flip the overall enable flag off.
    pub fn suspend(&self) {
        let checkpoint = self.registry.suspend_all();
        *self.suspend_checkpoint.lock().unwrap() = checkpoint;
        self.suspended.store(true, Ordering::SeqCst);
        info!("hotkeys suspended");
    }

    pub fn resume(&self) {
        let checkpoint = std::mem::take(&mut *self.suspend_checkpoint.lock().unwrap());
        self.registry.resume_all(&checkpoint);
        self.suspended.store(false, Ordering::SeqCst);
        info!("hotkeys resumed");
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::binding::{BindingFlags, EventFilter, HotkeyBinding, ModMask, Trigger};
    use crate::hotkey::condition::Condition;
    use std::sync::atomic::AtomicU32;

    fn binding_with_condition(id: u32, condition: Condition) -> HotkeyBinding {
        HotkeyBinding {
            id,
            source: "test".into(),
            trigger: Trigger::Key(30),
            modifiers: ModMask::EMPTY,
            event_filter: EventFilter::Both,
            flags: BindingFlags { evdev: true, grab: true, ..Default::default() },
            repeat_interval_ms: 0,
            callback: Box::new(|| {}),
            condition: Some(condition),
            enabled: true,
            grabbed: false,
            last_trigger: None,
            last_condition_result: None,
        }
    }

    #[test]
    fn flips_grab_state_when_text_condition_changes() {
        let registry = Arc::new(Registry::new());
        let conditions = Arc::new(ConditionEngine::new());
        let mode = Arc::new(Mutex::new("normal".to_string()));
        {
            let mode = Arc::clone(&mode);
            conditions.register_string_property("mode", move || mode.lock().unwrap().clone());
        }

        let id = crate::hotkey::binding::next_user_id();
        registry.register(binding_with_condition(id, Condition::text("mode == 'gaming'")));

        let layer = ConditionalLayer::new(Arc::clone(&registry), Arc::clone(&conditions));
        layer.monitor(id);

        layer.tick();
        assert_eq!(registry.is_grabbed(id), Some(false));

        *mode.lock().unwrap() = "gaming".to_string();
        conditions.invalidate_cache();
        layer.tick();
        assert_eq!(registry.is_grabbed(id), Some(true));
    }

    #[test]
    fn functional_condition_is_called_directly() {
        let registry = Arc::new(Registry::new());
        let conditions = Arc::new(ConditionEngine::new());
        let flag = Arc::new(AtomicU32::new(0));
        let flag2 = Arc::clone(&flag);

        let id = crate::hotkey::binding::next_user_id();
        registry.register(binding_with_condition(
            id,
            Condition::func(move || flag2.load(Ordering::SeqCst) == 1),
        ));

        let layer = ConditionalLayer::new(registry.clone(), conditions);
        layer.monitor(id);
        layer.tick();
        assert_eq!(registry.is_grabbed(id), Some(false));

        flag.store(1, Ordering::SeqCst);
        layer.tick();
        assert_eq!(registry.is_grabbed(id), Some(true));
    }

    #[test]
    fn suspend_and_resume_round_trip() {
        let registry = Arc::new(Registry::new());
        let conditions = Arc::new(ConditionEngine::new());
        let mut binding = binding_with_condition(crate::hotkey::binding::next_user_id(), Condition::func(|| true));
        binding.flags.suspend_group = true;
        binding.grabbed = true;
        let id = binding.id;
        registry.register(binding);
        registry.grab(id);

        let layer = ConditionalLayer::new(registry.clone(), conditions);
        layer.suspend();
        assert_eq!(registry.is_grabbed(id), Some(false));
        assert!(layer.is_suspended());

        layer.resume();
        assert_eq!(registry.is_grabbed(id), Some(true));
        assert!(!layer.is_suspended());
    }
}
