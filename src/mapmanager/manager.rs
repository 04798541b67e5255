//! Map Manager (spec component H)
//!
//! Layers named profiles of higher-level remappings on top of the Input
//! Engine and Hotkey Registry: press/hold/toggle/autofire/turbo/macro/
//! mouse-move/scroll actions, gated by window/process conditions,
//! switched by a hotkey of their own.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::hotkey::binding::{BindingFlags, EventFilter, HotkeyBinding, ModMask};
use crate::hotkey::condition::{Condition, ConditionEngine};
use crate::hotkey::conditional::ConditionalLayer;
use crate::hotkey::registry::Registry;
use crate::hotkey::{binding, parser};
use crate::input::Engine;
use crate::mapmanager::macro_recorder;
use crate::mapmanager::profile::{ActionKind, ConditionKind, Mapping, MappingCondition, Profile};
use crate::mapmanager::timer::TimerWheel;

/// Per-mapping runtime bookkeeping: the binding ids registered for it,
/// cleaned up together on profile deactivation.
#[derive(Default)]
struct MappingState {
    binding_ids: Vec<u32>,
    timer_id: Option<u64>,
}

pub struct MapManager {
    engine: Arc<Engine>,
    registry: Arc<Registry>,
    conditions: Arc<ConditionEngine>,
    conditional: Arc<ConditionalLayer>,
    timers: Arc<TimerWheel>,
    profiles: RwLock<Vec<Profile>>,
    active_profile: RwLock<Option<String>>,
    active_mappings: Mutex<HashMap<String, MappingState>>,
    path: PathBuf,
}

impl MapManager {
    pub fn new(
        engine: Arc<Engine>,
        registry: Arc<Registry>,
        conditions: Arc<ConditionEngine>,
        conditional: Arc<ConditionalLayer>,
        path: PathBuf,
    ) -> Arc<Self> {
        let timers = Arc::new(TimerWheel::new());
        timers.start();
        Arc::new(MapManager {
            engine,
            registry,
            conditions,
            conditional,
            timers,
            profiles: RwLock::new(Vec::new()),
            active_profile: RwLock::new(None),
            active_mappings: Mutex::new(HashMap::new()),
            path,
        })
    }

    /// Load persisted profiles from `self.path`, creating an empty store
    /// if the file doesn't exist yet.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no persisted profiles found, starting empty");
            return Ok(());
        }
        let contents = fs::read_to_string(&self.path).with_context(|| format!("failed to read {}", self.path.display()))?;
        let profiles: Vec<Profile> = serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", self.path.display()))?;
        info!(count = profiles.len(), "loaded profiles");
        *self.profiles.write().unwrap() = profiles;
        Ok(())
    }

    /// Persist profiles atomically: write to a sibling temp file, then
    /// rename over the target so a reader never observes a partial file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let profiles = self.profiles.read().unwrap();
        let json = serde_json::to_string_pretty(&*profiles).context("failed to serialize profiles")?;
        let tmp_path = temp_path_for(&self.path);
        fs::write(&tmp_path, &json).with_context(|| format!("failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| format!("failed to rename into {}", self.path.display()))?;
        info!(path = %self.path.display(), "saved profiles");
        Ok(())
    }

    pub fn add_profile(&self, profile: Profile) {
        self.profiles.write().unwrap().push(profile);
    }

    pub fn profile_ids(&self) -> Vec<String> {
        self.profiles.read().unwrap().iter().map(|p| p.id.clone()).collect()
    }

    pub fn active_profile_id(&self) -> Option<String> {
        self.active_profile.read().unwrap().clone()
    }

    /// Register a hotkey that switches the active profile ("Profile
    /// switching is itself a hotkey").
    pub fn bind_profile_switch(self: &Arc<Self>, hotkey: &str, target_profile_id: &str) -> Result<u32> {
        let parsed = parser::parse(hotkey)?;
        let manager = Arc::clone(self);
        let target = target_profile_id.to_string();
        let binding = HotkeyBinding {
            id: binding::next_user_id(),
            source: format!("mapmanager:switch:{target_profile_id}"),
            trigger: parsed.trigger,
            modifiers: parsed.modifiers,
            event_filter: parsed.event_filter,
            flags: parsed.flags,
            repeat_interval_ms: parsed.repeat_interval_ms,
            callback: Box::new(move || {
                if let Err(e) = manager.set_active_profile(&target) {
                    warn!(error = %e, profile = %target, "profile switch failed");
                }
            }),
            condition: None,
            enabled: true,
            grabbed: false,
            last_trigger: None,
            last_condition_result: None,
        };
        Ok(self.registry.register(binding))
    }

    /// Deactivate the current profile's mappings and activate the
    /// named one's (exactly one profile is active at a time).
    pub fn set_active_profile(&self, profile_id: &str) -> Result<()> {
        if let Some(current) = self.active_profile_id() {
            self.deactivate_profile(&current);
        }

        let profile = self
            .profiles
            .read()
            .unwrap()
            .iter()
            .find(|p| p.id == profile_id)
            .cloned()
            .with_context(|| format!("unknown profile `{profile_id}`"))?;

        for mapping in &profile.mappings {
            if !mapping.enabled {
                continue;
            }
            if let Err(e) = self.activate_mapping(profile_id, mapping) {
                warn!(error = %e, mapping = %mapping.id, "failed to activate mapping");
            }
        }

        *self.active_profile.write().unwrap() = Some(profile_id.to_string());
        info!(profile = profile_id, "profile activated");
        Ok(())
    }

    fn deactivate_profile(&self, profile_id: &str) {
        let prefix = format!("mapmanager:{profile_id}:");
        self.registry.suspend_matching(&prefix);

        let mut active = self.active_mappings.lock().unwrap();
        let keys: Vec<String> = active.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        for key in keys {
            if let Some(state) = active.remove(&key) {
                for id in state.binding_ids {
                    self.conditional.unmonitor(id);
                    self.registry.deregister(id);
                }
                if let Some(timer_id) = state.timer_id {
                    self.timers.cancel(timer_id);
                }
            }
        }
    }

    fn activate_mapping(&self, profile_id: &str, mapping: &Mapping) -> Result<()> {
        let state_key = format!("mapmanager:{profile_id}:{}", mapping.id);
        let mut state = MappingState::default();

        match mapping.action {
            ActionKind::Press => {
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, {
                    let engine = Arc::clone(&self.engine);
                    let targets = mapping.target_keys.clone();
                    move || forward_targets(&engine, &targets)
                })?);
            }
            ActionKind::Hold => {
                let engine_down = Arc::clone(&self.engine);
                let targets_down = mapping.target_keys.clone();
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, move || {
                    for key in &targets_down {
                        let _ = engine_down.send_key(key, true);
                    }
                })?);
                let engine_up = Arc::clone(&self.engine);
                let targets_up = mapping.target_keys.clone();
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Up, move || {
                    for key in &targets_up {
                        let _ = engine_up.send_key(key, false);
                    }
                })?);
            }
            ActionKind::Toggle => {
                let engine = Arc::clone(&self.engine);
                let targets = mapping.target_keys.clone();
                let on = Arc::new(Mutex::new(false));
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, move || {
                    let mut on = on.lock().unwrap();
                    *on = !*on;
                    for key in &targets {
                        let _ = engine.send_key(key, *on);
                    }
                })?);
            }
            ActionKind::Autofire | ActionKind::Turbo => {
                let interval_ms = if mapping.action == ActionKind::Turbo { mapping.turbo_interval_ms } else { mapping.interval_ms };
                let engine_fire = Arc::clone(&self.engine);
                let targets_fire = mapping.target_keys.clone();
                let timers = Arc::clone(&self.timers);
                let timer_id_slot: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));

                let timer_id_for_down = Arc::clone(&timer_id_slot);
                let timers_for_down = Arc::clone(&timers);
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, move || {
                    let engine = Arc::clone(&engine_fire);
                    let targets = targets_fire.clone();
                    let id = timers_for_down.register(interval_ms, Arc::new(move || forward_targets(&engine, &targets)));
                    *timer_id_for_down.lock().unwrap() = Some(id);
                })?);

                let timers_for_up = Arc::clone(&timers);
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Up, move || {
                    if let Some(id) = timer_id_slot.lock().unwrap().take() {
                        timers_for_up.cancel(id);
                    }
                })?);
            }
            ActionKind::Macro => {
                let engine = Arc::clone(&self.engine);
                let sequence = mapping.macro_sequence.clone();
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, move || {
                    let engine = Arc::clone(&engine);
                    let sequence = sequence.clone();
                    std::thread::spawn(move || {
                        let _ = macro_recorder::replay(&sequence, |key| engine.send_key(key, true).and_then(|_| engine.send_key(key, false)));
                    });
                })?);
            }
            ActionKind::MouseMove => {
                let (dx, dy) = parse_vector(&mapping.target_keys);
                let engine = Arc::clone(&self.engine);
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, move || {
                    let _ = engine.move_mouse(dx, dy);
                })?);
            }
            ActionKind::Scroll => {
                let amount = mapping.target_keys.first().and_then(|s| s.parse::<i32>().ok()).unwrap_or(1);
                let engine = Arc::clone(&self.engine);
                state.binding_ids.push(self.bind_source(profile_id, mapping, EventFilter::Down, move || {
                    let _ = engine.scroll(amount);
                })?);
            }
        }

        self.active_mappings.lock().unwrap().insert(state_key, state);
        Ok(())
    }

    fn bind_source(&self, profile_id: &str, mapping: &Mapping, event_filter: EventFilter, callback: impl Fn() + Send + Sync + 'static) -> Result<u32> {
        let key = crate::catalogue::lookup(&mapping.source_key).with_context(|| format!("unknown source key `{}`", mapping.source_key))?;
        let binding = HotkeyBinding {
            id: binding::next_user_id(),
            source: format!("mapmanager:{profile_id}:{}", mapping.id),
            trigger: crate::hotkey::binding::Trigger::Key(key.evdev),
            modifiers: ModMask::EMPTY,
            event_filter,
            flags: BindingFlags {
                evdev: true,
                grab: true,
                ..Default::default()
            },
            repeat_interval_ms: 0,
            callback: Box::new(callback),
            condition: mapping_condition(&mapping.conditions, Arc::clone(&self.conditions)),
            enabled: true,
            grabbed: false,
            last_trigger: None,
            last_condition_result: None,
        };
        let id = self.registry.register(binding);
        if !mapping.conditions.is_empty() {
            self.conditional.monitor(id);
        }
        Ok(id)
    }

    pub fn shutdown(&self) {
        self.timers.stop();
    }
}

fn forward_targets(engine: &Engine, targets: &[String]) {
    for key in targets {
        let _ = engine.send_key(key, true);
        let _ = engine.send_key(key, false);
    }
}

fn parse_vector(target_keys: &[String]) -> (i32, i32) {
    let dx = target_keys.first().and_then(|s| s.parse::<i32>().ok()).unwrap_or(0);
    let dy = target_keys.get(1).and_then(|s| s.parse::<i32>().ok()).unwrap_or(0);
    (dx, dy)
}

/// Build a combined `Condition::Func` gating a mapping's activation on
/// window title/class, process name or a custom expression, bridged
/// through whatever properties the daemon's window layer has
/// registered with the Condition Engine (e.g. `window_title`). A
/// mapping with no conditions is unconditionally active (`None`).
fn mapping_condition(conditions: &[MappingCondition], engine: Arc<ConditionEngine>) -> Option<Condition> {
    if conditions.is_empty() {
        return None;
    }
    let exprs: Vec<String> = conditions.iter().map(to_condition_expr).collect();
    Some(Condition::func(move || exprs.iter().all(|expr| engine.evaluate_condition(expr).unwrap_or(false))))
}

fn to_condition_expr(cond: &MappingCondition) -> String {
    match cond.kind {
        ConditionKind::WindowTitle => format!("window_title ~= '{}'", cond.pattern),
        ConditionKind::WindowClass => format!("window_class == '{}'", cond.pattern),
        ConditionKind::ProcessName => format!("process_name == '{}'", cond.pattern),
        ConditionKind::Custom => cond.pattern.clone(),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    tmp.set_file_name(format!("{file_name}.tmp"));
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_lives_beside_target() {
        let path = PathBuf::from("/tmp/havel/profiles.json");
        let tmp = temp_path_for(&path);
        assert_eq!(tmp, PathBuf::from("/tmp/havel/profiles.json.tmp"));
    }

    #[test]
    fn parse_vector_defaults_missing_components_to_zero() {
        assert_eq!(parse_vector(&["5".to_string()]), (5, 0));
        assert_eq!(parse_vector(&["5".to_string(), "-3".to_string()]), (5, -3));
        assert_eq!(parse_vector(&[]), (0, 0));
    }

    #[test]
    fn condition_expr_translates_each_kind() {
        assert_eq!(
            to_condition_expr(&MappingCondition { kind: ConditionKind::WindowTitle, pattern: "Firefox".into() }),
            "window_title ~= 'Firefox'"
        );
        assert_eq!(
            to_condition_expr(&MappingCondition { kind: ConditionKind::Custom, pattern: "mode == 'gaming'".into() }),
            "mode == 'gaming'"
        );
    }
}
