//! Built-in function table (spec component L, dispatched from `vm.rs`)
//!
//! Maps a (possibly dotted) call name to a concrete effect. Most bridge
//! straight to the `Arc<Engine>` operations from `input/engine.rs`;
//! `clipboard.*`/`window.*` are external collaborators spec.md only
//! specifies the interface to (§1 "external collaborators") so they are
//! backed here by minimal in-process state rather than a real X11/Wayland
//! integration.

use std::sync::{Arc, Mutex, Weak};

use tracing::info;

use crate::error::RuntimeFault;
use crate::input::engine::Engine;
use crate::lang::compiler::Value;
use crate::lang::vm::Interpreter;

/// Everything a builtin needs to reach outside the interpreter: the
/// Input Engine for device effects, and a weak link back to the
/// interpreter (set once at startup) so `setmode` can drive mode
/// transitions without an `Arc` reference cycle.
pub struct BuiltinContext {
    pub engine: Option<Arc<Engine>>,
    interpreter: Mutex<Option<Weak<Interpreter>>>,
    clipboard: Mutex<String>,
    window_title: Mutex<String>,
}

impl BuiltinContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        BuiltinContext {
            engine: Some(engine),
            interpreter: Mutex::new(None),
            clipboard: Mutex::new(String::new()),
            window_title: Mutex::new(String::new()),
        }
    }

    /// No device backing, used by compiler/VM unit tests that never
    /// reach a `mouse.*`/`send`/etc. call.
    pub fn headless_for_tests() -> Self {
        BuiltinContext {
            engine: None,
            interpreter: Mutex::new(None),
            clipboard: Mutex::new(String::new()),
            window_title: Mutex::new(String::new()),
        }
    }

    pub fn bind_interpreter(&self, interpreter: &Arc<Interpreter>) {
        *self.interpreter.lock().unwrap() = Some(Arc::downgrade(interpreter));
    }

    fn engine(&self) -> Result<&Arc<Engine>, RuntimeFault> {
        self.engine.as_ref().ok_or_else(|| RuntimeFault::Custom("no input engine attached".to_string()))
    }
}

/// Requires a `Value::Str` argument, faulting rather than coercing so
/// e.g. `10 | upper` raises a type error instead of silently stringifying.
/// `builtin` names the caller for the fault message ("upper expects string").
fn arg_str(args: &[Value], i: usize, builtin: &str) -> Result<String, RuntimeFault> {
    match args.get(i) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(_) => Err(RuntimeFault::TypeError(format!("{builtin} expects string"))),
        None => Err(RuntimeFault::ArityMismatch { expected: i + 1, got: args.len() }),
    }
}

fn arg_num(args: &[Value], i: usize) -> Result<f64, RuntimeFault> {
    match args.get(i) {
        Some(Value::Number(n)) => Ok(*n),
        Some(other) => Err(RuntimeFault::TypeError(format!("expected a number, got {other:?}"))),
        None => Err(RuntimeFault::ArityMismatch { expected: i + 1, got: args.len() }),
    }
}

fn arg_int(args: &[Value], i: usize) -> Result<i32, RuntimeFault> {
    Ok(arg_num(args, i)? as i32)
}

/// Dispatch a call to a builtin by its flattened name. Returns
/// `RuntimeFault::UnknownBuiltin` if `name` matches neither a builtin nor
/// a compiled user function (the caller, `vm::Interpreter::dispatch_call`,
/// already checked the latter).
pub fn dispatch(name: &str, args: Vec<Value>, ctx: &BuiltinContext) -> Result<Value, RuntimeFault> {
    match name {
        "print" | "log" => {
            let text = args.iter().map(Value::to_display_string).collect::<Vec<_>>().join(" ");
            info!(target: "havel::script", "{text}");
            println!("{text}");
            Ok(Value::Null)
        }
        "upper" => Ok(Value::Str(arg_str(&args, 0, "upper")?.to_uppercase())),
        "lower" => Ok(Value::Str(arg_str(&args, 0, "lower")?.to_lowercase())),
        "trim" => Ok(Value::Str(arg_str(&args, 0, "trim")?.trim().to_string())),
        "replace" => {
            let s = arg_str(&args, 0, "replace")?;
            let from = arg_str(&args, 1, "replace")?;
            let to = arg_str(&args, 2, "replace")?;
            Ok(Value::Str(s.replace(&from, &to)))
        }
        "len" => match args.first() {
            Some(Value::Str(s)) => Ok(Value::Number(s.chars().count() as f64)),
            Some(Value::Array(a)) => Ok(Value::Number(a.len() as f64)),
            Some(other) => Err(RuntimeFault::TypeError(format!("{other:?} has no length"))),
            None => Err(RuntimeFault::ArityMismatch { expected: 1, got: 0 }),
        },
        "sleep" => {
            let ms = arg_num(&args, 0)?;
            std::thread::sleep(std::time::Duration::from_millis(ms.max(0.0) as u64));
            Ok(Value::Null)
        }
        "send" => {
            let text = arg_str(&args, 0, "send")?;
            ctx.engine()?.send_text(&text).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            Ok(Value::Null)
        }
        "mouse.move" => {
            let dx = arg_int(&args, 0)?;
            let dy = arg_int(&args, 1)?;
            ctx.engine()?.move_mouse(dx, dy).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            Ok(Value::Null)
        }
        "mouse.click" => {
            let button = arg_str(&args, 0, "mouse.click")?;
            ctx.engine()?.click(&button).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            Ok(Value::Null)
        }
        "mouse.scroll" => {
            let amount = arg_int(&args, 0)?;
            ctx.engine()?.scroll(amount).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            Ok(Value::Null)
        }
        "key.press" => {
            let key = arg_str(&args, 0, "key.press")?;
            let engine = ctx.engine()?;
            engine.send_key(&key, true).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            engine.send_key(&key, false).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            Ok(Value::Null)
        }
        "mpv.playpause" => {
            let engine = ctx.engine()?;
            engine.send_key("playpause", true).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            engine.send_key("playpause", false).map_err(|e| RuntimeFault::Custom(e.to_string()))?;
            Ok(Value::Null)
        }
        "clipboard.get" => Ok(Value::Str(ctx.clipboard.lock().unwrap().clone())),
        "clipboard.set" => {
            let text = arg_str(&args, 0, "clipboard.set")?;
            *ctx.clipboard.lock().unwrap() = text;
            Ok(Value::Null)
        }
        "window.title" => Ok(Value::Str(ctx.window_title.lock().unwrap().clone())),
        "window.focus" | "window.next" => {
            // No window manager integration in this crate; these are the
            // documented seam (spec.md §1 "external collaborators") for a
            // future X11/Wayland bridge.
            Ok(Value::Null)
        }
        "setmode" => {
            let mode = arg_str(&args, 0, "setmode")?;
            if let Some(interpreter) = ctx.interpreter.lock().unwrap().as_ref().and_then(Weak::upgrade) {
                interpreter.set_mode(&mode);
            }
            Ok(Value::Null)
        }
        _ => Err(RuntimeFault::UnknownBuiltin(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_builtins_round_trip() {
        let ctx = BuiltinContext::headless_for_tests();
        let v = dispatch("upper", vec![Value::Str("hi".to_string())], &ctx).unwrap();
        assert_eq!(v, Value::Str("HI".to_string()));
    }

    #[test]
    fn clipboard_set_then_get() {
        let ctx = BuiltinContext::headless_for_tests();
        dispatch("clipboard.set", vec![Value::Str("copied".to_string())], &ctx).unwrap();
        let v = dispatch("clipboard.get", vec![], &ctx).unwrap();
        assert_eq!(v, Value::Str("copied".to_string()));
    }

    #[test]
    fn upper_on_a_number_is_a_type_fault_not_a_coercion() {
        let ctx = BuiltinContext::headless_for_tests();
        let err = dispatch("upper", vec![Value::Number(10.0)], &ctx).unwrap_err();
        assert_eq!(err, RuntimeFault::TypeError("upper expects string".to_string()));
    }

    #[test]
    fn unknown_builtin_is_a_fault() {
        let ctx = BuiltinContext::headless_for_tests();
        let err = dispatch("does.not.exist", vec![], &ctx).unwrap_err();
        assert_eq!(err, RuntimeFault::UnknownBuiltin("does.not.exist".to_string()));
    }

    #[test]
    fn mouse_builtins_without_an_engine_fault_cleanly() {
        let ctx = BuiltinContext::headless_for_tests();
        let err = dispatch("mouse.move", vec![Value::Number(1.0), Value::Number(1.0)], &ctx).unwrap_err();
        assert!(matches!(err, RuntimeFault::Custom(_)));
    }
}
