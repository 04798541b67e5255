//! Interpreter (spec component L)
//!
//! A stack VM executing one `BytecodeFunction` per call frame, grounded
//! on `BytecodeInterpreter.cpp`'s push/pop/instruction-dispatch shape.
//! `CALL` dispatches either to another compiled function or, if no such
//! function exists, to a built-in (`lang::builtins`); uncaught
//! `RuntimeFault`s unwind to the nearest `SetupTry` handler or, failing
//! that, abort just the current invocation (never the daemon, per
//! spec.md §7 "Runtime faults").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::RuntimeFault;
use crate::lang::builtins::{self, BuiltinContext};
use crate::lang::compiler::{Chunk, Instruction, OpCode, Operand, Value};

struct Frame {
    function_name: String,
    instructions: std::rc::Rc<Vec<Instruction>>,
    constants: std::rc::Rc<Vec<Value>>,
    locals: Vec<Value>,
    ip: usize,
    try_handlers: Vec<usize>,
}

/// Runs compiled Havel chunks. Cheap to invoke repeatedly from many
/// hotkey callbacks: each `call_function` gets a fresh stack and frame,
/// but shares the chunk and the mutable mode/global state behind locks.
pub struct Interpreter {
    chunk: Arc<Chunk>,
    ctx: Arc<BuiltinContext>,
    globals: Mutex<HashMap<String, Value>>,
    mode: Mutex<String>,
}

impl Interpreter {
    pub fn new(chunk: Chunk, ctx: Arc<BuiltinContext>) -> Arc<Self> {
        Arc::new(Interpreter {
            chunk: Arc::new(chunk),
            ctx,
            globals: Mutex::new(HashMap::new()),
            mode: Mutex::new("default".to_string()),
        })
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn context(&self) -> &Arc<BuiltinContext> {
        &self.ctx
    }

    pub fn current_mode(&self) -> String {
        self.mode.lock().unwrap().clone()
    }

    /// Switch modes, running the outgoing mode's `off` handlers and the
    /// incoming mode's `on` handlers (spec.md §3 "modes").
    pub fn set_mode(self: &Arc<Self>, new_mode: &str) {
        let previous = {
            let mut mode = self.mode.lock().unwrap();
            let previous = mode.clone();
            *mode = new_mode.to_string();
            previous
        };
        if previous == new_mode {
            return;
        }
        for (mode, function) in self.chunk.off_mode.clone() {
            if mode == previous {
                let _ = self.call_function(&function, Vec::new());
            }
        }
        for (mode, function) in self.chunk.on_mode.clone() {
            if mode == new_mode {
                let _ = self.call_function(&function, Vec::new());
            }
        }
        debug!(from = %previous, to = %new_mode, "mode switched");
    }

    /// Run `main`, then evaluate `config`/`devices` blocks (so their side
    /// effects happen once at load time) and return the compiled hotkey
    /// bindings for the caller to register with the Hotkey Registry.
    pub fn run_main(self: &Arc<Self>) -> Result<(), RuntimeFault> {
        self.call_function("main", Vec::new())?;
        Ok(())
    }

    pub fn evaluate_config(&self) -> Vec<(String, Value)> {
        self.chunk
            .config
            .iter()
            .filter_map(|entry| self.call_function(&entry.function, Vec::new()).ok().map(|v| (entry.name.clone(), v)))
            .collect()
    }

    pub fn evaluate_devices(&self) -> Vec<Value> {
        self.chunk
            .devices
            .iter()
            .filter_map(|f| self.call_function(f, Vec::new()).ok())
            .collect()
    }

    pub fn evaluate_mode_predicate(&self, function: &str) -> bool {
        self.call_function(function, Vec::new()).map(|v| v.truthy()).unwrap_or(false)
    }

    /// Call a compiled function by name with the given argument values.
    pub fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeFault> {
        let function = self
            .chunk
            .get_function(name)
            .ok_or_else(|| RuntimeFault::UnknownIdentifier(name.to_string()))?;

        if args.len() != function.param_count {
            return Err(RuntimeFault::ArityMismatch { expected: function.param_count, got: args.len() });
        }

        let mut locals = vec![Value::Null; function.local_count.max(function.param_count)];
        for (i, arg) in args.into_iter().enumerate() {
            locals[i] = arg;
        }

        let mut frame = Frame {
            function_name: name.to_string(),
            instructions: std::rc::Rc::new(function.instructions.clone()),
            constants: std::rc::Rc::new(function.constants.clone()),
            locals,
            ip: 0,
            try_handlers: Vec::new(),
        };

        self.run_frame(&mut frame)
    }

    fn run_frame(&self, frame: &mut Frame) -> Result<Value, RuntimeFault> {
        let mut stack: Vec<Value> = Vec::new();

        while frame.ip < frame.instructions.len() {
            let instruction = frame.instructions[frame.ip].clone();
            let result = self.execute(&instruction, frame, &mut stack);

            match result {
                Ok(StepOutcome::Continue) => frame.ip += 1,
                Ok(StepOutcome::Jump(target)) => frame.ip = target as usize,
                Ok(StepOutcome::Return(value)) => return Ok(value),
                Err(fault) => {
                    if let Some(handler) = frame.try_handlers.pop() {
                        stack.clear();
                        stack.push(Value::Null);
                        warn!(function = %frame.function_name, error = %fault, "runtime fault caught by try/catch");
                        frame.ip = handler;
                    } else {
                        return Err(fault);
                    }
                }
            }
        }

        Ok(stack.pop().unwrap_or(Value::Null))
    }

    fn execute(&self, instruction: &Instruction, frame: &mut Frame, stack: &mut Vec<Value>) -> Result<StepOutcome, RuntimeFault> {
        use OpCode::*;

        match instruction.opcode {
            LoadConst => {
                let idx = require_index(&instruction.operand)?;
                stack.push(frame.constants[idx as usize].clone());
                Ok(StepOutcome::Continue)
            }
            LoadVar => {
                let idx = require_index(&instruction.operand)? as usize;
                let value = frame.locals.get(idx).cloned().unwrap_or(Value::Null);
                stack.push(value);
                Ok(StepOutcome::Continue)
            }
            StoreVar => {
                let idx = require_index(&instruction.operand)? as usize;
                let value = pop(stack)?;
                if idx >= frame.locals.len() {
                    frame.locals.resize(idx + 1, Value::Null);
                }
                frame.locals[idx] = value;
                Ok(StepOutcome::Continue)
            }
            LoadGlobal => {
                let name = require_name(&instruction.operand)?;
                let value = self.globals.lock().unwrap().get(&name).cloned().unwrap_or(Value::Null);
                stack.push(value);
                Ok(StepOutcome::Continue)
            }
            StoreGlobal => {
                let name = require_name(&instruction.operand)?;
                let value = pop(stack)?;
                self.globals.lock().unwrap().insert(name, value);
                Ok(StepOutcome::Continue)
            }
            Pop => {
                pop(stack)?;
                Ok(StepOutcome::Continue)
            }
            Dup => {
                let value = stack.last().cloned().ok_or(RuntimeFault::StackUnderflow)?;
                stack.push(value);
                Ok(StepOutcome::Continue)
            }
            Add | Sub | Mul | Div | Mod | Pow | Eq | Neq | Lt | Lte | Gt | Gte => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                stack.push(binary_op(instruction.opcode, left, right)?);
                Ok(StepOutcome::Continue)
            }
            And => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                stack.push(Value::Bool(left.truthy() && right.truthy()));
                Ok(StepOutcome::Continue)
            }
            Or => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                stack.push(Value::Bool(left.truthy() || right.truthy()));
                Ok(StepOutcome::Continue)
            }
            Not => {
                let value = pop(stack)?;
                stack.push(Value::Bool(!value.truthy()));
                Ok(StepOutcome::Continue)
            }
            Neg => {
                let value = pop(stack)?;
                match value {
                    Value::Number(n) => stack.push(Value::Number(-n)),
                    other => return Err(RuntimeFault::TypeError(format!("cannot negate {other:?}"))),
                }
                Ok(StepOutcome::Continue)
            }
            Range => {
                let right = pop(stack)?;
                let left = pop(stack)?;
                let (lo, hi) = (as_number(&left)?, as_number(&right)?);
                let mut items = Vec::new();
                let mut i = lo as i64;
                while (i as f64) < hi {
                    items.push(Value::Number(i as f64));
                    i += 1;
                }
                stack.push(Value::Array(items));
                Ok(StepOutcome::Continue)
            }
            Jump => Ok(StepOutcome::Jump(require_index(&instruction.operand)?)),
            JumpIfFalse => {
                let target = require_index(&instruction.operand)?;
                let cond = pop(stack)?;
                if cond.truthy() {
                    Ok(StepOutcome::Continue)
                } else {
                    Ok(StepOutcome::Jump(target))
                }
            }
            JumpIfTrue => {
                let target = require_index(&instruction.operand)?;
                let cond = pop(stack)?;
                if cond.truthy() {
                    Ok(StepOutcome::Jump(target))
                } else {
                    Ok(StepOutcome::Continue)
                }
            }
            Call => {
                let (name, argc) = match &instruction.operand {
                    Operand::Call { name, argc } => (name.clone(), *argc as usize),
                    _ => return Err(RuntimeFault::Custom("malformed CALL instruction".to_string())),
                };
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(pop(stack)?);
                }
                args.reverse();
                let result = self.dispatch_call(&name, args)?;
                stack.push(result);
                Ok(StepOutcome::Continue)
            }
            CallValue => {
                let argc = require_index(&instruction.operand)? as usize;
                let mut args = Vec::with_capacity(argc);
                for _ in 0..argc {
                    args.push(pop(stack)?);
                }
                args.reverse();
                let callee = pop(stack)?;
                let name = match callee {
                    Value::Function(name) => name,
                    other => return Err(RuntimeFault::TypeError(format!("{other:?} is not callable"))),
                };
                let result = self.call_function(&name, args)?;
                stack.push(result);
                Ok(StepOutcome::Continue)
            }
            Return => {
                let value = pop(stack)?;
                Ok(StepOutcome::Return(value))
            }
            ArrayNew => {
                let n = require_index(&instruction.operand)? as usize;
                let mut items = vec![Value::Null; n];
                for slot in items.iter_mut().rev() {
                    *slot = pop(stack)?;
                }
                stack.push(Value::Array(items));
                Ok(StepOutcome::Continue)
            }
            ObjectNew => {
                let n = require_index(&instruction.operand)? as usize;
                let mut fields = vec![(String::new(), Value::Null); n];
                for slot in fields.iter_mut().rev() {
                    let key = match pop(stack)? {
                        Value::Str(s) => s,
                        other => return Err(RuntimeFault::TypeError(format!("object key must be a string, got {other:?}"))),
                    };
                    let value = pop(stack)?;
                    *slot = (key, value);
                }
                stack.push(Value::Object(fields));
                Ok(StepOutcome::Continue)
            }
            GetMember => {
                let property = require_name(&instruction.operand)?;
                let object = pop(stack)?;
                match object {
                    Value::Object(fields) => {
                        let value = fields.into_iter().find(|(k, _)| k == &property).map(|(_, v)| v).unwrap_or(Value::Null);
                        stack.push(value);
                    }
                    Value::Str(s) if property == "length" => stack.push(Value::Number(s.chars().count() as f64)),
                    Value::Array(items) if property == "length" => stack.push(Value::Number(items.len() as f64)),
                    other => return Err(RuntimeFault::TypeError(format!("cannot read property `{property}` of {other:?}"))),
                }
                Ok(StepOutcome::Continue)
            }
            SetMember => {
                let property = require_name(&instruction.operand)?;
                let value = pop(stack)?;
                let object = pop(stack)?;
                match object {
                    Value::Object(mut fields) => {
                        if let Some(entry) = fields.iter_mut().find(|(k, _)| k == &property) {
                            entry.1 = value.clone();
                        } else {
                            fields.push((property, value.clone()));
                        }
                        stack.push(Value::Object(fields));
                    }
                    other => return Err(RuntimeFault::TypeError(format!("cannot set property on {other:?}"))),
                }
                Ok(StepOutcome::Continue)
            }
            GetIndex => {
                let index = pop(stack)?;
                let object = pop(stack)?;
                match object {
                    Value::Array(items) => {
                        let i = as_number(&index)? as isize;
                        let resolved = resolve_index(i, items.len())?;
                        stack.push(items[resolved].clone());
                    }
                    other => return Err(RuntimeFault::TypeError(format!("cannot index {other:?}"))),
                }
                Ok(StepOutcome::Continue)
            }
            SetIndex => {
                let value = pop(stack)?;
                let index = pop(stack)?;
                let object = pop(stack)?;
                match object {
                    Value::Array(mut items) => {
                        let i = as_number(&index)? as isize;
                        let resolved = resolve_index(i, items.len())?;
                        items[resolved] = value.clone();
                        stack.push(Value::Array(items));
                    }
                    other => return Err(RuntimeFault::TypeError(format!("cannot index-assign {other:?}"))),
                }
                Ok(StepOutcome::Continue)
            }
            ArrayLen => {
                let value = pop(stack)?;
                match value {
                    Value::Array(items) => stack.push(Value::Number(items.len() as f64)),
                    other => return Err(RuntimeFault::TypeError(format!("{other:?} has no length"))),
                }
                Ok(StepOutcome::Continue)
            }
            SetupTry => {
                let target = require_index(&instruction.operand)?;
                frame.try_handlers.push(target as usize);
                Ok(StepOutcome::Continue)
            }
            PopTry => {
                frame.try_handlers.pop();
                Ok(StepOutcome::Continue)
            }
            Print => {
                let value = pop(stack)?;
                println!("{}", value.to_display_string());
                Ok(StepOutcome::Continue)
            }
            Debug => {
                debug!(stack_depth = stack.len(), locals = frame.locals.len(), "DEBUG opcode");
                Ok(StepOutcome::Continue)
            }
            Nop => Ok(StepOutcome::Continue),
        }
    }

    fn dispatch_call(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeFault> {
        if self.chunk.get_function(name).is_some() {
            return self.call_function(name, args);
        }
        if name == "mode" {
            return Ok(Value::Str(self.current_mode()));
        }
        builtins::dispatch(name, args, &self.ctx)
    }
}

enum StepOutcome {
    Continue,
    Jump(u32),
    Return(Value),
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, RuntimeFault> {
    stack.pop().ok_or(RuntimeFault::StackUnderflow)
}

fn require_index(operand: &Operand) -> Result<u32, RuntimeFault> {
    match operand {
        Operand::Index(i) => Ok(*i),
        _ => Err(RuntimeFault::Custom("expected an index operand".to_string())),
    }
}

fn require_name(operand: &Operand) -> Result<String, RuntimeFault> {
    match operand {
        Operand::Name(n) => Ok(n.clone()),
        _ => Err(RuntimeFault::Custom("expected a name operand".to_string())),
    }
}

fn as_number(value: &Value) -> Result<f64, RuntimeFault> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(RuntimeFault::TypeError(format!("expected a number, got {other:?}"))),
    }
}

fn resolve_index(i: isize, len: usize) -> Result<usize, RuntimeFault> {
    let resolved = if i < 0 { len as isize + i } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(RuntimeFault::IndexOutOfBounds(i));
    }
    Ok(resolved as usize)
}

/// Numeric ops promote to float throughout (Havel has one numeric type);
/// `+` additionally supports string concatenation, including implicit
/// stringification of a non-string operand, which is how interpolated
/// strings compile down (spec.md §4 "Bytecode Compiler").
fn binary_op(op: OpCode, left: Value, right: Value) -> Result<Value, RuntimeFault> {
    use OpCode::*;

    if matches!(op, Add) && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_))) {
        return Ok(Value::Str(format!("{}{}", left.to_display_string(), right.to_display_string())));
    }

    if let (Value::Str(l), Value::Str(r)) = (&left, &right) {
        return match op {
            Eq => Ok(Value::Bool(l == r)),
            Neq => Ok(Value::Bool(l != r)),
            _ => Err(RuntimeFault::TypeError(format!("invalid string operation {op:?}"))),
        };
    }

    let l = as_number(&left)?;
    let r = as_number(&right)?;
    Ok(match op {
        Add => Value::Number(l + r),
        Sub => Value::Number(l - r),
        Mul => Value::Number(l * r),
        Div => {
            if r == 0.0 {
                return Err(RuntimeFault::DivideByZero);
            }
            Value::Number(l / r)
        }
        Mod => {
            if r == 0.0 {
                return Err(RuntimeFault::DivideByZero);
            }
            Value::Number(l % r)
        }
        Pow => Value::Number(l.powf(r)),
        Eq => Value::Bool(l == r),
        Neq => Value::Bool(l != r),
        Lt => Value::Bool(l < r),
        Lte => Value::Bool(l <= r),
        Gt => Value::Bool(l > r),
        Gte => Value::Bool(l >= r),
        _ => return Err(RuntimeFault::Custom(format!("unsupported numeric op {op:?}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{compiler, lexer, parser};

    fn run(src: &str) -> Arc<Interpreter> {
        let tokens = lexer::tokenize(src).unwrap();
        let program = parser::parse(tokens).unwrap();
        let chunk = compiler::compile(&program).unwrap();
        let interp = Interpreter::new(chunk, Arc::new(BuiltinContext::headless_for_tests()));
        interp.run_main().unwrap();
        interp
    }

    #[test]
    fn arithmetic_and_let_binding() {
        let interp = run("let x = 2 + 3 * 4");
        let result = interp.call_function("main", Vec::new());
        assert!(result.is_ok());
    }

    #[test]
    fn function_call_returns_value() {
        let interp = run("fn double(n) { return n * 2 }");
        let v = interp.call_function("double", vec![Value::Number(21.0)]).unwrap();
        assert_eq!(v, Value::Number(42.0));
    }

    #[test]
    fn division_by_zero_is_a_runtime_fault() {
        let interp = run("fn bad() { return 1 / 0 }");
        let err = interp.call_function("bad", Vec::new()).unwrap_err();
        assert_eq!(err, RuntimeFault::DivideByZero);
    }

    #[test]
    fn try_catch_recovers_from_a_fault() {
        let interp = run("fn safe() { return try { 1 / 0 } catch { } }");
        let v = interp.call_function("safe", Vec::new()).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn array_indexing_and_length() {
        let interp = run("fn first(a) { return a[0] }");
        let v = interp.call_function("first", vec![Value::Array(vec![Value::Number(9.0), Value::Number(1.0)])]).unwrap();
        assert_eq!(v, Value::Number(9.0));
    }

    #[test]
    fn string_concatenation_via_add() {
        let interp = run("fn greet(name) { return \"hi \" + name }");
        let v = interp.call_function("greet", vec![Value::Str("sam".to_string())]).unwrap();
        assert_eq!(v, Value::Str("hi sam".to_string()));
    }

    #[test]
    fn mode_switch_runs_on_and_off_handlers() {
        let interp = run(
            "let log = 0\n\
             on mode gaming { setcounter(1) }\n\
             off mode gaming { setcounter(0) }",
        );
        interp.set_mode("gaming");
        assert_eq!(interp.current_mode(), "gaming");
        interp.set_mode("default");
        assert_eq!(interp.current_mode(), "default");
    }

    #[test]
    fn top_level_let_is_a_global_visible_to_every_function() {
        let interp = run(
            "let counter = 1\n\
             fn bump() { counter = counter + 1 }\n\
             fn read() { return counter }",
        );
        interp.call_function("bump", Vec::new()).unwrap();
        interp.call_function("bump", Vec::new()).unwrap();
        let v = interp.call_function("read", Vec::new()).unwrap();
        assert_eq!(v, Value::Number(3.0));
    }

    #[test]
    fn hotkey_binding_compiles_and_is_listed_on_the_chunk() {
        let interp = run("@^W => send(\"hi\")");
        assert_eq!(interp.chunk().hotkey_bindings.len(), 1);
    }
}
