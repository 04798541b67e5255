//! Bytecode Compiler (spec component K)
//!
//! Lowers a parsed `Program` to a `Chunk` of named `BytecodeFunction`s,
//! grounded on `BytecodeCompiler.cpp`'s statement/expression dispatch:
//! a `main` function holding the top-level statements, one function per
//! `fn`/lambda declaration, if/while lowered with placeholder jump
//! targets backpatched once the branch is fully compiled.
//!
//! The opcode set in spec.md §4 is illustrative rather than exhaustive —
//! it has no opcode for member/index access or for the pipeline and
//! range operators the parser already produces. This compiler adds the
//! handful those require (`GET_MEMBER`/`SET_MEMBER`, `GET_INDEX`/
//! `SET_INDEX`, `RANGE`, `NEG`, `CALL_VALUE`) and desugars pipelines into
//! nested calls at compile time rather than giving them their own
//! opcode, exactly as spec.md §4 describes ("desugared ... rather than
//! carried as its own opcode" — see `ast.rs` `Expr::Pipeline`).

use std::collections::HashMap;

use crate::error::CompileError;
use crate::lang::ast::{BinaryOp, Expr, InterpolationPart, Literal, Program, Stmt, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    /// A function value, referenced by its name in the owning `Chunk`.
    Function(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Function(_) => true,
        }
    }

    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}: {}", v.to_display_string())).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Function(name) => format!("<fn {name}>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    LoadConst,
    LoadVar,
    StoreVar,
    LoadGlobal,
    StoreGlobal,
    Pop,
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Not,
    Range,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    Call,
    CallValue,
    Return,
    ArrayNew,
    ObjectNew,
    GetMember,
    SetMember,
    GetIndex,
    SetIndex,
    ArrayLen,
    SetupTry,
    PopTry,
    Print,
    Debug,
    Nop,
}

/// An instruction's operand: a constant-pool index, a jump target, a
/// local slot index, an argument count, or a builtin/function name —
/// never more than one per instruction, matching `Bytecode.h`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Index(u32),
    Name(String),
    Call { name: String, argc: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    fn new(opcode: OpCode) -> Self {
        Instruction { opcode, operand: Operand::None }
    }

    fn idx(opcode: OpCode, i: u32) -> Self {
        Instruction { opcode, operand: Operand::Index(i) }
    }

    fn name(opcode: OpCode, n: impl Into<String>) -> Self {
        Instruction { opcode, operand: Operand::Name(n.into()) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BytecodeFunction {
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Value>,
    pub param_count: usize,
    pub local_count: usize,
}

/// A mode predicate or config/device entry evaluated once at load time,
/// compiled as a tiny nameless function (spec.md §3 "modes"/"config").
#[derive(Debug, Clone)]
pub struct NamedExpr {
    pub name: String,
    pub function: String,
}

#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub functions: HashMap<String, BytecodeFunction>,
    /// `(hotkey string, body function name)`, one per `Stmt::HotkeyBinding`.
    pub hotkey_bindings: Vec<(String, String)>,
    /// `modes { name: expr, ... }` predicates.
    pub modes: Vec<NamedExpr>,
    /// `on mode <name> { ... }` handler function names, by mode.
    pub on_mode: Vec<(String, String)>,
    /// `off mode <name> { ... }` handler function names, by mode.
    pub off_mode: Vec<(String, String)>,
    /// `config { key: expr, ... }` entries.
    pub config: Vec<NamedExpr>,
    /// `devices { expr, ... }` entries, each its own nameless function.
    pub devices: Vec<String>,
    /// `type Name { fields... }` declarations, kept for diagnostics.
    pub type_decls: Vec<(String, Vec<String>)>,
}

impl Chunk {
    pub fn get_function(&self, name: &str) -> Option<&BytecodeFunction> {
        self.functions.get(name)
    }
}

struct LoopContext {
    continue_placeholder: Vec<usize>,
    break_placeholder: Vec<usize>,
}

struct FunctionBuilder {
    name: String,
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
    locals: HashMap<String, u32>,
    param_count: usize,
}

impl FunctionBuilder {
    fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            name: name.into(),
            instructions: Vec::new(),
            constants: Vec::new(),
            locals: HashMap::new(),
            param_count: 0,
        }
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    fn const_index(&mut self, value: Value) -> u32 {
        if let Some(pos) = self.constants.iter().position(|v| v == &value) {
            return pos as u32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    fn var_index(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.locals.get(name) {
            return idx;
        }
        let idx = self.locals.len() as u32;
        self.locals.insert(name.to_string(), idx);
        idx
    }

    fn patch_jump_to_here(&mut self, at: usize) {
        let target = self.instructions.len() as u32;
        self.instructions[at].operand = Operand::Index(target);
    }

    fn finish(self) -> BytecodeFunction {
        BytecodeFunction {
            name: self.name,
            instructions: self.instructions,
            constants: self.constants,
            param_count: self.param_count,
            local_count: self.locals.len(),
        }
    }
}

pub struct Compiler {
    chunk: Chunk,
    current: FunctionBuilder,
    loops: Vec<LoopContext>,
    anon_counter: u32,
    /// Names bound by a top-level `let`, visible to every function as a
    /// free identifier (spec.md §4 "free identifiers resolve to globals
    /// or built-ins at runtime"), collected in a prepass so a function
    /// compiled before a later top-level `let` still resolves it.
    globals: std::collections::HashSet<String>,
}

/// Compile a parsed program into a chunk ready for `lang::vm::Interpreter`.
pub fn compile(program: &Program) -> Result<Chunk, CompileError> {
    let globals = program
        .statements
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Let { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();

    let mut compiler = Compiler {
        chunk: Chunk::default(),
        current: FunctionBuilder::new("main"),
        loops: Vec::new(),
        anon_counter: 0,
        globals,
    };
    compiler.compile_program(program)?;
    let main = std::mem::replace(&mut compiler.current, FunctionBuilder::new("main")).finish();
    compiler.chunk.functions.insert("main".to_string(), main);
    Ok(compiler.chunk)
}

impl Compiler {
    fn compile_program(&mut self, program: &Program) -> Result<(), CompileError> {
        for stmt in &program.statements {
            self.compile_top_level(stmt)?;
        }
        Ok(())
    }

    /// Top-level statements can additionally be the declarative forms
    /// (hotkey bindings, modes, config, devices) that register metadata
    /// on the chunk rather than emit instructions into `main`.
    fn compile_top_level(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::HotkeyBinding { hotkey, body } => {
                let name = self.fresh_name("hotkey");
                self.compile_function(&name, &[], body)?;
                self.chunk.hotkey_bindings.push((hotkey.clone(), name));
                Ok(())
            }
            Stmt::ModesBlock(pairs) => {
                for (name, expr) in pairs {
                    let fn_name = self.fresh_name("mode");
                    self.compile_expr_function(&fn_name, expr)?;
                    self.chunk.modes.push(NamedExpr { name: name.clone(), function: fn_name });
                }
                Ok(())
            }
            Stmt::OnMode { mode, body } => {
                let name = self.fresh_name("on_mode");
                self.compile_function(&name, &[], body)?;
                self.chunk.on_mode.push((mode.clone(), name));
                Ok(())
            }
            Stmt::OffMode { mode, body } => {
                let name = self.fresh_name("off_mode");
                self.compile_function(&name, &[], body)?;
                self.chunk.off_mode.push((mode.clone(), name));
                Ok(())
            }
            Stmt::ConfigBlock(pairs) => {
                for (key, expr) in pairs {
                    let fn_name = self.fresh_name("config");
                    self.compile_expr_function(&fn_name, expr)?;
                    self.chunk.config.push(NamedExpr { name: key.clone(), function: fn_name });
                }
                Ok(())
            }
            Stmt::DevicesBlock(exprs) => {
                for expr in exprs {
                    let fn_name = self.fresh_name("device");
                    self.compile_expr_function(&fn_name, expr)?;
                    self.chunk.devices.push(fn_name);
                }
                Ok(())
            }
            Stmt::TypeDecl { name, fields } => {
                self.chunk.type_decls.push((name.clone(), fields.clone()));
                Ok(())
            }
            Stmt::Function { name, params, body } => {
                self.compile_function(name, params, body)
            }
            Stmt::Let { name, value } => {
                self.compile_expr(value)?;
                self.current.emit(Instruction::name(OpCode::StoreGlobal, name.clone()));
                Ok(())
            }
            other => self.compile_statement(other),
        }
    }

    fn fresh_name(&mut self, prefix: &str) -> String {
        self.anon_counter += 1;
        format!("{prefix}${}", self.anon_counter)
    }

    /// Compile a standalone expression as a zero-param function returning
    /// its value, used for mode/config/device declarative entries.
    fn compile_expr_function(&mut self, name: &str, expr: &Expr) -> Result<(), CompileError> {
        let saved = std::mem::replace(&mut self.current, FunctionBuilder::new(name));
        self.compile_expr(expr)?;
        self.current.emit(Instruction::new(OpCode::Return));
        let built = std::mem::replace(&mut self.current, saved).finish();
        self.chunk.functions.insert(name.to_string(), built);
        Ok(())
    }

    fn compile_function(&mut self, name: &str, params: &[String], body: &Stmt) -> Result<(), CompileError> {
        let saved = std::mem::replace(&mut self.current, FunctionBuilder::new(name));
        self.current.param_count = params.len();
        for param in params {
            self.current.var_index(param);
        }
        self.compile_statement(body)?;
        // Implicit `return null` if the body fell through (spec.md §4's
        // "main function ... implicit trailing return").
        let const_idx = self.current.const_index(Value::Null);
        self.current.emit(Instruction::idx(OpCode::LoadConst, const_idx));
        self.current.emit(Instruction::new(OpCode::Return));
        let built = std::mem::replace(&mut self.current, saved).finish();
        self.chunk.functions.insert(name.to_string(), built);
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.compile_statement(s)?;
                }
                Ok(())
            }
            Stmt::Let { name, value } => {
                self.compile_expr(value)?;
                let slot = self.current.var_index(name);
                self.current.emit(Instruction::idx(OpCode::StoreVar, slot));
                Ok(())
            }
            Stmt::Expression(expr) => {
                self.compile_expr(expr)?;
                self.current.emit(Instruction::new(OpCode::Pop));
                Ok(())
            }
            Stmt::If { condition, then_branch, else_branch } => {
                self.compile_expr(condition)?;
                let jump_to_else = self.current.emit(Instruction::idx(OpCode::JumpIfFalse, 0));
                self.compile_statement(then_branch)?;
                let jump_to_end = self.current.emit(Instruction::idx(OpCode::Jump, 0));
                self.current.patch_jump_to_here(jump_to_else);
                if let Some(else_branch) = else_branch {
                    self.compile_statement(else_branch)?;
                }
                self.current.patch_jump_to_here(jump_to_end);
                Ok(())
            }
            Stmt::While { condition, body } => {
                let loop_start = self.current.instructions.len();
                self.loops.push(LoopContext { continue_placeholder: Vec::new(), break_placeholder: Vec::new() });
                self.compile_expr(condition)?;
                let jump_to_end = self.current.emit(Instruction::idx(OpCode::JumpIfFalse, 0));
                self.compile_statement(body)?;
                self.current.emit(Instruction::idx(OpCode::Jump, loop_start as u32));
                self.current.patch_jump_to_here(jump_to_end);
                self.finish_loop(loop_start);
                Ok(())
            }
            Stmt::Loop { body } => {
                let loop_start = self.current.instructions.len();
                self.loops.push(LoopContext { continue_placeholder: Vec::new(), break_placeholder: Vec::new() });
                self.compile_statement(body)?;
                self.current.emit(Instruction::idx(OpCode::Jump, loop_start as u32));
                self.finish_loop(loop_start);
                Ok(())
            }
            Stmt::For { binding, iterable, body } => {
                self.compile_expr(iterable)?;
                let array_slot = self.current.var_index(&format!("__for_array_{binding}"));
                self.current.emit(Instruction::idx(OpCode::StoreVar, array_slot));
                let idx_slot = self.current.var_index(&format!("__for_idx_{binding}"));
                let zero = self.current.const_index(Value::Number(0.0));
                self.current.emit(Instruction::idx(OpCode::LoadConst, zero));
                self.current.emit(Instruction::idx(OpCode::StoreVar, idx_slot));

                let loop_start = self.current.instructions.len();
                self.loops.push(LoopContext { continue_placeholder: Vec::new(), break_placeholder: Vec::new() });

                self.current.emit(Instruction::idx(OpCode::LoadVar, idx_slot));
                self.current.emit(Instruction::idx(OpCode::LoadVar, array_slot));
                self.current.emit(Instruction::new(OpCode::ArrayLen));
                self.current.emit(Instruction::new(OpCode::Lt));
                let jump_to_end = self.current.emit(Instruction::idx(OpCode::JumpIfFalse, 0));

                self.current.emit(Instruction::idx(OpCode::LoadVar, array_slot));
                self.current.emit(Instruction::idx(OpCode::LoadVar, idx_slot));
                self.current.emit(Instruction::new(OpCode::GetIndex));
                let binding_slot = self.current.var_index(binding);
                self.current.emit(Instruction::idx(OpCode::StoreVar, binding_slot));

                self.compile_statement(body)?;

                // `continue` must still reach the increment below it, so
                // its placeholder jumps are patched to here, not to the
                // condition check at `loop_start`.
                let increment_start = self.current.instructions.len();
                self.current.emit(Instruction::idx(OpCode::LoadVar, idx_slot));
                let one = self.current.const_index(Value::Number(1.0));
                self.current.emit(Instruction::idx(OpCode::LoadConst, one));
                self.current.emit(Instruction::new(OpCode::Add));
                self.current.emit(Instruction::idx(OpCode::StoreVar, idx_slot));
                self.current.emit(Instruction::idx(OpCode::Jump, loop_start as u32));
                self.current.patch_jump_to_here(jump_to_end);
                self.finish_loop_with_continue_target(increment_start);
                Ok(())
            }
            Stmt::Break => {
                let at = self.current.emit(Instruction::idx(OpCode::Jump, 0));
                self.loops
                    .last_mut()
                    .ok_or_else(|| CompileError::new("`break` outside a loop"))?
                    .break_placeholder
                    .push(at);
                Ok(())
            }
            Stmt::Continue => {
                let at = self.current.emit(Instruction::idx(OpCode::Jump, 0));
                self.loops
                    .last_mut()
                    .ok_or_else(|| CompileError::new("`continue` outside a loop"))?
                    .continue_placeholder
                    .push(at);
                Ok(())
            }
            Stmt::Function { name, params, body } => self.compile_function(name, params, body),
            Stmt::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        let idx = self.current.const_index(Value::Null);
                        self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                    }
                }
                self.current.emit(Instruction::new(OpCode::Return));
                Ok(())
            }
            Stmt::Import { .. } => Ok(()), // module resolution is outside this crate's scope (spec.md Non-goals)
            Stmt::HotkeyBinding { .. }
            | Stmt::ModesBlock(_)
            | Stmt::OnMode { .. }
            | Stmt::OffMode { .. }
            | Stmt::ConfigBlock(_)
            | Stmt::DevicesBlock(_)
            | Stmt::TypeDecl { .. } => {
                Err(CompileError::new("declarative blocks are only valid at the top level of a script"))
            }
        }
    }

    /// `while`/`loop`: `continue` re-enters at the condition check (or the
    /// top of the body for an unconditional `loop`), so both share
    /// `loop_start` as the continue target.
    fn finish_loop(&mut self, loop_start: usize) {
        self.finish_loop_with_continue_target(loop_start);
    }

    fn finish_loop_with_continue_target(&mut self, continue_target: usize) {
        let ctx = self.loops.pop().expect("loop context pushed at loop entry");
        for at in ctx.continue_placeholder {
            self.current.instructions[at].operand = Operand::Index(continue_target as u32);
        }
        for at in ctx.break_placeholder {
            self.current.patch_jump_to_here(at);
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => self.compile_literal(lit),
            Expr::Identifier(name) => {
                match name.as_str() {
                    "true" => {
                        let idx = self.current.const_index(Value::Bool(true));
                        self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                    }
                    "false" => {
                        let idx = self.current.const_index(Value::Bool(false));
                        self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                    }
                    "null" => {
                        let idx = self.current.const_index(Value::Null);
                        self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                    }
                    _ if !self.current.locals.contains_key(name) && self.globals.contains(name) => {
                        self.current.emit(Instruction::name(OpCode::LoadGlobal, name.clone()));
                    }
                    _ => {
                        let slot = self.current.var_index(name);
                        self.current.emit(Instruction::idx(OpCode::LoadVar, slot));
                    }
                }
                Ok(())
            }
            Expr::Unary { op, operand } => {
                self.compile_expr(operand)?;
                self.current.emit(Instruction::new(match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                }));
                Ok(())
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.current.emit(Instruction::new(binary_opcode(*op)));
                Ok(())
            }
            Expr::Call { callee, args } => self.compile_call(callee, args),
            Expr::Member { object, property } => {
                self.compile_expr(object)?;
                self.current.emit(Instruction::name(OpCode::GetMember, property.clone()));
                Ok(())
            }
            Expr::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.current.emit(Instruction::new(OpCode::GetIndex));
                Ok(())
            }
            Expr::Array(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.current.emit(Instruction::idx(OpCode::ArrayNew, items.len() as u32));
                Ok(())
            }
            Expr::Object(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(value)?;
                    let idx = self.current.const_index(Value::Str(key.clone()));
                    self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                }
                self.current.emit(Instruction::idx(OpCode::ObjectNew, pairs.len() as u32));
                Ok(())
            }
            Expr::Pipeline { source, stages } => {
                let desugared = desugar_pipeline(source, stages);
                self.compile_expr(&desugared)
            }
            Expr::Lambda { params, body } => {
                let name = self.fresh_name("lambda");
                self.compile_function(&name, params, body)?;
                let idx = self.current.const_index(Value::Function(name));
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                Ok(())
            }
            Expr::Ternary { condition, if_true, if_false } => {
                self.compile_expr(condition)?;
                let jump_to_false = self.current.emit(Instruction::idx(OpCode::JumpIfFalse, 0));
                self.compile_expr(if_true)?;
                let jump_to_end = self.current.emit(Instruction::idx(OpCode::Jump, 0));
                self.current.patch_jump_to_here(jump_to_false);
                self.compile_expr(if_false)?;
                self.current.patch_jump_to_here(jump_to_end);
                Ok(())
            }
            Expr::Try { body, catch } => {
                let setup = self.current.emit(Instruction::idx(OpCode::SetupTry, 0));
                self.compile_expr(body)?;
                self.current.emit(Instruction::new(OpCode::PopTry));
                let jump_to_end = self.current.emit(Instruction::idx(OpCode::Jump, 0));
                self.current.patch_jump_to_here(setup);
                self.compile_statement(catch)?;
                let idx = self.current.const_index(Value::Null);
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                self.current.patch_jump_to_here(jump_to_end);
                Ok(())
            }
            Expr::Assign { target, value } => self.compile_assign(target, value),
        }
    }

    fn compile_literal(&mut self, lit: &Literal) -> Result<(), CompileError> {
        match lit {
            Literal::Null => {
                let idx = self.current.const_index(Value::Null);
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
            }
            Literal::Bool(b) => {
                let idx = self.current.const_index(Value::Bool(*b));
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
            }
            Literal::Number(n) => {
                let idx = self.current.const_index(Value::Number(*n));
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
            }
            Literal::String(s) => {
                let idx = self.current.const_index(Value::Str(s.clone()));
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
            }
            Literal::Hotkey(s) => {
                let idx = self.current.const_index(Value::Str(s.clone()));
                self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
            }
            Literal::InterpolatedString(parts) => {
                self.compile_interpolation(parts)?;
            }
        }
        Ok(())
    }

    /// Lower to repeated string concatenation: push each text part as a
    /// constant, compile each expression part and coerce with `str()`-
    /// style stringification at runtime (the VM's `ADD` on a string
    /// operand always stringifies its partner, see `vm.rs`).
    fn compile_interpolation(&mut self, parts: &[InterpolationPart]) -> Result<(), CompileError> {
        if parts.is_empty() {
            let idx = self.current.const_index(Value::Str(String::new()));
            self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
            return Ok(());
        }
        let mut first = true;
        for part in parts {
            match part {
                InterpolationPart::Text(text) => {
                    let idx = self.current.const_index(Value::Str(text.clone()));
                    self.current.emit(Instruction::idx(OpCode::LoadConst, idx));
                }
                InterpolationPart::Expr(expr) => {
                    self.compile_expr(expr)?;
                }
            }
            if !first {
                self.current.emit(Instruction::new(OpCode::Add));
            }
            first = false;
        }
        Ok(())
    }

    /// Calls fall into two shapes: a (possibly dotted) name known at
    /// compile time — `print(...)`, `mouse.move(...)` — compiled as
    /// `CALL` with the flattened name baked in as an operand exactly like
    /// the original's identifier-only restriction, generalized to dotted
    /// paths for namespaced builtins; or an arbitrary callee expression
    /// (a variable holding a lambda) compiled as `CALL_VALUE`.
    fn compile_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<(), CompileError> {
        if let Some(name) = flatten_callee(callee) {
            for arg in args {
                self.compile_expr(arg)?;
            }
            self.current.emit(Instruction {
                opcode: OpCode::Call,
                operand: Operand::Call { name, argc: args.len() as u32 },
            });
        } else {
            self.compile_expr(callee)?;
            for arg in args {
                self.compile_expr(arg)?;
            }
            self.current.emit(Instruction::idx(OpCode::CallValue, args.len() as u32));
        }
        Ok(())
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CompileError> {
        match target {
            Expr::Identifier(name) => {
                self.compile_expr(value)?;
                self.current.emit(Instruction::new(OpCode::Dup));
                if !self.current.locals.contains_key(name) && self.globals.contains(name) {
                    self.current.emit(Instruction::name(OpCode::StoreGlobal, name.clone()));
                } else {
                    let slot = self.current.var_index(name);
                    self.current.emit(Instruction::idx(OpCode::StoreVar, slot));
                }
                Ok(())
            }
            Expr::Member { object, property } => {
                self.compile_expr(object)?;
                self.compile_expr(value)?;
                self.current.emit(Instruction::name(OpCode::SetMember, property.clone()));
                Ok(())
            }
            Expr::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.current.emit(Instruction::new(OpCode::SetIndex));
                Ok(())
            }
            _ => Err(CompileError::new("invalid assignment target")),
        }
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Mod => OpCode::Mod,
        BinaryOp::Pow => OpCode::Pow,
        BinaryOp::Eq => OpCode::Eq,
        BinaryOp::Neq => OpCode::Neq,
        BinaryOp::Lt => OpCode::Lt,
        BinaryOp::Lte => OpCode::Lte,
        BinaryOp::Gt => OpCode::Gt,
        BinaryOp::Gte => OpCode::Gte,
        BinaryOp::And => OpCode::And,
        BinaryOp::Or => OpCode::Or,
        BinaryOp::Range => OpCode::Range,
    }
}

/// Flatten an `Identifier` or a chain of `Member` accesses on identifiers
/// into a dotted name (`mouse.move`), the shape a builtin or user
/// function is called by. Returns `None` for anything else (a call on a
/// computed value), which falls back to `CALL_VALUE`.
fn flatten_callee(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(name) => Some(name.clone()),
        Expr::Member { object, property } => {
            let base = flatten_callee(object)?;
            Some(format!("{base}.{property}"))
        }
        _ => None,
    }
}

/// `a | f | g(args)` -> `g(f(a), args...)`, left-to-right (spec.md §4).
fn desugar_pipeline(source: &Expr, stages: &[Expr]) -> Expr {
    let mut acc = source.clone();
    for stage in stages {
        acc = match stage {
            Expr::Call { callee, args } => {
                let mut new_args = Vec::with_capacity(args.len() + 1);
                new_args.push(acc);
                new_args.extend(args.iter().cloned());
                Expr::Call { callee: callee.clone(), args: new_args }
            }
            other => Expr::Call { callee: Box::new(other.clone()), args: vec![acc] },
        };
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{lexer, parser};

    fn compile_src(src: &str) -> Chunk {
        let tokens = lexer::tokenize(src).unwrap();
        let program = parser::parse(tokens).unwrap();
        compile(&program).unwrap()
    }

    #[test]
    fn let_and_arithmetic_compiles() {
        let chunk = compile_src("let x = 1 + 2 * 3");
        let main = chunk.get_function("main").unwrap();
        assert!(main.instructions.iter().any(|i| i.opcode == OpCode::Mul));
        assert!(main.instructions.iter().any(|i| i.opcode == OpCode::Add));
        // top-level `let` binds a global (visible to every function), not a
        // `main`-local slot.
        assert!(main.instructions.iter().any(|i| i.opcode == OpCode::StoreGlobal));
    }

    #[test]
    fn nested_let_inside_a_function_stays_a_local() {
        let chunk = compile_src("fn f() { let x = 1; return x }");
        let f = chunk.get_function("f").unwrap();
        assert!(f.instructions.iter().any(|i| i.opcode == OpCode::StoreVar));
        assert!(f.instructions.iter().any(|i| i.opcode == OpCode::LoadVar));
        assert!(!f.instructions.iter().any(|i| i.opcode == OpCode::StoreGlobal));
    }

    #[test]
    fn function_reads_a_top_level_global_by_name() {
        let chunk = compile_src("let shared = 5\nfn read() { return shared }");
        let read = chunk.get_function("read").unwrap();
        assert!(read.instructions.iter().any(|i| i.opcode == OpCode::LoadGlobal));
    }

    #[test]
    fn if_else_emits_backpatched_jumps() {
        let chunk = compile_src("if 1 > 0 { print(1) } else { print(0) }");
        let main = chunk.get_function("main").unwrap();
        let jump_if_false = main.instructions.iter().find(|i| i.opcode == OpCode::JumpIfFalse).unwrap();
        match jump_if_false.operand {
            Operand::Index(target) => assert!((target as usize) <= main.instructions.len()),
            _ => panic!("expected a jump target operand"),
        }
    }

    #[test]
    fn pipeline_desugars_to_nested_calls() {
        let chunk = compile_src("\"hi\" | upper | trim");
        let main = chunk.get_function("main").unwrap();
        let calls: Vec<&Instruction> = main.instructions.iter().filter(|i| i.opcode == OpCode::Call).collect();
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn hotkey_binding_registers_without_emitting_into_main() {
        let chunk = compile_src("@^W => send(\"hi\")");
        assert_eq!(chunk.hotkey_bindings.len(), 1);
        assert_eq!(chunk.hotkey_bindings[0].0, "@^W");
        let main = chunk.get_function("main").unwrap();
        assert!(main.instructions.is_empty() || main.instructions.iter().all(|i| i.opcode != OpCode::Call));
    }

    #[test]
    fn function_declaration_produces_its_own_bytecode_function() {
        let chunk = compile_src("fn add(a, b) { return a + b }");
        let f = chunk.get_function("add").unwrap();
        assert_eq!(f.param_count, 2);
        assert!(f.instructions.iter().any(|i| i.opcode == OpCode::Add));
    }

    #[test]
    fn modes_block_compiles_each_predicate_as_its_own_function() {
        let chunk = compile_src("modes { gaming: true, normal: false }");
        assert_eq!(chunk.modes.len(), 2);
    }
}
