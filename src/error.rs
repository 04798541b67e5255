//! Crate-wide structured error types
//!
//! Operational failures (device I/O, uinput setup) propagate as
//! `anyhow::Error` with context, matching the daemon's boundary; the
//! errors here are for callers that need to match on *what* went wrong
//! rather than just log it — parser diagnostics and runtime faults.

use thiserror::Error;

/// A single parse diagnostic with source position, shared by the hotkey
/// DSL parser, the condition DSL parser and the Havel lexer/parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

#[derive(Debug, Error)]
pub enum HotkeyParseError {
    #[error("{0}")]
    Diagnostic(Diagnostic),
}

impl HotkeyParseError {
    pub fn at(line: usize, column: usize, message: impl Into<String>) -> Self {
        HotkeyParseError::Diagnostic(Diagnostic::new(line, column, message))
    }
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("empty condition expression")]
    Empty,
    #[error("unknown operator in condition: {0}")]
    UnknownOperator(String),
    #[error("invalid regex pattern `{pattern}`: {source}")]
    BadRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unknown property `{0}`")]
    UnknownProperty(String),
}

/// A fault raised while executing a compiled chunk. Catchable from
/// within a script by `try { } catch { }`; uncaught, it terminates the
/// script evaluation but never the daemon.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeFault {
    #[error("division by zero")]
    DivideByZero,
    #[error("type error: {0}")]
    TypeError(String),
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("unknown built-in function `{0}`")]
    UnknownBuiltin(String),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(isize),
    #[error("{0}")]
    Custom(String),
}

/// Errors raised while loading and compiling a `.hv` script. If any
/// diagnostics are collected, the daemon refuses to start (spec error
/// handling design, "Parse errors").
#[derive(Debug, Error)]
pub enum ScriptLoadError {
    #[error("{} syntax error(s) in script", .0.len())]
    Syntax(Vec<Diagnostic>),
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
}

/// An error lowering the AST to bytecode (spec component K). The AST
/// carries no source positions, so these are message-only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{0}")]
    Message(String),
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        CompileError::Message(message.into())
    }
}
