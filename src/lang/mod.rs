//! The Havel scripting language: lexer, parser, bytecode compiler and
//! interpreter (spec components H-L).

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod vm;

use std::path::Path;

use crate::error::ScriptLoadError;

/// Read, lex, parse and compile a `.hv` script. Any lexer or parser
/// diagnostics are collected and returned together so the caller can
/// report them all at once and refuse to start (spec.md §7 "Parse
/// errors").
pub fn load_script(path: &Path) -> Result<compiler::Chunk, ScriptLoadError> {
    let source = std::fs::read_to_string(path)?;

    let tokens = lexer::tokenize(&source).map_err(|diag| ScriptLoadError::Syntax(vec![diag]))?;
    let program = parser::parse(tokens).map_err(ScriptLoadError::Syntax)?;
    let chunk = compiler::compile(&program)?;
    Ok(chunk)
}
