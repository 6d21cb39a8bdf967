//! AST to program compiler
//!
//! Drives the full pipeline (lex → parse → lower) and owns the entry-point
//! wrapper: the top-level block compiles as the body of a variadic function
//! named `$main`, and the entry prototype always carries the `_ENV`
//! upvalue, whether or not the chunk touched a global.

mod adjust;
mod expr;
mod state;
mod stmt;

pub use state::{Access, ConstValue};

use crate::ast::{Chunk, FuncBody};
use crate::error::{CompileError, Result};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::program::Program;
use crate::span::Span;
use state::CompilerState;
use std::path::Path;

/// Diagnostic name of the entry-point prototype
pub const ENTRY_NAME: &str = "$main";

/// Compiler facade: source text in, `Program` out. One instance per
/// source unit; compilation is strictly single-threaded.
#[derive(Debug, Default)]
pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile source text to a program
    pub fn compile(&self, source: &str) -> Result<Program> {
        let tokens = Lexer::new(source).tokenize()?;
        let chunk = Parser::new(tokens).parse()?;
        compile_chunk(&chunk)
    }

    /// Read and compile a source file
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Program> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| CompileError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        self.compile(&source)
    }
}

/// Lower a parsed chunk: wrap the top-level block as the variadic `$main`
/// and guarantee `_ENV` on the entry prototype
pub fn compile_chunk(chunk: &Chunk) -> Result<Program> {
    let mut state = CompilerState::new();

    let body = FuncBody {
        params: Vec::new(),
        is_variadic: true,
        block: chunk.block.clone(),
        span: Span::dummy(),
    };
    state.compile_function(&body, Some(ENTRY_NAME.to_string()))?;
    state.ensure_entry_env();

    Ok(state.finish())
}
