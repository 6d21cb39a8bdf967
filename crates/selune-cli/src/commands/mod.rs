//! CLI subcommands

pub mod build;
pub mod check;
pub mod dump;

use anyhow::{anyhow, Result};
use selune_compiler::{Compiler, Program};

/// Compile `file`, translating compilation errors into the driver's
/// `file:line: message` diagnostic format
pub fn compile_file(file: &str) -> Result<Program> {
    Compiler::new()
        .compile_file(file)
        .map_err(|err| anyhow!(err.report(file)))
}
