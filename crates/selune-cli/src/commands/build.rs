//! Build command - compile a source file to a binary program

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Compile `file` to a `.slb` program file.
/// If `disasm` is true, also print the disassembled program to stdout.
pub fn run(file: &str, disasm: bool, output: Option<&str>) -> Result<()> {
    let program = super::compile_file(file)?;

    let output_path = match output {
        Some(path) => path.into(),
        None => Path::new(file).with_extension("slb"),
    };

    let bytes = program.to_bytes();
    fs::write(&output_path, bytes)
        .with_context(|| format!("Failed to write program file: {:?}", output_path))?;

    println!("Compiled {} -> {}", file, output_path.display());

    if disasm {
        println!("\n{}", program);
    }

    Ok(())
}
