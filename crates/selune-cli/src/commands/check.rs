//! Check command - compile and validate without writing output

use anyhow::{anyhow, Result};
use selune_compiler::validate;

/// Compile `file` and run the program validator, reporting any problems
pub fn run(file: &str) -> Result<()> {
    let program = super::compile_file(file)?;

    if let Err(errors) = validate(&program) {
        for error in &errors {
            eprintln!("{}: {}", file, error);
        }
        return Err(anyhow!("{}: {} validation error(s)", file, errors.len()));
    }

    println!(
        "{}: ok ({} prototype(s))",
        file,
        program.prototypes.len()
    );
    Ok(())
}
