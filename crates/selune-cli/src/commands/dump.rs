//! Dump command - print the compiled program in readable form

use anyhow::{Context, Result};

/// Compile `file` and print the tabular dump, or a JSON rendering of the
/// program model with `--json`
pub fn run(file: &str, json: bool) -> Result<()> {
    let program = super::compile_file(file)?;

    if json {
        let text =
            serde_json::to_string_pretty(&program).context("Failed to render program as JSON")?;
        println!("{}", text);
    } else {
        print!("{}", program);
    }
    Ok(())
}
