//! Selune command-line driver

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "selune", version, about = "Selune compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file to a binary program (.slb)
    Build {
        /// Source file to compile
        file: String,
        /// Print the disassembled program to stdout
        #[arg(long)]
        disasm: bool,
        /// Output path (defaults to the source path with a .slb extension)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Compile a source file and report errors without writing output
    Check {
        /// Source file to check
        file: String,
    },
    /// Compile a source file and print the human-readable program dump
    Dump {
        /// Source file to dump
        file: String,
        /// Emit the program as JSON instead of the table dump
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<()> = match cli.command {
        Command::Build {
            file,
            disasm,
            output,
        } => commands::build::run(&file, disasm, output.as_deref()),
        Command::Check { file } => commands::check::run(&file),
        Command::Dump { file, json } => commands::dump::run(&file, json),
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
