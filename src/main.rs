//! Provides the main entry point to the coldplan program.
use anyhow::Result;
use clap::Parser;
use coldplan::cli::{Cli, Commands, handle_run_command, handle_validate_command};

/// The main entry point to the program
fn main() -> Result<()> {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            model_dir,
            output_dir,
        } => handle_run_command(&model_dir, output_dir.as_deref()),
        Commands::Validate { model_dir } => handle_validate_command(&model_dir),
    }
}
