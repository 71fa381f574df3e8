//! The command line interface for the planner.
use crate::fefo;
use crate::log;
use crate::model::PlanningData;
use crate::optimisation::build_and_solve;
use crate::output::{create_output_directory, get_output_dir, write_solution};
use crate::settings::Settings;
use ::log::info;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// The command line interface for the planner.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// The available commands.
    #[command(subcommand)]
    pub command: Commands,
}

/// The available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Validate a model, solve it and write the plan.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Directory for output files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Run the validation pipeline only and report the outcome.
    Validate {
        /// Path to the model directory.
        model_dir: PathBuf,
    },
}

/// Handle the `run` command.
pub fn handle_run_command(model_path: &Path, output_path: Option<&Path>) -> Result<()> {
    // Load program settings
    let settings = Settings::load().context("Failed to load settings.")?;

    // Create output folder
    let output_path = match output_path {
        Some(p) => p.to_owned(),
        None => get_output_dir(model_path)?,
    };
    create_output_directory(&output_path).context("Failed to create output directory.")?;

    // Initialise program logger
    log::init(settings.log_level_filter()?, Some(&output_path))
        .context("Failed to initialise logging.")?;

    // Load and validate the model to plan
    let data = PlanningData::from_path(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());
    info!("Output data will be written to {}", output_path.display());

    // Build the MIP, solve it and extract the validated solution
    let solution = build_and_solve(
        &data,
        settings.solver,
        &settings.solver_options(),
        settings.warmstart,
    )?;

    // Assign the aggregate flows to specific batches
    let allocation = fefo::allocate(&data, &solution)?;

    write_solution(&output_path, &solution, &allocation)?;
    info!(
        "Plan complete: total cost {:.2}, fill rate {:.3}, {} production runs, {} shipments",
        solution.total_cost,
        solution.fill_rate,
        solution.production_batches.len(),
        solution.shipments.len()
    );

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path) -> Result<()> {
    if !log::is_logger_initialised() {
        let settings = Settings::load().context("Failed to load settings.")?;
        log::init(settings.log_level_filter()?, None)
            .context("Failed to initialise logging.")?;
    }

    let data = PlanningData::from_path(model_path)?;
    info!(
        "Model at {} is valid: {} products, {} nodes, {} demand entries over {} days",
        model_path.display(),
        data.products.len(),
        data.nodes.len(),
        data.demand.len(),
        data.window.num_days()
    );

    Ok(())
}
