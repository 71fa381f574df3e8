//! The module responsible for writing output data to disk.
use crate::fefo::FefoAllocation;
use crate::solution::OptimizationSolution;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "coldplan_results";

/// Get the default output directory for the model specified at `model_dir`
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to
    // check for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;
    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory at the specified path
pub fn create_output_directory(output_dir: &Path) -> Result<()> {
    if output_dir.is_dir() {
        // already exists
        return Ok(());
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(())
}

#[derive(Serialize)]
struct LaborRow {
    date: NaiveDate,
    used: f64,
    paid: f64,
    fixed: f64,
    overtime: f64,
    non_fixed: f64,
}

#[derive(Serialize)]
struct CostRow<'a> {
    component: &'a str,
    total: f64,
}

#[derive(Serialize)]
struct InventoryRow<'a> {
    key: &'a str,
    quantity: f64,
}

/// Write one CSV file of serialisable rows
fn write_csv<T: Serialize>(file_path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the solution and its batch allocations to the output directory.
///
/// Produces CSV files for production, shipments, labor, costs and aggregate inventory, plus the
/// full solution as JSON with pipe-delimited composite keys.
pub fn write_solution(
    output_path: &Path,
    solution: &OptimizationSolution,
    allocation: &FefoAllocation,
) -> Result<()> {
    write_csv(
        &output_path.join("production.csv"),
        &solution.production_batches,
    )?;
    write_csv(&output_path.join("shipments.csv"), &solution.shipments)?;
    write_csv(&output_path.join("disposals.csv"), &solution.disposals)?;

    write_csv(
        &output_path.join("labor.csv"),
        solution
            .labor_hours_by_date
            .iter()
            .map(|(date, hours)| LaborRow {
                date: *date,
                used: hours.used,
                paid: hours.paid,
                fixed: hours.fixed,
                overtime: hours.overtime,
                non_fixed: hours.non_fixed,
            }),
    )?;

    write_csv(
        &output_path.join("costs.csv"),
        [
            CostRow {
                component: "labor",
                total: solution.costs.labor.total,
            },
            CostRow {
                component: "production",
                total: solution.costs.production.total,
            },
            CostRow {
                component: "transport",
                total: solution.costs.transport.total,
            },
            CostRow {
                component: "holding",
                total: solution.costs.holding.total,
            },
            CostRow {
                component: "waste_shortage",
                total: solution.costs.waste_shortage.total,
            },
            CostRow {
                component: "total",
                total: solution.costs.total,
            },
        ],
    )?;

    write_csv(
        &output_path.join("inventory.csv"),
        solution
            .inventory_state
            .iter()
            .map(|(key, quantity)| InventoryRow {
                key,
                quantity: *quantity,
            }),
    )?;

    write_csv(
        &output_path.join("batch_allocations.csv"),
        allocation
            .shipment_allocations
            .iter()
            .chain(&allocation.consumption_allocations)
            .chain(&allocation.disposal_allocations),
    )?;

    fs::write(output_path.join("solution.json"), solution.to_json()?)
        .context("Could not write solution.json")?;

    Ok(())
}
