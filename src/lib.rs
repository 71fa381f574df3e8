//! Common functionality for the coldplan planning engine.
//!
//! The crate plans production and distribution for a perishable goods manufacturer: a validated
//! input container feeds a sliding-window MIP, an external solver produces aggregate flows, and
//! a FEFO post-processor assigns them to specific batches.
#![warn(missing_docs)]

use dirs::config_dir;
use std::path::PathBuf;

pub mod alias;
pub mod cli;
pub mod costs;
pub mod demand;
pub mod error;
pub mod fefo;
pub mod id;
pub mod input;
pub mod inventory;
pub mod labor;
pub mod log;
pub mod model;
pub mod network;
pub mod node;
pub mod optimisation;
pub mod output;
pub mod product;
pub mod route;
pub mod settings;
pub mod solution;
pub mod solver;
pub mod truck;
pub mod warmstart;

#[cfg(test)]
mod fixture;

/// The factor all flow variables are scaled by: flows are expressed in thousands of units.
///
/// Chosen for matrix conditioning, fixed at init time, and never a per-solve knob. Costs applied
/// to scaled variables are pre-multiplied by this factor; solution extraction multiplies every
/// scaled value by it to recover native units.
pub const SCALE_FACTOR: f64 = 1000.0;

/// Get config dir for program.
///
/// In the unlikely event this path cannot be retrieved, the CWD will be returned.
pub fn get_coldplan_config_dir() -> PathBuf {
    let Some(mut config_dir) = config_dir() else {
        return PathBuf::default();
    };

    config_dir.push("coldplan");
    config_dir
}
