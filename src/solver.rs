//! A thin adapter over the external MIP solver.
//!
//! The builder emits a standard MIP; this module owns solver selection, opaque option passing,
//! warmstart hand-off and the explicit termination mapping. An infeasible or unbounded model
//! never produces a solution object; it surfaces as an error carrying the solver's status.
use crate::error::PlanningError;
use anyhow::Result;
use highs::{HighsModelStatus, RowProblem, Sense};
use log::{info, warn};
use serde::Serialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::time::{Duration, Instant};

/// Which solver backend to use
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum SolverChoice {
    /// The HiGHS solver (preferred)
    #[default]
    #[string = "highs"]
    Highs,
    /// The COIN-OR CBC solver
    #[string = "cbc"]
    Cbc,
}

/// Options passed opaquely to the solver
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    /// Relative MIP gap at which the solver may stop
    pub mip_gap: f64,
    /// Wall-clock limit in seconds. The solver's cooperative time limit is the only
    /// cancellation channel.
    pub time_limit_seconds: Option<f64>,
    /// Number of solver threads, when overridden
    pub threads: Option<i32>,
    /// Whether the solver may write to the console
    pub log_to_console: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            mip_gap: 1e-4,
            time_limit_seconds: None,
            threads: None,
            log_to_console: false,
        }
    }
}

/// How a solve terminated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Proven optimal within the MIP gap
    Optimal,
    /// Integer-feasible incumbent, not proven optimal (e.g. the time limit was hit)
    Feasible,
    /// No feasible solution exists
    Infeasible,
    /// The objective is unbounded below
    Unbounded,
    /// The time limit was reached without an integer-feasible incumbent
    TimeLimit,
    /// A solver-side failure
    Error(String),
}

impl Termination {
    /// Whether this termination carries a usable solution
    pub fn has_solution(&self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// The raw output of a solve: status, objective and one value per column
pub struct RawSolution {
    /// How the solve terminated. Always a solution-bearing status.
    pub termination: Termination,
    /// The objective value, in model (scaled-cost) terms
    pub objective: f64,
    /// One value per column, in column order
    pub values: Vec<f64>,
    /// Wall-clock time spent in the solver
    pub solve_time: Duration,
}

/// Solve the problem with the selected backend.
///
/// # Arguments
///
/// * `problem` - The assembled problem, to be minimised
/// * `objective_coefficients` - One objective coefficient per column, in column order
/// * `choice` - Which backend to use
/// * `options` - Options passed opaquely to the solver
/// * `warmstart` - Optional full column-value vector handed to the solver as a MIP start
///
/// # Returns
///
/// A [`RawSolution`] whose termination is `Optimal` or `Feasible`, or an error for every other
/// outcome.
pub fn solve(
    problem: RowProblem,
    objective_coefficients: &[f64],
    choice: SolverChoice,
    options: &SolverOptions,
    warmstart: Option<&[f64]>,
) -> Result<RawSolution> {
    match choice {
        SolverChoice::Highs => solve_highs(problem, objective_coefficients, options, warmstart),
        SolverChoice::Cbc => Err(PlanningError::Solve(
            "the CBC backend is not linked into this build; select the highs solver".to_string(),
        )
        .into()),
    }
}

/// Solve with HiGHS, mapping its model status onto [`Termination`]
fn solve_highs(
    problem: RowProblem,
    objective_coefficients: &[f64],
    options: &SolverOptions,
    warmstart: Option<&[f64]>,
) -> Result<RawSolution> {
    let num_cols = objective_coefficients.len();
    let mut model = problem.optimise(Sense::Minimise);

    model.set_option("output_flag", options.log_to_console);
    model.set_option("mip_rel_gap", options.mip_gap);
    if let Some(limit) = options.time_limit_seconds {
        model.set_option("time_limit", limit);
    }
    if let Some(threads) = options.threads {
        model.set_option("threads", threads);
    }

    if let Some(values) = warmstart {
        // Hints must reach the solver through its MIP-start entry point; setting variable
        // values anywhere else leaves the solver cold-started.
        model.set_solution(Some(values), None, None, None);
        info!("Passed warmstart hints for {} columns to HiGHS", values.len());
    }

    let start = Instant::now();
    let solved = model.solve();
    let solve_time = start.elapsed();

    let termination = match solved.status() {
        HighsModelStatus::Optimal => Termination::Optimal,
        HighsModelStatus::ReachedTimeLimit => Termination::TimeLimit,
        HighsModelStatus::Infeasible => Termination::Infeasible,
        HighsModelStatus::Unbounded => Termination::Unbounded,
        HighsModelStatus::UnboundedOrInfeasible => Termination::Unbounded,
        status => Termination::Error(format!("{status:?}")),
    };

    match &termination {
        Termination::Optimal | Termination::TimeLimit => {}
        other => {
            return Err(PlanningError::Solve(format!(
                "solver terminated with {other:?} after {solve_time:.1?}"
            ))
            .into());
        }
    }

    let values = solved.get_solution().columns().to_vec();
    let incumbent_usable = values.len() == num_cols && values.iter().all(|v| v.is_finite());

    let termination = match termination {
        Termination::Optimal => Termination::Optimal,
        // A time-limited solve with an integer-feasible incumbent is Feasible, never Optimal
        Termination::TimeLimit if incumbent_usable => {
            warn!("Time limit reached; returning the incumbent solution");
            Termination::Feasible
        }
        _ => {
            return Err(PlanningError::Solve(
                "time limit reached without an integer-feasible incumbent".to_string(),
            )
            .into());
        }
    };

    let objective = values
        .iter()
        .zip(objective_coefficients)
        .map(|(value, coefficient)| value * coefficient)
        .sum();

    Ok(RawSolution {
        termination,
        objective,
        values,
        solve_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_termination_has_solution() {
        assert!(Termination::Optimal.has_solution());
        assert!(Termination::Feasible.has_solution());
        assert!(!Termination::Infeasible.has_solution());
        assert!(!Termination::TimeLimit.has_solution());
    }

    /// A two-variable MIP small enough to solve in-process
    #[test]
    fn test_solve_small_mip() {
        let mut problem = RowProblem::default();
        // Minimise 3x + 2y subject to x + y >= 4, x integer in [0, 10], y in [0, 10]
        let x = problem.add_integer_column(3.0, 0.0..=10.0);
        let y = problem.add_column(2.0, 0.0..=10.0);
        problem.add_row(4.0.., [(x, 1.0), (y, 1.0)]);

        let solution = solve(
            problem,
            &[3.0, 2.0],
            SolverChoice::Highs,
            &SolverOptions::default(),
            None,
        )
        .unwrap();

        assert_eq!(solution.termination, Termination::Optimal);
        assert_approx_eq!(f64, solution.objective, 8.0, epsilon = 1e-6);
        assert_approx_eq!(f64, solution.values[1], 4.0, epsilon = 1e-6);
    }

    /// An infeasible model must surface as an error, never a solution object
    #[test]
    fn test_infeasible_is_an_error() {
        let mut problem = RowProblem::default();
        let x = problem.add_column(1.0, 0.0..=1.0);
        problem.add_row(5.0.., [(x, 1.0)]);

        let result = solve(
            problem,
            &[1.0],
            SolverChoice::Highs,
            &SolverOptions::default(),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cbc_is_not_linked() {
        let problem = RowProblem::default();
        assert!(
            solve(
                problem,
                &[],
                SolverChoice::Cbc,
                &SolverOptions::default(),
                None
            )
            .is_err()
        );
    }
}
