//! Problem assembly with build-time self-checks.
//!
//! All columns and rows pass through [`ProblemBuilder`], which enforces the documented
//! constraint-category order (so debug output is stable and reproducible), rejects rows that
//! reference the same column twice (the signature of a variable appearing on both sides of a
//! balance), and tracks the constraint-matrix coefficient range for the conditioning self-check.
use crate::error::PlanningError;
use anyhow::Result;
use highs::RowProblem;
use log::{debug, warn};

/// Constraint categories, in the order they must be added
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConstraintCategory {
    /// State-specific material balances
    MaterialBalance,
    /// Demand accounting rows
    Demand,
    /// Sliding-window shelf-life rows
    ShelfLife,
    /// Labor, pallet-ceiling and storage-capacity rows
    Capacity,
    /// Per-departure truck capacity rows
    Truck,
    /// Big-M indicator linking rows
    BinaryLinking,
}

/// The conditioning ratio above which the builder warns about a badly scaled matrix
const CONDITIONING_WARN_RATIO: f64 = 1e6;

/// A handle to one column of the problem: the solver's column plus its position, used to read
/// the value back out of the raw solution.
#[derive(Clone, Copy, Debug)]
pub struct VarRef {
    /// The solver column
    pub col: highs::Col,
    /// Zero-based column position
    pub index: usize,
}

/// Assembles the scaled MIP, recording enough metadata for self-checks and extraction
pub struct ProblemBuilder {
    problem: RowProblem,
    objective: Vec<f64>,
    num_rows: usize,
    coeff_abs_min: f64,
    coeff_abs_max: f64,
    category: Option<ConstraintCategory>,
}

impl Default for ProblemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            problem: RowProblem::default(),
            objective: Vec::new(),
            num_rows: 0,
            coeff_abs_min: f64::INFINITY,
            coeff_abs_max: 0.0,
            category: None,
        }
    }

    /// Add a continuous column with the given objective coefficient and bounds
    pub fn add_column(&mut self, objective: f64, min: f64, max: f64) -> VarRef {
        let col = self.problem.add_column(objective, min..=max);
        let index = self.objective.len();
        self.objective.push(objective);
        VarRef { col, index }
    }

    /// Add an integer column with the given objective coefficient and bounds
    pub fn add_integer_column(&mut self, objective: f64, min: f64, max: f64) -> VarRef {
        let col = self.problem.add_integer_column(objective, min..=max);
        let index = self.objective.len();
        self.objective.push(objective);
        VarRef { col, index }
    }

    /// Add a binary column with the given objective coefficient
    pub fn add_binary_column(&mut self, objective: f64) -> VarRef {
        self.add_integer_column(objective, 0.0, 1.0)
    }

    /// Add a constraint row.
    ///
    /// # Errors
    ///
    /// Fails with [`PlanningError::ModelBuild`] when a row is added out of category order or
    /// references the same column twice. Both indicate a builder bug, not a data problem.
    pub fn add_row(
        &mut self,
        category: ConstraintCategory,
        min: f64,
        max: f64,
        terms: Vec<(VarRef, f64)>,
    ) -> Result<()> {
        if let Some(current) = self.category
            && category < current
        {
            return Err(PlanningError::ModelBuild(format!(
                "constraint category {category:?} added after {current:?}; \
                 the documented order is balance, demand, shelf life, capacity, truck, binary"
            ))
            .into());
        }
        self.category = Some(category);

        let mut seen = std::collections::HashSet::with_capacity(terms.len());
        for (var, coefficient) in &terms {
            if !seen.insert(var.index) {
                return Err(PlanningError::ModelBuild(format!(
                    "column {} appears twice in one {category:?} row; \
                     a variable may not sit on both sides of a constraint",
                    var.index
                ))
                .into());
            }

            let magnitude = coefficient.abs();
            if magnitude > 0.0 {
                self.coeff_abs_min = self.coeff_abs_min.min(magnitude);
                self.coeff_abs_max = self.coeff_abs_max.max(magnitude);
            }
        }

        self.problem.add_row(
            min..=max,
            terms.into_iter().map(|(var, coefficient)| (var.col, coefficient)),
        );
        self.num_rows += 1;
        Ok(())
    }

    /// An equality row: the terms must sum to exactly `rhs`
    pub fn add_equality_row(
        &mut self,
        category: ConstraintCategory,
        rhs: f64,
        terms: Vec<(VarRef, f64)>,
    ) -> Result<()> {
        self.add_row(category, rhs, rhs, terms)
    }

    /// Number of columns added so far
    pub fn num_cols(&self) -> usize {
        self.objective.len()
    }

    /// Number of rows added so far
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// `max|coef| / min|coef|` over the constraint matrix
    pub fn conditioning_ratio(&self) -> f64 {
        if self.coeff_abs_max == 0.0 {
            return 1.0;
        }
        self.coeff_abs_max / self.coeff_abs_min
    }

    /// Run the conditioning self-check and hand back the assembled problem with its objective
    /// coefficients (one per column, in column order).
    pub fn finish(self) -> (RowProblem, Vec<f64>) {
        let ratio = self.conditioning_ratio();
        debug!(
            "Built problem: {} columns, {} rows, coefficient ratio {ratio:.1e}",
            self.objective.len(),
            self.num_rows
        );
        if ratio >= CONDITIONING_WARN_RATIO {
            warn!(
                "Constraint matrix coefficient ratio is {ratio:.1e} (>= {CONDITIONING_WARN_RATIO:.0e}); \
                 the model may be numerically unstable"
            );
        }

        (self.problem, self.objective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_category_order_is_enforced() {
        let mut pb = ProblemBuilder::new();
        let x = pb.add_column(1.0, 0.0, 10.0);
        pb.add_row(ConstraintCategory::Demand, 0.0, 1.0, vec![(x, 1.0)])
            .unwrap();

        // Demand -> Capacity is forwards, fine
        pb.add_row(ConstraintCategory::Capacity, 0.0, 1.0, vec![(x, 1.0)])
            .unwrap();

        // Capacity -> MaterialBalance runs backwards
        assert!(
            pb.add_row(ConstraintCategory::MaterialBalance, 0.0, 1.0, vec![(x, 1.0)])
                .is_err()
        );
    }

    #[test]
    fn test_duplicate_column_in_row_is_rejected() {
        let mut pb = ProblemBuilder::new();
        let x = pb.add_column(1.0, 0.0, 10.0);
        assert!(
            pb.add_row(
                ConstraintCategory::MaterialBalance,
                0.0,
                1.0,
                vec![(x, 1.0), (x, -1.0)]
            )
            .is_err()
        );
    }

    #[test]
    fn test_conditioning_ratio() {
        let mut pb = ProblemBuilder::new();
        let x = pb.add_column(1.0, 0.0, 10.0);
        let y = pb.add_column(1.0, 0.0, 10.0);
        pb.add_row(
            ConstraintCategory::MaterialBalance,
            0.0,
            1.0,
            vec![(x, 0.001), (y, 1000.0)],
        )
        .unwrap();
        assert_approx_eq!(f64, pb.conditioning_ratio(), 1e6, epsilon = 1.0);
    }

    #[test]
    fn test_empty_matrix_ratio_is_one() {
        let pb = ProblemBuilder::new();
        assert_approx_eq!(f64, pb.conditioning_ratio(), 1.0, epsilon = 1e-12);
    }
}
