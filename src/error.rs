//! Error kinds for the planning pipeline.
//!
//! Every error bubbles to the caller; nothing is recovered locally. Validation problems are
//! collected across a full pass over the input so that the caller receives every failure at once,
//! each with enough context to locate and correct the source record without rerunning.
use std::fmt;
use thiserror::Error;

/// A single problem found while validating input records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The input domain the issue was found in (e.g. "demand", "trucks")
    pub domain: String,
    /// A key identifying the offending record (e.g. "6122|2025-06-02")
    pub record: String,
    /// The field that failed validation
    pub field: String,
    /// What a valid value would look like
    pub expected: String,
    /// The value actually found
    pub actual: String,
}

impl ValidationIssue {
    /// Create a new issue. All arguments are converted to owned strings.
    pub fn new(
        domain: &str,
        record: impl fmt::Display,
        field: &str,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            record: record.to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] {}: field `{}`: expected {}, got {}",
            self.domain, self.record, self.field, self.expected, self.actual
        )
    }
}

/// Format a list of issues, one per line, for error messages
fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// An accumulator for [`ValidationIssue`]s.
///
/// Readers push issues as they encounter them; the pipeline converts a non-empty list into a
/// [`PlanningError`] only once the full pass has completed, so that every failure is reported.
#[derive(Debug, Default)]
pub struct IssueList(Vec<ValidationIssue>);

impl IssueList {
    /// Create an empty issue list
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue
    pub fn push(&mut self, issue: ValidationIssue) {
        self.0.push(issue);
    }

    /// Whether any issue has been recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded issues
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Consume the list, returning an error if any issue was recorded.
    ///
    /// Issues recorded during alias resolution become an
    /// [`PlanningError::AliasResolution`]; everything else becomes
    /// [`PlanningError::Validation`].
    pub fn into_result(self) -> Result<(), PlanningError> {
        if self.0.is_empty() {
            return Ok(());
        }

        if self.0.iter().all(|issue| issue.field == "product") {
            Err(PlanningError::AliasResolution(self.0))
        } else {
            Err(PlanningError::Validation(self.0))
        }
    }

    /// Iterate over the recorded issues
    pub fn iter(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.0.iter()
    }
}

/// Errors raised by the planning pipeline
#[derive(Debug, Error)]
pub enum PlanningError {
    /// One or more input records violated the input contract
    #[error("input validation failed with {} issue(s):\n{}", .0.len(), format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// A product reference could not be resolved after the three-tier lookup
    #[error("alias resolution failed with {} unresolved reference(s):\n{}", .0.len(), format_issues(.0))]
    AliasResolution(Vec<ValidationIssue>),

    /// Unreachable demand, invalid intermediate stop or storage capability mismatch
    #[error("network topology error: {0}")]
    Topology(String),

    /// An acyclicity or scaling self-check failed while building the model. Indicates a bug.
    #[error("model build self-check failed: {0}")]
    ModelBuild(String),

    /// The solver reported infeasibility, unboundedness or a numerical failure
    #[error("solve failed: {0}")]
    Solve(String),

    /// A cross-field invariant of the solution was violated during extraction. Indicates a bug.
    #[error("solution contract violated: {0}")]
    SolutionContract(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::new("demand", "6122|2025-06-02", "quantity", ">= 0", "-4");
        assert_eq!(
            issue.to_string(),
            "[demand] 6122|2025-06-02: field `quantity`: expected >= 0, got -4"
        );
    }

    #[test]
    fn test_issue_list_empty_is_ok() {
        assert!(IssueList::new().into_result().is_ok());
    }

    #[test]
    fn test_issue_list_aggregates_all_failures() {
        let mut issues = IssueList::new();
        issues.push(ValidationIssue::new("demand", "a", "quantity", ">= 0", "-1"));
        issues.push(ValidationIssue::new("inventory", "b", "state", "frozen", "x"));
        let err = issues.into_result().unwrap_err();
        let PlanningError::Validation(list) = err else {
            panic!("expected validation error");
        };
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_unresolved_products_become_alias_error() {
        let mut issues = IssueList::new();
        issues.push(ValidationIssue::new(
            "inventory",
            "168846",
            "product",
            "a known product ID, name or alias",
            "168846",
        ));
        assert!(matches!(
            issues.into_result().unwrap_err(),
            PlanningError::AliasResolution(_)
        ));
    }
}
