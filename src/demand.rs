//! The demand forecast.
//!
//! Forecast records arrive with free-form product references (IDs, SKU codes or names); they are
//! resolved to canonical product IDs by the alias resolution stage before they become part of the
//! validated planning data.
use crate::error::{IssueList, ValidationIssue};
use crate::id::{NodeID, ProductID};
use crate::input::*;
use anyhow::Result;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

const DEMAND_FILE_NAME: &str = "demand.csv";

/// A single forecast record, as read from file. The product reference is unresolved.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DemandRecord {
    /// The node the demand occurs at
    pub node: String,
    /// A product reference: canonical ID, SKU code or alias
    pub product: String,
    /// The date the demand falls due
    pub date: NaiveDate,
    /// Units demanded
    #[serde(deserialize_with = "deserialise_quantity")]
    pub quantity: f64,
}

/// Demand in units for each (node, product, date), after alias resolution
pub type DemandMap = IndexMap<(NodeID, ProductID, NaiveDate), f64>;

/// Read raw forecast records from the `demand.csv` file in `model_dir`.
///
/// Field-level checks (quantity range, date parseability) happen during deserialisation; alias
/// resolution and cross-referencing happen later in the pipeline.
pub fn read_demand(model_dir: &Path, issues: &mut IssueList) -> Result<Vec<DemandRecord>> {
    let file_path = model_dir.join(DEMAND_FILE_NAME);
    let records: Vec<DemandRecord> = read_csv(&file_path)?.collect();
    if records.is_empty() {
        issues.push(ValidationIssue::new(
            "demand",
            DEMAND_FILE_NAME,
            "rows",
            "at least one forecast entry",
            "an empty file",
        ));
    }
    Ok(records)
}

/// Total units demanded across a demand map
pub fn total_demand(demand: &DemandMap) -> f64 {
    demand.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_demand() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(DEMAND_FILE_NAME)).unwrap();
            writeln!(
                file,
                "node,product,date,quantity\n6104,6122,2025-06-02,250\n6104,6125,2025-06-02,120"
            )
            .unwrap();
        }

        let mut issues = IssueList::new();
        let records = read_demand(dir.path(), &mut issues).unwrap();
        assert!(issues.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product, "6122");
        assert_eq!(records[0].quantity, 250.0);
    }

    #[test]
    fn test_negative_quantity_fails_to_parse() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(DEMAND_FILE_NAME)).unwrap();
            writeln!(file, "node,product,date,quantity\n6104,6122,2025-06-02,-5").unwrap();
        }

        let mut issues = IssueList::new();
        assert!(read_demand(dir.path(), &mut issues).is_err());
    }

    #[test]
    fn test_empty_file_is_an_issue() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(DEMAND_FILE_NAME)).unwrap();
            writeln!(file, "node,product,date,quantity").unwrap();
        }

        let mut issues = IssueList::new();
        let records = read_demand(dir.path(), &mut issues).unwrap();
        assert!(records.is_empty());
        assert_eq!(issues.len(), 1);
    }
}
