//! Initial inventory records.
//!
//! Inventory snapshots are taken before the planning window opens. Like forecast records, the
//! product references are free-form until alias resolution has run. Records may carry a
//! production date; batches without one are given a synthetic date by the FEFO allocator.
use crate::error::{IssueList, ValidationIssue};
use crate::id::{NodeID, ProductID};
use crate::input::*;
use crate::product::StorageState;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

const INVENTORY_FILE_NAME: &str = "inventory.csv";

/// A single inventory record, as read from file. The product reference is unresolved.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InventoryRecord {
    /// The node holding the stock
    pub node: String,
    /// A product reference: canonical ID, SKU code or alias
    pub product: String,
    /// The storage state the stock is held in
    pub state: StorageState,
    /// Units on hand
    #[serde(deserialize_with = "deserialise_quantity")]
    pub quantity: f64,
    /// The date the stock was produced, when known
    pub production_date: Option<NaiveDate>,
    /// The date the snapshot was taken
    pub snapshot_date: NaiveDate,
}

/// A validated initial-inventory entry with a resolved product ID
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryEntry {
    /// The node holding the stock
    pub node: NodeID,
    /// The canonical product ID
    pub product: ProductID,
    /// The storage state the stock is held in
    pub state: StorageState,
    /// Units on hand
    pub quantity: f64,
    /// The date the stock was produced, when known
    pub production_date: Option<NaiveDate>,
    /// The date the snapshot was taken
    pub snapshot_date: NaiveDate,
}

/// Read raw inventory records from the `inventory.csv` file in `model_dir`.
///
/// The file may legitimately be absent; a plan can start from empty stock.
pub fn read_inventory(model_dir: &Path, issues: &mut IssueList) -> Result<Vec<InventoryRecord>> {
    let file_path = model_dir.join(INVENTORY_FILE_NAME);
    if !file_path.is_file() {
        return Ok(Vec::new());
    }

    let records: Vec<InventoryRecord> = read_csv(&file_path)?.collect();
    for record in &records {
        if let Some(production_date) = record.production_date
            && production_date > record.snapshot_date
        {
            issues.push(ValidationIssue::new(
                "inventory",
                format!("{}|{}", record.node, record.product),
                "production_date",
                format!("no later than the snapshot date ({})", record.snapshot_date),
                production_date,
            ));
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_inventory() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(INVENTORY_FILE_NAME)).unwrap();
            writeln!(
                file,
                "node,product,state,quantity,production_date,snapshot_date\n\
                 LINEAGE,168846,frozen,640,2025-05-20,2025-06-01\n\
                 6104,6122,ambient,120,,2025-06-01"
            )
            .unwrap();
        }

        let mut issues = IssueList::new();
        let records = read_inventory(dir.path(), &mut issues).unwrap();
        assert!(issues.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].state, StorageState::Frozen);
        assert_eq!(records[1].production_date, None);
    }

    #[test]
    fn test_missing_file_means_no_stock() {
        let dir = tempdir().unwrap();
        let mut issues = IssueList::new();
        let records = read_inventory(dir.path(), &mut issues).unwrap();
        assert!(records.is_empty());
        assert!(issues.is_empty());
    }

    #[test]
    fn test_production_after_snapshot_is_an_issue() {
        let dir = tempdir().unwrap();
        {
            let mut file = File::create(dir.path().join(INVENTORY_FILE_NAME)).unwrap();
            writeln!(
                file,
                "node,product,state,quantity,production_date,snapshot_date\n\
                 LINEAGE,168846,frozen,640,2025-06-05,2025-06-01"
            )
            .unwrap();
        }

        let mut issues = IssueList::new();
        read_inventory(dir.path(), &mut issues).unwrap();
        assert_eq!(issues.len(), 1);
    }
}
