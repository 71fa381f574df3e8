//! Cost parameters for the objective.
//!
//! Holding costs are charged per pallet-day at a state-specific rate, on the end-of-day state of
//! the stock, plus a fixed per-pallet handling charge. Transport costs live on routes and truck
//! schedules, not here.
use crate::error::{IssueList, ValidationIssue};
use crate::product::StorageState;
use serde::Deserialize;

/// Cost parameters, read from the `[costs]` table of `model.toml`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CostParameters {
    /// Cost per unit produced
    pub production_cost_per_unit: f64,
    /// Penalty per unit of unmet demand
    pub shortage_penalty_per_unit: f64,
    /// Cost incurred each time a product is produced on a day
    #[serde(default)]
    pub changeover_cost: f64,
    /// Fixed handling charge per pallet-day
    #[serde(default)]
    pub storage_fixed_per_pallet: f64,
    /// Holding cost per pallet-day for frozen stock
    #[serde(default)]
    pub storage_frozen_per_pallet_day: f64,
    /// Holding cost per pallet-day for ambient stock
    #[serde(default)]
    pub storage_ambient_per_pallet_day: f64,
    /// Holding cost per pallet-day for thawed stock
    #[serde(default)]
    pub storage_thawed_per_pallet_day: f64,
}

impl CostParameters {
    /// The state-specific holding rate per pallet-day
    pub fn holding_per_pallet_day(&self, state: StorageState) -> f64 {
        match state {
            StorageState::Frozen => self.storage_frozen_per_pallet_day,
            StorageState::Ambient => self.storage_ambient_per_pallet_day,
            StorageState::Thawed => self.storage_thawed_per_pallet_day,
        }
    }

    /// Record an issue for every negative or non-finite rate
    pub fn check(&self, issues: &mut IssueList) {
        for (field, value) in [
            ("production_cost_per_unit", self.production_cost_per_unit),
            ("shortage_penalty_per_unit", self.shortage_penalty_per_unit),
            ("changeover_cost", self.changeover_cost),
            ("storage_fixed_per_pallet", self.storage_fixed_per_pallet),
            (
                "storage_frozen_per_pallet_day",
                self.storage_frozen_per_pallet_day,
            ),
            (
                "storage_ambient_per_pallet_day",
                self.storage_ambient_per_pallet_day,
            ),
            (
                "storage_thawed_per_pallet_day",
                self.storage_thawed_per_pallet_day,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                issues.push(ValidationIssue::new(
                    "costs",
                    "model.toml",
                    field,
                    "a finite, non-negative cost",
                    value,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn cost_parameters() -> CostParameters {
        CostParameters {
            production_cost_per_unit: 1.0,
            shortage_penalty_per_unit: 1000.0,
            changeover_cost: 50.0,
            storage_fixed_per_pallet: 0.5,
            storage_frozen_per_pallet_day: 0.3,
            storage_ambient_per_pallet_day: 0.1,
            storage_thawed_per_pallet_day: 0.2,
        }
    }

    #[test]
    fn test_holding_per_pallet_day() {
        let costs = cost_parameters();
        assert_eq!(costs.holding_per_pallet_day(StorageState::Frozen), 0.3);
        assert_eq!(costs.holding_per_pallet_day(StorageState::Ambient), 0.1);
        assert_eq!(costs.holding_per_pallet_day(StorageState::Thawed), 0.2);
    }

    #[test]
    fn test_negative_cost_is_an_issue() {
        let mut costs = cost_parameters();
        costs.shortage_penalty_per_unit = -1.0;
        let mut issues = IssueList::new();
        costs.check(&mut issues);
        assert_eq!(issues.len(), 1);
    }
}
