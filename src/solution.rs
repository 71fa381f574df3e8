//! The typed optimisation result and its contract.
//!
//! Every cross-field invariant is checked when the solution is assembled; a violation raises a
//! [`PlanningError::SolutionContract`] that propagates to the caller. A failed check is never
//! downgraded to a success with empty data.
//!
//! Composite map keys are pipe-delimited strings ("node|product|state|date"), never tuples, so
//! the object survives serialisation on platforms without tuple-keyed maps.
use crate::error::PlanningError;
use crate::id::{NodeID, ProductID};
use crate::model::PlanningData;
use crate::product::StorageState;
use crate::solver::Termination;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Relative tolerance for cross-field sums (1%)
const SUM_TOLERANCE: f64 = 0.01;
/// Absolute tolerance for near-zero comparisons
const EPSILON: f64 = 1e-6;
/// Demand level above which the unscaling sanity floor applies
const NONTRIVIAL_DEMAND_UNITS: f64 = 1000.0;
/// Minimum believable production when demand is non-trivial and anything was produced
const PRODUCTION_SANITY_FLOOR_UNITS: f64 = 100.0;

/// One production run: an integer number of mixes of one product on one day
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProductionBatch {
    /// The manufacturing node
    pub node: NodeID,
    /// The product produced
    pub product: ProductID,
    /// The production date
    pub date: NaiveDate,
    /// Units produced; always a positive multiple of the product's mix size
    pub quantity: f64,
}

/// One shipment between two nodes
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Shipment {
    /// The node the shipment departs from
    pub origin: NodeID,
    /// The node the shipment is delivered to
    pub destination: NodeID,
    /// The product shipped
    pub product: ProductID,
    /// Units shipped (positive)
    pub quantity: f64,
    /// The departure date
    pub departure_date: NaiveDate,
    /// The delivery date
    pub delivery_date: NaiveDate,
    /// The state the stock lands in at the destination
    pub state: StorageState,
    /// The truck schedule used, when the origin is timetabled
    pub truck_id: Option<Rc<str>>,
}

/// Demand served from stock on one date, split by the state it was drawn from
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Consumption {
    /// The node the demand was served at
    pub node: NodeID,
    /// The product consumed
    pub product: ProductID,
    /// The date of consumption
    pub date: NaiveDate,
    /// The state the stock was drawn from (ambient or thawed)
    pub state: StorageState,
    /// Units consumed (positive)
    pub quantity: f64,
}

/// A same-day state change of stock at one node
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateTransition {
    /// The node the transition happened at
    pub node: NodeID,
    /// The product moved
    pub product: ProductID,
    /// The date of the transition
    pub date: NaiveDate,
    /// The state the stock left
    pub from_state: StorageState,
    /// The state the stock entered
    pub to_state: StorageState,
    /// Units moved (positive)
    pub quantity: f64,
}

/// Expired stock discarded at one node
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Disposal {
    /// The node the stock was discarded at
    pub node: NodeID,
    /// The product discarded
    pub product: ProductID,
    /// The state the stock was in
    pub state: StorageState,
    /// The date of disposal
    pub date: NaiveDate,
    /// Units discarded (positive)
    pub quantity: f64,
}

/// Hours worked and paid on one date, aggregated over manufacturing nodes
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct LaborHours {
    /// Hours of work the plan requires
    pub used: f64,
    /// Hours paid for; never less than `used`
    pub paid: f64,
    /// Paid hours at the regular rate
    pub fixed: f64,
    /// Paid hours at the overtime rate
    pub overtime: f64,
    /// Paid hours at the non-fixed-day rate
    pub non_fixed: f64,
}

/// A cost component with only a total
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct ComponentCost {
    /// The component's total cost
    pub total: f64,
}

/// Labor cost, in total and by date
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LaborCost {
    /// Total labor cost over the window
    pub total: f64,
    /// Labor cost per date
    pub by_date: BTreeMap<NaiveDate, f64>,
}

/// Holding cost, per state
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct HoldingCost {
    /// Total holding cost
    pub total: f64,
    /// Holding cost of frozen stock
    pub frozen: f64,
    /// Holding cost of ambient stock
    pub ambient: f64,
    /// Holding cost of thawed stock
    pub thawed: f64,
}

/// The structured cost breakdown. The top-level total must equal the sum of the sub-totals
/// within the floating-point tolerance.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CostBreakdown {
    /// Labor cost
    pub labor: LaborCost,
    /// Production cost, changeover charges included
    pub production: ComponentCost,
    /// Transport cost over all shipments
    pub transport: ComponentCost,
    /// Holding cost, per state
    pub holding: HoldingCost,
    /// Shortage penalties and waste
    pub waste_shortage: ComponentCost,
    /// The sum of the components above
    pub total: f64,
}

impl CostBreakdown {
    /// Sum of the sub-totals
    pub fn component_sum(&self) -> f64 {
        self.labor.total
            + self.production.total
            + self.transport.total
            + self.holding.total
            + self.waste_shortage.total
    }
}

/// Build the pipe-delimited aggregate-inventory key
pub fn inventory_key(node: &str, product: &str, state: StorageState, date: NaiveDate) -> String {
    format!("{node}|{product}|{state}|{date}")
}

/// The validated result of one solve
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptimizationSolution {
    /// Discriminator for the model variant that produced this solution
    pub model_type: String,
    /// How the solve terminated
    pub termination: Termination,
    /// The solver's objective value, in cost terms
    pub objective_value: f64,
    /// Wall-clock seconds spent in the solver
    pub solve_time_seconds: f64,
    /// Production runs with positive quantity
    pub production_batches: Vec<ProductionBatch>,
    /// Hours worked and paid, per date
    pub labor_hours_by_date: BTreeMap<NaiveDate, LaborHours>,
    /// Shipments with positive quantity
    pub shipments: Vec<Shipment>,
    /// Demand served from stock, by source state
    pub demand_consumption: Vec<Consumption>,
    /// Thaw and freeze movements
    pub state_transitions: Vec<StateTransition>,
    /// Expired stock discarded
    pub disposals: Vec<Disposal>,
    /// The structured cost breakdown
    pub costs: CostBreakdown,
    /// The total plan cost; equals `costs.total`
    pub total_cost: f64,
    /// Fraction of demand served, in [0, 1]
    pub fill_rate: f64,
    /// Total units produced
    pub total_production: f64,
    /// Total units of unmet demand
    pub total_shortage_units: f64,
    /// End-of-day stock per "node|product|state|date" key, in units
    pub inventory_state: BTreeMap<String, f64>,
}

/// Whether two sums agree within the relative tolerance
fn sums_agree(a: f64, b: f64) -> bool {
    (a - b).abs() <= SUM_TOLERANCE * a.abs().max(b.abs()) + EPSILON
}

impl OptimizationSolution {
    /// Check every cross-field invariant, consuming and returning the solution.
    ///
    /// # Errors
    ///
    /// A [`PlanningError::SolutionContract`] for the first violated invariant. The error always
    /// propagates; the caller must never swallow it and report success.
    pub fn validated(self, data: &PlanningData) -> Result<Self> {
        let contract = |message: String| PlanningError::SolutionContract(message);

        let batch_sum: f64 = self.production_batches.iter().map(|b| b.quantity).sum();
        if !sums_agree(batch_sum, self.total_production) {
            return Err(contract(format!(
                "total_production {} does not match the batch sum {batch_sum}",
                self.total_production
            ))
            .into());
        }

        for batch in &self.production_batches {
            if batch.quantity <= 0.0 {
                return Err(contract(format!(
                    "production batch {}|{}|{} has non-positive quantity {}",
                    batch.node, batch.product, batch.date, batch.quantity
                ))
                .into());
            }

            let units_per_mix = data.products[&batch.product].units_per_mix as f64;
            let mixes = batch.quantity / units_per_mix;
            if (mixes - mixes.round()).abs() > EPSILON {
                return Err(contract(format!(
                    "production batch {}|{}|{} quantity {} is not a multiple of the {} unit mix",
                    batch.node, batch.product, batch.date, batch.quantity, units_per_mix
                ))
                .into());
            }
        }

        let component_sum = self.costs.component_sum();
        if !sums_agree(component_sum, self.costs.total) {
            return Err(contract(format!(
                "cost breakdown total {} does not match the component sum {component_sum}",
                self.costs.total
            ))
            .into());
        }
        if !sums_agree(self.total_cost, self.costs.total) {
            return Err(contract(format!(
                "total_cost {} does not match the cost breakdown total {}",
                self.total_cost, self.costs.total
            ))
            .into());
        }

        for (date, hours) in &self.labor_hours_by_date {
            if hours.paid + EPSILON < hours.used {
                return Err(contract(format!(
                    "labor on {date}: paid hours {} below used hours {}",
                    hours.paid, hours.used
                ))
                .into());
            }
        }

        if !(0.0..=1.0 + EPSILON).contains(&self.fill_rate) {
            return Err(contract(format!("fill rate {} outside [0, 1]", self.fill_rate)).into());
        }
        let total_demand = data.total_demand();
        if total_demand > 0.0 {
            let expected = 1.0 - self.total_shortage_units / total_demand;
            if (self.fill_rate - expected).abs() > SUM_TOLERANCE {
                return Err(contract(format!(
                    "fill rate {} does not match 1 - shortage/demand = {expected}",
                    self.fill_rate
                ))
                .into());
            }
        }

        for key in self.inventory_state.keys() {
            let date_part = key
                .rsplit('|')
                .next()
                .with_context(|| format!("malformed inventory key {key}"))?;
            let date: NaiveDate = date_part
                .parse()
                .with_context(|| format!("malformed inventory key {key}"))?;
            if !data.window.contains(date) {
                return Err(contract(format!(
                    "inventory key {key} dated outside the planning window"
                ))
                .into());
            }
        }

        // A non-trivial demand served by a suspiciously tiny production points at a missing
        // unscaling step in extraction
        if total_demand >= NONTRIVIAL_DEMAND_UNITS
            && self.total_production > 0.0
            && self.total_production < PRODUCTION_SANITY_FLOOR_UNITS
        {
            return Err(contract(format!(
                "total production {} is implausibly small against demand {total_demand}; \
                 flow values may not have been unscaled",
                self.total_production
            ))
            .into());
        }

        Ok(self)
    }

    /// Serialise the solution as JSON. Every key is a string or primitive.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Could not serialise solution")
    }
}
