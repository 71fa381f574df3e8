//! The sliding-window MIP builder.
//!
//! The model tracks aggregate state-level flows (no age cohorts): a state-specific material
//! balance per (node, product, state, day), paired with sliding-window shelf-life inequalities
//! that bound cumulative outflows by cumulative inflows over a shelf-life-length window. The
//! pairing guarantees no unit remains in a state past its shelf life, with O(horizon) variables.
//!
//! All flow variables are scaled by [`crate::SCALE_FACTOR`] (expressed in thousands of units) to
//! keep the constraint matrix well-conditioned. Integer and binary variables are not scaled;
//! costs applied to scaled variables are pre-multiplied by the scale factor; labor and per-pallet
//! costs are not flow-based and stay unscaled.
mod constraints;
mod extract;
mod problem;
mod variables;

pub use problem::{ConstraintCategory, ProblemBuilder, VarRef};

use crate::SCALE_FACTOR;
use crate::id::{NodeID, ProductID};
use crate::model::PlanningData;
use crate::product::StorageState;
use crate::solution::OptimizationSolution;
use crate::solver::{SolverChoice, SolverOptions, solve};
use crate::truck::TruckSchedule;
use crate::warmstart;
use anyhow::Result;
use indexmap::IndexMap;
use log::info;
use std::collections::HashMap;
use std::rc::Rc;
use strum::IntoEnumIterator;

/// Zero-based offset of a date from the start of the planning window
pub type DayIndex = usize;

/// A legal departure: a (shipment leg, departure day) combination on which stock may leave a
/// node. Combinations with no scheduled truck on a truck-required origin are never enumerated,
/// so no variable exists for them.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The node stock departs from
    pub origin: NodeID,
    /// The node stock is dropped off at
    pub destination: NodeID,
    /// The truck schedule used, when the origin requires one
    pub truck: Option<Rc<TruckSchedule>>,
    /// Departure day index
    pub depart: DayIndex,
    /// Arrival day index
    pub arrive: DayIndex,
    /// The state stock is held in while moving (and drawn from at the origin)
    pub transit_state: StorageState,
    /// The state stock lands in at the destination
    pub arrival_state: StorageState,
    /// Per-unit transport cost: route legs plus the truck's variable cost
    pub cost_per_unit: f64,
}

/// An initial-inventory batch, positioned on the pre-window time axis.
///
/// `effective_day` is 0 for stock fresh at the window start and negative for aged stock, so the
/// shelf-life windows exclude it from day `effective_day + shelf_life` onwards.
#[derive(Debug, Clone, Copy)]
pub struct InitialBatch {
    /// Day offset the batch entered its state (non-positive)
    pub effective_day: i64,
    /// Units in the batch
    pub quantity: f64,
}

/// Precomputed lookups shared by variable creation, constraint assembly and extraction
pub struct ModelContext<'a> {
    /// The validated input
    pub data: &'a PlanningData,
    /// Number of days in the window
    pub num_days: usize,
    /// Every legal departure
    pub dispatches: Vec<Dispatch>,
    /// Demand per (node, product, day index)
    pub demand: HashMap<(NodeID, ProductID, DayIndex), f64>,
    /// Initial stock batches per (node, product, state)
    pub initial: HashMap<(NodeID, ProductID, StorageState), Vec<InitialBatch>>,
    /// Per-product bound on total units that can exist in any optimal plan
    pub supply_bound: HashMap<ProductID, f64>,
    /// Per-(node, product) bound on daily mixes
    pub mix_bound: HashMap<(NodeID, ProductID), f64>,
}

impl<'a> ModelContext<'a> {
    /// Precompute the shared lookups for one build
    pub fn new(data: &'a PlanningData) -> Self {
        let num_days = data.window.num_days();
        let dispatches = enumerate_dispatches(data, num_days);

        let mut demand = HashMap::new();
        for ((node, product, date), quantity) in &data.demand {
            if *quantity > 0.0 {
                let day = data.window.index_of(*date).expect("demand outside window");
                demand.insert((Rc::clone(node), Rc::clone(product), day), *quantity);
            }
        }

        let mut initial: HashMap<_, Vec<InitialBatch>> = HashMap::new();
        for entry in &data.initial_inventory {
            // Batches without a production date age from the snapshot date, matching the
            // synthetic dates the FEFO allocator assigns
            let batch_date = entry.production_date.unwrap_or(entry.snapshot_date);
            let effective_day = (batch_date - data.window.start).num_days().min(0);
            initial
                .entry((
                    Rc::clone(&entry.node),
                    Rc::clone(&entry.product),
                    entry.state,
                ))
                .or_default()
                .push(InitialBatch {
                    effective_day,
                    quantity: entry.quantity,
                });
        }

        // Any plan that produces more than demand plus one mix of round-up per production run is
        // dominated, so total stock of a product is bounded by initial inventory plus demand plus
        // the worst-case round-up.
        let manufacturing_nodes = data.nodes.values().filter(|n| n.can_manufacture).count();
        let mut supply_bound = HashMap::new();
        let mut mix_bound = HashMap::new();
        let max_hours = data.labor.max_daily_hours();
        for (product_id, product) in &data.products {
            let round_up = (num_days * manufacturing_nodes) as f64 * product.units_per_mix as f64;
            let bound = data.total_initial_inventory_for_product(product_id)
                + data.total_demand_for_product(product_id)
                + round_up;
            supply_bound.insert(Rc::clone(product_id), bound);

            for node in data.nodes.values().filter(|n| n.can_manufacture) {
                let mixes =
                    (max_hours * node.production_rate() / product.units_per_mix as f64).ceil();
                mix_bound.insert((Rc::clone(&node.id), Rc::clone(product_id)), mixes);
            }
        }

        Self {
            data,
            num_days,
            dispatches,
            demand,
            initial,
            supply_bound,
            mix_bound,
        }
    }

    /// Total initial units at (node, product, state)
    pub fn initial_quantity(&self, key: &(NodeID, ProductID, StorageState)) -> f64 {
        self.initial
            .get(key)
            .map_or(0.0, |batches| batches.iter().map(|b| b.quantity).sum())
    }

    /// Initial units at (node, product, state) still inside the shelf-life window ending at
    /// `day`, i.e. batches whose effective day is no earlier than `window_start`.
    pub fn initial_quantity_in_window(
        &self,
        key: &(NodeID, ProductID, StorageState),
        window_start: i64,
    ) -> f64 {
        self.initial.get(key).map_or(0.0, |batches| {
            batches
                .iter()
                .filter(|b| b.effective_day >= window_start)
                .map(|b| b.quantity)
                .sum()
        })
    }

    /// The first day index on which stock at (node, product, state) can be expired, if any day
    /// in the window qualifies. Disposal variables exist only from this day onwards.
    pub fn disposal_floor(
        &self,
        key: &(NodeID, ProductID, StorageState),
    ) -> Option<DayIndex> {
        let shelf_life = self.data.products[&key.1].shelf_life_days(key.2) as i64;
        let earliest_inflow = self
            .initial
            .get(key)
            .into_iter()
            .flatten()
            .map(|b| b.effective_day)
            .min()
            .unwrap_or(0)
            .min(0);

        let floor = (earliest_inflow + shelf_life).max(0);
        (floor < self.num_days as i64).then_some(floor as usize)
    }

    /// The storage states hosted at a node
    pub fn hosted_states(&self, node: &NodeID) -> Vec<StorageState> {
        let mode = self.data.nodes[node].storage_mode;
        StorageState::iter().filter(|s| mode.hosts(*s)).collect()
    }
}

/// Enumerate every legal departure.
///
/// Origins that require truck schedules ship only on (truck, weekday) combinations the schedule
/// allows; other origins may dispatch on any day along their routes. Departures whose arrival
/// falls after the window are useless and never created.
fn enumerate_dispatches(data: &PlanningData, num_days: usize) -> Vec<Dispatch> {
    let mut dispatches = Vec::new();

    for day in 0..num_days {
        let date = data.window.date_at(day);

        for delivery in &data.truck_deliveries {
            if !delivery.truck.runs_on(date) {
                continue;
            }
            let arrive = day + delivery.transit_days as usize;
            if arrive >= num_days {
                continue;
            }

            let origin = &data.nodes[&delivery.truck.origin];
            let destination = &data.nodes[&delivery.destination];
            let transit_state = delivery.transport_mode.transit_state();
            if !origin.storage_mode.hosts(transit_state) {
                continue;
            }

            dispatches.push(Dispatch {
                origin: Rc::clone(&delivery.truck.origin),
                destination: Rc::clone(&delivery.destination),
                truck: Some(Rc::clone(&delivery.truck)),
                depart: day,
                arrive,
                transit_state,
                arrival_state: delivery
                    .transport_mode
                    .arrival_state(destination.storage_mode),
                cost_per_unit: delivery.route_cost_per_unit + delivery.truck.cost_per_unit,
            });
        }

        for route in data.routes.values() {
            let origin = &data.nodes[&route.origin];
            if origin.requires_truck_schedules {
                continue;
            }

            let arrive = day + route.transit_days as usize;
            if arrive >= num_days {
                continue;
            }

            let destination = &data.nodes[&route.destination];
            let transit_state = route.transport_mode.transit_state();
            if !origin.storage_mode.hosts(transit_state) {
                continue;
            }
            let arrival_state = route.transport_mode.arrival_state(destination.storage_mode);
            if !destination.storage_mode.hosts(arrival_state) {
                continue;
            }

            dispatches.push(Dispatch {
                origin: Rc::clone(&route.origin),
                destination: Rc::clone(&route.destination),
                truck: None,
                depart: day,
                arrive,
                transit_state,
                arrival_state,
                cost_per_unit: route.cost_per_unit,
            });
        }
    }

    dispatches
}

/// Every decision variable of the model, keyed by its indices.
///
/// Entries are ordered ([`IndexMap`]): insertion order is column order, which is how values are
/// read back out of the raw solution.
#[derive(Default)]
pub struct VariableMap {
    /// Integer mixes produced, per (node, product, day). Production in units is
    /// `mix_count * units_per_mix`; there is no separate production variable.
    pub mix_count: IndexMap<(NodeID, ProductID, DayIndex), VarRef>,
    /// 1 iff any mixes of the product run that day
    pub product_produced: IndexMap<(NodeID, ProductID, DayIndex), VarRef>,
    /// 1 iff anything is produced at the node that day
    pub any_production: IndexMap<(NodeID, DayIndex), VarRef>,
    /// End-of-day stock in scaled units, per (node, product, state, day)
    pub inventory: IndexMap<(NodeID, ProductID, StorageState, DayIndex), VarRef>,
    /// Integer pallets covering the end-of-day stock
    pub pallet_count: IndexMap<(NodeID, ProductID, StorageState, DayIndex), VarRef>,
    /// Scaled units moving on a dispatch, per (dispatch index, product)
    pub in_transit: IndexMap<(usize, ProductID), VarRef>,
    /// Scaled units moved frozen -> thawed, per (node, product, day)
    pub thaw: IndexMap<(NodeID, ProductID, DayIndex), VarRef>,
    /// Scaled units moved ambient -> frozen, per (node, product, day)
    pub freeze: IndexMap<(NodeID, ProductID, DayIndex), VarRef>,
    /// Scaled units consumed against demand, per (node, product, source state, day).
    /// Kept separate per state so the balances never double-count the outflow.
    pub consumed: IndexMap<(NodeID, ProductID, StorageState, DayIndex), VarRef>,
    /// Scaled units of unmet demand
    pub shortage: IndexMap<(NodeID, ProductID, DayIndex), VarRef>,
    /// Scaled units discarded. Exists only for days on which stock can actually be expired.
    pub disposal: IndexMap<(NodeID, ProductID, StorageState, DayIndex), VarRef>,
    /// Paid hours at the regular rate, per (node, day)
    pub labor_regular: IndexMap<(NodeID, DayIndex), VarRef>,
    /// Paid hours at the overtime rate
    pub labor_overtime: IndexMap<(NodeID, DayIndex), VarRef>,
    /// Paid hours at the non-fixed-day rate
    pub labor_non_fixed: IndexMap<(NodeID, DayIndex), VarRef>,
}

/// Build the model, solve it and extract the validated solution.
///
/// # Arguments
///
/// * `data` - The validated planning data
/// * `choice` - Which solver backend to use
/// * `options` - Options passed opaquely to the solver
/// * `use_warmstart` - Whether to generate campaign-pattern hints for the solver
pub fn build_and_solve(
    data: &PlanningData,
    choice: SolverChoice,
    options: &SolverOptions,
    use_warmstart: bool,
) -> Result<OptimizationSolution> {
    let ctx = ModelContext::new(data);

    let mut pb = ProblemBuilder::new();
    let vars = variables::add_variables(&mut pb, &ctx);
    constraints::add_constraints(&mut pb, &vars, &ctx)?;

    info!(
        "Built sliding-window model: {} columns, {} rows, {} dispatches",
        pb.num_cols(),
        pb.num_rows(),
        ctx.dispatches.len()
    );

    let num_cols = pb.num_cols();
    let (problem, objective) = pb.finish();

    let warm_values = if use_warmstart {
        warmstart::generate_hints(data)
            .map(|hints| hints.to_column_values(&vars, &data.window, num_cols))
    } else {
        None
    };

    let raw = solve(problem, &objective, choice, options, warm_values.as_deref())?;
    info!(
        "Solve finished ({:?}) in {:.2?}, objective {:.2}",
        raw.termination, raw.solve_time, raw.objective
    );

    extract::extract_solution(&ctx, &vars, &raw)
}

/// Unscale a flow value back to native units
pub(crate) fn unscale(value: f64) -> f64 {
    value * SCALE_FACTOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::*;
    use rstest::rstest;

    #[rstest]
    fn test_dispatches_follow_truck_days(single_route_data: PlanningData) {
        // The fixture's truck runs Tuesday and Thursday only; no dispatch may exist on any
        // other weekday for the truck-required origin.
        let ctx = ModelContext::new(&single_route_data);
        for dispatch in &ctx.dispatches {
            let date = single_route_data.window.date_at(dispatch.depart);
            let truck = dispatch.truck.as_ref().expect("origin requires trucks");
            assert!(truck.runs_on(date));
        }
    }

    #[rstest]
    fn test_disposal_floor_accounts_for_shelf_life(single_node_data: PlanningData) {
        let ctx = ModelContext::new(&single_node_data);
        let key = (
            "6122".into(),
            "P1".into(),
            crate::product::StorageState::Ambient,
        );
        // Fresh stock with a 30-day ambient life cannot expire inside a 7-day window
        assert_eq!(ctx.disposal_floor(&key), None);
    }
}
