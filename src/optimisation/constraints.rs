//! The constraint library.
//!
//! Constraints are added in a documented category order (material balance, demand, shelf-life
//! windows, capacity, truck, binary linking) so debug output is stable and reproducible. The
//! material balance references only the previous day's inventory; consumption is bounded by
//! non-negativity plus the balance alone, with no separate `consumption <= inventory` row.
use super::{DayIndex, ModelContext, VariableMap};
use crate::SCALE_FACTOR;
use crate::id::{NodeID, ProductID};
use crate::optimisation::problem::{ConstraintCategory, ProblemBuilder, VarRef};
use crate::product::StorageState;
use crate::truck::UNITS_PER_PALLET;
use anyhow::Result;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

type FlowKey = (NodeID, ProductID, StorageState, DayIndex);

/// Per-(node, product, state, day) inflow and outflow terms, with coefficients in scaled units.
///
/// Disposal is deliberately absent: it participates in the material balance (stock leaves the
/// node) but not in the shelf-life windows, which is what lets expired stock exit at all.
struct FlowIndex {
    inflows: HashMap<FlowKey, Vec<(VarRef, f64)>>,
    outflows: HashMap<FlowKey, Vec<(VarRef, f64)>>,
}

fn build_flow_index(vars: &VariableMap, ctx: &ModelContext) -> FlowIndex {
    let mut inflows: HashMap<FlowKey, Vec<(VarRef, f64)>> = HashMap::new();
    let mut outflows: HashMap<FlowKey, Vec<(VarRef, f64)>> = HashMap::new();

    // Production lands in ambient storage in units of one mix
    for ((node, product, day), var) in &vars.mix_count {
        let units_per_mix = ctx.data.products[product].units_per_mix as f64;
        inflows
            .entry((
                Rc::clone(node),
                Rc::clone(product),
                StorageState::Ambient,
                *day,
            ))
            .or_default()
            .push((*var, units_per_mix / SCALE_FACTOR));
    }

    // Shipments leave the origin in their transit state on the departure day and land at the
    // destination in their arrival state on the arrival day
    for ((dispatch_index, product), var) in &vars.in_transit {
        let dispatch = &ctx.dispatches[*dispatch_index];
        outflows
            .entry((
                Rc::clone(&dispatch.origin),
                Rc::clone(product),
                dispatch.transit_state,
                dispatch.depart,
            ))
            .or_default()
            .push((*var, 1.0));
        inflows
            .entry((
                Rc::clone(&dispatch.destination),
                Rc::clone(product),
                dispatch.arrival_state,
                dispatch.arrive,
            ))
            .or_default()
            .push((*var, 1.0));
    }

    // Thawing moves stock frozen -> thawed; freezing moves it ambient -> frozen. The thawed
    // inflow restarts the shelf-life clock because it enters the thawed window fresh.
    for ((node, product, day), var) in &vars.thaw {
        outflows
            .entry((Rc::clone(node), Rc::clone(product), StorageState::Frozen, *day))
            .or_default()
            .push((*var, 1.0));
        inflows
            .entry((Rc::clone(node), Rc::clone(product), StorageState::Thawed, *day))
            .or_default()
            .push((*var, 1.0));
    }
    for ((node, product, day), var) in &vars.freeze {
        outflows
            .entry((Rc::clone(node), Rc::clone(product), StorageState::Ambient, *day))
            .or_default()
            .push((*var, 1.0));
        inflows
            .entry((Rc::clone(node), Rc::clone(product), StorageState::Frozen, *day))
            .or_default()
            .push((*var, 1.0));
    }

    // Demand consumption draws from the state it is keyed on
    for (key, var) in &vars.consumed {
        outflows.entry(key.clone()).or_default().push((*var, 1.0));
    }

    FlowIndex { inflows, outflows }
}

/// Add every constraint, in the documented category order
pub fn add_constraints(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
) -> Result<()> {
    let flows = build_flow_index(vars, ctx);
    add_material_balance(pb, vars, ctx, &flows)?;
    add_demand_accounting(pb, vars, ctx)?;
    add_shelf_life_windows(pb, vars, ctx, &flows)?;
    add_labor_coupling(pb, vars, ctx)?;
    add_pallet_ceilings(pb, vars)?;
    add_storage_capacity(pb, vars, ctx)?;
    add_truck_capacity(pb, vars, ctx)?;
    add_binary_linking(pb, vars, ctx)?;
    Ok(())
}

/// State-specific material balance:
///
///   inventory[t] = inventory[t-1] + inflows(t) - outflows(t)
///
/// Initial inventory supplies the day-0 right-hand side. Non-negativity of inventory alone
/// bounds the outflows; no separate consumption bound exists.
fn add_material_balance(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
    flows: &FlowIndex,
) -> Result<()> {
    for ((node, product, state, day), inventory) in &vars.inventory {
        let key = (Rc::clone(node), Rc::clone(product), *state, *day);
        let mut terms = vec![(*inventory, 1.0)];

        if *day > 0 {
            // Always the previous day, never the same day: the balance must stay acyclic
            let previous = vars.inventory
                [&(Rc::clone(node), Rc::clone(product), *state, *day - 1)];
            terms.push((previous, -1.0));
        }

        if let Some(inflow_terms) = flows.inflows.get(&key) {
            terms.extend(inflow_terms.iter().map(|(var, coef)| (*var, -coef)));
        }
        if let Some(outflow_terms) = flows.outflows.get(&key) {
            terms.extend(outflow_terms.iter().copied());
        }
        if let Some(disposal) = vars.disposal.get(&key) {
            terms.push((*disposal, 1.0));
        }

        let rhs = if *day == 0 {
            ctx.initial_quantity(&(Rc::clone(node), Rc::clone(product), *state)) / SCALE_FACTOR
        } else {
            0.0
        };

        pb.add_equality_row(ConstraintCategory::MaterialBalance, rhs, terms)?;
    }

    Ok(())
}

/// Demand accounting, for every (node, product, day) with positive demand:
///
///   consumed_from_ambient + consumed_from_thawed + shortage = demand
fn add_demand_accounting(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
) -> Result<()> {
    for ((node, product, day), shortage) in &vars.shortage {
        let quantity = ctx.demand[&(Rc::clone(node), Rc::clone(product), *day)];
        let mut terms = vec![(*shortage, 1.0)];

        for state in [StorageState::Ambient, StorageState::Thawed] {
            if let Some(consumed) =
                vars.consumed
                    .get(&(Rc::clone(node), Rc::clone(product), state, *day))
            {
                terms.push((*consumed, 1.0));
            }
        }

        pb.add_equality_row(
            ConstraintCategory::Demand,
            quantity / SCALE_FACTOR,
            terms,
        )?;
    }

    Ok(())
}

/// Sliding-window shelf life, for each state with shelf life L:
///
///   sum(outflows over [t-L+1, t]) <= sum(inflows over the same window)
///
/// Paired with the balance this guarantees no unit stays in the state longer than L days,
/// without age-cohort variables. Initial batches contribute to the right-hand side while their
/// (possibly pre-window) inflow day is still inside the window; disposal is exempt so expired
/// stock can still leave the node.
fn add_shelf_life_windows(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
    flows: &FlowIndex,
) -> Result<()> {
    // Distinct (node, product, state) triples, in inventory-variable order
    let mut triples: Vec<(NodeID, ProductID, StorageState)> = Vec::new();
    for (node, product, state, _) in vars.inventory.keys() {
        let triple = (Rc::clone(node), Rc::clone(product), *state);
        if triples.last() != Some(&triple) {
            triples.push(triple);
        }
    }

    for (node, product, state) in triples {
        let shelf_life = ctx.data.products[&product].shelf_life_days(state) as i64;

        for day in 0..ctx.num_days {
            let window_start = day as i64 - shelf_life + 1;
            let mut terms = Vec::new();
            let mut any_outflow = false;

            let first_day = window_start.max(0) as usize;
            for window_day in first_day..=day {
                let key = (
                    Rc::clone(&node),
                    Rc::clone(&product),
                    state,
                    window_day,
                );
                if let Some(outflow_terms) = flows.outflows.get(&key) {
                    any_outflow = true;
                    terms.extend(outflow_terms.iter().copied());
                }
                if let Some(inflow_terms) = flows.inflows.get(&key) {
                    terms.extend(inflow_terms.iter().map(|(var, coef)| (*var, -coef)));
                }
            }

            if !any_outflow {
                continue;
            }

            let initial_in_window = ctx.initial_quantity_in_window(
                &(Rc::clone(&node), Rc::clone(&product), state),
                window_start,
            );

            pb.add_row(
                ConstraintCategory::ShelfLife,
                f64::NEG_INFINITY,
                initial_in_window / SCALE_FACTOR,
                terms,
            )?;
        }
    }

    Ok(())
}

/// Labor coupling, per manufacturing node and day:
///
///   used = sum(mixes * units_per_mix) / rate + overhead
///   used <= max_hours                       (capacity; a separate row, not the linking one)
///   regular + overtime + non_fixed >= used  (paid hours cover the work)
///   regular + overtime + non_fixed >= min_paid * any_production
///
/// Rate-class bounds (fixed vs non-fixed days) are set on the variables themselves.
fn add_labor_coupling(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
) -> Result<()> {
    for ((node_id, day), any_production) in &vars.any_production {
        let node = &ctx.data.nodes[node_id];
        let labor = ctx
            .data
            .labor
            .get(ctx.data.window.date_at(*day))
            .expect("labor calendar covers the window");

        let rate = node.production_rate();
        let overhead_any = node.startup_hours + node.shutdown_hours - node.changeover_hours;

        // Hours actually used, as terms over the production variables
        let mut used_terms: Vec<(VarRef, f64)> = Vec::new();
        for product_id in ctx.data.products.keys() {
            let key = (Rc::clone(node_id), Rc::clone(product_id), *day);
            let units_per_mix = ctx.data.products[product_id].units_per_mix as f64;
            used_terms.push((vars.mix_count[&key], units_per_mix / rate));
            if node.changeover_hours > 0.0 {
                used_terms.push((vars.product_produced[&key], node.changeover_hours));
            }
        }
        if overhead_any != 0.0 {
            used_terms.push((*any_production, overhead_any));
        }

        // Capacity: used <= max_hours
        pb.add_row(
            ConstraintCategory::Capacity,
            f64::NEG_INFINITY,
            labor.max_hours,
            used_terms.clone(),
        )?;

        // Paid hours cover the hours used
        let regular = vars.labor_regular[&(Rc::clone(node_id), *day)];
        let overtime = vars.labor_overtime[&(Rc::clone(node_id), *day)];
        let non_fixed = vars.labor_non_fixed[&(Rc::clone(node_id), *day)];
        let mut paid_terms = vec![(regular, 1.0), (overtime, 1.0), (non_fixed, 1.0)];
        paid_terms.extend(used_terms.iter().map(|(var, coef)| (*var, -coef)));
        pb.add_row(
            ConstraintCategory::Capacity,
            0.0,
            f64::INFINITY,
            paid_terms,
        )?;

        // Minimum callout payment when anything runs on a premium day
        if labor.min_paid_hours > 0.0 {
            pb.add_row(
                ConstraintCategory::Capacity,
                0.0,
                f64::INFINITY,
                vec![
                    (regular, 1.0),
                    (overtime, 1.0),
                    (non_fixed, 1.0),
                    (*any_production, -labor.min_paid_hours),
                ],
            )?;
        }
    }

    Ok(())
}

/// Pallet ceiling: pallet_count * (units_per_pallet / S) >= inventory. Cost minimisation drives
/// the count down onto the ceiling.
fn add_pallet_ceilings(pb: &mut ProblemBuilder, vars: &VariableMap) -> Result<()> {
    let pallet_scaled = UNITS_PER_PALLET as f64 / SCALE_FACTOR;
    for (key, pallet_count) in &vars.pallet_count {
        let inventory = vars.inventory[key];
        pb.add_row(
            ConstraintCategory::Capacity,
            0.0,
            f64::INFINITY,
            vec![(*pallet_count, pallet_scaled), (inventory, -1.0)],
        )?;
    }

    Ok(())
}

/// Total stock at a node may not exceed its storage capacity
fn add_storage_capacity(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
) -> Result<()> {
    for node in ctx.data.nodes.values() {
        let Some(capacity) = node.storage_capacity else {
            continue;
        };

        for day in 0..ctx.num_days {
            let terms: Vec<_> = vars
                .inventory
                .iter()
                .filter(|((n, _, _, d), _)| *n == node.id && *d == day)
                .map(|(_, var)| (*var, 1.0))
                .collect();
            if terms.is_empty() {
                continue;
            }

            pb.add_row(
                ConstraintCategory::Capacity,
                f64::NEG_INFINITY,
                capacity / SCALE_FACTOR,
                terms,
            )?;
        }
    }

    Ok(())
}

/// Truck capacity: all shipments departing on one (truck, date) share the truck's capacity,
/// drop-offs included
fn add_truck_capacity(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
) -> Result<()> {
    let mut groups: IndexMap<(Rc<str>, DayIndex), (f64, Vec<(VarRef, f64)>)> = IndexMap::new();
    for ((dispatch_index, _), var) in &vars.in_transit {
        let dispatch = &ctx.dispatches[*dispatch_index];
        let Some(truck) = &dispatch.truck else {
            continue;
        };

        groups
            .entry((Rc::clone(&truck.id), dispatch.depart))
            .or_insert_with(|| (truck.capacity, Vec::new()))
            .1
            .push((*var, 1.0));
    }

    for ((_, _), (capacity, terms)) in groups {
        pb.add_row(
            ConstraintCategory::Truck,
            f64::NEG_INFINITY,
            capacity / SCALE_FACTOR,
            terms,
        )?;
    }

    Ok(())
}

/// Big-M indicator linking:
///
///   mix_count <= M * product_produced        (M is the mix bound, the tightest valid Big-M)
///   product_produced <= mix_count
///   sum(product_produced) <= N * any_production
///
/// The third row must keep this direction; reversing it lets the indicator stay zero while the
/// binaries are set.
fn add_binary_linking(
    pb: &mut ProblemBuilder,
    vars: &VariableMap,
    ctx: &ModelContext,
) -> Result<()> {
    for ((node, product, day), mix_count) in &vars.mix_count {
        let produced = vars.product_produced[&(Rc::clone(node), Rc::clone(product), *day)];
        let big_m = ctx.mix_bound[&(Rc::clone(node), Rc::clone(product))];

        pb.add_row(
            ConstraintCategory::BinaryLinking,
            0.0,
            f64::INFINITY,
            vec![(produced, big_m), (*mix_count, -1.0)],
        )?;
        pb.add_row(
            ConstraintCategory::BinaryLinking,
            0.0,
            f64::INFINITY,
            vec![(*mix_count, 1.0), (produced, -1.0)],
        )?;
    }

    let num_products = ctx.data.products.len() as f64;
    for ((node, day), any_production) in &vars.any_production {
        let mut terms = vec![(*any_production, num_products)];
        for product_id in ctx.data.products.keys() {
            let produced =
                vars.product_produced[&(Rc::clone(node), Rc::clone(product_id), *day)];
            terms.push((produced, -1.0));
        }

        pb.add_row(ConstraintCategory::BinaryLinking, 0.0, f64::INFINITY, terms)?;
    }

    Ok(())
}
