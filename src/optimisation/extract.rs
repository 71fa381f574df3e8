//! Solution extraction.
//!
//! Reads raw column values back into the typed, validated [`OptimizationSolution`]. Every scaled
//! flow value is unscaled here, exactly once; the solution contract's sanity floor exists to
//! catch this step going missing. The extracted cost breakdown is cross-checked against the
//! solver's objective before the solution-level invariants run.
use super::{ModelContext, VariableMap, unscale};
use crate::error::PlanningError;
use crate::solution::{
    ComponentCost, Consumption, CostBreakdown, Disposal, HoldingCost, LaborCost, LaborHours,
    OptimizationSolution, ProductionBatch, Shipment, StateTransition, inventory_key,
};
use crate::solver::RawSolution;
use anyhow::Result;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Scaled values below this are treated as solver noise, not flows
const FLOW_EPSILON: f64 = 1e-7;
/// Relative tolerance between the recomputed cost breakdown and the solver objective
const OBJECTIVE_TOLERANCE: f64 = 0.01;

/// Build the validated solution from raw column values
pub fn extract_solution(
    ctx: &ModelContext,
    vars: &VariableMap,
    raw: &RawSolution,
) -> Result<OptimizationSolution> {
    let data = ctx.data;
    let value = |var: &super::VarRef| raw.values[var.index];

    // Production runs: integer mixes, reported in units
    let mut production_batches = Vec::new();
    for ((node, product, day), var) in &vars.mix_count {
        let mixes = value(var).round();
        if mixes < 0.5 {
            continue;
        }
        let units_per_mix = data.products[product].units_per_mix as f64;
        production_batches.push(ProductionBatch {
            node: Rc::clone(node),
            product: Rc::clone(product),
            date: data.window.date_at(*day),
            quantity: mixes * units_per_mix,
        });
    }
    let total_production: f64 = production_batches.iter().map(|b| b.quantity).sum();

    // Labor: hours used are recomputed from the production variables; hours paid are the three
    // rate-class variables. Aggregated per date over manufacturing nodes.
    let mut labor_hours_by_date: BTreeMap<_, LaborHours> = BTreeMap::new();
    let mut labor_cost_by_date: BTreeMap<_, f64> = BTreeMap::new();
    for ((node_id, day), any_var) in &vars.any_production {
        let node = &data.nodes[node_id];
        let date = data.window.date_at(*day);
        let labor = data.labor.get(date).expect("labor calendar covers the window");

        let mut used = 0.0;
        for product_id in data.products.keys() {
            let key = (Rc::clone(node_id), Rc::clone(product_id), *day);
            let mixes = value(&vars.mix_count[&key]).round();
            let units_per_mix = data.products[product_id].units_per_mix as f64;
            used += mixes * units_per_mix / node.production_rate();
            used += value(&vars.product_produced[&key]).round() * node.changeover_hours;
        }
        used += value(any_var).round()
            * (node.startup_hours + node.shutdown_hours - node.changeover_hours);

        let regular = value(&vars.labor_regular[&(Rc::clone(node_id), *day)]);
        let overtime = value(&vars.labor_overtime[&(Rc::clone(node_id), *day)]);
        let non_fixed = value(&vars.labor_non_fixed[&(Rc::clone(node_id), *day)]);

        let entry = labor_hours_by_date.entry(date).or_default();
        entry.used += used;
        entry.paid += regular + overtime + non_fixed;
        entry.fixed += regular;
        entry.overtime += overtime;
        entry.non_fixed += non_fixed;

        *labor_cost_by_date.entry(date).or_default() += regular * labor.regular_rate
            + overtime * labor.overtime_rate
            + non_fixed * labor.non_fixed_rate;
    }
    let labor_total: f64 = labor_cost_by_date.values().sum();

    // Shipments, with the transport cost accumulated alongside
    let mut shipments = Vec::new();
    let mut transport_total = 0.0;
    for ((dispatch_index, product), var) in &vars.in_transit {
        let scaled = value(var);
        if scaled <= FLOW_EPSILON {
            continue;
        }

        let dispatch = &ctx.dispatches[*dispatch_index];
        let quantity = unscale(scaled);
        transport_total += dispatch.cost_per_unit * quantity;
        shipments.push(Shipment {
            origin: Rc::clone(&dispatch.origin),
            destination: Rc::clone(&dispatch.destination),
            product: Rc::clone(product),
            quantity,
            departure_date: data.window.date_at(dispatch.depart),
            delivery_date: data.window.date_at(dispatch.arrive),
            state: dispatch.arrival_state,
            truck_id: dispatch.truck.as_ref().map(|t| Rc::clone(&t.id)),
        });
    }

    // Per-state demand consumption, transitions and disposals, for the FEFO allocator
    let mut demand_consumption = Vec::new();
    for ((node, product, state, day), var) in &vars.consumed {
        let scaled = value(var);
        if scaled > FLOW_EPSILON {
            demand_consumption.push(Consumption {
                node: Rc::clone(node),
                product: Rc::clone(product),
                date: data.window.date_at(*day),
                state: *state,
                quantity: unscale(scaled),
            });
        }
    }

    let mut state_transitions = Vec::new();
    for (map, from_state, to_state) in [
        (
            &vars.thaw,
            crate::product::StorageState::Frozen,
            crate::product::StorageState::Thawed,
        ),
        (
            &vars.freeze,
            crate::product::StorageState::Ambient,
            crate::product::StorageState::Frozen,
        ),
    ] {
        for ((node, product, day), var) in map {
            let scaled = value(var);
            if scaled > FLOW_EPSILON {
                state_transitions.push(StateTransition {
                    node: Rc::clone(node),
                    product: Rc::clone(product),
                    date: data.window.date_at(*day),
                    from_state,
                    to_state,
                    quantity: unscale(scaled),
                });
            }
        }
    }

    let mut disposals = Vec::new();
    for ((node, product, state, day), var) in &vars.disposal {
        let scaled = value(var);
        if scaled > FLOW_EPSILON {
            disposals.push(Disposal {
                node: Rc::clone(node),
                product: Rc::clone(product),
                state: *state,
                date: data.window.date_at(*day),
                quantity: unscale(scaled),
            });
        }
    }

    // Aggregate end-of-day inventory, pipe-keyed and unscaled
    let mut inventory_state = BTreeMap::new();
    for ((node, product, state, day), var) in &vars.inventory {
        let scaled = value(var);
        if scaled > FLOW_EPSILON {
            inventory_state.insert(
                inventory_key(node, product, *state, data.window.date_at(*day)),
                unscale(scaled),
            );
        }
    }

    // Holding cost from the pallet counts, per state
    let mut holding = HoldingCost::default();
    for ((_, _, state, _), var) in &vars.pallet_count {
        let pallets = value(var).round();
        if pallets < 0.5 {
            continue;
        }
        let cost = pallets
            * (data.costs.storage_fixed_per_pallet + data.costs.holding_per_pallet_day(*state));
        match state {
            crate::product::StorageState::Frozen => holding.frozen += cost,
            crate::product::StorageState::Ambient => holding.ambient += cost,
            crate::product::StorageState::Thawed => holding.thawed += cost,
        }
    }
    holding.total = holding.frozen + holding.ambient + holding.thawed;

    let total_shortage_units: f64 = vars.shortage.values().map(|var| unscale(value(var))).sum();
    let changeover_runs: f64 = vars
        .product_produced
        .values()
        .map(|var| value(var).round())
        .sum();

    let costs = CostBreakdown {
        labor: LaborCost {
            total: labor_total,
            by_date: labor_cost_by_date,
        },
        production: ComponentCost {
            total: data.costs.production_cost_per_unit * total_production
                + data.costs.changeover_cost * changeover_runs,
        },
        transport: ComponentCost {
            total: transport_total,
        },
        holding,
        waste_shortage: ComponentCost {
            total: data.costs.shortage_penalty_per_unit * total_shortage_units,
        },
        total: 0.0,
    };
    let costs = CostBreakdown {
        total: costs.component_sum(),
        ..costs
    };

    // The recomputed breakdown must agree with the solver's own objective; divergence means the
    // extraction (typically an unscaling step) is wrong
    let divergence = (costs.total - raw.objective).abs();
    if divergence > OBJECTIVE_TOLERANCE * costs.total.abs().max(raw.objective.abs()) + 1.0 {
        return Err(PlanningError::SolutionContract(format!(
            "extracted cost breakdown {} diverges from the solver objective {}",
            costs.total, raw.objective
        ))
        .into());
    }

    let total_demand = data.total_demand();
    let fill_rate = if total_demand > 0.0 {
        (1.0 - total_shortage_units / total_demand).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let solution = OptimizationSolution {
        model_type: "sliding_window".to_string(),
        termination: raw.termination.clone(),
        objective_value: raw.objective,
        solve_time_seconds: raw.solve_time.as_secs_f64(),
        production_batches,
        labor_hours_by_date,
        shipments,
        demand_consumption,
        state_transitions,
        disposals,
        costs,
        total_cost: 0.0,
        fill_rate,
        total_production,
        total_shortage_units,
        inventory_state,
    };
    let solution = OptimizationSolution {
        total_cost: solution.costs.total,
        ..solution
    };

    solution.validated(data)
}
