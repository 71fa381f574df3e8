//! Decision-variable creation.
//!
//! Objective coefficients are attached as columns are created. Costs on scaled flow variables
//! are pre-multiplied by the scale factor; integer and binary variables (mixes, pallets,
//! indicators) and labor hours are unscaled. Bounds are tightened per variable from demand,
//! initial stock, truck capacity and labor capacity.
use super::{ModelContext, VariableMap};
use crate::SCALE_FACTOR;
use crate::optimisation::ProblemBuilder;
use crate::product::StorageState;
use crate::truck::UNITS_PER_PALLET;
use std::rc::Rc;

/// Create every decision variable for the model
pub fn add_variables(pb: &mut ProblemBuilder, ctx: &ModelContext) -> VariableMap {
    let mut vars = VariableMap::default();
    let data = ctx.data;
    let costs = &data.costs;

    // Production: integer mixes, the production indicator per product and the any-production
    // indicator, at manufacturing nodes only
    for node in data.nodes.values().filter(|n| n.can_manufacture) {
        for product_id in data.products.keys() {
            let mix_bound = ctx.mix_bound[&(Rc::clone(&node.id), Rc::clone(product_id))];
            let units_per_mix = data.products[product_id].units_per_mix as f64;
            for day in 0..ctx.num_days {
                let key = (Rc::clone(&node.id), Rc::clone(product_id), day);
                vars.mix_count.insert(
                    key.clone(),
                    pb.add_integer_column(
                        costs.production_cost_per_unit * units_per_mix,
                        0.0,
                        mix_bound,
                    ),
                );
                vars.product_produced
                    .insert(key, pb.add_binary_column(costs.changeover_cost));
            }
        }

        for day in 0..ctx.num_days {
            let key = (Rc::clone(&node.id), day);
            vars.any_production.insert(key, pb.add_binary_column(0.0));
        }
    }

    // Paid labor hours by rate class. On fixed days the non-fixed class is pinned to zero; on
    // non-fixed days the regular and overtime classes are.
    for node in data.nodes.values().filter(|n| n.can_manufacture) {
        for day in 0..ctx.num_days {
            let labor = data
                .labor
                .get(data.window.date_at(day))
                .expect("labor calendar covers the window");
            let key = (Rc::clone(&node.id), day);

            let (regular_max, overtime_max, non_fixed_max) = if labor.is_fixed_day {
                (labor.fixed_hours, labor.max_hours - labor.fixed_hours, 0.0)
            } else {
                (0.0, 0.0, labor.max_hours)
            };

            vars.labor_regular.insert(
                key.clone(),
                pb.add_column(labor.regular_rate, 0.0, regular_max),
            );
            vars.labor_overtime.insert(
                key.clone(),
                pb.add_column(labor.overtime_rate, 0.0, overtime_max),
            );
            vars.labor_non_fixed
                .insert(key, pb.add_column(labor.non_fixed_rate, 0.0, non_fixed_max));
        }
    }

    // End-of-day inventory and its pallet ceiling, for hosted states. Nodes that cannot store
    // keep the variable pinned at zero so the balance still closes on arrival days.
    for node in data.nodes.values() {
        for product_id in data.products.keys() {
            let supply = ctx.supply_bound[product_id];
            let inventory_max = if node.can_store { supply / SCALE_FACTOR } else { 0.0 };
            let pallet_max = (supply / UNITS_PER_PALLET as f64).ceil();

            for state in ctx.hosted_states(&node.id) {
                for day in 0..ctx.num_days {
                    let key = (Rc::clone(&node.id), Rc::clone(product_id), state, day);
                    vars.inventory
                        .insert(key.clone(), pb.add_column(0.0, 0.0, inventory_max));

                    if node.can_store {
                        let holding = costs.storage_fixed_per_pallet
                            + costs.holding_per_pallet_day(state);
                        vars.pallet_count
                            .insert(key, pb.add_integer_column(holding, 0.0, pallet_max));
                    }
                }
            }
        }
    }

    // Pipeline inventory: one variable per (dispatch, product). The absence of a variable for
    // unscheduled (route, weekday) combinations is what enforces truck availability.
    for (dispatch_index, dispatch) in ctx.dispatches.iter().enumerate() {
        for product_id in data.products.keys() {
            let mut shipment_max = ctx.supply_bound[product_id];
            if let Some(truck) = &dispatch.truck {
                shipment_max = shipment_max.min(truck.capacity);
            }

            vars.in_transit.insert(
                (dispatch_index, Rc::clone(product_id)),
                pb.add_column(
                    dispatch.cost_per_unit * SCALE_FACTOR,
                    0.0,
                    shipment_max / SCALE_FACTOR,
                ),
            );
        }
    }

    // State transitions exist only at nodes with both storage regimes
    for node in data.nodes.values().filter(|n| n.storage_mode.hosts_frozen()) {
        if !node.storage_mode.hosts(StorageState::Ambient) {
            continue;
        }
        for product_id in data.products.keys() {
            let transition_max = ctx.supply_bound[product_id] / SCALE_FACTOR;
            for day in 0..ctx.num_days {
                let key = (Rc::clone(&node.id), Rc::clone(product_id), day);
                vars.thaw
                    .insert(key.clone(), pb.add_column(0.0, 0.0, transition_max));
                vars.freeze.insert(key, pb.add_column(0.0, 0.0, transition_max));
            }
        }
    }

    // Demand satisfaction: consumption drawn from ambient and thawed stock, plus shortage.
    // Created only where demand is positive, bounded by that day's demand. Iterates the demand
    // map in file order so the column order is reproducible.
    for ((node, product, date), quantity) in &data.demand {
        if *quantity <= 0.0 {
            continue;
        }
        let day = data.window.index_of(*date).expect("demand outside window");
        let demand_scaled = quantity / SCALE_FACTOR;
        let storage_mode = data.nodes[node].storage_mode;

        for state in [StorageState::Ambient, StorageState::Thawed] {
            if storage_mode.hosts(state) {
                let key = (Rc::clone(node), Rc::clone(product), state, day);
                vars.consumed
                    .insert(key, pb.add_column(0.0, 0.0, demand_scaled));
            }
        }

        vars.shortage.insert(
            (Rc::clone(node), Rc::clone(product), day),
            pb.add_column(
                costs.shortage_penalty_per_unit * SCALE_FACTOR,
                0.0,
                demand_scaled,
            ),
        );
    }

    // Disposal: created only for days on which stock can actually be expired, so fresh stock
    // can never be discarded
    for node in data.nodes.values().filter(|n| n.can_store) {
        for product_id in data.products.keys() {
            for state in ctx.hosted_states(&node.id) {
                let key = (Rc::clone(&node.id), Rc::clone(product_id), state);
                let Some(floor) = ctx.disposal_floor(&key) else {
                    continue;
                };

                let disposal_max = ctx.supply_bound[product_id] / SCALE_FACTOR;
                for day in floor..ctx.num_days {
                    vars.disposal.insert(
                        (Rc::clone(&node.id), Rc::clone(product_id), state, day),
                        pb.add_column(0.0, 0.0, disposal_max),
                    );
                }
            }
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::*;
    use crate::model::PlanningData;
    use rstest::rstest;

    #[rstest]
    fn test_no_transit_variable_without_truck(single_route_data: PlanningData) {
        let ctx = ModelContext::new(&single_route_data);
        let mut pb = ProblemBuilder::new();
        let vars = add_variables(&mut pb, &ctx);

        // Every pipeline variable's departure day must be one the truck runs on
        for (dispatch_index, _) in vars.in_transit.keys() {
            let dispatch = &ctx.dispatches[*dispatch_index];
            let truck = dispatch.truck.as_ref().unwrap();
            assert!(truck.runs_on(single_route_data.window.date_at(dispatch.depart)));
        }
    }

    #[rstest]
    fn test_no_disposal_variable_for_fresh_stock(single_node_data: PlanningData) {
        let ctx = ModelContext::new(&single_node_data);
        let mut pb = ProblemBuilder::new();
        let vars = add_variables(&mut pb, &ctx);

        // 30-day ambient life in a 7-day window: nothing can expire
        assert!(vars.disposal.is_empty());
    }

    #[rstest]
    fn test_mix_bound_covers_a_full_day(single_node_data: PlanningData) {
        let ctx = ModelContext::new(&single_node_data);
        // 14h at 100 units/h over 100-unit mixes = 14 mixes
        assert_eq!(ctx.mix_bound[&("6122".into(), "P1".into())], 14.0);
    }
}
