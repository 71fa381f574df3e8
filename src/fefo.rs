//! Post-solve FEFO allocation.
//!
//! The MIP works on aggregate state-level flows; this pass replays the plan chronologically and
//! assigns every flow to specific production-date-tagged batches, first-expired-first-out. A
//! failure here is a bug in the plan or the extraction, not a modelling trade-off: it raises and
//! marks the whole solution as failed.
use crate::error::PlanningError;
use crate::id::{NodeID, ProductID};
use crate::model::PlanningData;
use crate::product::StorageState;
use crate::solution::{OptimizationSolution, inventory_key};
use anyhow::Result;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;

/// Units below this are treated as zero when draining batches
const EPSILON_UNITS: f64 = 1e-3;
/// Tolerance when comparing batch totals against the aggregate inventory
const AGGREGATE_TOLERANCE_UNITS: f64 = 0.5;

/// A production-date-tagged quantity sitting in one state at one node
#[derive(Debug, Clone)]
struct Batch {
    /// The date the stock was produced (possibly synthetic, for initial inventory)
    production_date: NaiveDate,
    /// The date the stock entered its current state; expiry counts from here
    entered_state: NaiveDate,
    /// The date from which the batch may no longer be shipped or consumed
    expiry: NaiveDate,
    /// Units remaining
    quantity: f64,
}

/// One slice of a flow, assigned to a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchAllocation {
    /// The node the flow happened at (the origin, for shipments)
    pub node: NodeID,
    /// The destination node, for shipment allocations
    pub destination: Option<NodeID>,
    /// The product
    pub product: ProductID,
    /// The state the stock was drawn from
    pub state: StorageState,
    /// The date of the flow
    pub date: NaiveDate,
    /// The production date of the batch the slice came from
    pub batch_production_date: NaiveDate,
    /// Units taken from the batch
    pub quantity: f64,
    /// Age of the batch at the time of the flow, in days
    pub age_days: i64,
}

/// The complete batch-level view of a plan
#[derive(Debug, Default)]
pub struct FefoAllocation {
    /// Shipments, sliced by origin batch
    pub shipment_allocations: Vec<BatchAllocation>,
    /// Demand consumption, sliced by batch
    pub consumption_allocations: Vec<BatchAllocation>,
    /// Disposals, sliced by batch
    pub disposal_allocations: Vec<BatchAllocation>,
}

/// Stock in flight: batch slices that left their origin and have not yet arrived
struct InFlight {
    arrival_date: NaiveDate,
    destination: NodeID,
    product: ProductID,
    arrival_state: StorageState,
    /// True when the stock changes state on arrival (frozen arriving at an ambient-only node)
    resets_shelf_life: bool,
    batches: Vec<Batch>,
}

type StoreKey = (NodeID, ProductID, StorageState);

/// Allocate every aggregate flow of the solution to specific batches.
///
/// # Errors
///
/// [`PlanningError::SolutionContract`] when a flow cannot be covered by unexpired stock or the
/// end-of-day batch totals drift from the aggregate inventory.
pub fn allocate(data: &PlanningData, solution: &OptimizationSolution) -> Result<FefoAllocation> {
    let mut stores: HashMap<StoreKey, Vec<Batch>> = HashMap::new();
    let mut in_flight: Vec<InFlight> = Vec::new();
    let mut allocation = FefoAllocation::default();

    // Initial inventory becomes pre-window batches; entries without a production date get the
    // snapshot date as a synthetic one
    for entry in &data.initial_inventory {
        let production_date = entry.production_date.unwrap_or(entry.snapshot_date);
        let shelf_life = data.products[&entry.product].shelf_life_days(entry.state);
        stores
            .entry((
                Rc::clone(&entry.node),
                Rc::clone(&entry.product),
                entry.state,
            ))
            .or_default()
            .push(Batch {
                production_date,
                entered_state: production_date,
                expiry: production_date + Days::new(shelf_life as u64),
                quantity: entry.quantity,
            });
    }

    for date in data.window.iter_days() {
        // Arrivals land before anything departs or is consumed today
        for flight in in_flight.extract_if(.., |f| f.arrival_date == date) {
            let shelf_life =
                data.products[&flight.product].shelf_life_days(flight.arrival_state);
            let store = stores
                .entry((
                    Rc::clone(&flight.destination),
                    Rc::clone(&flight.product),
                    flight.arrival_state,
                ))
                .or_default();

            for mut batch in flight.batches {
                if flight.resets_shelf_life {
                    batch.entered_state = date;
                    batch.expiry = date + Days::new(shelf_life as u64);
                }
                store.push(batch);
            }
        }

        // Production creates fresh ambient batches
        for batch in solution.production_batches.iter().filter(|b| b.date == date) {
            let shelf_life = data.products[&batch.product].shelf_life_days(StorageState::Ambient);
            stores
                .entry((
                    Rc::clone(&batch.node),
                    Rc::clone(&batch.product),
                    StorageState::Ambient,
                ))
                .or_default()
                .push(Batch {
                    production_date: date,
                    entered_state: date,
                    expiry: date + Days::new(shelf_life as u64),
                    quantity: batch.quantity,
                });
        }

        // State transitions re-batch stock in the target state; thawing (and freezing) restart
        // the state clock from today
        for transition in solution.state_transitions.iter().filter(|t| t.date == date) {
            let slices = drain_fefo(
                &mut stores,
                &(
                    Rc::clone(&transition.node),
                    Rc::clone(&transition.product),
                    transition.from_state,
                ),
                transition.quantity,
                date,
                false,
            )
            .map_err(|e| transition_error(&transition.node, &transition.product, date, &e))?;

            let shelf_life =
                data.products[&transition.product].shelf_life_days(transition.to_state);
            let store = stores
                .entry((
                    Rc::clone(&transition.node),
                    Rc::clone(&transition.product),
                    transition.to_state,
                ))
                .or_default();
            for slice in slices {
                store.push(Batch {
                    production_date: slice.production_date,
                    entered_state: date,
                    expiry: date + Days::new(shelf_life as u64),
                    quantity: slice.quantity,
                });
            }
        }

        // Departures pull from origin stock, earliest expiry first
        for shipment in solution
            .shipments
            .iter()
            .filter(|s| s.departure_date == date)
        {
            let transit_state = match shipment.state {
                StorageState::Ambient => StorageState::Ambient,
                StorageState::Frozen | StorageState::Thawed => StorageState::Frozen,
            };
            let slices = drain_fefo(
                &mut stores,
                &(
                    Rc::clone(&shipment.origin),
                    Rc::clone(&shipment.product),
                    transit_state,
                ),
                shipment.quantity,
                date,
                false,
            )
            .map_err(|e| {
                PlanningError::SolutionContract(format!(
                    "FEFO: shipment {}->{} of {} on {date}: {e}",
                    shipment.origin, shipment.destination, shipment.product
                ))
            })?;

            for slice in &slices {
                allocation.shipment_allocations.push(BatchAllocation {
                    node: Rc::clone(&shipment.origin),
                    destination: Some(Rc::clone(&shipment.destination)),
                    product: Rc::clone(&shipment.product),
                    state: transit_state,
                    date,
                    batch_production_date: slice.production_date,
                    quantity: slice.quantity,
                    age_days: (date - slice.production_date).num_days(),
                });
            }

            in_flight.push(InFlight {
                arrival_date: shipment.delivery_date,
                destination: Rc::clone(&shipment.destination),
                product: Rc::clone(&shipment.product),
                arrival_state: shipment.state,
                resets_shelf_life: shipment.state == StorageState::Thawed,
                batches: slices,
            });
        }

        // Demand consumption, per source state
        for consumption in solution
            .demand_consumption
            .iter()
            .filter(|c| c.date == date)
        {
            let key = (
                Rc::clone(&consumption.node),
                Rc::clone(&consumption.product),
                consumption.state,
            );
            let slices = drain_fefo(&mut stores, &key, consumption.quantity, date, false)
                .map_err(|e| {
                    PlanningError::SolutionContract(format!(
                        "FEFO: consumption of {} at {} on {date}: {e}",
                        consumption.product, consumption.node
                    ))
                })?;

            for slice in slices {
                allocation.consumption_allocations.push(BatchAllocation {
                    node: Rc::clone(&consumption.node),
                    destination: None,
                    product: Rc::clone(&consumption.product),
                    state: consumption.state,
                    date,
                    batch_production_date: slice.production_date,
                    quantity: slice.quantity,
                    age_days: (date - slice.production_date).num_days(),
                });
            }
        }

        // Disposal may (and usually does) take expired stock
        for disposal in solution.disposals.iter().filter(|d| d.date == date) {
            let key = (
                Rc::clone(&disposal.node),
                Rc::clone(&disposal.product),
                disposal.state,
            );
            let slices =
                drain_fefo(&mut stores, &key, disposal.quantity, date, true).map_err(|e| {
                    PlanningError::SolutionContract(format!(
                        "FEFO: disposal of {} at {} on {date}: {e}",
                        disposal.product, disposal.node
                    ))
                })?;

            for slice in slices {
                allocation.disposal_allocations.push(BatchAllocation {
                    node: Rc::clone(&disposal.node),
                    destination: None,
                    product: Rc::clone(&disposal.product),
                    state: disposal.state,
                    date,
                    batch_production_date: slice.production_date,
                    quantity: slice.quantity,
                    age_days: (date - slice.production_date).num_days(),
                });
            }
        }

        // End of day: batch totals must match the aggregate inventory
        for ((node, product, state), batches) in &stores {
            let batch_total: f64 = batches.iter().map(|b| b.quantity).sum();
            let aggregate = solution
                .inventory_state
                .get(&inventory_key(node, product, *state, date))
                .copied()
                .unwrap_or(0.0);

            if (batch_total - aggregate).abs() > AGGREGATE_TOLERANCE_UNITS {
                return Err(PlanningError::SolutionContract(format!(
                    "FEFO: batch total {batch_total} for {node}|{product}|{state} on {date} \
                     does not match the aggregate inventory {aggregate}"
                ))
                .into());
            }
        }
    }

    Ok(allocation)
}

fn transition_error(
    node: &NodeID,
    product: &ProductID,
    date: NaiveDate,
    message: &str,
) -> PlanningError {
    PlanningError::SolutionContract(format!(
        "FEFO: state transition of {product} at {node} on {date}: {message}"
    ))
}

/// Take `quantity` units from the store, earliest expiry first.
///
/// Unexpired flows refuse expired batches: a consumption or shipment reaching past-shelf-life
/// stock means the plan violated its own shelf-life windows. Disposal takes expired stock.
fn drain_fefo(
    stores: &mut HashMap<StoreKey, Vec<Batch>>,
    key: &StoreKey,
    quantity: f64,
    date: NaiveDate,
    allow_expired: bool,
) -> Result<Vec<Batch>, String> {
    let Some(batches) = stores.get_mut(key) else {
        return Err(format!("no stock on hand (needed {quantity})"));
    };
    batches.sort_by_key(|b| b.expiry);

    let mut remaining = quantity;
    let mut slices = Vec::new();
    for batch in batches.iter_mut() {
        if remaining <= EPSILON_UNITS {
            break;
        }
        if batch.quantity <= EPSILON_UNITS {
            continue;
        }
        if !allow_expired && batch.expiry <= date {
            return Err(format!(
                "only stock expired on {} remains; {remaining} units short",
                batch.expiry
            ));
        }

        let take = batch.quantity.min(remaining);
        batch.quantity -= take;
        remaining -= take;
        slices.push(Batch {
            production_date: batch.production_date,
            entered_state: batch.entered_state,
            expiry: batch.expiry,
            quantity: take,
        });
    }
    batches.retain(|b| b.quantity > EPSILON_UNITS);

    if remaining > EPSILON_UNITS {
        return Err(format!("{remaining} units short of {quantity}"));
    }

    Ok(slices)
}
