//! Fixtures for tests
use crate::costs::CostParameters;
use crate::demand::DemandMap;
use crate::inventory::InventoryEntry;
use crate::labor::{LaborCalendar, LaborDay};
use crate::model::{PlanningData, PlanningWindow};
use crate::network::expand_truck_deliveries;
use crate::node::{Node, NodeMap, StorageMode};
use crate::product::{Product, ProductMap, StorageState};
use crate::route::{Route, RouteMap, TransportMode};
use crate::solution::{
    ComponentCost, Consumption, CostBreakdown, HoldingCost, LaborCost, LaborHours,
    OptimizationSolution, ProductionBatch, inventory_key,
};
use crate::solver::Termination;
use crate::truck::{
    DeparturePeriod, PALLETS_PER_TRUCK, TruckMap, TruckSchedule, UNITS_PER_CASE, UNITS_PER_PALLET,
};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use rstest::fixture;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Monday at the start of the standard test window
pub fn window_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

/// A product with a 100-unit mix and a long ambient life
pub fn test_product(id: &str, units_per_mix: u32) -> Rc<Product> {
    Rc::new(Product {
        id: id.into(),
        name: format!("TEST PRODUCT {id}"),
        shelf_life_ambient_days: 30,
        shelf_life_frozen_days: 120,
        shelf_life_thawed_days: 14,
        units_per_mix,
    })
}

/// A labor calendar covering `num_days` from `start`: weekdays fixed (12h of 14h at regular
/// rates), weekends non-fixed with a 4-hour minimum callout
pub fn test_calendar(start: NaiveDate, num_days: usize) -> LaborCalendar {
    let mut issues = crate::error::IssueList::new();
    let days = (0..num_days).map(|offset| {
        let date = start + Days::new(offset as u64);
        let is_fixed_day = !matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        LaborDay {
            date,
            is_fixed_day,
            fixed_hours: if is_fixed_day { 12.0 } else { 0.0 },
            max_hours: 14.0,
            regular_rate: 25.0,
            overtime_rate: 37.5,
            non_fixed_rate: 50.0,
            min_paid_hours: if is_fixed_day { 0.0 } else { 4.0 },
        }
    });
    let calendar = LaborCalendar::from_days(days, &mut issues);
    assert!(issues.is_empty());
    calendar
}

/// Cost parameters where production is cheap and shortage is ruinous
pub fn test_costs() -> CostParameters {
    CostParameters {
        production_cost_per_unit: 1.0,
        shortage_penalty_per_unit: 1000.0,
        changeover_cost: 0.0,
        storage_fixed_per_pallet: 0.0,
        storage_frozen_per_pallet_day: 0.0,
        storage_ambient_per_pallet_day: 0.0,
        storage_thawed_per_pallet_day: 0.0,
    }
}

fn base_node(id: &str) -> Node {
    Node {
        id: id.into(),
        name: format!("node {id}"),
        can_manufacture: false,
        production_rate_per_hour: None,
        can_store: true,
        storage_mode: StorageMode::Ambient,
        storage_capacity: None,
        has_demand: false,
        requires_truck_schedules: false,
        lat: None,
        lon: None,
        startup_hours: 0.0,
        shutdown_hours: 0.0,
        changeover_hours: 0.0,
    }
}

/// A single manufacturing node "6122" with local demand for product "P1": 250 units on the
/// second day of a 7-day window
#[fixture]
pub fn single_node_data() -> PlanningData {
    let start = window_start();
    let window = PlanningWindow::new(start, start + Days::new(6)).unwrap();

    let product = test_product("P1", 100);
    let mut products = ProductMap::new();
    products.insert(Rc::clone(&product.id), product);

    let mut node = base_node("6122");
    node.can_manufacture = true;
    node.production_rate_per_hour = Some(100.0);
    node.storage_mode = StorageMode::Both;
    node.has_demand = true;
    let node = Rc::new(node);
    let mut nodes = NodeMap::new();
    nodes.insert(Rc::clone(&node.id), node);

    let mut demand = DemandMap::new();
    demand.insert(("6122".into(), "P1".into(), start + Days::new(1)), 250.0);

    PlanningData {
        products,
        nodes,
        routes: RouteMap::new(),
        trucks: TruckMap::new(),
        truck_deliveries: Vec::new(),
        labor: test_calendar(start, 7),
        demand,
        initial_inventory: Vec::new(),
        costs: test_costs(),
        window,
    }
}

/// A manufacturing node "6122" shipping to demand node "6104" over a 2-day ambient route, with
/// trucks on Tuesday and Thursday only
#[fixture]
pub fn single_route_data() -> PlanningData {
    let start = window_start();
    let window = PlanningWindow::new(start, start + Days::new(13)).unwrap();

    let product = test_product("P1", 100);
    let mut products = ProductMap::new();
    products.insert(Rc::clone(&product.id), product);

    let mut factory = base_node("6122");
    factory.can_manufacture = true;
    factory.production_rate_per_hour = Some(1400.0);
    factory.storage_mode = StorageMode::Both;
    factory.requires_truck_schedules = true;

    let mut store = base_node("6104");
    store.has_demand = true;

    let mut nodes = NodeMap::new();
    for node in [factory, store] {
        let node = Rc::new(node);
        nodes.insert(Rc::clone(&node.id), node);
    }

    let route = Rc::new(Route {
        id: "R1".into(),
        origin: "6122".into(),
        destination: "6104".into(),
        transit_days: 2,
        transport_mode: TransportMode::Ambient,
        cost_per_unit: 0.05,
    });
    let mut routes = RouteMap::new();
    routes.insert(Rc::clone(&route.id), route);

    let mut trucks = TruckMap::new();
    for (id, day) in [("T1", Weekday::Tue), ("T2", Weekday::Thu)] {
        let truck = Rc::new(TruckSchedule {
            id: id.into(),
            origin: "6122".into(),
            destination: "6104".into(),
            day_of_week: Some(day),
            departure_period: DeparturePeriod::Morning,
            capacity: 14080.0,
            cost_fixed: 1200.0,
            cost_per_unit: 0.02,
            intermediate_stops: vec![],
            pallet_capacity: PALLETS_PER_TRUCK,
            units_per_pallet: UNITS_PER_PALLET,
            units_per_case: UNITS_PER_CASE,
        });
        trucks.insert(Rc::clone(&truck.id), truck);
    }

    let mut demand = DemandMap::new();
    // Demand lands mid-window so a Tuesday departure can serve it
    demand.insert(("6104".into(), "P1".into(), start + Days::new(4)), 800.0);
    demand.insert(("6104".into(), "P1".into(), start + Days::new(11)), 600.0);

    let truck_deliveries = expand_truck_deliveries(&trucks, &routes, &nodes).unwrap();

    PlanningData {
        products,
        nodes,
        routes,
        trucks,
        truck_deliveries,
        labor: test_calendar(start, 14),
        demand,
        initial_inventory: Vec::new(),
        costs: test_costs(),
        window,
    }
}

/// A hand-built solution consistent with [`single_node_data`]: three mixes on day one, demand
/// consumed on day two, the 50-unit remainder held for the rest of the window
pub fn feasible_solution(data: &PlanningData) -> OptimizationSolution {
    let start = data.window.start;
    let day0 = start;
    let day1 = start + Days::new(1);

    let mut labor_hours_by_date: BTreeMap<NaiveDate, LaborHours> = data
        .window
        .iter_days()
        .map(|date| (date, LaborHours::default()))
        .collect();
    labor_hours_by_date.insert(
        day0,
        LaborHours {
            used: 3.0,
            paid: 3.0,
            fixed: 3.0,
            overtime: 0.0,
            non_fixed: 0.0,
        },
    );

    let mut inventory_state = BTreeMap::new();
    inventory_state.insert(inventory_key("6122", "P1", StorageState::Ambient, day0), 300.0);
    for date in data.window.iter_days().skip(1) {
        inventory_state.insert(
            inventory_key("6122", "P1", StorageState::Ambient, date),
            50.0,
        );
    }

    let labor_total = 3.0 * 25.0;
    let production_total = 300.0;
    let costs = CostBreakdown {
        labor: LaborCost {
            total: labor_total,
            by_date: BTreeMap::from([(day0, labor_total)]),
        },
        production: ComponentCost {
            total: production_total,
        },
        transport: ComponentCost::default(),
        holding: HoldingCost::default(),
        waste_shortage: ComponentCost::default(),
        total: labor_total + production_total,
    };

    OptimizationSolution {
        model_type: "sliding_window".to_string(),
        termination: Termination::Optimal,
        objective_value: costs.total,
        solve_time_seconds: 0.01,
        production_batches: vec![ProductionBatch {
            node: "6122".into(),
            product: "P1".into(),
            date: day0,
            quantity: 300.0,
        }],
        labor_hours_by_date,
        shipments: vec![],
        demand_consumption: vec![Consumption {
            node: "6122".into(),
            product: "P1".into(),
            date: day1,
            state: StorageState::Ambient,
            quantity: 250.0,
        }],
        state_transitions: vec![],
        disposals: vec![],
        costs: costs.clone(),
        total_cost: costs.total,
        fill_rate: 1.0,
        total_production: 300.0,
        total_shortage_units: 0.0,
        inventory_state,
    }
}

/// An initial-inventory entry for tests
pub fn initial_entry(
    node: &str,
    product: &str,
    state: StorageState,
    quantity: f64,
    production_date: Option<NaiveDate>,
) -> InventoryEntry {
    InventoryEntry {
        node: node.into(),
        product: product.into(),
        state,
        quantity,
        production_date,
        snapshot_date: window_start() - Days::new(1),
    }
}
