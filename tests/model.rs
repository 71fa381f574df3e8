use coldplan::fefo;
use coldplan::model::PlanningData;
use coldplan::optimisation::build_and_solve;
use coldplan::solver::{SolverChoice, SolverOptions};
use std::path::{Path, PathBuf};

/// Get the path to the demo model.
fn get_model_dir() -> PathBuf {
    Path::new(file!())
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("demos")
        .join("simple")
}

/// An integration test which attempts to load the demo model
#[test]
fn test_model_from_path() {
    let data = PlanningData::from_path(get_model_dir()).unwrap();

    // The inventory reference "168846" resolves to product 6122 through the alias table
    assert!(
        data.initial_inventory
            .iter()
            .any(|entry| &*entry.node == "LINEAGE" && &*entry.product == "6122")
    );

    // Forecast rows referencing the product by name share the canonical ID
    assert!(
        data.demand
            .keys()
            .all(|(_, product, _)| data.products.contains_key(product))
    );
}

/// Plan the demo model end to end: solve, extract, allocate batches
#[test]
fn test_plan_demo_model() {
    let data = PlanningData::from_path(get_model_dir()).unwrap();
    let solution = build_and_solve(
        &data,
        SolverChoice::Highs,
        &SolverOptions::default(),
        true,
    )
    .unwrap();

    // Shortage is priced out; the demo demand is fully servable
    assert!(solution.fill_rate > 0.99);
    assert!(solution.total_production > 0.0);

    // Every shipment from the timetabled factory names its truck
    for shipment in &solution.shipments {
        if &*shipment.origin == "6122" {
            assert!(shipment.truck_id.is_some());
        }
    }

    // The aggregate plan decomposes into batches
    let allocation = fefo::allocate(&data, &solution).unwrap();
    let shipped_total: f64 = allocation
        .shipment_allocations
        .iter()
        .map(|a| a.quantity)
        .sum();
    let solution_shipped: f64 = solution.shipments.iter().map(|s| s.quantity).sum();
    assert!((shipped_total - solution_shipped).abs() < 1.0);
}
