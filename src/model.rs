//! The validated planning data container.
//!
//! [`PlanningData`] is created once by the validation pipeline and read immutably by the model
//! builder. The pipeline runs a full pass over every input domain, collecting hard errors, and
//! fails with the aggregated list; it never continues past an unresolved reference with a
//! warning.
use crate::alias::{ProductResolver, read_alias_table};
use crate::costs::CostParameters;
use crate::demand::{DemandMap, read_demand};
use crate::error::{IssueList, ValidationIssue};
use crate::input::*;
use crate::inventory::{InventoryEntry, read_inventory};
use crate::labor::{LaborCalendar, read_labor_calendar};
use crate::network::{TruckDelivery, check_reachability, expand_truck_deliveries};
use crate::node::{NodeMap, read_nodes};
use crate::product::{ProductMap, read_products};
use crate::route::{RouteMap, read_routes};
use crate::truck::{TruckMap, read_trucks};
use anyhow::{Context, Result, ensure};
use chrono::{Days, NaiveDate};
use log::info;
use serde::Deserialize;
use std::path::Path;
use std::rc::Rc;

const MODEL_FILE_NAME: &str = "model.toml";

/// The inclusive date range a plan covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanningWindow {
    /// First day of the plan
    pub start: NaiveDate,
    /// Last day of the plan (inclusive)
    pub end: NaiveDate,
}

impl PlanningWindow {
    /// Create a window, checking that it runs forwards
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        ensure!(
            start <= end,
            "Planning window must run forwards (start {start}, end {end})"
        );
        Ok(Self { start, end })
    }

    /// Number of days in the window
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Iterate over the dates in the window, in order
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }

    /// The zero-based day index of a date, if it falls inside the window
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        (date >= self.start && date <= self.end)
            .then(|| (date - self.start).num_days() as usize)
    }

    /// The date at a zero-based day index.
    ///
    /// # Panics
    ///
    /// Panics if the index is outside the window.
    pub fn date_at(&self, day: usize) -> NaiveDate {
        assert!(day < self.num_days(), "Day index {day} outside window");
        self.start + Days::new(day as u64)
    }

    /// Whether a date falls inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// The `[planning]` section of the model file
#[derive(Debug, Deserialize, PartialEq)]
struct PlanningSection {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

/// Represents the contents of the entire model file
#[derive(Debug, Deserialize, PartialEq)]
struct ModelFile {
    planning: PlanningSection,
    costs: CostParameters,
}

impl ModelFile {
    /// Read a model file from the specified directory
    fn from_path(model_dir: &Path) -> Result<ModelFile> {
        read_toml(&model_dir.join(MODEL_FILE_NAME))
    }
}

/// Validated planning data. Created once by the pipeline; immutable afterwards.
pub struct PlanningData {
    /// Products, keyed by canonical ID
    pub products: ProductMap,
    /// Network nodes, keyed by ID
    pub nodes: NodeMap,
    /// Transport legs, keyed by ID
    pub routes: RouteMap,
    /// Truck schedules, keyed by ID
    pub trucks: TruckMap,
    /// Truck drop-offs expanded into (truck, destination) legs with cumulative transit
    pub truck_deliveries: Vec<TruckDelivery>,
    /// Labor rules per date
    pub labor: LaborCalendar,
    /// Demand per (node, product, date), alias-resolved
    pub demand: DemandMap,
    /// Initial stock, alias-resolved
    pub initial_inventory: Vec<InventoryEntry>,
    /// Cost parameters for the objective
    pub costs: CostParameters,
    /// The dates the plan covers
    pub window: PlanningWindow,
}

impl PlanningData {
    /// Run the full validation pipeline on the model directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing the model input files
    ///
    /// # Returns
    ///
    /// The validated planning data, or an error aggregating every hard failure found during the
    /// pass. Topology errors are checked last, on otherwise-clean data.
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<PlanningData> {
        let model_dir = model_dir.as_ref();
        let model_file = ModelFile::from_path(model_dir)?;
        let window =
            PlanningWindow::new(model_file.planning.start_date, model_file.planning.end_date)
                .with_context(|| input_err_msg(model_dir.join(MODEL_FILE_NAME)))?;

        let mut issues = IssueList::new();
        let products = read_products(model_dir, &mut issues)?;
        let nodes = read_nodes(model_dir, &mut issues)?;
        let routes = read_routes(model_dir, &mut issues)?;
        let trucks = read_trucks(model_dir, &mut issues)?;
        let labor = read_labor_calendar(model_dir, &mut issues)?;
        let demand_records = read_demand(model_dir, &mut issues)?;
        let inventory_records = read_inventory(model_dir, &mut issues)?;
        let alias_rows = read_alias_table(model_dir)?;

        model_file.costs.check(&mut issues);

        // Labor must cover every day of the window
        for date in labor.missing_dates(window.start, window.end) {
            issues.push(ValidationIssue::new(
                "labor_calendar",
                date,
                "date",
                "an entry for every day of the planning window",
                format!("no entry for {date}"),
            ));
        }

        // Route endpoints must exist and the destination must be able to store what arrives
        for route in routes.values() {
            for (field, node_id) in [("origin", &route.origin), ("destination", &route.destination)]
            {
                if !nodes.contains_key(node_id) {
                    issues.push(ValidationIssue::new(
                        "routes",
                        &route.id,
                        field,
                        "a node defined in nodes.csv",
                        node_id,
                    ));
                }
            }

            if let Some(destination) = nodes.get(&route.destination) {
                let arrival = route.transport_mode.arrival_state(destination.storage_mode);
                if !destination.storage_mode.hosts(arrival) {
                    issues.push(ValidationIssue::new(
                        "routes",
                        &route.id,
                        "transport_mode",
                        format!("a mode whose arrivals {} can store", route.destination),
                        route.transport_mode.transit_state(),
                    ));
                }
            }
        }

        // Alias resolution: forecast and inventory references become canonical product IDs.
        // Every unresolved reference is recorded individually.
        let resolver = ProductResolver::new(&products, &alias_rows, &mut issues);

        let mut demand = DemandMap::new();
        for record in &demand_records {
            let record_key = format!("{}|{}|{}", record.node, record.product, record.date);
            let Some(product) =
                resolver.resolve_or_report(&record.product, "demand", &record_key, &mut issues)
            else {
                continue;
            };

            let Some(node) = nodes.get_key_value(record.node.as_str()).map(|(k, _)| k) else {
                issues.push(ValidationIssue::new(
                    "demand",
                    &record_key,
                    "node",
                    "a node defined in nodes.csv",
                    &record.node,
                ));
                continue;
            };

            if !nodes[node].has_demand {
                issues.push(ValidationIssue::new(
                    "demand",
                    &record_key,
                    "node",
                    "a node with the demand capability",
                    &record.node,
                ));
                continue;
            }

            if !window.contains(record.date) {
                issues.push(ValidationIssue::new(
                    "demand",
                    &record_key,
                    "date",
                    format!("a date in [{}, {}]", window.start, window.end),
                    record.date,
                ));
                continue;
            }

            let key = (Rc::clone(node), product, record.date);
            if demand.insert(key, record.quantity).is_some() {
                issues.push(ValidationIssue::new(
                    "demand",
                    &record_key,
                    "date",
                    "one forecast entry per (node, product, date)",
                    "a duplicate entry",
                ));
            }
        }

        let mut initial_inventory = Vec::with_capacity(inventory_records.len());
        for record in &inventory_records {
            let record_key = format!("{}|{}", record.node, record.product);
            let Some(product) =
                resolver.resolve_or_report(&record.product, "inventory", &record_key, &mut issues)
            else {
                continue;
            };

            let Some((node, node_data)) = nodes.get_key_value(record.node.as_str()) else {
                issues.push(ValidationIssue::new(
                    "inventory",
                    &record_key,
                    "node",
                    "a node defined in nodes.csv",
                    &record.node,
                ));
                continue;
            };

            if !node_data.storage_mode.hosts(record.state) {
                issues.push(ValidationIssue::new(
                    "inventory",
                    &record_key,
                    "state",
                    format!("a state supported by {} storage", node),
                    record.state,
                ));
                continue;
            }

            if record.snapshot_date > window.start {
                issues.push(ValidationIssue::new(
                    "inventory",
                    &record_key,
                    "snapshot_date",
                    format!("no later than the planning start ({})", window.start),
                    record.snapshot_date,
                ));
                continue;
            }

            initial_inventory.push(InventoryEntry {
                node: Rc::clone(node),
                product,
                state: record.state,
                quantity: record.quantity,
                production_date: record.production_date,
                snapshot_date: record.snapshot_date,
            });
        }

        // One full pass is complete: raise now if anything failed
        issues.into_result()?;

        // Topology runs on otherwise-clean data
        let truck_deliveries = expand_truck_deliveries(&trucks, &routes, &nodes)?;
        check_reachability(&nodes, &routes, &products, &demand)?;

        info!(
            "Validated planning data: {} products, {} nodes, {} routes, {} trucks, {} demand entries",
            products.len(),
            nodes.len(),
            routes.len(),
            trucks.len(),
            demand.len()
        );

        Ok(PlanningData {
            products,
            nodes,
            routes,
            trucks,
            truck_deliveries,
            labor,
            demand,
            initial_inventory,
            costs: model_file.costs,
            window,
        })
    }

    /// Total units demanded over the window
    pub fn total_demand(&self) -> f64 {
        self.demand.values().sum()
    }

    /// Total units demanded for one product over the window
    pub fn total_demand_for_product(&self, product: &str) -> f64 {
        self.demand
            .iter()
            .filter(|((_, p, _), _)| &***p == product)
            .map(|(_, quantity)| quantity)
            .sum()
    }

    /// Total initial stock for one product, across all nodes and states
    pub fn total_initial_inventory_for_product(&self, product: &str) -> f64 {
        self.initial_inventory
            .iter()
            .filter(|entry| &*entry.product == product)
            .map(|entry| entry.quantity)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planning_window() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        let window = PlanningWindow::new(start, end).unwrap();

        assert_eq!(window.num_days(), 7);
        assert_eq!(window.index_of(start), Some(0));
        assert_eq!(window.index_of(end), Some(6));
        assert_eq!(window.index_of(end + Days::new(1)), None);
        assert_eq!(window.date_at(3), start + Days::new(3));
        assert_eq!(window.iter_days().count(), 7);

        assert!(PlanningWindow::new(end, start).is_err());
    }

    #[test]
    fn test_single_day_window() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let window = PlanningWindow::new(day, day).unwrap();
        assert_eq!(window.num_days(), 1);
        assert_eq!(window.iter_days().collect::<Vec<_>>(), vec![day]);
    }
}
