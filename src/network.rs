//! Network topology validation.
//!
//! Two checks run after the record-level pipeline has passed: truck schedules are expanded into
//! their constituent route legs (any missing leg is fatal), and every manufacturing node must be
//! able to reach every demand node within the shelf life of some transport mode.
use crate::demand::DemandMap;
use crate::error::PlanningError;
use crate::id::NodeID;
use crate::node::NodeMap;
use crate::product::ProductMap;
use crate::route::{RouteMap, TransportMode, find_route};
use crate::truck::{TruckMap, TruckSchedule};
use anyhow::Result;
use petgraph::Directed;
use petgraph::algo::dijkstra;
use petgraph::graph::{Graph, NodeIndex};
use std::collections::HashMap;
use std::rc::Rc;

/// A single drop-off served by a truck, with transit accumulated over the truck's route legs
#[derive(Debug, Clone)]
pub struct TruckDelivery {
    /// The schedule this drop-off belongs to
    pub truck: Rc<TruckSchedule>,
    /// The node the stock is dropped off at
    pub destination: NodeID,
    /// Days between departure and drop-off
    pub transit_days: u32,
    /// The temperature regime for the whole run
    pub transport_mode: TransportMode,
    /// Per-unit route cost accumulated over the legs to this drop-off
    pub route_cost_per_unit: f64,
}

/// Expand every truck schedule into per-drop-off deliveries.
///
/// Each consecutive pair in the truck's visit sequence must be backed by a route; every
/// intermediate stop must be a storage node able to hold the stock in its transit state; all legs
/// of one truck must share a transport mode.
pub fn expand_truck_deliveries(
    trucks: &TruckMap,
    routes: &RouteMap,
    nodes: &NodeMap,
) -> Result<Vec<TruckDelivery>> {
    let mut deliveries = Vec::new();

    for truck in trucks.values() {
        let sequence = truck.visit_sequence();

        // Stops must be real storage nodes
        for stop in &truck.intermediate_stops {
            let node = nodes.get(stop).ok_or_else(|| {
                PlanningError::Topology(format!(
                    "Truck {}: intermediate stop {stop} is not a node",
                    truck.id
                ))
            })?;
            if !node.can_store {
                return Err(PlanningError::Topology(format!(
                    "Truck {}: intermediate stop {stop} cannot store stock",
                    truck.id
                ))
                .into());
            }
        }

        // Walk the legs, accumulating transit and cost to each drop-off
        let mut mode: Option<TransportMode> = None;
        let mut transit_days = 0;
        let mut route_cost_per_unit = 0.0;
        for pair in sequence.windows(2) {
            let (leg_origin, leg_destination) = (&pair[0], &pair[1]);
            let route = [TransportMode::Frozen, TransportMode::Ambient]
                .into_iter()
                .filter(|m| mode.is_none_or(|fixed| fixed == *m))
                .find_map(|m| find_route(routes, leg_origin, leg_destination, m))
                .ok_or_else(|| {
                    PlanningError::Topology(format!(
                        "Truck {}: no route covers leg {leg_origin} -> {leg_destination}",
                        truck.id
                    ))
                })?;

            mode = Some(route.transport_mode);
            transit_days += route.transit_days;
            route_cost_per_unit += route.cost_per_unit;

            // Every node after this leg's destination is a drop-off
            let node = &nodes[leg_destination];
            let arrival_state = route.transport_mode.arrival_state(node.storage_mode);
            if !node.storage_mode.hosts(arrival_state) {
                return Err(PlanningError::Topology(format!(
                    "Truck {}: {leg_destination} cannot store {arrival_state} arrivals",
                    truck.id
                ))
                .into());
            }

            deliveries.push(TruckDelivery {
                truck: Rc::clone(truck),
                destination: Rc::clone(leg_destination),
                transit_days,
                transport_mode: route.transport_mode,
                route_cost_per_unit,
            });
        }
    }

    Ok(deliveries)
}

/// A directed graph of route legs for one transport mode, with transit days as edge weights
fn mode_graph(
    routes: &RouteMap,
    nodes: &NodeMap,
    mode: TransportMode,
) -> (Graph<NodeID, u32, Directed>, HashMap<NodeID, NodeIndex>) {
    let mut graph = Graph::new();
    let mut indices = HashMap::new();
    for node_id in nodes.keys() {
        let index = graph.add_node(Rc::clone(node_id));
        indices.insert(Rc::clone(node_id), index);
    }

    for route in routes.values() {
        if route.transport_mode == mode {
            graph.add_edge(
                indices[&route.origin],
                indices[&route.destination],
                route.transit_days,
            );
        }
    }

    (graph, indices)
}

/// Check that every manufacturing node reaches every demand node.
///
/// A demand node is reachable when, for some transport mode, a sequence of routes connects the
/// two nodes with combined transit no longer than the longest shelf life (over demanded
/// products) for that mode. Stock that cannot survive any path means the demand can never be
/// served and the configuration is rejected.
pub fn check_reachability(
    nodes: &NodeMap,
    routes: &RouteMap,
    products: &ProductMap,
    demand: &DemandMap,
) -> Result<()> {
    let manufacturing: Vec<_> = nodes.values().filter(|n| n.can_manufacture).collect();

    // Demand nodes and the products demanded at each
    let mut demanded_products: HashMap<NodeID, Vec<Rc<str>>> = HashMap::new();
    for (node, product, _) in demand.keys() {
        demanded_products
            .entry(Rc::clone(node))
            .or_default()
            .push(Rc::clone(product));
    }

    let (frozen_graph, frozen_indices) = mode_graph(routes, nodes, TransportMode::Frozen);
    let (ambient_graph, ambient_indices) = mode_graph(routes, nodes, TransportMode::Ambient);

    for factory in &manufacturing {
        let frozen_reach = dijkstra(
            &frozen_graph,
            frozen_indices[&factory.id],
            None,
            |e| *e.weight(),
        );
        let ambient_reach = dijkstra(
            &ambient_graph,
            ambient_indices[&factory.id],
            None,
            |e| *e.weight(),
        );

        for (demand_node, product_ids) in &demanded_products {
            // Demand at the factory itself is served from local stock
            if *demand_node == factory.id {
                continue;
            }

            let frozen_limit = product_ids
                .iter()
                .map(|p| products[p].shelf_life_frozen_days)
                .max()
                .unwrap_or(0);
            let ambient_limit = product_ids
                .iter()
                .map(|p| products[p].shelf_life_ambient_days)
                .max()
                .unwrap_or(0);

            let frozen_ok = frozen_reach
                .get(&frozen_indices[demand_node])
                .is_some_and(|transit| *transit <= frozen_limit);
            let ambient_ok = ambient_reach
                .get(&ambient_indices[demand_node])
                .is_some_and(|transit| *transit <= ambient_limit);

            if !frozen_ok && !ambient_ok {
                return Err(PlanningError::Topology(format!(
                    "Demand node {demand_node} is unreachable from manufacturing node {} \
                     within shelf life on any transport mode",
                    factory.id
                ))
                .into());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, StorageMode};
    use crate::product::Product;
    use crate::route::Route;
    use crate::truck::{DeparturePeriod, PALLETS_PER_TRUCK, UNITS_PER_CASE, UNITS_PER_PALLET};
    use chrono::NaiveDate;

    fn node(id: &str, storage_mode: StorageMode, can_manufacture: bool) -> Rc<Node> {
        Rc::new(Node {
            id: id.into(),
            name: id.to_string(),
            can_manufacture,
            production_rate_per_hour: can_manufacture.then_some(1400.0),
            can_store: true,
            storage_mode,
            storage_capacity: None,
            has_demand: !can_manufacture,
            requires_truck_schedules: can_manufacture,
            lat: None,
            lon: None,
            startup_hours: 0.0,
            shutdown_hours: 0.0,
            changeover_hours: 0.0,
        })
    }

    fn route(id: &str, origin: &str, destination: &str, transit_days: u32) -> Rc<Route> {
        Rc::new(Route {
            id: id.into(),
            origin: origin.into(),
            destination: destination.into(),
            transit_days,
            transport_mode: TransportMode::Frozen,
            cost_per_unit: 0.05,
        })
    }

    fn network() -> (NodeMap, RouteMap) {
        let mut nodes = NodeMap::new();
        for n in [
            node("6122", StorageMode::Both, true),
            node("LINEAGE", StorageMode::Frozen, false),
            node("6130", StorageMode::Ambient, false),
        ] {
            nodes.insert(Rc::clone(&n.id), n);
        }

        let mut routes = RouteMap::new();
        for r in [
            route("R1", "6122", "LINEAGE", 1),
            route("R2", "LINEAGE", "6130", 3),
        ] {
            routes.insert(Rc::clone(&r.id), r);
        }

        (nodes, routes)
    }

    fn truck_with_stop() -> TruckMap {
        let truck = Rc::new(crate::truck::TruckSchedule {
            id: "T1".into(),
            origin: "6122".into(),
            destination: "6130".into(),
            day_of_week: None,
            departure_period: DeparturePeriod::Morning,
            capacity: 14080.0,
            cost_fixed: 1200.0,
            cost_per_unit: 0.02,
            intermediate_stops: vec!["LINEAGE".into()],
            pallet_capacity: PALLETS_PER_TRUCK,
            units_per_pallet: UNITS_PER_PALLET,
            units_per_case: UNITS_PER_CASE,
        });
        let mut trucks = TruckMap::new();
        trucks.insert(Rc::clone(&truck.id), truck);
        trucks
    }

    #[test]
    fn test_expand_truck_deliveries() {
        let (nodes, routes) = network();
        let deliveries = expand_truck_deliveries(&truck_with_stop(), &routes, &nodes).unwrap();
        assert_eq!(deliveries.len(), 2);

        assert_eq!(&*deliveries[0].destination, "LINEAGE");
        assert_eq!(deliveries[0].transit_days, 1);

        assert_eq!(&*deliveries[1].destination, "6130");
        assert_eq!(deliveries[1].transit_days, 4);
        assert!((deliveries[1].route_cost_per_unit - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_missing_leg_is_fatal() {
        let (nodes, mut routes) = network();
        routes.shift_remove("R2");
        assert!(expand_truck_deliveries(&truck_with_stop(), &routes, &nodes).is_err());
    }

    #[test]
    fn test_reachability() {
        let (nodes, routes) = network();
        let mut products = ProductMap::new();
        products.insert(
            "6122P".into(),
            Rc::new(Product {
                id: "6122P".into(),
                name: "white bread".into(),
                shelf_life_ambient_days: 17,
                shelf_life_frozen_days: 120,
                shelf_life_thawed_days: 14,
                units_per_mix: 100,
            }),
        );

        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let mut demand = DemandMap::new();
        demand.insert(("6130".into(), "6122P".into(), date), 100.0);

        assert!(check_reachability(&nodes, &routes, &products, &demand).is_ok());

        // Removing the final leg makes the demand node unreachable
        let mut broken = routes.clone();
        broken.shift_remove("R2");
        assert!(check_reachability(&nodes, &broken, &products, &demand).is_err());
    }
}
