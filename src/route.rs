//! Transport legs between nodes.
//!
//! A route is a single (origin, destination, transport mode) leg with its own transit time and
//! per-unit cost. Trucks with intermediate stops expand into a sequence of these legs at
//! validation time.
use crate::error::{IssueList, ValidationIssue};
use crate::id::{NodeID, define_id_getter};
use crate::input::*;
use crate::node::StorageMode;
use crate::product::StorageState;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::Path;
use std::rc::Rc;

const ROUTES_FILE_NAME: &str = "routes.csv";

/// The temperature regime stock is held at while in transit
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum TransportMode {
    /// Refrigerated transport
    #[string = "frozen"]
    Frozen,
    /// Ambient transport
    #[string = "ambient"]
    Ambient,
}

impl TransportMode {
    /// The storage state of stock while it is in transit on this mode
    pub fn transit_state(&self) -> StorageState {
        match self {
            Self::Frozen => StorageState::Frozen,
            Self::Ambient => StorageState::Ambient,
        }
    }

    /// The storage state stock lands in when it arrives at a node with the given storage mode.
    ///
    /// A frozen arrival at a node without frozen storage thaws on arrival; its shelf life
    /// restarts from the thawed shelf life. Ambient arrivals stay ambient.
    pub fn arrival_state(&self, destination_storage: StorageMode) -> StorageState {
        match self {
            Self::Ambient => StorageState::Ambient,
            Self::Frozen if destination_storage.hosts_frozen() => StorageState::Frozen,
            Self::Frozen => StorageState::Thawed,
        }
    }
}

/// A transport leg between two nodes
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Route {
    /// Unique identifier for the route
    pub id: Rc<str>,
    /// The node shipments depart from
    pub origin: NodeID,
    /// The node shipments arrive at
    pub destination: NodeID,
    /// Days spent in transit. Zero means same-day arrival.
    pub transit_days: u32,
    /// The temperature regime for this leg
    pub transport_mode: TransportMode,
    /// Cost per unit shipped on this leg
    pub cost_per_unit: f64,
}
define_id_getter! {Route}

/// A map of [`Route`]s, keyed by route ID. Iteration order is file order.
pub type RouteMap = IndexMap<Rc<str>, Rc<Route>>;

/// Find the route for an (origin, destination, mode) triple, if one exists
pub fn find_route<'a>(
    routes: &'a RouteMap,
    origin: &str,
    destination: &str,
    mode: TransportMode,
) -> Option<&'a Rc<Route>> {
    routes.values().find(|route| {
        &*route.origin == origin
            && &*route.destination == destination
            && route.transport_mode == mode
    })
}

/// Read routes from the `routes.csv` file in `model_dir`.
///
/// Self-loops and negative costs are rejected here; whether the endpoints exist is checked later,
/// once the node table is available.
pub fn read_routes(model_dir: &Path, issues: &mut IssueList) -> Result<RouteMap> {
    let file_path = model_dir.join(ROUTES_FILE_NAME);
    Ok(read_routes_from_iter(read_csv(&file_path)?, issues))
}

fn read_routes_from_iter<I>(iter: I, issues: &mut IssueList) -> RouteMap
where
    I: Iterator<Item = Route>,
{
    let mut map = RouteMap::new();
    for route in iter {
        if route.origin == route.destination {
            issues.push(ValidationIssue::new(
                "routes",
                &route.id,
                "destination",
                "a node other than the origin",
                &route.destination,
            ));
            continue;
        }

        if check_nonnegative(route.cost_per_unit).is_err() {
            issues.push(ValidationIssue::new(
                "routes",
                &route.id,
                "cost_per_unit",
                "a finite, non-negative cost",
                route.cost_per_unit,
            ));
            continue;
        }

        insert_unique(&mut map, route, "routes", issues);
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, origin: &str, destination: &str) -> Route {
        Route {
            id: id.into(),
            origin: origin.into(),
            destination: destination.into(),
            transit_days: 1,
            transport_mode: TransportMode::Frozen,
            cost_per_unit: 0.05,
        }
    }

    #[test]
    fn test_arrival_state() {
        // Frozen arrivals stay frozen where frozen storage exists
        assert_eq!(
            TransportMode::Frozen.arrival_state(StorageMode::Frozen),
            StorageState::Frozen
        );
        assert_eq!(
            TransportMode::Frozen.arrival_state(StorageMode::Both),
            StorageState::Frozen
        );

        // ... and thaw on arrival where it does not
        assert_eq!(
            TransportMode::Frozen.arrival_state(StorageMode::Ambient),
            StorageState::Thawed
        );

        // Ambient arrivals are always ambient
        assert_eq!(
            TransportMode::Ambient.arrival_state(StorageMode::Ambient),
            StorageState::Ambient
        );
    }

    #[test]
    fn test_self_loop_is_an_issue() {
        let mut issues = IssueList::new();
        let map = read_routes_from_iter([route("R1", "6104", "6104")].into_iter(), &mut issues);
        assert!(map.is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_find_route() {
        let mut issues = IssueList::new();
        let map = read_routes_from_iter(
            [route("R1", "6122", "LINEAGE"), route("R2", "LINEAGE", "6130")].into_iter(),
            &mut issues,
        );
        assert!(issues.is_empty());
        assert!(find_route(&map, "6122", "LINEAGE", TransportMode::Frozen).is_some());
        assert!(find_route(&map, "6122", "LINEAGE", TransportMode::Ambient).is_none());
        assert!(find_route(&map, "6130", "LINEAGE", TransportMode::Frozen).is_none());
    }
}
