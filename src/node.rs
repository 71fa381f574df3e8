//! Locations in the production and distribution network.
//!
//! A node combines manufacturing, storage and demand capabilities. Manufacturing output enters
//! storage in the ambient state, so a manufacturing node must host ambient stock.
use crate::error::{IssueList, ValidationIssue};
use crate::id::{NodeID, define_id_getter};
use crate::input::*;
use crate::product::StorageState;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::Path;
use std::rc::Rc;

const NODES_FILE_NAME: &str = "nodes.csv";

/// Which temperature regimes a node's storage supports
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum StorageMode {
    /// Frozen storage only
    #[string = "frozen"]
    Frozen,
    /// Ambient storage only. Hosts ambient and thawed stock.
    #[string = "ambient"]
    Ambient,
    /// Both frozen and ambient storage. Required to host thaw/freeze transitions.
    #[string = "both"]
    Both,
}

impl StorageMode {
    /// Whether stock in the given state can be held at a node with this storage mode.
    ///
    /// Thawed stock sits in ambient storage, so both `Ambient` and `Both` host it.
    pub fn hosts(&self, state: StorageState) -> bool {
        match self {
            Self::Frozen => state == StorageState::Frozen,
            Self::Ambient => matches!(state, StorageState::Ambient | StorageState::Thawed),
            Self::Both => true,
        }
    }

    /// Whether a node with this storage mode supports frozen storage
    pub fn hosts_frozen(&self) -> bool {
        self.hosts(StorageState::Frozen)
    }
}

/// A location in the network
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Node {
    /// Unique identifier for the node (e.g. "6122" or "LINEAGE")
    pub id: Rc<str>,
    /// A text description of the node (e.g. "Moorebank DC")
    pub name: String,
    /// Whether product can be manufactured here
    pub can_manufacture: bool,
    /// Units produced per labor hour. Required when `can_manufacture` is set.
    pub production_rate_per_hour: Option<f64>,
    /// Whether stock can be held here overnight
    pub can_store: bool,
    /// The temperature regimes supported by this node's storage
    pub storage_mode: StorageMode,
    /// Maximum units that can be held here, if limited
    pub storage_capacity: Option<f64>,
    /// Whether customer demand occurs at this node
    pub has_demand: bool,
    /// Whether departures from this node must follow the truck schedules
    pub requires_truck_schedules: bool,
    /// Latitude, for map rendering only
    pub lat: Option<f64>,
    /// Longitude, for map rendering only
    pub lon: Option<f64>,
    /// Hours consumed starting up a production day
    #[serde(default)]
    pub startup_hours: f64,
    /// Hours consumed shutting down a production day
    #[serde(default)]
    pub shutdown_hours: f64,
    /// Hours consumed switching production between products
    #[serde(default)]
    pub changeover_hours: f64,
}
define_id_getter! {Node}

impl Node {
    /// The production rate for a manufacturing node.
    ///
    /// # Panics
    ///
    /// Panics if the node cannot manufacture. Validation guarantees the rate is present and
    /// positive for manufacturing nodes.
    pub fn production_rate(&self) -> f64 {
        assert!(self.can_manufacture, "Node {} cannot manufacture", self.id);
        self.production_rate_per_hour
            .expect("Manufacturing node without production rate")
    }
}

/// A map of [`Node`]s, keyed by node ID. Iteration order is file order.
pub type NodeMap = IndexMap<NodeID, Rc<Node>>;

/// Read nodes from the `nodes.csv` file in `model_dir`.
///
/// Capability coherence is checked here: manufacturing implies a positive production rate and
/// ambient-capable storage; a demand node must be able to hold stock; overhead hours must be
/// finite and non-negative.
pub fn read_nodes(model_dir: &Path, issues: &mut IssueList) -> Result<NodeMap> {
    let file_path = model_dir.join(NODES_FILE_NAME);
    let nodes = read_nodes_from_iter(read_csv(&file_path)?, issues);
    if nodes.is_empty() && issues.is_empty() {
        issues.push(ValidationIssue::new(
            "nodes",
            NODES_FILE_NAME,
            "rows",
            "at least one node",
            "an empty file",
        ));
    }
    Ok(nodes)
}

fn read_nodes_from_iter<I>(iter: I, issues: &mut IssueList) -> NodeMap
where
    I: Iterator<Item = Node>,
{
    let mut map = NodeMap::new();
    for node in iter {
        if node.can_manufacture {
            match node.production_rate_per_hour {
                Some(rate) if rate > 0.0 && rate.is_finite() => {}
                other => {
                    issues.push(ValidationIssue::new(
                        "nodes",
                        &node.id,
                        "production_rate_per_hour",
                        "a positive rate for a manufacturing node",
                        other.map_or("missing".to_string(), |r| r.to_string()),
                    ));
                    continue;
                }
            }

            if !node.storage_mode.hosts(StorageState::Ambient) {
                issues.push(ValidationIssue::new(
                    "nodes",
                    &node.id,
                    "storage_mode",
                    "ambient or both (production enters ambient storage)",
                    "frozen",
                ));
                continue;
            }
        }

        // A demand node without storage would have its stock columns pinned to zero and every
        // delivery forced through a same-day consumption; reject the configuration instead
        if node.has_demand && !node.can_store {
            issues.push(ValidationIssue::new(
                "nodes",
                &node.id,
                "can_store",
                "a demand node that can hold stock",
                "can_store=false",
            ));
            continue;
        }

        for (field, hours) in [
            ("startup_hours", node.startup_hours),
            ("shutdown_hours", node.shutdown_hours),
            ("changeover_hours", node.changeover_hours),
        ] {
            if check_nonnegative(hours).is_err() {
                issues.push(ValidationIssue::new(
                    "nodes",
                    &node.id,
                    field,
                    "a finite, non-negative number of hours",
                    hours,
                ));
            }
        }

        insert_unique(&mut map, node, "nodes", issues);
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manufacturing_node(id: &str, rate: Option<f64>) -> Node {
        Node {
            id: id.into(),
            name: format!("node {id}"),
            can_manufacture: true,
            production_rate_per_hour: rate,
            can_store: true,
            storage_mode: StorageMode::Both,
            storage_capacity: None,
            has_demand: false,
            requires_truck_schedules: true,
            lat: None,
            lon: None,
            startup_hours: 0.5,
            shutdown_hours: 0.5,
            changeover_hours: 0.25,
        }
    }

    #[test]
    fn test_storage_mode_hosts() {
        assert!(StorageMode::Frozen.hosts(StorageState::Frozen));
        assert!(!StorageMode::Frozen.hosts(StorageState::Ambient));
        assert!(!StorageMode::Frozen.hosts(StorageState::Thawed));

        assert!(!StorageMode::Ambient.hosts(StorageState::Frozen));
        assert!(StorageMode::Ambient.hosts(StorageState::Ambient));
        assert!(StorageMode::Ambient.hosts(StorageState::Thawed));

        assert!(StorageMode::Both.hosts(StorageState::Frozen));
        assert!(StorageMode::Both.hosts(StorageState::Ambient));
        assert!(StorageMode::Both.hosts(StorageState::Thawed));
    }

    #[test]
    fn test_manufacturing_requires_rate() {
        let mut issues = IssueList::new();
        let map = read_nodes_from_iter(
            [
                manufacturing_node("M1", Some(1400.0)),
                manufacturing_node("M2", None),
                manufacturing_node("M3", Some(0.0)),
            ]
            .into_iter(),
            &mut issues,
        );
        assert_eq!(map.len(), 1);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_frozen_only_manufacturing_is_rejected() {
        let mut issues = IssueList::new();
        let mut node = manufacturing_node("M1", Some(1400.0));
        node.storage_mode = StorageMode::Frozen;
        let map = read_nodes_from_iter([node].into_iter(), &mut issues);
        assert!(map.is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_demand_without_storage_is_rejected() {
        let mut issues = IssueList::new();
        let mut node = manufacturing_node("D1", None);
        node.can_manufacture = false;
        node.has_demand = true;
        node.can_store = false;
        let map = read_nodes_from_iter([node].into_iter(), &mut issues);
        assert!(map.is_empty());
        assert_eq!(issues.len(), 1);
    }
}
