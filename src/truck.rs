//! Truck departure schedules.
//!
//! A truck schedule fixes which (route, day-of-week) combinations shipments may depart on. A
//! schedule with no day of week runs daily. Trucks with intermediate stops drop off at each stop
//! and share a single capacity across all drop-offs.
use crate::error::{IssueList, ValidationIssue};
use crate::id::{NodeID, define_id_getter};
use crate::input::*;
use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::Deserializer;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::Path;
use std::rc::Rc;

const TRUCKS_FILE_NAME: &str = "trucks.csv";

/// Units per case
pub const UNITS_PER_CASE: u32 = 10;
/// Cases per pallet
pub const CASES_PER_PALLET: u32 = 32;
/// Units per pallet (32 cases of 10 units)
pub const UNITS_PER_PALLET: u32 = UNITS_PER_CASE * CASES_PER_PALLET;
/// Pallets per truck
pub const PALLETS_PER_TRUCK: u32 = 44;

fn default_pallet_capacity() -> u32 {
    PALLETS_PER_TRUCK
}
fn default_units_per_pallet() -> u32 {
    UNITS_PER_PALLET
}
fn default_units_per_case() -> u32 {
    UNITS_PER_CASE
}

/// When in the day a truck departs
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, DeserializeLabeledStringEnum, SerializeLabeledStringEnum,
)]
pub enum DeparturePeriod {
    /// Departs in the morning
    #[string = "morning"]
    Morning,
    /// Departs in the afternoon
    #[string = "afternoon"]
    Afternoon,
}

/// Read a semicolon-separated list of node IDs (e.g. "LINEAGE;6130")
fn deserialise_stops<'de, D>(deserialiser: D) -> Result<Vec<NodeID>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(deserialiser)?;
    Ok(value
        .unwrap_or_default()
        .split(';')
        .filter(|stop| !stop.is_empty())
        .map(Into::into)
        .collect())
}

/// A scheduled truck departure
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TruckSchedule {
    /// Unique identifier for the schedule
    pub id: Rc<str>,
    /// The node the truck departs from
    pub origin: NodeID,
    /// The final drop-off node
    pub destination: NodeID,
    /// The day of week the truck runs on. Empty means the truck runs daily.
    #[serde(default, deserialize_with = "deserialise_day_of_week")]
    pub day_of_week: Option<Weekday>,
    /// When in the day the truck departs
    pub departure_period: DeparturePeriod,
    /// Capacity in units
    #[serde(deserialize_with = "deserialise_quantity")]
    pub capacity: f64,
    /// Fixed cost per departure
    pub cost_fixed: f64,
    /// Cost per unit shipped
    pub cost_per_unit: f64,
    /// Nodes the truck drops off at before the final destination, in visit order
    #[serde(default, deserialize_with = "deserialise_stops")]
    pub intermediate_stops: Vec<NodeID>,
    /// Pallet positions on the truck
    #[serde(default = "default_pallet_capacity")]
    pub pallet_capacity: u32,
    /// Units per pallet
    #[serde(default = "default_units_per_pallet")]
    pub units_per_pallet: u32,
    /// Units per case
    #[serde(default = "default_units_per_case")]
    pub units_per_case: u32,
}
define_id_getter! {TruckSchedule}

impl TruckSchedule {
    /// Whether the truck departs on the given date
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.day_of_week.is_none_or(|day| date.weekday() == day)
    }

    /// The full visit sequence: origin, intermediate stops, final destination
    pub fn visit_sequence(&self) -> Vec<NodeID> {
        let mut sequence = Vec::with_capacity(self.intermediate_stops.len() + 2);
        sequence.push(Rc::clone(&self.origin));
        sequence.extend(self.intermediate_stops.iter().cloned());
        sequence.push(Rc::clone(&self.destination));
        sequence
    }

    /// The (origin, destination) pairs this truck covers, one per drop-off.
    ///
    /// A truck with no intermediate stops covers a single pair. A truck with stops drops off at
    /// every stop, so each leg runs from the truck's origin to one drop-off point.
    pub fn drop_off_pairs(&self) -> Vec<(NodeID, NodeID)> {
        self.intermediate_stops
            .iter()
            .chain(std::iter::once(&self.destination))
            .map(|stop| (Rc::clone(&self.origin), Rc::clone(stop)))
            .collect()
    }
}

/// A map of [`TruckSchedule`]s, keyed by schedule ID. Iteration order is file order.
pub type TruckMap = IndexMap<Rc<str>, Rc<TruckSchedule>>;

/// Read truck schedules from the `trucks.csv` file in `model_dir`.
///
/// The file may legitimately be absent when no node requires truck schedules.
pub fn read_trucks(model_dir: &Path, issues: &mut IssueList) -> Result<TruckMap> {
    let file_path = model_dir.join(TRUCKS_FILE_NAME);
    if !file_path.is_file() {
        return Ok(TruckMap::new());
    }
    Ok(read_trucks_from_iter(read_csv(&file_path)?, issues))
}

fn read_trucks_from_iter<I>(iter: I, issues: &mut IssueList) -> TruckMap
where
    I: Iterator<Item = TruckSchedule>,
{
    let mut map = TruckMap::new();
    for truck in iter {
        if truck.capacity <= 0.0 {
            issues.push(ValidationIssue::new(
                "trucks",
                &truck.id,
                "capacity",
                "a positive capacity in units",
                truck.capacity,
            ));
            continue;
        }

        for (field, cost) in [
            ("cost_fixed", truck.cost_fixed),
            ("cost_per_unit", truck.cost_per_unit),
        ] {
            if check_nonnegative(cost).is_err() {
                issues.push(ValidationIssue::new(
                    "trucks",
                    &truck.id,
                    field,
                    "a finite, non-negative cost",
                    cost,
                ));
            }
        }

        if truck.origin == truck.destination {
            issues.push(ValidationIssue::new(
                "trucks",
                &truck.id,
                "destination",
                "a node other than the origin",
                &truck.destination,
            ));
            continue;
        }

        insert_unique(&mut map, truck, "trucks", issues);
    }

    map
}
