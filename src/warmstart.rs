//! Warmstart hint generation.
//!
//! An optional accelerator: a weekly demand-weighted campaign pattern suggesting which products
//! to run on which days. Hints cover the `product_produced` binaries only; open-source solvers
//! ignore hints on continuous variables. Invalid hints are discarded wholesale so a bad pattern
//! can never corrupt the solve.
use crate::id::{NodeID, ProductID};
use crate::model::{PlanningData, PlanningWindow};
use crate::optimisation::VariableMap;
use chrono::{Datelike, NaiveDate, Weekday};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{info, warn};
use std::rc::Rc;

/// Products scheduled per weekday, by default
const DEFAULT_SKUS_PER_WEEKDAY: usize = 3;

/// Suggested values for the `product_produced` binaries
#[derive(Debug, Default)]
pub struct ProductionHints(IndexMap<(NodeID, ProductID, NaiveDate), bool>);

impl ProductionHints {
    /// Number of hinted (node, product, date) combinations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no hints were produced
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a combination is hinted on
    pub fn is_set(&self, node: &str, product: &str, date: NaiveDate) -> bool {
        self.0
            .iter()
            .any(|((n, p, d), set)| *set && &**n == node && &**p == product && *d == date)
    }

    /// Iterate over the hinted combinations
    pub fn iter(&self) -> impl Iterator<Item = (&(NodeID, ProductID, NaiveDate), &bool)> {
        self.0.iter()
    }

    /// Expand the hints into one value per column (zeros elsewhere), ready for the solver's
    /// MIP-start interface
    pub fn to_column_values(
        &self,
        vars: &VariableMap,
        window: &PlanningWindow,
        num_cols: usize,
    ) -> Vec<f64> {
        let mut values = vec![0.0; num_cols];
        for ((node, product, date), set) in &self.0 {
            if !set {
                continue;
            }
            let Some(day) = window.index_of(*date) else {
                continue;
            };
            if let Some(var) = vars
                .product_produced
                .get(&(Rc::clone(node), Rc::clone(product), day))
            {
                values[var.index] = 1.0;
            }
        }

        values
    }
}

/// Generate campaign-pattern hints for the planning data.
///
/// Returns `None` (and the solve proceeds cold) when the demand or calendar gives the pattern
/// nothing to work with, or when the generated hints fail their own validation.
pub fn generate_hints(data: &PlanningData) -> Option<ProductionHints> {
    let hints = build_campaign_pattern(data, DEFAULT_SKUS_PER_WEEKDAY);
    if hints.is_empty() {
        info!("No warmstart hints generated; solving cold");
        return None;
    }

    if let Err(reason) = validate_hints(&hints, data) {
        warn!("Discarding warmstart hints: {reason}");
        return None;
    }

    info!("Generated {} warmstart hints", hints.len());
    Some(hints)
}

/// Allocate production days per product proportional to weekly demand share, roughly K SKUs per
/// weekday, keeping weekends free where the week allows it
fn build_campaign_pattern(data: &PlanningData, skus_per_weekday: usize) -> ProductionHints {
    let mut hints = ProductionHints::default();

    let weeks: Vec<Vec<NaiveDate>> = data
        .window
        .iter_days()
        .chunk_by(NaiveDate::iso_week)
        .into_iter()
        .map(|(_, days)| days.collect())
        .collect();

    for node in data.nodes.values().filter(|n| n.can_manufacture) {
        for week_days in &weeks {
            // Weekend days are used only when the week has no weekdays at all
            let mut production_days: Vec<NaiveDate> = week_days
                .iter()
                .copied()
                .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
                .collect();
            if production_days.is_empty() {
                production_days.clone_from(week_days);
            }

            // Demand share per product over this week, across all demand nodes
            let mut weekly_demand: IndexMap<ProductID, f64> = IndexMap::new();
            for ((_, product, date), quantity) in &data.demand {
                if week_days.contains(date) {
                    *weekly_demand.entry(Rc::clone(product)).or_default() += quantity;
                }
            }
            let total: f64 = weekly_demand.values().sum();
            if total <= 0.0 {
                continue;
            }

            let slots = production_days.len() * skus_per_weekday;
            let mut assignments_per_day = vec![0usize; production_days.len()];

            // Largest demand first; each product claims days proportional to its share
            let mut products: Vec<_> = weekly_demand.into_iter().collect();
            products.sort_by(|a, b| b.1.total_cmp(&a.1));

            for (product, quantity) in products {
                let share = quantity / total;
                let days_wanted =
                    ((share * slots as f64).round() as usize).clamp(1, production_days.len());

                // Spread the campaign over the least-loaded weekdays
                let mut day_order: Vec<usize> = (0..production_days.len()).collect();
                day_order.sort_by_key(|i| assignments_per_day[*i]);

                for day_index in day_order.into_iter().take(days_wanted) {
                    if assignments_per_day[day_index] >= skus_per_weekday {
                        continue;
                    }
                    assignments_per_day[day_index] += 1;
                    hints.0.insert(
                        (
                            Rc::clone(&node.id),
                            Rc::clone(&product),
                            production_days[day_index],
                        ),
                        true,
                    );
                }
            }
        }
    }

    hints
}

/// Check that every hint is binary, every date is inside the window and every product exists
fn validate_hints(hints: &ProductionHints, data: &PlanningData) -> Result<(), String> {
    for (node, product, date) in hints.0.keys() {
        if !data.window.contains(*date) {
            return Err(format!("hint date {date} outside the planning window"));
        }
        if !data.products.contains_key(product) {
            return Err(format!("hint references unknown product {product}"));
        }
        if !data.nodes.get(node).is_some_and(|n| n.can_manufacture) {
            return Err(format!("hint references non-manufacturing node {node}"));
        }
    }

    Ok(())
}
