//! Products and their storage states.
//!
//! A product is an SKU with an indivisible batch size (`units_per_mix`) and a shelf life per
//! storage state. Thawing frozen stock resets its remaining life to the thawed shelf life.
use crate::error::{IssueList, ValidationIssue};
use crate::id::{ProductID, define_id_getter};
use crate::input::*;
use anyhow::Result;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use strum::EnumIter;

const PRODUCTS_FILE_NAME: &str = "products.csv";

/// Default shelf life for frozen stock, in days
pub const DEFAULT_SHELF_LIFE_FROZEN_DAYS: u32 = 120;
/// Default shelf life for ambient stock, in days
pub const DEFAULT_SHELF_LIFE_AMBIENT_DAYS: u32 = 17;
/// Default shelf life for thawed stock, in days
pub const DEFAULT_SHELF_LIFE_THAWED_DAYS: u32 = 14;

fn default_frozen_days() -> u32 {
    DEFAULT_SHELF_LIFE_FROZEN_DAYS
}
fn default_ambient_days() -> u32 {
    DEFAULT_SHELF_LIFE_AMBIENT_DAYS
}
fn default_thawed_days() -> u32 {
    DEFAULT_SHELF_LIFE_THAWED_DAYS
}

/// The storage state of stock, at rest or in transit
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeserializeLabeledStringEnum,
    SerializeLabeledStringEnum,
)]
pub enum StorageState {
    /// Stock held or moved frozen
    #[string = "frozen"]
    Frozen,
    /// Fresh stock held or moved at ambient temperature
    #[string = "ambient"]
    Ambient,
    /// Previously frozen stock that has been thawed
    #[string = "thawed"]
    Thawed,
}

impl StorageState {
    /// The lower-case label used in input files and composite keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Frozen => "frozen",
            Self::Ambient => "ambient",
            Self::Thawed => "thawed",
        }
    }
}

impl fmt::Display for StorageState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product (SKU) in the planning problem
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Product {
    /// Unique identifier for the product (e.g. "6122")
    pub id: Rc<str>,
    /// Customer-facing description (e.g. "HELGAS GFREE TRAD WHITE 470G")
    pub name: String,
    /// Shelf life when held at ambient temperature
    #[serde(default = "default_ambient_days")]
    pub shelf_life_ambient_days: u32,
    /// Shelf life when held frozen
    #[serde(default = "default_frozen_days")]
    pub shelf_life_frozen_days: u32,
    /// Shelf life after thawing. Thawing resets the remaining life to this value.
    #[serde(default = "default_thawed_days")]
    pub shelf_life_thawed_days: u32,
    /// The indivisible production batch size, in units
    pub units_per_mix: u32,
}
define_id_getter! {Product}

impl Product {
    /// Shelf life in days for stock held in the given state
    pub fn shelf_life_days(&self, state: StorageState) -> u32 {
        match state {
            StorageState::Frozen => self.shelf_life_frozen_days,
            StorageState::Ambient => self.shelf_life_ambient_days,
            StorageState::Thawed => self.shelf_life_thawed_days,
        }
    }
}

/// A map of [`Product`]s, keyed by product ID. Iteration order is file order.
pub type ProductMap = IndexMap<ProductID, Rc<Product>>;

/// Read products from the `products.csv` file in `model_dir`.
///
/// Field-level problems are recorded in `issues`; I/O and parse failures are returned directly.
pub fn read_products(model_dir: &Path, issues: &mut IssueList) -> Result<ProductMap> {
    let file_path = model_dir.join(PRODUCTS_FILE_NAME);
    let products = read_products_from_iter(read_csv(&file_path)?, issues);
    if products.is_empty() && issues.is_empty() {
        issues.push(ValidationIssue::new(
            "products",
            PRODUCTS_FILE_NAME,
            "rows",
            "at least one product",
            "an empty file",
        ));
    }
    Ok(products)
}

fn read_products_from_iter<I>(iter: I, issues: &mut IssueList) -> ProductMap
where
    I: Iterator<Item = Product>,
{
    let mut map = ProductMap::new();
    for product in iter {
        if product.units_per_mix == 0 {
            issues.push(ValidationIssue::new(
                "products",
                &product.id,
                "units_per_mix",
                "a positive integer",
                product.units_per_mix,
            ));
            continue;
        }

        for (field, value) in [
            ("shelf_life_ambient_days", product.shelf_life_ambient_days),
            ("shelf_life_frozen_days", product.shelf_life_frozen_days),
            ("shelf_life_thawed_days", product.shelf_life_thawed_days),
        ] {
            if value == 0 {
                issues.push(ValidationIssue::new(
                    "products",
                    &product.id,
                    field,
                    "at least one day",
                    value,
                ));
            }
        }

        insert_unique(&mut map, product, "products", issues);
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, units_per_mix: u32) -> Product {
        Product {
            id: id.into(),
            name: format!("product {id}"),
            shelf_life_ambient_days: 17,
            shelf_life_frozen_days: 120,
            shelf_life_thawed_days: 14,
            units_per_mix,
        }
    }

    #[test]
    fn test_shelf_life_days() {
        let p = product("6122", 100);
        assert_eq!(p.shelf_life_days(StorageState::Frozen), 120);
        assert_eq!(p.shelf_life_days(StorageState::Ambient), 17);
        assert_eq!(p.shelf_life_days(StorageState::Thawed), 14);
    }

    #[test]
    fn test_read_products_from_iter() {
        let mut issues = IssueList::new();
        let map = read_products_from_iter(
            [product("6122", 100), product("6125", 60)].into_iter(),
            &mut issues,
        );
        assert!(issues.is_empty());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_zero_mix_size_is_an_issue() {
        let mut issues = IssueList::new();
        let map = read_products_from_iter([product("6122", 0)].into_iter(), &mut issues);
        assert!(map.is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_an_issue() {
        let mut issues = IssueList::new();
        let map = read_products_from_iter(
            [product("6122", 100), product("6122", 100)].into_iter(),
            &mut issues,
        );
        assert_eq!(map.len(), 1);
        assert_eq!(issues.len(), 1);
    }
}
