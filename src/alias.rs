//! Product alias resolution.
//!
//! Inventory and forecast files refer to products inconsistently: some carry the canonical
//! product ID, some an internal SKU code, some a customer-facing name. Resolution runs in three
//! tiers: exact ID match, product-name match, then the alias table. An unresolved reference is
//! fatal; the pipeline never degrades it to a warning and skips the record.
use crate::error::{IssueList, ValidationIssue};
use crate::id::ProductID;
use crate::input::input_err_msg;
use crate::product::ProductMap;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

const ALIAS_FILE_NAME: &str = "aliases.csv";

/// One row of the alias table: a canonical reference and its alternatives
#[derive(Debug, Clone, PartialEq)]
pub struct AliasRow {
    /// The canonical reference (column 1). Must itself resolve via tier 1 or 2.
    pub canonical: String,
    /// Alternative references (columns 2 onwards)
    pub aliases: Vec<String>,
}

/// Read the alias table from `aliases.csv` in `model_dir`.
///
/// The file is headerless with a variable number of columns per row. Its absence is non-fatal:
/// resolution simply runs with tiers 1 and 2 only, and any reference that needed the table shows
/// up as an unresolved-reference error.
pub fn read_alias_table(model_dir: &Path) -> Result<Vec<AliasRow>> {
    let file_path = model_dir.join(ALIAS_FILE_NAME);
    if !file_path.is_file() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&file_path)
        .with_context(|| input_err_msg(&file_path))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| input_err_msg(&file_path))?;
        let mut fields = record.iter().map(str::trim).filter(|f| !f.is_empty());
        let Some(canonical) = fields.next() else {
            continue;
        };
        rows.push(AliasRow {
            canonical: canonical.to_string(),
            aliases: fields.map(ToString::to_string).collect(),
        });
    }

    Ok(rows)
}

/// Resolves free-form product references to canonical product IDs
#[derive(Debug, Default)]
pub struct ProductResolver {
    /// Tier 1: exact product IDs
    by_id: HashMap<Rc<str>, ProductID>,
    /// Tier 2: product names
    by_name: HashMap<String, ProductID>,
    /// Tier 3: entries from the alias table
    aliases: HashMap<String, ProductID>,
}

impl ProductResolver {
    /// Build a resolver from the product table and the (possibly empty) alias table.
    ///
    /// Alias rows whose canonical reference is itself unknown are recorded as issues; their
    /// aliases are dropped so that later lookups fail loudly rather than resolving to a phantom
    /// product.
    pub fn new(products: &ProductMap, alias_rows: &[AliasRow], issues: &mut IssueList) -> Self {
        let mut resolver = Self::default();
        for (id, product) in products {
            resolver.by_id.insert(Rc::clone(id), Rc::clone(id));
            resolver
                .by_name
                .insert(product.name.clone(), Rc::clone(id));
        }

        for row in alias_rows {
            let Some(canonical) = resolver.resolve_exact(&row.canonical) else {
                issues.push(ValidationIssue::new(
                    "aliases",
                    &row.canonical,
                    "canonical",
                    "a known product ID or name in column 1",
                    &row.canonical,
                ));
                continue;
            };

            for alias in &row.aliases {
                resolver.aliases.insert(alias.clone(), Rc::clone(&canonical));
            }
            // The canonical reference maps to itself, so resolution is idempotent even when the
            // table lists a product name in column 1.
            resolver
                .aliases
                .insert(row.canonical.clone(), canonical);
        }

        resolver
    }

    /// Tiers 1 and 2 only: exact ID, then product name
    fn resolve_exact(&self, reference: &str) -> Option<ProductID> {
        self.by_id
            .get(reference)
            .or_else(|| self.by_name.get(reference))
            .cloned()
    }

    /// Resolve a reference to a canonical product ID, trying all three tiers in order
    pub fn resolve(&self, reference: &str) -> Option<ProductID> {
        self.resolve_exact(reference)
            .or_else(|| self.aliases.get(reference).cloned())
    }

    /// Resolve a reference, recording an issue in `issues` when it cannot be resolved.
    ///
    /// The issue field is always "product" so that the pipeline can classify an all-unresolved
    /// failure as an alias-resolution error.
    pub fn resolve_or_report(
        &self,
        reference: &str,
        domain: &str,
        record: &str,
        issues: &mut IssueList,
    ) -> Option<ProductID> {
        let resolved = self.resolve(reference);
        if resolved.is_none() {
            issues.push(ValidationIssue::new(
                domain,
                record,
                "product",
                "a known product ID, name or alias",
                reference,
            ));
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Product;

    fn products() -> ProductMap {
        let mut map = ProductMap::new();
        for (id, name) in [
            ("6122", "HELGAS GFREE TRAD WHITE 470G"),
            ("6125", "HELGAS GFREE MIXED GRAIN 500G"),
        ] {
            map.insert(
                id.into(),
                Product {
                    id: id.into(),
                    name: name.to_string(),
                    shelf_life_ambient_days: 17,
                    shelf_life_frozen_days: 120,
                    shelf_life_thawed_days: 14,
                    units_per_mix: 100,
                }
                .into(),
            );
        }
        map
    }

    fn alias_rows() -> Vec<AliasRow> {
        vec![AliasRow {
            canonical: "6122".to_string(),
            aliases: vec!["168846".to_string(), "GF WHITE".to_string()],
        }]
    }

    #[test]
    fn test_three_tier_resolution() {
        let mut issues = IssueList::new();
        let resolver = ProductResolver::new(&products(), &alias_rows(), &mut issues);
        assert!(issues.is_empty());

        // Tier 1: exact ID
        assert_eq!(resolver.resolve("6122").unwrap(), "6122".into());
        // Tier 2: product name
        assert_eq!(
            resolver.resolve("HELGAS GFREE TRAD WHITE 470G").unwrap(),
            "6122".into()
        );
        // Tier 3: alias table
        assert_eq!(resolver.resolve("168846").unwrap(), "6122".into());
        assert_eq!(resolver.resolve("GF WHITE").unwrap(), "6122".into());

        // Unknown reference
        assert!(resolver.resolve("199999").is_none());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut issues = IssueList::new();
        let resolver = ProductResolver::new(&products(), &alias_rows(), &mut issues);
        let canonical = resolver.resolve("168846").unwrap();
        assert_eq!(resolver.resolve(&canonical).unwrap(), canonical);
    }

    #[test]
    fn test_unknown_canonical_is_an_issue() {
        let rows = vec![AliasRow {
            canonical: "no_such_product".to_string(),
            aliases: vec!["x".to_string()],
        }];
        let mut issues = IssueList::new();
        let resolver = ProductResolver::new(&products(), &rows, &mut issues);
        assert_eq!(issues.len(), 1);
        // The orphaned alias must not resolve
        assert!(resolver.resolve("x").is_none());
    }

    #[test]
    fn test_unresolved_reference_is_reported() {
        let mut issues = IssueList::new();
        let resolver = ProductResolver::new(&products(), &[], &mut issues);
        assert!(
            resolver
                .resolve_or_report("168846", "inventory", "LINEAGE|168846", &mut issues)
                .is_none()
        );
        assert_eq!(issues.len(), 1);
    }
}
