//! Common routines for handling input data.
use crate::error::{IssueList, ValidationIssue};
use crate::id::HasID;
use anyhow::{Context, Result, ensure};
use chrono::Weekday;
use indexmap::IndexMap;
use itertools::Itertools;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

/// The largest quantity accepted in any input record.
///
/// Values at or above this are taken to be data-entry errors (e.g. a barcode pasted into a
/// quantity column) and rejected during validation.
pub const MAX_REASONABLE_QUANTITY: f64 = 1e6;

/// Read a series of type `T`s from a CSV file.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = csv::Reader::from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec.into_iter())
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read an f64, checking that it is a finite, non-negative quantity below the sanity limit
pub fn deserialise_quantity<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: f64 = Deserialize::deserialize(deserialiser)?;
    if !value.is_finite() || value < 0.0 || value >= MAX_REASONABLE_QUANTITY {
        Err(serde::de::Error::custom(format!(
            "Quantity must be in the range [0, {MAX_REASONABLE_QUANTITY})"
        )))?;
    }

    Ok(value)
}

/// Read an optional day of the week from its English name (e.g. "tuesday" or "tue").
///
/// An empty field means the schedule runs daily.
pub fn deserialise_day_of_week<'de, D>(deserialiser: D) -> Result<Option<Weekday>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Deserialize::deserialize(deserialiser)?;
    match value.as_deref() {
        None | Some("") => Ok(None),
        Some(name) => Weekday::from_str(name)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("Unknown day of week: {name}"))),
    }
}

/// Check that a rate or cost field is finite and non-negative
pub fn check_nonnegative(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "Value must be a finite, non-negative number (got {value})"
    );
    Ok(())
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().to_string_lossy())
}

/// Insert a record into an ID-keyed map, recording a duplicate ID as an issue
pub fn insert_unique<T: HasID>(
    map: &mut IndexMap<Rc<str>, Rc<T>>,
    record: T,
    domain: &str,
    issues: &mut IssueList,
) {
    let id: Rc<str> = record.get_id().into();
    if map.insert(Rc::clone(&id), record.into()).is_some() {
        issues.push(ValidationIssue::new(
            domain,
            &id,
            "id",
            format!("a unique {domain} ID"),
            format!("duplicate of {id}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde::de::IntoDeserializer;
    use serde::de::value::{Error as ValueError, F64Deserializer};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    /// Test a normal read
    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id,value\nhello,1\nworld,2").unwrap();
        }
        let records: Vec<Record> = read_csv(&file_path).unwrap().collect();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 1,
                },
                Record {
                    id: "world".to_string(),
                    value: 2,
                }
            ]
        );
    }

    #[test]
    fn test_read_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id = \"hello\"\nvalue = 1").unwrap();
        }

        assert_eq!(
            read_toml::<Record>(&file_path).unwrap(),
            Record {
                id: "hello".to_string(),
                value: 1,
            }
        );

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "bad toml syntax").unwrap();
        }

        assert!(read_toml::<Record>(&file_path).is_err());
    }

    /// Deserialise value with deserialise_quantity()
    fn deserialise_f64(value: f64) -> Result<f64, ValueError> {
        let deserialiser: F64Deserializer<ValueError> = value.into_deserializer();
        deserialise_quantity(deserialiser)
    }

    #[test]
    fn test_deserialise_quantity() {
        // Valid inputs
        assert_eq!(deserialise_f64(0.0), Ok(0.0));
        assert_eq!(deserialise_f64(250.0), Ok(250.0));
        assert_eq!(deserialise_f64(999_999.0), Ok(999_999.0));

        // Invalid inputs
        assert!(deserialise_f64(-1.0).is_err());
        assert!(deserialise_f64(1e6).is_err());
        assert!(deserialise_f64(f64::NAN).is_err());
        assert!(deserialise_f64(f64::INFINITY).is_err());
    }
}
