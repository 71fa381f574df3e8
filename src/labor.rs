//! The labor calendar.
//!
//! Each date in the planning window carries the labor rules for that day: fixed days (normal
//! working days) pay a regular rate up to the fixed hours and an overtime rate beyond them;
//! non-fixed days (weekends, holidays) pay a premium rate with a minimum callout payment.
use crate::error::{IssueList, ValidationIssue};
use crate::input::*;
use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const LABOR_FILE_NAME: &str = "labor_calendar.csv";

/// Labor rules for a single date
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LaborDay {
    /// The date these rules apply to
    pub date: NaiveDate,
    /// Whether this is a normal working day
    pub is_fixed_day: bool,
    /// Hours paid at the regular rate on a fixed day (e.g. 12)
    pub fixed_hours: f64,
    /// Hard ceiling on hours worked in this day (e.g. 14)
    pub max_hours: f64,
    /// Pay rate for regular hours
    pub regular_rate: f64,
    /// Pay rate for overtime hours on a fixed day
    pub overtime_rate: f64,
    /// Pay rate for hours on a non-fixed day
    pub non_fixed_rate: f64,
    /// Minimum hours paid when any production happens on a non-fixed day (e.g. 4)
    #[serde(default)]
    pub min_paid_hours: f64,
}

/// The labor calendar: one [`LaborDay`] per date, ordered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaborCalendar(BTreeMap<NaiveDate, LaborDay>);

impl LaborCalendar {
    /// Create a calendar from an iterator of days. Duplicate dates are an error.
    pub fn from_days<I>(days: I, issues: &mut IssueList) -> Self
    where
        I: Iterator<Item = LaborDay>,
    {
        let mut map = BTreeMap::new();
        for day in days {
            if day.fixed_hours < 0.0 || day.max_hours < day.fixed_hours {
                issues.push(ValidationIssue::new(
                    "labor_calendar",
                    day.date,
                    "max_hours",
                    format!("at least fixed_hours ({})", day.fixed_hours),
                    day.max_hours,
                ));
                continue;
            }

            for (field, rate) in [
                ("regular_rate", day.regular_rate),
                ("overtime_rate", day.overtime_rate),
                ("non_fixed_rate", day.non_fixed_rate),
                ("min_paid_hours", day.min_paid_hours),
            ] {
                if check_nonnegative(rate).is_err() {
                    issues.push(ValidationIssue::new(
                        "labor_calendar",
                        day.date,
                        field,
                        "a finite, non-negative number",
                        rate,
                    ));
                }
            }

            let date = day.date;
            if map.insert(date, day).is_some() {
                issues.push(ValidationIssue::new(
                    "labor_calendar",
                    date,
                    "date",
                    "a unique date",
                    format!("duplicate entry for {date}"),
                ));
            }
        }
        Self(map)
    }

    /// The labor rules for the given date, if present
    pub fn get(&self, date: NaiveDate) -> Option<&LaborDay> {
        self.0.get(&date)
    }

    /// Iterate over days in date order
    pub fn iter(&self) -> impl Iterator<Item = &LaborDay> {
        self.0.values()
    }

    /// The largest `max_hours` over the calendar, used for variable bounds
    pub fn max_daily_hours(&self) -> f64 {
        self.0.values().map(|day| day.max_hours).fold(0.0, f64::max)
    }

    /// Whether the calendar is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dates in the given range missing from the calendar
    pub fn missing_dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|date| *date <= end)
            .filter(|date| !self.0.contains_key(date))
            .collect()
    }
}

/// Read the labor calendar from the `labor_calendar.csv` file in `model_dir`
pub fn read_labor_calendar(model_dir: &Path, issues: &mut IssueList) -> Result<LaborCalendar> {
    let file_path = model_dir.join(LABOR_FILE_NAME);
    Ok(LaborCalendar::from_days(read_csv(&file_path)?, issues))
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn labor_day(date: NaiveDate, is_fixed_day: bool) -> LaborDay {
        LaborDay {
            date,
            is_fixed_day,
            fixed_hours: if is_fixed_day { 12.0 } else { 0.0 },
            max_hours: 14.0,
            regular_rate: 25.0,
            overtime_rate: 37.5,
            non_fixed_rate: 50.0,
            min_paid_hours: if is_fixed_day { 0.0 } else { 4.0 },
        }
    }

    #[test]
    fn test_missing_dates() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let mut issues = IssueList::new();
        let calendar = LaborCalendar::from_days(
            [labor_day(start, true), labor_day(start + chrono::Days::new(2), true)].into_iter(),
            &mut issues,
        );
        assert!(issues.is_empty());
        assert_eq!(
            calendar.missing_dates(start, start + chrono::Days::new(2)),
            vec![start + chrono::Days::new(1)]
        );
    }

    #[test]
    fn test_max_below_fixed_is_an_issue() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let mut day = labor_day(start, true);
        day.max_hours = 10.0;
        let mut issues = IssueList::new();
        let calendar = LaborCalendar::from_days([day].into_iter(), &mut issues);
        assert!(calendar.is_empty());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_max_daily_hours() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let mut issues = IssueList::new();
        let calendar =
            LaborCalendar::from_days([labor_day(start, true)].into_iter(), &mut issues);
        assert_eq!(calendar.max_daily_hours(), 14.0);
    }
}
