use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid service month {value:?}: expected MM/YYYY")]
pub struct PeriodError {
    value: String,
}

/// Service month of an invoice line.
///
/// The portal renders months as `08/2025` in some views and `8/2025` in
/// others; both parse to the same period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServicePeriod {
    year: i32,
    month: u32,
}

impl ServicePeriod {
    pub fn new(month: u32, year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Number of calendar days in this month.
    pub fn days_in_month(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .map(|d| d.day())
            .unwrap_or(31)
    }

    pub fn contains_day(&self, day: u8) -> bool {
        day >= 1 && u32::from(day) <= self.days_in_month()
    }
}

impl fmt::Display for ServicePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

impl FromStr for ServicePeriod {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeriodError {
            value: s.to_string(),
        };
        let (month, year) = s.trim().split_once('/').ok_or_else(err)?;
        let month: u32 = month.trim().parse().map_err(|_| err())?;
        let year: i32 = year.trim().parse().map_err(|_| err())?;
        Self::new(month, year).ok_or_else(err)
    }
}

impl TryFrom<String> for ServicePeriod {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServicePeriod> for String {
    fn from(value: ServicePeriod) -> Self {
        value.to_string()
    }
}
