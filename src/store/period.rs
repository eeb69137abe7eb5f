use chrono::{Datelike, Utc};
use std::fmt;
use std::str::FromStr;

/// One month of accumulation, the unit of reporting and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (1970..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The current UTC month.
    pub fn current() -> Self {
        let now = Utc::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid date format '{0}'. Use MM/YYYY (e.g: 09/2025)")]
pub struct ParsePeriodError(String);

impl FromStr for Period {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParsePeriodError(s.to_string());
        let (month, year) = s.split_once('/').ok_or_else(invalid)?;
        let month: u32 = month.trim().parse().map_err(|_| invalid())?;
        let year: i32 = year.trim().parse().map_err(|_| invalid())?;
        Period::new(year, month).ok_or_else(invalid)
    }
}
