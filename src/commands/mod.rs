pub mod admin;
pub mod config;
pub mod stats;

use crate::store::{ParsePeriodError, Period};

/// Resolves an optional `MM/YYYY` argument, defaulting to the current month.
/// Malformed input is rejected here, before any store call.
pub(crate) fn parse_period(arg: Option<&str>) -> Result<Period, ParsePeriodError> {
    match arg {
        Some(s) => s.parse(),
        None => Ok(Period::current()),
    }
}
