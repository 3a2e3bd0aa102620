//! Shared utility functions for the desertification data crates.

/// Date utility functions
pub mod dates {
    use crate::error::DateError;
    use chrono::{Local, Months, NaiveDate};

    /// First day of the month and first day of the following month.
    ///
    /// The end is exclusive, matching how upstream collections are filtered
    /// by date.
    pub fn month_window(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), DateError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DateError(format!("invalid year/month {}-{:02}", year, month)))?;
        let end = shift_months(start, 1)?;
        Ok((start, end))
    }

    /// Move a date by a signed number of months.
    pub fn shift_months(date: NaiveDate, months: i32) -> Result<NaiveDate, DateError> {
        let shifted = if months >= 0 {
            date.checked_add_months(Months::new(months as u32))
        } else {
            date.checked_sub_months(Months::new(months.unsigned_abs()))
        };
        shifted.ok_or_else(|| DateError(format!("cannot shift {} by {} months", date, months)))
    }

    /// Local timestamp in ISO 8601 with microseconds, e.g. `2024-03-01T10:15:30.123456`.
    pub fn now_iso() -> String {
        Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string()
    }

    /// Compact local timestamp used in per-run file names, e.g. `20240301_101530`.
    pub fn run_stamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

}

/// Key formatting shared by the soil cache and the checkpoint file
pub mod keys {
    /// Cache key for a location and year: coordinates rounded to 3 decimals.
    ///
    /// Month is deliberately absent; soil properties are annual.
    pub fn cache_key(latitude: f64, longitude: f64, year: i32) -> String {
        format!("{:.3}_{:.3}_{}", latitude, longitude, year)
    }

    /// Checkpoint task id, e.g. `Tanta_Farms_2019_03`.
    pub fn task_id(location: &str, year: i32, month: u32) -> String {
        format!("{}_{}_{:02}", location, year, month)
    }

}

/// Error types
pub mod error {
    use std::fmt;

    #[derive(Debug)]
    pub struct DateError(pub String);

    impl fmt::Display for DateError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Date error: {}", self.0)
        }
    }

    impl std::error::Error for DateError {}
}
