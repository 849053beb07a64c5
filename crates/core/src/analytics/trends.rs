//! Trend windows and zero-filling.

use std::collections::HashMap;

use chrono::{Datelike, Days, Months, NaiveDate};
use thiserror::Error;

use super::types::{DailyTrend, MonthlyTrend};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    #[error("Invalid date range: start date must be before or equal to end date")]
    InvalidRange,
    #[error("Invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}

/// A date range with inclusive start and end dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new date range, validating that start <= end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    /// Creates a date range for an entire month.
    pub fn month(year: i32, month: u32) -> Result<Self, DateRangeError> {
        let invalid = DateRangeError::InvalidMonth { year, month };
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or(invalid.clone())?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or(invalid)?;
        Ok(Self { start, end })
    }

    /// The `days` days ending with `today`, or `None` for an empty window.
    pub fn last_days(today: NaiveDate, days: u32) -> Option<Self> {
        let start = today.checked_sub_days(Days::new(u64::from(days.checked_sub(1)?)))?;
        Some(Self { start, end: today })
    }

    /// Every date in the range, oldest first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |date| *date <= end)
    }
}

/// The `months` calendar months ending with the month of `today`, oldest first.
pub fn last_months(today: NaiveDate, months: u32) -> Vec<(i32, u32)> {
    let Some(first_of_month) = today.with_day(1) else {
        return Vec::new();
    };
    (0..months)
        .rev()
        .filter_map(|back| first_of_month.checked_sub_months(Months::new(back)))
        .map(|date| (date.year(), date.month()))
        .collect()
}

/// Label of a calendar month.
///
/// Pattern: `2024-03`
pub fn month_label(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// One entry per date of `range`, oldest first, zero where nothing was counted.
pub fn zero_fill_days(range: DateRange, counts: &HashMap<NaiveDate, u64>) -> Vec<DailyTrend> {
    range
        .dates()
        .map(|date| DailyTrend {
            date,
            visitors: counts.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

/// One entry per month, in the order given, zero where nothing was counted.
pub fn zero_fill_months(
    months: &[(i32, u32)],
    totals: &HashMap<(i32, u32), u64>,
) -> Vec<MonthlyTrend> {
    months
        .iter()
        .map(|&(year, month)| MonthlyTrend {
            month: month_label(year, month),
            visitors: totals.get(&(year, month)).copied().unwrap_or(0),
        })
        .collect()
}
