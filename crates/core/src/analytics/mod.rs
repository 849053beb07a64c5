//! View and visitor counters: result types, dedup windows and trend windows.

mod session;
mod trends;
mod types;

pub use session::{view_marker_expiry, visit_marker_expiry, VIEW_WINDOW_HOURS};
pub use trends::{
    last_months, month_label, zero_fill_days, zero_fill_months, DateRange, DateRangeError,
};
pub use types::{DailyTrend, MonthlyTrend, TopContent, TrackResult, ViewCount};
