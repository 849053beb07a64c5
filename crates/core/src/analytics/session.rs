//! Dedup windows for session markers.

use chrono::{DateTime, Days, Duration, Utc};

/// How long a content view marker suppresses repeat counting.
pub const VIEW_WINDOW_HOURS: i64 = 24;

/// Expiry of a content view marker written at `now`, in epoch seconds.
pub fn view_marker_expiry(now: DateTime<Utc>) -> i64 {
    (now + Duration::hours(VIEW_WINDOW_HOURS)).timestamp()
}

/// Expiry of a visit marker written at `now`: the midnight after next, in
/// epoch seconds.
///
/// The marker also records the day it was counted for, which is what decides
/// whether a later sight counts again.
pub fn visit_marker_expiry(now: DateTime<Utc>) -> i64 {
    now.date_naive()
        .checked_add_days(Days::new(2))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_else(|| (now + Duration::days(2)).timestamp())
}
