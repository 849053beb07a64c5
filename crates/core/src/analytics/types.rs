use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// View count of one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCount {
    pub content_id: String,
    pub views: u64,
}

/// Most viewed items per content kind, highest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopContent {
    pub posts: Vec<ViewCount>,
    pub projects: Vec<ViewCount>,
    pub certifications: Vec<ViewCount>,
}

/// Outcome of tracking a view or a visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    /// Counter value after tracking.
    pub count: u64,
    pub session_id: String,
    /// False when the session had already been counted within its window.
    pub counted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub visitors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub visitors: u64,
}
