//! Site visitor counters.
//!
//! A session counts once per calendar day (UTC). The session marker remembers
//! the day it was last counted for and expires the midnight after next.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::try_join_all;

use portfolio_core::analytics::{
    last_months, visit_marker_expiry, zero_fill_days, zero_fill_months, DailyTrend, DateRange,
    MonthlyTrend, TrackResult,
};
use portfolio_core::clock::{Clock, SystemClock};
use portfolio_core::storage::{
    keys, Condition, KeyCondition, Mutation, Query, RecordStore, RepositoryError, Result,
    SortCondition,
};

use super::support::{apply_best_effort, may_have_applied, query_all};

const DAILY_ENTITY: &str = "VISITOR_DAILY";
const TOTAL_ENTITY: &str = "VISITOR_TOTAL";
const SESSION_ENTITY: &str = "SESSION";
const DATE: &str = "date";
const COUNT: &str = "count";
const TOTAL_COUNT: &str = "totalCount";
const LAST_UPDATED: &str = "lastUpdated";
const LAST_TRACKED_DATE: &str = "lastTrackedDate";
const LAST_TRACKED_TIME: &str = "lastTrackedTime";

pub struct VisitorRepository<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for VisitorRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: RecordStore> VisitorRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for day boundaries and marker expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Counts `session_id` as today's visitor unless it was already counted
    /// today. Returns today's visitor count.
    pub async fn track_visitor(&self, session_id: &str) -> Result<TrackResult> {
        let now = self.clock.now();
        let today = now.date_naive();
        let today_token = keys::date_token(today);
        let marker = keys::visit_session_key(session_id);
        let unchanged = |count| TrackResult {
            count,
            session_id: session_id.to_string(),
            counted: false,
        };

        let seen = self.store.get(&marker, true).await?;
        if seen.is_some_and(|m| m.get_str(LAST_TRACKED_DATE) == Some(today_token.as_str())) {
            return Ok(unchanged(self.daily_count(today).await?));
        }

        let claim = Mutation::new()
            .set(keys::ENTITY_TYPE, SESSION_ENTITY)
            .set(LAST_TRACKED_DATE, today_token.as_str())
            .set(LAST_TRACKED_TIME, keys::timestamp_token(now))
            .set(keys::EXPIRES_AT, visit_marker_expiry(now));
        let vacant = Condition::NotExists
            .or(Condition::less_than(
                keys::EXPIRES_AT,
                self.clock.epoch_seconds() + 1,
            ))
            .or(Condition::not_equals(LAST_TRACKED_DATE, today_token.as_str()));
        if !self.store.update(&marker, &claim, Some(&vacant)).await?.is_updated() {
            tracing::debug!(session_id, date = %today_token, "Visit already claimed");
            return Ok(unchanged(self.daily_count(today).await?));
        }

        let index_key = keys::daily_visitor_index_key(today);
        let increment = Mutation::new()
            .set_if_absent(keys::ENTITY_TYPE, DAILY_ENTITY)
            .set_if_absent(DATE, today_token.as_str())
            .set(keys::GSI1PK, index_key.pk)
            .set(keys::GSI1SK, index_key.sk)
            .add(COUNT, 1)
            .set(LAST_UPDATED, keys::timestamp_token(now));
        let count = match self
            .store
            .update(&keys::daily_visitor_key(today), &increment, None)
            .await
        {
            Ok(outcome) => outcome
                .into_record()
                .map(|record| record.get_count(COUNT))
                .unwrap_or_default(),
            Err(err) if may_have_applied(&err) => {
                tracing::warn!(
                    session_id,
                    error = %err,
                    "Keeping visit marker after ambiguous increment"
                );
                return Err(err);
            }
            Err(err) => {
                // Release the claim so a retry of this visit can count it.
                if let Err(release) = self.store.delete(&marker, None).await {
                    tracing::warn!(session_id, error = %release, "Failed to release visit marker");
                }
                return Err(err);
            }
        };

        let total = Mutation::new()
            .set_if_absent(keys::ENTITY_TYPE, TOTAL_ENTITY)
            .add(TOTAL_COUNT, 1)
            .set(LAST_UPDATED, keys::timestamp_token(now));
        apply_best_effort(self.store.as_ref(), &keys::visitor_total_key(), &total, None).await;

        tracing::debug!(date = %today_token, count, "Counted visitor");
        Ok(TrackResult {
            count,
            session_id: session_id.to_string(),
            counted: true,
        })
    }

    /// Visitors counted since tracking began.
    pub async fn total_visitors(&self) -> Result<u64> {
        let record = self.store.get(&keys::visitor_total_key(), false).await?;
        Ok(record.map_or(0, |r| r.get_count(TOTAL_COUNT)))
    }

    pub async fn daily_count(&self, date: NaiveDate) -> Result<u64> {
        let record = self.store.get(&keys::daily_visitor_key(date), false).await?;
        Ok(record.map_or(0, |r| r.get_count(COUNT)))
    }

    /// Visitors per day for the last `days` days including today, oldest
    /// first. Days without visits are reported as zero.
    pub async fn daily_trends(&self, days: u32) -> Result<Vec<DailyTrend>> {
        let Some(range) = DateRange::last_days(self.clock.now().date_naive(), days) else {
            return Ok(Vec::new());
        };

        let day_keys: Vec<_> = range.dates().map(keys::daily_visitor_key).collect();
        let records = self.store.batch_get(&day_keys).await?;

        let counts: HashMap<NaiveDate, u64> = records
            .iter()
            .filter_map(|record| {
                let date = NaiveDate::parse_from_str(record.get_str(DATE)?, "%Y-%m-%d").ok()?;
                Some((date, record.get_count(COUNT)))
            })
            .collect();

        Ok(zero_fill_days(range, &counts))
    }

    /// Visitors per calendar month for the last `months` months including the
    /// current one, oldest first. Months without visits are reported as zero.
    pub async fn monthly_trends(&self, months: u32) -> Result<Vec<MonthlyTrend>> {
        let window = last_months(self.clock.now().date_naive(), months);

        let sums = window.iter().map(|&(year, month)| async move {
            let range = DateRange::month(year, month)
                .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
            let query = Query::index(KeyCondition::Equals(keys::VISITOR_DAILY_PREFIX.to_string()))
                .sort(SortCondition::Between(
                    keys::date_token(range.start),
                    keys::date_token(range.end),
                ));
            let records = query_all(self.store.as_ref(), query).await?;
            let visitors: u64 = records.iter().map(|r| r.get_count(COUNT)).sum();
            Ok::<_, RepositoryError>(((year, month), visitors))
        });
        let totals: HashMap<(i32, u32), u64> = try_join_all(sums).await?.into_iter().collect();

        Ok(zero_fill_months(&window, &totals))
    }
}
