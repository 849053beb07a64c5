//! Content view counters.
//!
//! A view counts once per session and content item within
//! [`VIEW_WINDOW_HOURS`](portfolio_core::analytics::VIEW_WINDOW_HOURS). The
//! session marker is claimed with a conditional write before the counter
//! moves, so concurrent first sights of the same (session, item) pair
//! increment once.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::try_join3;

use portfolio_core::analytics::{view_marker_expiry, TopContent, TrackResult, ViewCount};
use portfolio_core::clock::{Clock, SystemClock};
use portfolio_core::content::EntityKind;
use portfolio_core::storage::{
    keys, Condition, KeyCondition, Mutation, Query, Record, RecordStore, Result,
};

use super::support::{apply_best_effort, may_have_applied, query_all};

const VIEWS_ENTITY: &str = "VIEWS";
const SESSION_ENTITY: &str = "SESSION";
const CONTENT_ID: &str = "contentId";
const CONTENT_TYPE: &str = "contentType";
const VIEW_COUNT: &str = "viewCount";
const LAST_VIEWED: &str = "lastViewed";
const TOTAL_VIEWS: &str = "totalViews";
const LAST_UPDATED: &str = "lastUpdated";
const TRACKED_AT: &str = "trackedAt";

pub struct AnalyticsRepository<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for AnalyticsRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: RecordStore> AnalyticsRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for timestamps and marker expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Counts a view of `content_id` by `session_id` unless this session was
    /// already counted for it within the window.
    pub async fn track_view(
        &self,
        kind: EntityKind,
        content_id: &str,
        session_id: &str,
    ) -> Result<TrackResult> {
        let marker = keys::view_session_key(session_id, kind, content_id);
        let unchanged = |count| TrackResult {
            count,
            session_id: session_id.to_string(),
            counted: false,
        };

        if self.store.get(&marker, true).await?.is_some() {
            return Ok(unchanged(self.view_count(kind, content_id).await?));
        }

        let now = self.clock.now();
        let claim = Mutation::new()
            .set(keys::ENTITY_TYPE, SESSION_ENTITY)
            .set(TRACKED_AT, keys::timestamp_token(now))
            .set(keys::EXPIRES_AT, view_marker_expiry(now));
        let vacant = Condition::NotExists.or(Condition::less_than(
            keys::EXPIRES_AT,
            self.clock.epoch_seconds() + 1,
        ));
        if !self.store.update(&marker, &claim, Some(&vacant)).await?.is_updated() {
            tracing::debug!(%kind, content_id, session_id, "View already claimed");
            return Ok(unchanged(self.view_count(kind, content_id).await?));
        }

        let aggregate = keys::view_key(kind, content_id);
        let increment = Mutation::new()
            .set_if_absent(keys::ENTITY_TYPE, VIEWS_ENTITY)
            .set_if_absent(CONTENT_ID, content_id)
            .set_if_absent(CONTENT_TYPE, kind.as_str())
            .set(keys::GSI1PK, keys::view_index_pk(kind))
            .add(VIEW_COUNT, 1)
            .set(LAST_VIEWED, keys::timestamp_token(now));
        let count = match self.store.update(&aggregate, &increment, None).await {
            Ok(outcome) => outcome
                .into_record()
                .map(|record| record.get_count(VIEW_COUNT))
                .unwrap_or_default(),
            Err(err) if may_have_applied(&err) => {
                tracing::warn!(
                    session_id,
                    error = %err,
                    "Keeping view marker after ambiguous increment"
                );
                return Err(err);
            }
            Err(err) => {
                // Release the claim so a retry of this view can count it.
                if let Err(release) = self.store.delete(&marker, None).await {
                    tracing::warn!(session_id, error = %release, "Failed to release view marker");
                }
                return Err(err);
            }
        };

        // Only the writer that produced `count` may move the ranking token, so
        // a slower writer never replaces a newer one.
        let token = Mutation::new().set(keys::GSI1SK, keys::view_index_key(kind, count).sk);
        let current = Condition::equals(VIEW_COUNT, count);
        apply_best_effort(self.store.as_ref(), &aggregate, &token, Some(&current)).await;

        let total = Mutation::new()
            .set_if_absent(keys::ENTITY_TYPE, VIEWS_ENTITY)
            .add(TOTAL_VIEWS, 1)
            .set(LAST_UPDATED, keys::timestamp_token(now));
        apply_best_effort(self.store.as_ref(), &keys::view_total_key(), &total, None).await;

        tracing::debug!(%kind, content_id, count, "Counted view");
        Ok(TrackResult {
            count,
            session_id: session_id.to_string(),
            counted: true,
        })
    }

    pub async fn view_count(&self, kind: EntityKind, content_id: &str) -> Result<u64> {
        let record = self.store.get(&keys::view_key(kind, content_id), false).await?;
        Ok(record.map_or(0, |r| r.get_count(VIEW_COUNT)))
    }

    /// Views across every content item.
    pub async fn total_views(&self) -> Result<u64> {
        let record = self.store.get(&keys::view_total_key(), false).await?;
        Ok(record.map_or(0, |r| r.get_count(TOTAL_VIEWS)))
    }

    /// View counts of every tracked item of `kind`, by content id.
    pub async fn views_by_kind(&self, kind: EntityKind) -> Result<BTreeMap<String, u64>> {
        let query = Query::index(KeyCondition::Equals(keys::view_index_pk(kind)));
        let records = query_all(self.store.as_ref(), query).await?;
        Ok(records
            .iter()
            .filter_map(to_view_count)
            .map(|view| (view.content_id, view.views))
            .collect())
    }

    /// The `limit` most viewed items of each kind, highest first.
    pub async fn top_content(&self, limit: usize) -> Result<TopContent> {
        let (posts, projects, certifications) = try_join3(
            self.top_of(EntityKind::Post, limit),
            self.top_of(EntityKind::Project, limit),
            self.top_of(EntityKind::Certification, limit),
        )
        .await?;

        Ok(TopContent {
            posts,
            projects,
            certifications,
        })
    }

    async fn top_of(&self, kind: EntityKind, limit: usize) -> Result<Vec<ViewCount>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query = Query::index(KeyCondition::Equals(keys::view_index_pk(kind))).limit(limit);
        let page = self.store.query(&query).await?;
        Ok(page.records.iter().filter_map(to_view_count).collect())
    }
}

fn to_view_count(record: &Record) -> Option<ViewCount> {
    Some(ViewCount {
        content_id: record.get_str(CONTENT_ID)?.to_string(),
        views: record.get_count(VIEW_COUNT),
    })
}
