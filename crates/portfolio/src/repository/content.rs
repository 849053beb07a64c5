//! Generic repository for content entities.
//!
//! One implementation serves posts, projects and certifications. Every write
//! is a single conditional update of the entity record, so the primary record
//! and its index projection always move together.

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::try_join_all;
use uuid::Uuid;

use portfolio_core::clock::{Clock, SystemClock};
use portfolio_core::content::{
    transition, transition_source, ContentData, ContentRecord, Filter, ListPage, ListQuery,
    NewContent, Patch, Status,
};
use portfolio_core::storage::{
    keys, merge_pages, Condition, KeyCondition, MergedCursor, Mutation, Query, RecordStore,
    RepositoryError, Result, StreamPage, Target, UpdateOutcome,
};

use super::conversions::{content_to_record, record_to_content};
use crate::config::Config;

/// Compare-and-swap rounds before a contended write gives up.
const WRITE_ATTEMPTS: usize = 3;

/// Repository for one content kind, selected by the payload type `D`.
pub struct ContentRepository<D, S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: Config,
    _kind: PhantomData<fn() -> D>,
}

impl<D, S> Clone for ContentRepository<D, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            _kind: PhantomData,
        }
    }
}

impl<D: ContentData, S: RecordStore> ContentRepository<D, S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: config.clone(),
            _kind: PhantomData,
        }
    }

    /// Replaces the time source used for timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates a new draft.
    pub async fn create(&self, input: impl NewContent<D>) -> Result<ContentRecord<D>> {
        let now = self.clock.now();
        let content = ContentRecord::draft(Uuid::new_v4(), input.build(now), now);
        let record = content_to_record(&content)?;

        self.store.put(&record).await?;
        tracing::debug!(kind = %D::KIND, id = %content.id, "Created draft");
        // Stored timestamps carry microsecond precision; report what a read returns.
        record_to_content(&record)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ContentRecord<D>>> {
        self.read(id, false).await
    }

    /// Merges a partial update. Returns `None` when the entity does not exist
    /// and [`RepositoryError::Conflict`] when concurrent writers keep winning.
    pub async fn update(
        &self,
        id: Uuid,
        patch: &impl Patch<D>,
    ) -> Result<Option<ContentRecord<D>>> {
        Ok(self.update_returning(id, patch).await?.map(|(_, after)| after))
    }

    /// Like [`ContentRepository::update`], also returning the state it replaced.
    pub(crate) async fn update_returning(
        &self,
        id: Uuid,
        patch: &impl Patch<D>,
    ) -> Result<Option<(ContentRecord<D>, ContentRecord<D>)>> {
        for _ in 0..WRITE_ATTEMPTS {
            let Some(current) = self.read(id, true).await? else {
                return Ok(None);
            };

            let mut next = current.clone();
            patch.apply(&mut next.data);
            next.updated_at = self.clock.now();
            next.version = current.version + 1;

            let index_key = next.index_key();
            let mutation = Mutation::new()
                .set(keys::DATA, serde_json::to_value(&next.data)?)
                .set(keys::UPDATED_AT, keys::timestamp_token(next.updated_at))
                .set(keys::VERSION, next.version)
                .set(keys::GSI1PK, index_key.pk)
                .set(keys::GSI1SK, index_key.sk);
            let condition = Condition::equals(keys::VERSION, current.version);

            match self.store.update(&current.key(), &mutation, Some(&condition)).await? {
                UpdateOutcome::Updated(record) => {
                    return Ok(Some((current, record_to_content(&record)?)));
                }
                UpdateOutcome::Missing => return Ok(None),
                UpdateOutcome::Rejected => {
                    tracing::debug!(kind = %D::KIND, %id, "Version moved during update, retrying");
                }
            }
        }

        tracing::warn!(kind = %D::KIND, %id, "Update abandoned after repeated conflicts");
        Err(RepositoryError::Conflict(keys::entity_pk(D::KIND, id)))
    }

    /// Deletes the entity. Returns false when it did not exist.
    ///
    /// Fails with [`RepositoryError::Conflict`] when concurrent writers keep
    /// moving its version.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.delete_returning(id).await?.is_some())
    }

    /// Like [`ContentRepository::delete`], returning the deleted state.
    pub(crate) async fn delete_returning(&self, id: Uuid) -> Result<Option<ContentRecord<D>>> {
        for _ in 0..WRITE_ATTEMPTS {
            let Some(current) = self.read(id, true).await? else {
                return Ok(None);
            };

            let condition = Condition::equals(keys::VERSION, current.version);
            if self.store.delete(&current.key(), Some(&condition)).await? {
                tracing::debug!(kind = %D::KIND, %id, "Deleted");
                return Ok(Some(current));
            }
        }

        tracing::warn!(kind = %D::KIND, %id, "Delete abandoned after repeated conflicts");
        Err(RepositoryError::Conflict(keys::entity_pk(D::KIND, id)))
    }

    /// Moves a draft to PUBLISHED. `None` when missing or already published.
    pub async fn publish(&self, id: Uuid) -> Result<Option<ContentRecord<D>>> {
        self.transition_to(id, Status::Published).await
    }

    /// Moves a published entity back to DRAFT. `None` when missing or not published.
    pub async fn unpublish(&self, id: Uuid) -> Result<Option<ContentRecord<D>>> {
        self.transition_to(id, Status::Draft).await
    }

    async fn transition_to(&self, id: Uuid, target: Status) -> Result<Option<ContentRecord<D>>> {
        let source = transition_source(target);

        for _ in 0..WRITE_ATTEMPTS {
            let Some(current) = self.read(id, true).await? else {
                return Ok(None);
            };
            if current.status != source {
                tracing::debug!(
                    kind = %D::KIND,
                    %id,
                    status = %current.status,
                    %target,
                    "Transition is a no-op"
                );
                return Ok(None);
            }

            let next = transition(&current, target, self.clock.now());
            let index_key = next.index_key();
            let mut mutation = Mutation::new()
                .set(keys::STATUS, target.as_str())
                .set(keys::UPDATED_AT, keys::timestamp_token(next.updated_at))
                .set(keys::VERSION, next.version)
                .set(keys::GSI1PK, index_key.pk)
                .set(keys::GSI1SK, index_key.sk);
            mutation = match next.published_at {
                Some(at) => mutation.set(keys::PUBLISHED_AT, keys::timestamp_token(at)),
                None => mutation.remove(keys::PUBLISHED_AT),
            };
            let condition = Condition::equals(keys::STATUS, source.as_str())
                .and(Condition::equals(keys::VERSION, current.version));

            match self.store.update(&current.key(), &mutation, Some(&condition)).await? {
                UpdateOutcome::Updated(record) => {
                    tracing::debug!(kind = %D::KIND, %id, status = %target, "Status changed");
                    return Ok(Some(record_to_content(&record)?));
                }
                UpdateOutcome::Missing => return Ok(None),
                // Another writer got there first; the re-read decides between
                // retrying and reporting a no-op.
                UpdateOutcome::Rejected => {}
            }
        }

        tracing::warn!(
            kind = %D::KIND,
            %id,
            %target,
            "Transition abandoned after repeated conflicts"
        );
        Ok(None)
    }

    /// Lists entities newest first.
    ///
    /// Without a status the listing spans every status. Each index partition
    /// read is one stream of a merged cursor, so the page token continues the
    /// combined ordering.
    pub async fn list(
        &self,
        query: &ListQuery,
        filter: &impl Filter,
    ) -> Result<ListPage<ContentRecord<D>>> {
        let limit = self.config.page_size(query.limit);
        let statuses = match query.status {
            Some(status) => vec![status],
            None => Status::ALL.to_vec(),
        };
        let scopes = filter.scopes().unwrap_or_else(D::all_scopes);
        let streams: Vec<String> = statuses
            .iter()
            .flat_map(|status| {
                scopes
                    .iter()
                    .map(|scope| keys::index_pk(D::KIND, *status, scope.as_deref()))
            })
            .collect();

        let cursor = MergedCursor::resume(query.page_token.as_deref(), &streams)?;
        let condition = filter.condition();

        let reads = cursor.open_streams().into_iter().map(|(stream, start)| {
            let query = Query::index(KeyCondition::Equals(stream.to_string()))
                .filter(condition.clone())
                .limit(limit)
                .start(start.cloned());
            async move {
                let page = self.store.query(&query).await?;
                Ok::<_, RepositoryError>(StreamPage {
                    stream: stream.to_string(),
                    page,
                })
            }
        });
        let pages = try_join_all(reads).await?;

        let (records, next) = merge_pages(&cursor, pages, Target::Index, limit);
        let items = records
            .iter()
            .map(record_to_content)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListPage {
            items,
            next_page_token: next.to_token()?,
        })
    }

    async fn read(&self, id: Uuid, consistent: bool) -> Result<Option<ContentRecord<D>>> {
        let key = keys::entity_key(D::KIND, id);
        self.store
            .get(&key, consistent)
            .await?
            .map(|record| record_to_content(&record))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use futures_util::future::join_all;
    use portfolio_core::clock::ManualClock;
    use portfolio_core::content::{
        CertificationData, CertificationFilter, CertificationPatch, CertificationType,
        NewCertification, NewProject, ProjectData, ProjectFilter, ProjectPatch,
    };

    use crate::storage::InMemoryStore;

    type Projects = ContentRepository<ProjectData, InMemoryStore>;

    fn setup<D: ContentData>() -> (ContentRepository<D, InMemoryStore>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        let repo =
            ContentRepository::new(store, &Config::default()).with_clock(Arc::new(clock.clone()));
        (repo, clock)
    }

    fn project(name: &str) -> NewProject {
        ProjectData {
            name: name.to_string(),
            description: format!("{name} description"),
            ..Default::default()
        }
    }

    async fn create_projects(repo: &Projects, clock: &ManualClock, names: &[&str]) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for name in names {
            ids.push(repo.create(project(name)).await.unwrap().id);
            clock.advance(Duration::minutes(1));
        }
        ids
    }

    fn names(page: &ListPage<ContentRecord<ProjectData>>) -> Vec<&str> {
        page.items.iter().map(|p| p.data.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_then_get_is_draft() {
        let (repo, _) = setup::<ProjectData>();

        let created = repo.create(project("Portfolio")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(fetched.status, Status::Draft);
        assert_eq!(fetched.created_at, fetched.updated_at);
        assert_eq!(fetched.published_at, None);
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_matches_stored_record_with_system_clock() {
        let repo: Projects =
            ContentRepository::new(Arc::new(InMemoryStore::new()), &Config::default());

        let created = repo.create(project("Portfolio")).await.unwrap();
        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(created.created_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (repo, _) = setup::<ProjectData>();
        assert!(repo.get_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_and_refreshes_updated_at() {
        let (repo, clock) = setup::<ProjectData>();
        let created = repo.create(project("Portfolio")).await.unwrap();
        clock.advance(Duration::minutes(5));

        let patch = ProjectPatch {
            featured: Some(true),
            ..Default::default()
        };
        let updated = repo.update(created.id, &patch).await.unwrap().unwrap();

        assert!(updated.data.featured);
        assert_eq!(updated.data.name, "Portfolio");
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.updated_at, created.updated_at + Duration::minutes(5));
        assert_eq!(updated.version, created.version + 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_none() {
        let (repo, _) = setup::<ProjectData>();
        let result = repo
            .update(Uuid::new_v4(), &ProjectPatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (repo, _) = setup::<ProjectData>();
        let created = repo.create(project("Portfolio")).await.unwrap();

        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_twice_is_noop() {
        let (repo, clock) = setup::<ProjectData>();
        let created = repo.create(project("Portfolio")).await.unwrap();
        clock.advance(Duration::hours(1));

        let published = repo.publish(created.id).await.unwrap().unwrap();
        assert_eq!(published.status, Status::Published);
        assert_eq!(published.published_at, Some(clock.now()));

        assert!(repo.publish(created.id).await.unwrap().is_none());
        let stored = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored, published);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_has_one_winner() {
        let (repo, _) = setup::<ProjectData>();

        for round in 0..20 {
            let created = repo.create(project(&format!("p{round}"))).await.unwrap();
            let id = created.id;
            let attempts = (0..4).map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.publish(id).await })
            });

            let winners = join_all(attempts)
                .await
                .into_iter()
                .map(|joined| joined.unwrap().unwrap())
                .filter(Option::is_some)
                .count();
            assert_eq!(winners, 1);

            let stored = repo.get_by_id(created.id).await.unwrap().unwrap();
            assert_eq!(stored.status, Status::Published);
            assert_eq!(stored.version, created.version + 1);
        }
    }

    #[tokio::test]
    async fn test_unpublish_only_from_published() {
        let (repo, _) = setup::<ProjectData>();
        let created = repo.create(project("Portfolio")).await.unwrap();

        assert!(repo.unpublish(created.id).await.unwrap().is_none());

        repo.publish(created.id).await.unwrap().unwrap();
        let draft = repo.unpublish(created.id).await.unwrap().unwrap();
        assert_eq!(draft.status, Status::Draft);
        assert_eq!(draft.published_at, None);
    }

    #[tokio::test]
    async fn test_transitions_on_missing_entity_are_none() {
        let (repo, _) = setup::<ProjectData>();
        assert!(repo.publish(Uuid::new_v4()).await.unwrap().is_none());
        assert!(repo.unpublish(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_status_matches_current_status() {
        let (repo, clock) = setup::<ProjectData>();
        let ids = create_projects(&repo, &clock, &["a", "b", "c", "d"]).await;

        repo.publish(ids[0]).await.unwrap();
        repo.publish(ids[2]).await.unwrap();
        repo.update(ids[2], &ProjectPatch::default()).await.unwrap();
        repo.unpublish(ids[0]).await.unwrap();
        repo.publish(ids[3]).await.unwrap();

        for status in Status::ALL {
            let page = repo.list(&ListQuery::status(status), &()).await.unwrap();
            assert!(page.items.iter().all(|p| p.status == status));
        }

        let published = repo
            .list(&ListQuery::status(Status::Published), &())
            .await
            .unwrap();
        let mut published_ids: Vec<Uuid> = published.items.iter().map(|p| p.id).collect();
        published_ids.sort();
        let mut expected = vec![ids[2], ids[3]];
        expected.sort();
        assert_eq!(published_ids, expected);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let (repo, clock) = setup::<ProjectData>();
        create_projects(&repo, &clock, &["oldest", "middle", "newest"]).await;

        let page = repo
            .list(&ListQuery::status(Status::Draft), &())
            .await
            .unwrap();
        assert_eq!(names(&page), vec!["newest", "middle", "oldest"]);
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_list_all_statuses_paginates_across_merge() {
        let (repo, clock) = setup::<ProjectData>();
        let ids = create_projects(&repo, &clock, &["p1", "p2", "p3", "p4", "p5"]).await;
        // Published records order by publish time, drafts by creation time.
        repo.publish(ids[1]).await.unwrap();
        clock.advance(Duration::minutes(1));
        repo.publish(ids[3]).await.unwrap();

        let mut seen = Vec::new();
        let mut query = ListQuery::default().with_limit(2);
        loop {
            let page = repo.list(&query, &()).await.unwrap();
            assert!(page.items.len() <= 2);
            seen.extend(names(&page).into_iter().map(str::to_string));
            match page.next_page_token {
                Some(token) => query = query.with_page_token(token),
                None => break,
            }
        }

        assert_eq!(seen, vec!["p4", "p2", "p5", "p3", "p1"]);
    }

    #[tokio::test]
    async fn test_list_filter_by_featured() {
        let (repo, clock) = setup::<ProjectData>();
        let ids = create_projects(&repo, &clock, &["plain", "star"]).await;
        let patch = ProjectPatch {
            featured: Some(true),
            ..Default::default()
        };
        repo.update(ids[1], &patch).await.unwrap();

        let filter = ProjectFilter {
            featured: Some(true),
        };
        let page = repo.list(&ListQuery::default(), &filter).await.unwrap();
        assert_eq!(names(&page), vec!["star"]);
    }

    #[tokio::test]
    async fn test_list_rejects_foreign_token() {
        let (repo, _) = setup::<ProjectData>();
        let token = MergedCursor::new(["OTHER#STREAM"])
            .to_token()
            .unwrap()
            .unwrap();

        let result = repo
            .list(&ListQuery::default().with_page_token(token), &())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_page_size_is_clamped() {
        let (repo, clock) = setup::<ProjectData>();
        create_projects(&repo, &clock, &["a", "b"]).await;

        let page = repo
            .list(&ListQuery::default().with_limit(0), &())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_page_token.is_some());
    }

    #[tokio::test]
    async fn test_certifications_ordered_by_date_earned_within_type() {
        let (repo, _) = setup::<CertificationData>();

        let mut older = NewCertification::new("Older", "Issuer");
        older.date_earned = Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        let mut newer = NewCertification::new("Newer", "Issuer");
        newer.date_earned = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let mut course = NewCertification::new("Course", "Academy");
        course.kind = CertificationType::Course;

        repo.create(older).await.unwrap();
        repo.create(newer).await.unwrap();
        let course = repo.create(course).await.unwrap();

        let filter = CertificationFilter {
            kind: Some(CertificationType::Certification),
            featured: None,
        };
        let page = repo.list(&ListQuery::default(), &filter).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|c| c.data.name.as_str()).collect();
        assert_eq!(names, vec!["Newer", "Older"]);

        let all = repo.list(&ListQuery::default(), &()).await.unwrap();
        assert_eq!(all.items.len(), 3);
        assert_eq!(all.items[0].id, course.id);
    }

    #[tokio::test]
    async fn test_certification_type_change_moves_index() {
        let (repo, _) = setup::<CertificationData>();
        let created = repo
            .create(NewCertification::new("CKA", "CNCF"))
            .await
            .unwrap();

        let patch = CertificationPatch {
            kind: Some(CertificationType::Course),
            ..Default::default()
        };
        repo.update(created.id, &patch).await.unwrap().unwrap();

        let courses = CertificationFilter {
            kind: Some(CertificationType::Course),
            featured: None,
        };
        let page = repo.list(&ListQuery::default(), &courses).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, created.id);
    }
}
