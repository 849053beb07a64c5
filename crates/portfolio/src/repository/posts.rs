//! Post repository: content operations plus category aggregates.
//!
//! Category counts are derived state. They move best-effort alongside post
//! writes and can be rebuilt from the post records with
//! [`PostRepository::reconcile_categories`].

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use portfolio_core::clock::{Clock, SystemClock};
use portfolio_core::content::{
    category_moves, CategoryCount, EntityKind, ListPage, ListQuery, NewPost, Post, PostData,
    PostFilter, PostPatch,
};
use portfolio_core::storage::{
    keys, Condition, KeyCondition, Mutation, Query, Record, RecordStore, Result, SortCondition,
    SortOrder,
};

use super::content::ContentRepository;
use super::support::{apply_best_effort, query_all};
use crate::config::Config;

const CATEGORY_ENTITY: &str = "CATEGORY";
const NAME: &str = "name";
const COUNT: &str = "count";
const LAST_UPDATED: &str = "lastUpdated";

pub struct PostRepository<S> {
    posts: ContentRepository<PostData, S>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for PostRepository<S> {
    fn clone(&self) -> Self {
        Self {
            posts: self.posts.clone(),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: RecordStore> PostRepository<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        Self {
            posts: ContentRepository::new(Arc::clone(&store), config),
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.posts = self.posts.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Creates a draft post and counts it in its category.
    pub async fn create(&self, input: NewPost) -> Result<Post> {
        let post = self.posts.create(input).await?;
        if let (_, Some(category)) = category_moves(None, Some(post.data.category.as_str())) {
            self.increment_category(category).await;
        }
        Ok(post)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        self.posts.get_by_id(id).await
    }

    /// Merges a partial update, moving the post between category counts when
    /// its category changed.
    pub async fn update(&self, id: Uuid, patch: &PostPatch) -> Result<Option<Post>> {
        let Some((before, after)) = self.posts.update_returning(id, patch).await? else {
            return Ok(None);
        };

        let (decrement, increment) = category_moves(
            Some(before.data.category.as_str()),
            Some(after.data.category.as_str()),
        );
        if let Some(category) = decrement {
            self.decrement_category(category).await;
        }
        if let Some(category) = increment {
            self.increment_category(category).await;
        }
        Ok(Some(after))
    }

    /// Deletes a post and uncounts it from its category.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some(deleted) = self.posts.delete_returning(id).await? else {
            return Ok(false);
        };
        if let (Some(category), _) = category_moves(Some(deleted.data.category.as_str()), None) {
            self.decrement_category(category).await;
        }
        Ok(true)
    }

    pub async fn publish(&self, id: Uuid) -> Result<Option<Post>> {
        self.posts.publish(id).await
    }

    pub async fn unpublish(&self, id: Uuid) -> Result<Option<Post>> {
        self.posts.unpublish(id).await
    }

    pub async fn list(&self, query: &ListQuery, filter: &PostFilter) -> Result<ListPage<Post>> {
        self.posts.list(query, filter).await
    }

    /// Every category aggregate, by name.
    pub async fn categories(&self) -> Result<Vec<CategoryCount>> {
        let query = Query::index(KeyCondition::Equals(keys::CATEGORY_PREFIX.to_string()))
            .order(SortOrder::Ascending);
        let records = query_all(self.store.as_ref(), query).await?;
        Ok(records.iter().filter_map(category_count).collect())
    }

    /// Recounts posts per category and overwrites every aggregate with the
    /// result. Categories without posts are set to zero.
    pub async fn reconcile_categories(&self) -> Result<Vec<CategoryCount>> {
        let query = Query::table(KeyCondition::BeginsWith(keys::entity_pk_prefix(
            EntityKind::Post,
        )))
        .sort(SortCondition::Equals(keys::METADATA_SK.to_string()));
        let posts = query_all(self.store.as_ref(), query).await?;

        let mut counts: BTreeMap<String, u64> = self
            .categories()
            .await?
            .into_iter()
            .map(|category| (category.name, 0))
            .collect();
        for post in &posts {
            if let Some(category) = post.get_str("Data.category").filter(|c| !c.is_empty()) {
                *counts.entry(category.to_string()).or_default() += 1;
            }
        }

        let now = keys::timestamp_token(self.clock.now());
        for (name, count) in &counts {
            let mutation = category_mutation(name, &now).set(COUNT, *count);
            self.store
                .update(&keys::category_key(name), &mutation, None)
                .await?;
        }

        tracing::info!(
            posts = posts.len(),
            categories = counts.len(),
            "Reconciled category counts"
        );
        Ok(counts
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect())
    }

    async fn increment_category(&self, name: &str) {
        let now = keys::timestamp_token(self.clock.now());
        let mutation = category_mutation(name, &now).add(COUNT, 1);
        apply_best_effort(self.store.as_ref(), &keys::category_key(name), &mutation, None).await;
    }

    async fn decrement_category(&self, name: &str) {
        let now = keys::timestamp_token(self.clock.now());
        let mutation = category_mutation(name, &now).add(COUNT, -1);
        let floor = Condition::greater_than(COUNT, 0);
        apply_best_effort(
            self.store.as_ref(),
            &keys::category_key(name),
            &mutation,
            Some(&floor),
        )
        .await;
    }
}

/// Identity and index projection of a category aggregate.
fn category_mutation(name: &str, now: &str) -> Mutation {
    let index_key = keys::category_index_key(name);
    Mutation::new()
        .set(keys::ENTITY_TYPE, CATEGORY_ENTITY)
        .set(NAME, name)
        .set(keys::GSI1PK, index_key.pk)
        .set(keys::GSI1SK, index_key.sk)
        .set(LAST_UPDATED, now)
}

fn category_count(record: &Record) -> Option<CategoryCount> {
    Some(CategoryCount {
        name: record.get_str(NAME)?.to_string(),
        count: record.get_count(COUNT),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use portfolio_core::clock::ManualClock;
    use portfolio_core::content::Status;
    use portfolio_core::storage::RepositoryError;

    use crate::repository::support::faults::FaultyStore;
    use crate::storage::InMemoryStore;

    fn setup() -> (PostRepository<InMemoryStore>, Arc<InMemoryStore>) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        let repo = PostRepository::new(Arc::clone(&store), &Config::default())
            .with_clock(Arc::new(clock));
        (repo, store)
    }

    fn post(title: &str, category: &str) -> NewPost {
        NewPost::new(title, "Some content").with_category(category)
    }

    fn counts(categories: &[CategoryCount]) -> Vec<(&str, u64)> {
        categories
            .iter()
            .map(|c| (c.name.as_str(), c.count))
            .collect()
    }

    #[tokio::test]
    async fn test_create_derives_slug_and_read_time() {
        let (repo, _) = setup();

        let long = repo
            .create(NewPost::new("Hello World", "word ".repeat(400)))
            .await
            .unwrap();
        let short = repo
            .create(NewPost::new("Short", "word ".repeat(10)))
            .await
            .unwrap();

        assert_eq!(long.data.slug, "hello-world");
        assert_eq!(long.data.read_time, 2);
        assert_eq!(short.data.read_time, 1);
        assert_eq!(long.status, Status::Draft);
    }

    #[tokio::test]
    async fn test_category_round_trip() {
        let (repo, _) = setup();
        let first = repo.create(post("One", "Backend")).await.unwrap();
        repo.create(post("Two", "Backend")).await.unwrap();
        repo.create(post("Three", "DevOps")).await.unwrap();

        assert!(repo.delete(first.id).await.unwrap());

        let categories = repo.categories().await.unwrap();
        assert_eq!(counts(&categories), vec![("Backend", 1), ("DevOps", 1)]);
    }

    #[tokio::test]
    async fn test_recategorize_moves_count() {
        let (repo, _) = setup();
        let created = repo.create(post("One", "Backend")).await.unwrap();

        let patch = PostPatch {
            category: Some("DevOps".to_string()),
            ..Default::default()
        };
        let updated = repo.update(created.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.data.category, "DevOps");

        let categories = repo.categories().await.unwrap();
        assert_eq!(counts(&categories), vec![("Backend", 0), ("DevOps", 1)]);
    }

    #[tokio::test]
    async fn test_update_recomputes_read_time() {
        let (repo, _) = setup();
        let created = repo.create(post("One", "Backend")).await.unwrap();

        let patch = PostPatch {
            content: Some("word ".repeat(400)),
            ..Default::default()
        };
        let updated = repo.update(created.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.data.read_time, 2);

        let categories = repo.categories().await.unwrap();
        assert_eq!(counts(&categories), vec![("Backend", 1)]);
    }

    #[tokio::test]
    async fn test_decrement_never_goes_below_zero() {
        let (repo, store) = setup();
        let created = repo.create(post("One", "Backend")).await.unwrap();
        store
            .update(
                &keys::category_key("Backend"),
                &Mutation::new().set(COUNT, 0),
                None,
            )
            .await
            .unwrap();

        assert!(repo.delete(created.id).await.unwrap());

        let categories = repo.categories().await.unwrap();
        assert_eq!(counts(&categories), vec![("Backend", 0)]);
    }

    #[tokio::test]
    async fn test_delete_missing_post() {
        let (repo, _) = setup();
        assert!(!repo.delete(Uuid::new_v4()).await.unwrap());
        assert!(repo.categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uncategorized_posts_are_not_counted() {
        let (repo, _) = setup();
        repo.create(NewPost::new("Loose", "body")).await.unwrap();
        assert!(repo.categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift() {
        let (repo, store) = setup();
        repo.create(post("One", "Backend")).await.unwrap();
        repo.create(post("Two", "Backend")).await.unwrap();
        repo.create(post("Three", "DevOps")).await.unwrap();

        // Drift: an inflated count and a stale category with no posts.
        store
            .update(
                &keys::category_key("Backend"),
                &Mutation::new().set(COUNT, 7),
                None,
            )
            .await
            .unwrap();
        let stale = category_mutation("Stale", "2024-01-01T00:00:00.000000Z").set(COUNT, 3);
        store
            .update(&keys::category_key("Stale"), &stale, None)
            .await
            .unwrap();

        let reconciled = repo.reconcile_categories().await.unwrap();
        assert_eq!(
            counts(&reconciled),
            vec![("Backend", 2), ("DevOps", 1), ("Stale", 0)]
        );
        assert_eq!(counts(&repo.categories().await.unwrap()), counts(&reconciled));
    }

    #[tokio::test]
    async fn test_list_filters_by_category() {
        let (repo, _) = setup();
        repo.create(post("One", "Backend")).await.unwrap();
        let devops = repo.create(post("Two", "DevOps")).await.unwrap();

        let filter = PostFilter {
            category: Some("DevOps".to_string()),
        };
        let page = repo.list(&ListQuery::default(), &filter).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, devops.id);
    }

    #[tokio::test]
    async fn test_publish_then_publish_again() {
        let (repo, _) = setup();
        let created = repo.create(post("One", "Backend")).await.unwrap();

        assert!(repo.publish(created.id).await.unwrap().is_some());
        assert!(repo.publish(created.id).await.unwrap().is_none());

        let drafts = repo
            .list(&ListQuery::status(Status::Draft), &PostFilter::default())
            .await
            .unwrap();
        assert!(drafts.items.is_empty());
    }

    fn faulty_setup() -> (PostRepository<FaultyStore>, Arc<FaultyStore>) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        let inner = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        let store = Arc::new(FaultyStore::new(inner));
        let repo = PostRepository::new(Arc::clone(&store), &Config::default())
            .with_clock(Arc::new(clock));
        (repo, store)
    }

    #[tokio::test]
    async fn test_category_failures_do_not_fail_writes() {
        let (repo, store) = faulty_setup();
        store.fail_updates(
            keys::CATEGORY_PREFIX,
            RepositoryError::ConnectionFailed("unreachable".into()),
        );

        let created = repo.create(post("One", "Backend")).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_some());
        assert!(repo.categories().await.unwrap().is_empty());

        repo.create(post("Two", "Backend")).await.unwrap();
        assert!(repo.delete(created.id).await.unwrap());

        store.heal();
        let reconciled = repo.reconcile_categories().await.unwrap();
        assert_eq!(counts(&reconciled), vec![("Backend", 1)]);
    }

    #[tokio::test]
    async fn test_update_reports_conflict_after_repeated_rejections() {
        let (repo, store) = faulty_setup();
        let created = repo.create(post("One", "Backend")).await.unwrap();
        store.reject_updates(&keys::entity_pk(EntityKind::Post, created.id));

        let patch = PostPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let result = repo.update(created.id, &patch).await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        let stored = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.data.title, "One");
    }
}
