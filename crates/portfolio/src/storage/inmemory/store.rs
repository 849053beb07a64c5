//! In-memory record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use portfolio_core::clock::{Clock, SystemClock};
use portfolio_core::storage::{
    keys, Attributes, Condition, KeyCondition, Mutation, Page, Query, Record, RecordKey,
    RecordStore, RepositoryError, Result, SortOrder, StartKey, Target, UpdateOutcome,
};

/// In-memory storage backend for testing.
///
/// Mirrors the DynamoDB backend's semantics: conditional writes, a sparse
/// secondary index, `limit` counted before the filter, start-key pagination
/// and expiry of records whose `ExpiresAt` has passed.
#[derive(Clone)]
pub struct InMemoryStore {
    items: Arc<RwLock<BTreeMap<RecordKey, Attributes>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that evaluates expiry against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            items: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
        }
    }

    /// Number of stored records, expired ones included.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    fn now(&self) -> i64 {
        self.clock.epoch_seconds()
    }
}

fn live<'a>(
    items: &'a BTreeMap<RecordKey, Attributes>,
    key: &RecordKey,
    now: i64,
) -> Option<&'a Attributes> {
    items
        .get(key)
        .filter(|attributes| !is_expired(attributes, now))
}

fn is_expired(attributes: &Attributes, now: i64) -> bool {
    attributes
        .get(keys::EXPIRES_AT)
        .and_then(serde_json::Value::as_i64)
        .is_some_and(|at| at <= now)
}

fn to_record(key: &RecordKey, attributes: &Attributes) -> Record {
    Record {
        key: key.clone(),
        attributes: attributes.clone(),
    }
}

fn failed(condition: Option<&Condition>, current: Option<&Attributes>) -> bool {
    condition.is_some_and(|c| !c.evaluate(current))
}

/// Key values of a record as seen by `target`, or `None` if it is not projected.
fn target_keys(record: &Record, target: Target) -> Option<(&str, &str)> {
    match target {
        Target::Table => Some((&record.key.pk, &record.key.sk)),
        Target::Index => Some((
            record.get_str(target.partition_attribute())?,
            record.get_str(target.sort_attribute())?,
        )),
    }
}

type Position = (String, String, String, String);

fn record_position(record: &Record, target: Target) -> Option<Position> {
    let (partition, sort) = target_keys(record, target)?;
    Some((
        partition.to_string(),
        sort.to_string(),
        record.key.pk.clone(),
        record.key.sk.clone(),
    ))
}

fn start_position(start: &StartKey, target: Target) -> Position {
    let get = |name: &str| start.get(name).unwrap_or_default().to_string();
    (
        get(target.partition_attribute()),
        get(target.sort_attribute()),
        get(keys::PK),
        get(keys::SK),
    )
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get(&self, key: &RecordKey, _consistent: bool) -> Result<Option<Record>> {
        let items = self.items.read().await;
        Ok(live(&items, key, self.now()).map(|attributes| to_record(key, attributes)))
    }

    async fn put(&self, record: &Record) -> Result<()> {
        let mut items = self.items.write().await;
        items.insert(record.key.clone(), record.attributes.clone());
        Ok(())
    }

    async fn update(
        &self,
        key: &RecordKey,
        mutation: &Mutation,
        condition: Option<&Condition>,
    ) -> Result<UpdateOutcome> {
        let mut items = self.items.write().await;
        let current = live(&items, key, self.now());

        if failed(condition, current) {
            return Ok(match current {
                Some(_) => UpdateOutcome::Rejected,
                None => UpdateOutcome::Missing,
            });
        }

        let mut attributes = current.cloned().unwrap_or_default();
        mutation
            .apply(&mut attributes)
            .map_err(RepositoryError::QueryFailed)?;
        let record = to_record(key, &attributes);
        items.insert(key.clone(), attributes);
        Ok(UpdateOutcome::Updated(record))
    }

    async fn delete(&self, key: &RecordKey, condition: Option<&Condition>) -> Result<bool> {
        let mut items = self.items.write().await;
        let current = live(&items, key, self.now());

        if failed(condition, current) {
            return Ok(false);
        }
        let existed = current.is_some();
        items.remove(key);
        Ok(existed)
    }

    async fn query(&self, query: &Query) -> Result<Page> {
        let items = self.items.read().await;
        let now = self.now();
        let target = query.target;

        let mut matching: Vec<(Position, Record)> = items
            .iter()
            .filter(|(_, attributes)| !is_expired(attributes, now))
            .map(|(key, attributes)| to_record(key, attributes))
            .filter_map(|record| {
                let position = record_position(&record, target)?;
                let partition_matches = match &query.partition {
                    KeyCondition::Equals(value) => position.0 == *value,
                    KeyCondition::BeginsWith(prefix) => position.0.starts_with(prefix.as_str()),
                };
                let sort_matches = query.sort.as_ref().is_none_or(|s| s.matches(&position.1));
                (partition_matches && sort_matches).then_some((position, record))
            })
            .collect();

        matching.sort_by(|(a, _), (b, _)| a.cmp(b));
        if query.order == SortOrder::Descending {
            matching.reverse();
        }

        if let Some(start) = &query.start {
            let start = start_position(start, target);
            matching.retain(|(position, _)| match query.order {
                SortOrder::Ascending => *position > start,
                SortOrder::Descending => *position < start,
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        let has_more = matching.len() > limit;
        matching.truncate(limit);

        let next = match (has_more, matching.last()) {
            (true, Some((_, last))) => Some(StartKey::from_record(last, target)),
            _ => None,
        };

        let records = matching
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| {
                query
                    .filter
                    .as_ref()
                    .is_none_or(|filter| filter.evaluate(Some(&record.attributes)))
            })
            .collect();

        Ok(Page { records, next })
    }

    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<Record>> {
        let items = self.items.read().await;
        let now = self.now();
        Ok(keys
            .iter()
            .filter_map(|key| live(&items, key, now).map(|attributes| to_record(key, attributes)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use portfolio_core::clock::ManualClock;
    use portfolio_core::storage::SortCondition;
    use serde_json::json;

    fn key(pk: &str, sk: &str) -> RecordKey {
        RecordKey::new(pk, sk)
    }

    fn indexed(pk: &str, gsi1pk: &str, gsi1sk: &str) -> Record {
        Record::new(key(pk, keys::METADATA_SK))
            .with(keys::GSI1PK, gsi1pk)
            .with(keys::GSI1SK, gsi1sk)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryStore::new();
        let record = Record::new(key("POST#1", "METADATA")).with("Status", "DRAFT");

        store.put(&record).await.unwrap();

        let retrieved = store.get(&record.key, false).await.unwrap();
        assert_eq!(retrieved, Some(record));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = InMemoryStore::new();
        let result = store.get(&key("POST#1", "METADATA"), true).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unconditional_update_upserts() {
        let store = InMemoryStore::new();
        let k = key("ANALYTICS#TOTAL", "VIEWS");

        let outcome = store
            .update(&k, &Mutation::new().add("totalViews", 1), None)
            .await
            .unwrap();

        let record = outcome.into_record().unwrap();
        assert_eq!(record.get_i64("totalViews"), Some(1));
    }

    #[tokio::test]
    async fn test_conditional_update_rejected_vs_missing() {
        let store = InMemoryStore::new();
        let k = key("POST#1", "METADATA");
        let publish = Mutation::new().set("Status", "PUBLISHED");
        let from_draft = Condition::equals("Status", "DRAFT");

        let missing = store.update(&k, &publish, Some(&from_draft)).await.unwrap();
        assert_eq!(missing, UpdateOutcome::Missing);

        store
            .put(&Record::new(k.clone()).with("Status", "DRAFT"))
            .await
            .unwrap();
        let first = store.update(&k, &publish, Some(&from_draft)).await.unwrap();
        assert!(first.is_updated());

        let second = store.update(&k, &publish, Some(&from_draft)).await.unwrap();
        assert_eq!(second, UpdateOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_invalid_mutation_path_is_query_failed() {
        let store = InMemoryStore::new();
        let result = store
            .update(&key("A", "B"), &Mutation::new().set("Data.title", "x"), None)
            .await;
        assert!(matches!(result, Err(RepositoryError::QueryFailed(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryStore::new();
        let k = key("POST#1", "METADATA");
        store.put(&Record::new(k.clone())).await.unwrap();

        assert!(store.delete(&k, Some(&Condition::Exists)).await.unwrap());
        assert!(!store.delete(&k, None).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_records_are_absent() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let store = InMemoryStore::with_clock(Arc::new(clock.clone()));
        let k = key("SESSION#s1", "VISIT");
        let expires = (start + Duration::hours(1)).timestamp();

        store
            .put(&Record::new(k.clone()).with(keys::EXPIRES_AT, expires))
            .await
            .unwrap();
        assert!(store.get(&k, false).await.unwrap().is_some());

        clock.advance(Duration::hours(1));
        assert!(store.get(&k, false).await.unwrap().is_none());

        let claim = store
            .update(&k, &Mutation::new().set("x", 1), Some(&Condition::NotExists))
            .await
            .unwrap();
        assert!(claim.is_updated());
    }

    #[tokio::test]
    async fn test_index_query_descending_with_pagination() {
        let store = InMemoryStore::new();
        for (pk, token) in [("POST#1", "POST#01"), ("POST#2", "POST#03"), ("POST#3", "POST#02")] {
            store
                .put(&indexed(pk, "POST#STATUS#DRAFT", token))
                .await
                .unwrap();
        }
        store
            .put(&indexed("POST#4", "POST#STATUS#PUBLISHED", "POST#04"))
            .await
            .unwrap();
        store
            .put(&Record::new(key("POST#5", "METADATA")))
            .await
            .unwrap();

        let query = Query::index(KeyCondition::Equals("POST#STATUS#DRAFT".to_string())).limit(2);
        let first = store.query(&query).await.unwrap();
        let pks: Vec<_> = first.records.iter().map(|r| r.key.pk.as_str()).collect();
        assert_eq!(pks, vec!["POST#2", "POST#3"]);
        assert!(first.next.is_some());

        let second = store.query(&query.clone().start(first.next)).await.unwrap();
        let pks: Vec<_> = second.records.iter().map(|r| r.key.pk.as_str()).collect();
        assert_eq!(pks, vec!["POST#1"]);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_filter_applies_after_limit() {
        let store = InMemoryStore::new();
        let rows = [("P#1", "03", true), ("P#2", "02", false), ("P#3", "01", true)];
        for (pk, token, featured) in rows {
            let record =
                indexed(pk, "P#STATUS#DRAFT", token).with("Data", json!({"featured": featured}));
            store.put(&record).await.unwrap();
        }

        let query = Query::index(KeyCondition::Equals("P#STATUS#DRAFT".to_string()))
            .filter(Some(Condition::equals("Data.featured", true)))
            .limit(2);
        let page = store.query(&query).await.unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].key.pk, "P#1");
        assert!(page.next.is_some());
    }

    #[tokio::test]
    async fn test_table_prefix_query_with_sort_condition() {
        let store = InMemoryStore::new();
        store.put(&Record::new(key("POST#1", "METADATA"))).await.unwrap();
        store.put(&Record::new(key("POST#2", "METADATA"))).await.unwrap();
        store
            .put(&Record::new(key("POST#CATEGORY#Backend", "COUNT")))
            .await
            .unwrap();

        let query = Query::table(KeyCondition::BeginsWith("POST#".to_string()))
            .sort(SortCondition::Equals("METADATA".to_string()))
            .order(SortOrder::Ascending);
        let page = store.query(&query).await.unwrap();

        let pks: Vec<_> = page.records.iter().map(|r| r.key.pk.as_str()).collect();
        assert_eq!(pks, vec!["POST#1", "POST#2"]);
    }

    #[tokio::test]
    async fn test_batch_get_skips_missing() {
        let store = InMemoryStore::new();
        store.put(&Record::new(key("A", "1"))).await.unwrap();

        let records = store
            .batch_get(&[key("A", "1"), key("B", "1")])
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
    }
}
