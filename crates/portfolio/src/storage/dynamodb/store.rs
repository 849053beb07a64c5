//! DynamoDB record store.
//!
//! Implements `RecordStore` from `portfolio_core::storage` on a single table
//! with one global secondary index.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{KeysAndAttributes, ReturnValue, ReturnValuesOnConditionCheckFailure};
use aws_sdk_dynamodb::Client;

use portfolio_core::clock::{Clock, SystemClock};
use portfolio_core::storage::{
    keys, Condition, KeyCondition, Mutation, Page, Query, Record, RecordKey, RecordStore,
    RepositoryError, Result, SortOrder, Target, UpdateOutcome,
};

use super::conversions::{
    item_to_record, item_to_start_key, key_to_item, record_to_item, start_key_to_item, Item,
};
use super::error::{
    map_batch_get_error, map_delete_item_error, map_get_item_error, map_put_item_error,
    map_query_error, map_scan_error, map_update_item_error,
};
use super::expressions::ExpressionBuilder;
use crate::config::Config;

/// Maximum keys per BatchGetItem request.
const BATCH_GET_LIMIT: usize = 100;

/// Rounds spent re-requesting unprocessed batch keys before giving up.
const BATCH_GET_ATTEMPTS: u32 = 5;

/// DynamoDB-based record store.
///
/// Every call runs under a deadline. A call that misses it fails with
/// [`RepositoryError::Timeout`] and must be treated as not applied.
#[derive(Clone)]
pub struct DynamoDbStore {
    client: Client,
    table_name: String,
    index_name: String,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore")
            .field("table_name", &self.table_name)
            .field("index_name", &self.index_name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DynamoDbStore {
    /// Creates a new store with the given DynamoDB client.
    pub fn new(
        client: Client,
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            index_name: index_name.into(),
            timeout,
            clock: Arc::new(SystemClock),
        }
    }

    /// Creates a new store from configuration.
    ///
    /// Uses the AWS SDK default credential chain, the configured region and,
    /// when set, the endpoint override for local DynamoDB.
    pub async fn from_config(config: &Config) -> Self {
        let mut sdk_config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            sdk_config_loader = sdk_config_loader.endpoint_url(endpoint);
        }

        let sdk_config = sdk_config_loader.load().await;
        Self::new(
            Client::new(&sdk_config),
            &config.table_name,
            &config.index_name,
            config.store_timeout(),
        )
    }

    /// Get the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn deadline<T>(&self, call: impl Future<Output = T>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RepositoryError::Timeout(self.timeout.as_millis() as u64))
    }

    fn page(&self, items: Option<Vec<Item>>, last: Option<Item>) -> Result<Page> {
        let now = self.clock.epoch_seconds();
        let mut records = items
            .unwrap_or_default()
            .iter()
            .map(item_to_record)
            .collect::<Result<Vec<_>>>()?;
        records.retain(|record| !record.is_expired(now));
        let next = last
            .filter(|key| !key.is_empty())
            .as_ref()
            .map(item_to_start_key)
            .transpose()?;
        Ok(Page { records, next })
    }
}

#[async_trait]
impl RecordStore for DynamoDbStore {
    async fn get(&self, key: &RecordKey, consistent: bool) -> Result<Option<Record>> {
        let result = self
            .deadline(
                self.client
                    .get_item()
                    .table_name(&self.table_name)
                    .set_key(Some(key_to_item(key)))
                    .consistent_read(consistent)
                    .send(),
            )
            .await?
            .map_err(map_get_item_error)?;

        let now = self.clock.epoch_seconds();
        match result.item {
            Some(item) => Ok(Some(item_to_record(&item)?).filter(|r| !r.is_expired(now))),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &Record) -> Result<()> {
        self.deadline(
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(record_to_item(record)))
                .send(),
        )
        .await?
        .map_err(map_put_item_error)?;

        Ok(())
    }

    async fn update(
        &self,
        key: &RecordKey,
        mutation: &Mutation,
        condition: Option<&Condition>,
    ) -> Result<UpdateOutcome> {
        if mutation.is_empty() {
            return Err(RepositoryError::InvalidData(
                "Update requires at least one action".to_string(),
            ));
        }

        let mut builder = ExpressionBuilder::new();
        let update_expression = builder.update(mutation);
        let condition_expression = condition.map(|c| builder.condition(c, keys::PK));

        let result = self
            .deadline(
                self.client
                    .update_item()
                    .table_name(&self.table_name)
                    .set_key(Some(key_to_item(key)))
                    .update_expression(update_expression)
                    .set_condition_expression(condition_expression)
                    .set_expression_attribute_names(builder.names())
                    .set_expression_attribute_values(builder.values())
                    .return_values(ReturnValue::AllNew)
                    .return_values_on_condition_check_failure(
                        ReturnValuesOnConditionCheckFailure::AllOld,
                    )
                    .send(),
            )
            .await?;

        match result {
            Ok(output) => {
                let mut item = output.attributes.unwrap_or_default();
                item.extend(key_to_item(key));
                Ok(UpdateOutcome::Updated(item_to_record(&item)?))
            }
            Err(err) => match err.as_service_error() {
                Some(UpdateItemError::ConditionalCheckFailedException(failed)) => {
                    Ok(match failed.item() {
                        Some(_) => UpdateOutcome::Rejected,
                        None => UpdateOutcome::Missing,
                    })
                }
                _ => Err(map_update_item_error(err)),
            },
        }
    }

    async fn delete(&self, key: &RecordKey, condition: Option<&Condition>) -> Result<bool> {
        let mut builder = ExpressionBuilder::new();
        let condition_expression = condition.map(|c| builder.condition(c, keys::PK));

        let result = self
            .deadline(
                self.client
                    .delete_item()
                    .table_name(&self.table_name)
                    .set_key(Some(key_to_item(key)))
                    .set_condition_expression(condition_expression)
                    .set_expression_attribute_names(builder.names())
                    .set_expression_attribute_values(builder.values())
                    .return_values(ReturnValue::AllOld)
                    .send(),
            )
            .await?;

        match result {
            Ok(output) => Ok(output.attributes.is_some_and(|old| !old.is_empty())),
            Err(err) => match err.as_service_error() {
                Some(DeleteItemError::ConditionalCheckFailedException(_)) => Ok(false),
                _ => Err(map_delete_item_error(err)),
            },
        }
    }

    async fn query(&self, query: &Query) -> Result<Page> {
        let target = query.target;
        let partition_attribute = target.partition_attribute();
        let sort_attribute = target.sort_attribute();
        let index_name = (target == Target::Index).then(|| self.index_name.clone());
        let exclusive_start_key = query.start.as_ref().map(start_key_to_item);
        let limit = query.limit.map(|l| l.min(i32::MAX as usize) as i32);
        let mut builder = ExpressionBuilder::new();

        match &query.partition {
            KeyCondition::Equals(partition) => {
                let key_condition = builder.key_condition(
                    partition_attribute,
                    partition,
                    sort_attribute,
                    query.sort.as_ref(),
                );
                let filter = query.filter.as_ref().map(|f| builder.condition(f, keys::PK));

                let output = self
                    .deadline(
                        self.client
                            .query()
                            .table_name(&self.table_name)
                            .set_index_name(index_name)
                            .key_condition_expression(key_condition)
                            .set_filter_expression(filter)
                            .set_expression_attribute_names(builder.names())
                            .set_expression_attribute_values(builder.values())
                            .scan_index_forward(query.order == SortOrder::Ascending)
                            .set_limit(limit)
                            .set_exclusive_start_key(exclusive_start_key)
                            .send(),
                    )
                    .await?
                    .map_err(map_query_error)?;

                self.page(output.items, output.last_evaluated_key)
            }
            // Query needs an exact partition; prefixes are served by a filtered
            // Scan, which returns records in no particular order.
            partition @ KeyCondition::BeginsWith(_) => {
                let filter = builder.scan_filter(
                    partition_attribute,
                    partition,
                    sort_attribute,
                    query.sort.as_ref(),
                    query.filter.as_ref(),
                );

                tracing::debug!(
                    table = %self.table_name,
                    ?partition,
                    "serving prefix partition with a scan"
                );

                let output = self
                    .deadline(
                        self.client
                            .scan()
                            .table_name(&self.table_name)
                            .set_index_name(index_name)
                            .filter_expression(filter)
                            .set_expression_attribute_names(builder.names())
                            .set_expression_attribute_values(builder.values())
                            .set_limit(limit)
                            .set_exclusive_start_key(exclusive_start_key)
                            .send(),
                    )
                    .await?
                    .map_err(map_scan_error)?;

                self.page(output.items, output.last_evaluated_key)
            }
        }
    }

    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<Record>> {
        let now = self.clock.epoch_seconds();
        let unique: Vec<&RecordKey> = keys.iter().collect::<BTreeSet<_>>().into_iter().collect();
        let mut records = Vec::with_capacity(unique.len());

        for chunk in unique.chunks(BATCH_GET_LIMIT) {
            let mut pending: Vec<Item> = chunk.iter().map(|key| key_to_item(key)).collect();

            for attempt in 0..BATCH_GET_ATTEMPTS {
                if pending.is_empty() {
                    break;
                }
                if attempt > 0 {
                    tokio::time::sleep(Duration::from_millis(50 << attempt)).await;
                }

                let request = KeysAndAttributes::builder()
                    .set_keys(Some(std::mem::take(&mut pending)))
                    .build()
                    .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;

                let output = self
                    .deadline(
                        self.client
                            .batch_get_item()
                            .request_items(&self.table_name, request)
                            .send(),
                    )
                    .await?
                    .map_err(map_batch_get_error)?;

                let items = output
                    .responses
                    .and_then(|mut responses| responses.remove(&self.table_name))
                    .unwrap_or_default();
                for item in &items {
                    let record = item_to_record(item)?;
                    if !record.is_expired(now) {
                        records.push(record);
                    }
                }

                pending = output
                    .unprocessed_keys
                    .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                    .map(|remaining| remaining.keys)
                    .unwrap_or_default();
            }

            if !pending.is_empty() {
                return Err(RepositoryError::Throttled(format!(
                    "{} keys left unprocessed by BatchGetItem",
                    pending.len()
                )));
            }
        }

        Ok(records)
    }
}
