use async_trait::async_trait;

use super::{Condition, Mutation, Page, Query, Record, RecordKey, Result, UpdateOutcome};

/// Generic primitives over the single table and its secondary index.
///
/// "Not found" and "condition failed" are ordinary return values. Only
/// infrastructure failures surface as [`RepositoryError`].
///
/// [`RepositoryError`]: super::RepositoryError
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Gets a record by key. Expired records are reported as absent.
    async fn get(&self, key: &RecordKey, consistent: bool) -> Result<Option<Record>>;

    /// Unconditionally writes a whole record.
    async fn put(&self, record: &Record) -> Result<()>;

    /// Applies a mutation, optionally guarded by a condition on the stored state.
    ///
    /// An unconditional update of a missing key creates the record.
    async fn update(
        &self,
        key: &RecordKey,
        mutation: &Mutation,
        condition: Option<&Condition>,
    ) -> Result<UpdateOutcome>;

    /// Deletes a record. Returns false when nothing was deleted.
    async fn delete(&self, key: &RecordKey, condition: Option<&Condition>) -> Result<bool>;

    /// Runs a key-scoped query against the table or the index.
    async fn query(&self, query: &Query) -> Result<Page>;

    /// Fetches many records by key. Missing keys are skipped and the result
    /// order is unspecified.
    async fn batch_get(&self, keys: &[RecordKey]) -> Result<Vec<Record>>;
}
