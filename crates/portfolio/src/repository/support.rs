//! Helpers shared by the repositories.

use portfolio_core::storage::{
    Condition, Mutation, Query, Record, RecordKey, RecordStore, RepositoryError, Result,
    UpdateOutcome,
};

/// Applies an aggregate change that must never fail the calling operation.
///
/// Errors are logged and swallowed. A failed condition is a silent no-op.
pub(crate) async fn apply_best_effort<S: RecordStore + ?Sized>(
    store: &S,
    key: &RecordKey,
    mutation: &Mutation,
    condition: Option<&Condition>,
) {
    match store.update(key, mutation, condition).await {
        Ok(UpdateOutcome::Updated(_)) => {}
        Ok(outcome) => {
            tracing::debug!(pk = %key.pk, sk = %key.sk, ?outcome, "Aggregate update skipped");
        }
        Err(err) => {
            tracing::warn!(
                pk = %key.pk,
                sk = %key.sk,
                error = %err,
                transient = err.is_transient(),
                "Aggregate update failed"
            );
        }
    }
}

/// Follows continuation keys until the query is exhausted.
pub(crate) async fn query_all<S: RecordStore + ?Sized>(
    store: &S,
    query: Query,
) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut start = None;
    loop {
        let page = store.query(&query.clone().start(start)).await?;
        records.extend(page.records);
        match page.next {
            Some(next) => start = Some(next),
            None => return Ok(records),
        }
    }
}

/// Whether a failed write may still have been applied by the store.
///
/// A timed out call gives no answer either way, so state claimed before it
/// (such as a session marker) is kept rather than released.
pub(crate) fn may_have_applied(err: &RepositoryError) -> bool {
    matches!(err, RepositoryError::Timeout(_))
}
