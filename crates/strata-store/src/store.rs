use async_trait::async_trait;
use strata_types::{MemoryRecord, RecordFilter, RecordId, Tier};

use crate::error::StoreError;

/// Pluggable record persistence for the memory engine.
///
/// Implementations may be in-memory, embedded databases, or remote
/// services; each operation must be atomic at single-record granularity,
/// and index updates must be visible to a subsequent `query` on the same
/// instance (read-your-writes).
///
/// The store holds records in every lifecycle state, including forgotten
/// ones kept for audit. Visibility rules live in the engine, not here.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, or replace the existing record with the same id.
    async fn put(&self, record: MemoryRecord) -> Result<RecordId, StoreError>;

    /// Retrieve a record by id, whatever its state.
    async fn get(&self, id: &RecordId) -> Result<Option<MemoryRecord>, StoreError>;

    /// Physically remove a record. Fails with `NotFound` if absent.
    async fn delete(&self, id: &RecordId) -> Result<(), StoreError>;

    /// All records of a tier matching the filter, ordered by `created_at`
    /// ascending (ties by id).
    async fn query(
        &self,
        tier: Tier,
        filter: &RecordFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Total record count for a tier, across all states.
    async fn count(&self, tier: Tier) -> Result<usize, StoreError>;
}
