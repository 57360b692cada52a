use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use strata_types::{MemoryRecord, RecordFilter, RecordId, SessionId, Tier};
use tracing::debug;

use crate::error::StoreError;
use crate::store::RecordStore;

/// In-memory record store for testing, development, and single-process
/// deployments. Records and their tier/tag/session indexes are updated in
/// one critical section, so every query observes completed writes.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<RecordId, MemoryRecord>,
    by_tier: HashMap<Tier, HashSet<RecordId>>,
    by_tag: HashMap<String, HashSet<RecordId>>,
    by_session: HashMap<SessionId, HashSet<RecordId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held, across all tiers and states.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StoreInner {
    fn index(&mut self, record: &MemoryRecord) {
        self.by_tier.entry(record.tier()).or_default().insert(record.id);
        for tag in &record.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(record.id);
        }
        if let Some(session) = record.session_id() {
            self.by_session
                .entry(session.clone())
                .or_default()
                .insert(record.id);
        }
    }

    fn unindex(&mut self, record: &MemoryRecord) {
        if let Some(ids) = self.by_tier.get_mut(&record.tier()) {
            ids.remove(&record.id);
        }
        for tag in &record.tags {
            if let Some(ids) = self.by_tag.get_mut(tag) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        if let Some(session) = record.session_id() {
            if let Some(ids) = self.by_session.get_mut(session) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.by_session.remove(session);
                }
            }
        }
    }

    /// Narrowest candidate id set for a query, before predicate checks.
    fn candidates(&self, tier: Tier, filter: &RecordFilter) -> Vec<RecordId> {
        let tier_ids = match self.by_tier.get(&tier) {
            Some(ids) => ids,
            None => return Vec::new(),
        };

        if let Some(ref session) = filter.session_id {
            return match self.by_session.get(session) {
                Some(ids) => ids.intersection(tier_ids).copied().collect(),
                None => Vec::new(),
            };
        }

        if let Some(ref tag) = filter.tag {
            return match self.by_tag.get(tag) {
                Some(ids) => ids.intersection(tier_ids).copied().collect(),
                None => Vec::new(),
            };
        }

        tier_ids.iter().copied().collect()
    }
}

fn lock_poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("store lock poisoned".into())
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn put(&self, record: MemoryRecord) -> Result<RecordId, StoreError> {
        let id = record.id;
        let mut inner = self.inner.write().map_err(lock_poisoned)?;
        if let Some(previous) = inner.records.remove(&id) {
            inner.unindex(&previous);
        }
        inner.index(&record);
        inner.records.insert(id, record);
        debug!(id = %id, "stored record");
        Ok(id)
    }

    async fn get(&self, id: &RecordId) -> Result<Option<MemoryRecord>, StoreError> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        Ok(inner.records.get(id).cloned())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(lock_poisoned)?;
        let record = inner.records.remove(id).ok_or(StoreError::NotFound(*id))?;
        inner.unindex(&record);
        debug!(id = %id, "deleted record");
        Ok(())
    }

    async fn query(
        &self,
        tier: Tier,
        filter: &RecordFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        let mut results: Vec<MemoryRecord> = inner
            .candidates(tier, filter)
            .into_iter()
            .filter_map(|id| inner.records.get(&id))
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(results)
    }

    async fn count(&self, tier: Tier) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(lock_poisoned)?;
        Ok(inner.by_tier.get(&tier).map_or(0, |ids| ids.len()))
    }
}
