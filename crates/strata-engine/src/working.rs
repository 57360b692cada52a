//! L0 working memory: short-lived per-session events.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_store::{RecordStore, StoreError};
use strata_types::{
    LifecycleState, MemoryRecord, MonotonicClock, RecordFilter, RecordId, SessionId, Tier,
    TierData,
};
use tracing::{debug, info};

use crate::error::EngineError;

/// When over-cap sessions shed their oldest events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionMode {
    /// Enforce the cap inside every upsert.
    Inline,
    /// Let sessions run over until the next [`sweep`](WorkingMemory::sweep).
    Deferred,
}

/// Tuning for the working tier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkingConfig {
    /// Maximum active events per session before the oldest are evicted.
    pub session_cap: usize,
    pub eviction: EvictionMode,
    /// Evict events untouched for longer than this during sweeps.
    /// `None` disables age-based expiry.
    pub ttl: Option<Duration>,
}

impl Default for WorkingConfig {
    fn default() -> Self {
        Self {
            session_cap: 128,
            eviction: EvictionMode::Inline,
            ttl: None,
        }
    }
}

/// Outcome of a maintenance sweep over the working tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Events removed to bring sessions back under the cap.
    pub evicted: usize,
    /// Events removed because they outlived the configured TTL.
    pub expired: usize,
}

/// Manages L0 events: upsert-with-merge, recency eviction, TTL expiry.
///
/// Evicted events are deleted outright. Only governed forgetting (L2 and
/// explicit `forget` calls) leaves a tombstone behind; cap and TTL
/// eviction is bookkeeping, not governance.
pub(crate) struct WorkingMemory {
    store: Arc<dyn RecordStore>,
    clock: Arc<MonotonicClock>,
    config: WorkingConfig,
}

impl WorkingMemory {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<MonotonicClock>,
        config: WorkingConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Insert a working event, or merge into the session's existing event
    /// with the same dedup key: content is replaced, tags are unioned, and
    /// the original source and creation time stick.
    pub(crate) async fn upsert(
        &self,
        session_id: SessionId,
        source: String,
        content: String,
        tags: BTreeSet<String>,
        dedup_key: Option<String>,
    ) -> Result<RecordId, EngineError> {
        if let Some(ref key) = dedup_key {
            let filter = RecordFilter::new()
                .with_session(session_id.clone())
                .with_dedup_key(key.clone())
                .with_state(LifecycleState::Active);
            let mut matches = self.store.query(Tier::Working, &filter).await?;
            if let Some(mut existing) = matches.pop() {
                existing.content = content;
                existing.tags.extend(tags);
                existing.touch(self.clock.stamp());
                let id = existing.id;
                self.store.put(existing).await?;
                debug!(id = %id, session = %session_id, dedup_key = %key, "merged working event");
                return Ok(id);
            }
        }

        let record = MemoryRecord::builder(
            content,
            TierData::Working {
                source,
                session_id: session_id.clone(),
                dedup_key,
            },
        )
        .tags(tags)
        .created_at(self.clock.stamp())
        .build();
        let id = self.store.put(record).await?;
        debug!(id = %id, session = %session_id, "recorded working event");

        if self.config.eviction == EvictionMode::Inline {
            self.enforce_cap(&session_id).await?;
        }
        Ok(id)
    }

    /// The session's newest active events, newest first.
    pub(crate) async fn recent(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        let mut events = self.active_events(session_id).await?;
        events.reverse();
        events.truncate(limit);
        Ok(events)
    }

    pub(crate) async fn active_events(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        let filter = RecordFilter::new()
            .with_session(session_id.clone())
            .with_state(LifecycleState::Active);
        Ok(self.store.query(Tier::Working, &filter).await?)
    }

    /// Delete the session's oldest active events until it is back under
    /// the cap. Returns how many were evicted.
    pub(crate) async fn enforce_cap(&self, session_id: &SessionId) -> Result<usize, EngineError> {
        let events = self.active_events(session_id).await?;
        if events.len() <= self.config.session_cap {
            return Ok(0);
        }
        let excess = events.len() - self.config.session_cap;
        let mut evicted = 0;
        for event in events.into_iter().take(excess) {
            match self.store.delete(&event.id).await {
                Ok(()) => evicted += 1,
                // Another sweep got there first.
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        if evicted > 0 {
            debug!(session = %session_id, evicted, "evicted oldest working events");
        }
        Ok(evicted)
    }

    /// Full maintenance pass: TTL expiry first, then per-session cap
    /// enforcement across every session with active events.
    pub(crate) async fn sweep(&self) -> Result<MaintenanceReport, EngineError> {
        let active = RecordFilter::new().with_state(LifecycleState::Active);
        let events = self.store.query(Tier::Working, &active).await?;

        let mut expired = 0;
        if let Some(ttl) = self.config.ttl {
            let now = self.clock.stamp();
            let ttl_ms = ttl.as_millis() as u64;
            for event in &events {
                if event.updated_at.age_ms(now) > ttl_ms {
                    match self.store.delete(&event.id).await {
                        Ok(()) => expired += 1,
                        Err(StoreError::NotFound(_)) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        let sessions: BTreeSet<SessionId> = events
            .iter()
            .filter_map(|e| e.session_id().cloned())
            .collect();
        let mut evicted = 0;
        for session in &sessions {
            evicted += self.enforce_cap(session).await?;
        }

        if evicted > 0 || expired > 0 {
            info!(evicted, expired, "working memory sweep");
        }
        Ok(MaintenanceReport { evicted, expired })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::InMemoryStore;
    use strata_types::Timestamp;

    fn working(config: WorkingConfig) -> (WorkingMemory, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let memory = WorkingMemory::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::new(MonotonicClock::new()),
            config,
        );
        (memory, store)
    }

    async fn upsert_plain(memory: &WorkingMemory, session: &str, content: &str) -> RecordId {
        memory
            .upsert(
                session.into(),
                "agent".into(),
                content.into(),
                BTreeSet::new(),
                None,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upsert_without_dedup_key_always_creates() {
        let (memory, store) = working(WorkingConfig::default());
        let a = upsert_plain(&memory, "s1", "saw a bird").await;
        let b = upsert_plain(&memory, "s1", "saw a bird").await;
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn upsert_merges_on_dedup_key() {
        let (memory, store) = working(WorkingConfig::default());
        let first = memory
            .upsert(
                "s1".into(),
                "tool".into(),
                "build failing".into(),
                BTreeSet::from(["ci".to_string()]),
                Some("build-status".into()),
            )
            .await
            .unwrap();
        let second = memory
            .upsert(
                "s1".into(),
                "user".into(),
                "build fixed".into(),
                BTreeSet::from(["release".to_string()]),
                Some("build-status".into()),
            )
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);

        let merged = store.get(&first).await.unwrap().unwrap();
        assert_eq!(merged.content, "build fixed");
        assert!(merged.tags.contains("ci"));
        assert!(merged.tags.contains("release"));
        assert_eq!(merged.version, 1);
        assert!(merged.updated_at > merged.created_at);
        match merged.data {
            TierData::Working { ref source, .. } => assert_eq!(source, "tool"),
            ref other => panic!("unexpected tier data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dedup_keys_are_scoped_per_session() {
        let (memory, store) = working(WorkingConfig::default());
        memory
            .upsert(
                "s1".into(),
                "agent".into(),
                "x".into(),
                BTreeSet::new(),
                Some("k".into()),
            )
            .await
            .unwrap();
        memory
            .upsert(
                "s2".into(),
                "agent".into(),
                "y".into(),
                BTreeSet::new(),
                Some("k".into()),
            )
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn inline_eviction_keeps_session_under_cap() {
        let (memory, _store) = working(WorkingConfig {
            session_cap: 3,
            ..WorkingConfig::default()
        });
        let first = upsert_plain(&memory, "s1", "event 0").await;
        for i in 1..6 {
            upsert_plain(&memory, "s1", &format!("event {i}")).await;
        }

        let events = memory.active_events(&"s1".into()).await.unwrap();
        assert_eq!(events.len(), 3);
        // The oldest events went first.
        assert!(events.iter().all(|e| e.id != first));
        assert_eq!(events[0].content, "event 3");
        assert_eq!(events[2].content, "event 5");
    }

    #[tokio::test]
    async fn eviction_is_per_session() {
        let (memory, _store) = working(WorkingConfig {
            session_cap: 2,
            ..WorkingConfig::default()
        });
        for i in 0..4 {
            upsert_plain(&memory, "s1", &format!("a{i}")).await;
        }
        upsert_plain(&memory, "s2", "b0").await;

        assert_eq!(memory.active_events(&"s1".into()).await.unwrap().len(), 2);
        assert_eq!(memory.active_events(&"s2".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deferred_eviction_waits_for_sweep() {
        let (memory, _store) = working(WorkingConfig {
            session_cap: 2,
            eviction: EvictionMode::Deferred,
            ttl: None,
        });
        for i in 0..5 {
            upsert_plain(&memory, "s1", &format!("e{i}")).await;
        }
        assert_eq!(memory.active_events(&"s1".into()).await.unwrap().len(), 5);

        let report = memory.sweep().await.unwrap();
        assert_eq!(report.evicted, 3);
        assert_eq!(report.expired, 0);
        assert_eq!(memory.active_events(&"s1".into()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sweep_expires_stale_events() {
        let (memory, store) = working(WorkingConfig {
            session_cap: 100,
            eviction: EvictionMode::Deferred,
            ttl: Some(Duration::from_millis(60_000)),
        });

        // One event well past the TTL, one fresh.
        let stale = MemoryRecord::builder(
            "old observation",
            TierData::Working {
                source: "agent".into(),
                session_id: "s1".into(),
                dedup_key: None,
            },
        )
        .created_at(Timestamp::new(1_000, 0))
        .build();
        let stale_id = stale.id;
        store.put(stale).await.unwrap();
        let fresh_id = upsert_plain(&memory, "s1", "new observation").await;

        let report = memory.sweep().await.unwrap();
        assert_eq!(report.expired, 1);
        assert!(store.get(&stale_id).await.unwrap().is_none());
        assert!(store.get(&fresh_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let (memory, _store) = working(WorkingConfig::default());
        for i in 0..5 {
            upsert_plain(&memory, "s1", &format!("e{i}")).await;
        }
        let recent = memory.recent(&"s1".into(), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "e4");
        assert_eq!(recent[1].content, "e3");
    }

}
