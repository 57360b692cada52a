//! The engine facade: one object owning all three tiers, the relation
//! graph, search, and governance.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_store::{InMemoryStore, RecordStore, StoreError};
use strata_types::{
    ForgetSelector, LifecycleState, Link, MemoryRecord, MonotonicClock, NodeKind, RecordFilter,
    RecordId, SessionId, Tier,
};
use tracing::{debug, info};

use crate::canonical::{canonical_node, CanonicalMemory};
use crate::episodic::{CommitReceipt, EpisodeLog};
use crate::error::EngineError;
use crate::governance::Governance;
use crate::graph::{Expansion, RelationGraph};
use crate::locks::TransitionLocks;
use crate::scorer::{RelevanceScorer, TokenOverlapScorer};
use crate::search::{excerpt, SearchConfig, SearchResult, SearchView, Searcher};
use crate::working::{MaintenanceReport, WorkingConfig, WorkingMemory};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub working: WorkingConfig,
    pub search: SearchConfig,
    pub consolidation: ConsolidationConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Active events a session needs before `consolidate` folds its
    /// oldest `batch` into an episode. Zero disables consolidation.
    pub batch: usize,
    /// Character cap on the generated episode summary.
    pub summary_chars: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            batch: 20,
            summary_chars: 480,
        }
    }
}

/// Point-in-time record counts, for observability and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub working_active: usize,
    pub episodes: usize,
    pub canonical_active: usize,
    pub canonical_deprecated: usize,
    /// Tombstones across all tiers.
    pub forgotten: usize,
    pub links: usize,
    /// Everything the store holds, tombstones included.
    pub total_records: usize,
}

/// Tiered memory for long-lived agents.
///
/// Records move upward through three tiers: volatile working events
/// (L0), committed episode summaries (L1), and durable canonical
/// knowledge (L2) connected by a typed relation graph. The engine owns
/// the lifecycle rules; the store behind it only holds records.
///
/// Cheap to share: wrap it in an `Arc` and call from any task.
pub struct MemoryEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<MonotonicClock>,
    locks: Arc<TransitionLocks>,
    graph: RelationGraph,
    config: EngineConfig,
    working: WorkingMemory,
    episodes: EpisodeLog,
    canonical: CanonicalMemory,
    searcher: Searcher,
    governance: Governance,
}

impl MemoryEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        scorer: Arc<dyn RelevanceScorer>,
        config: EngineConfig,
    ) -> Self {
        let clock = Arc::new(MonotonicClock::new());
        let locks = Arc::new(TransitionLocks::new());
        let graph = RelationGraph::new();
        let working = WorkingMemory::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.working.clone(),
        );
        let episodes = EpisodeLog::new(Arc::clone(&store), Arc::clone(&clock));
        let canonical = CanonicalMemory::new(Arc::clone(&store), Arc::clone(&clock));
        let searcher = Searcher::new(Arc::clone(&store), scorer, config.search.clone());
        let governance = Governance::new(
            Arc::clone(&store),
            graph.clone(),
            Arc::clone(&locks),
            Arc::clone(&clock),
        );
        Self {
            store,
            clock,
            locks,
            graph,
            config,
            working,
            episodes,
            canonical,
            searcher,
            governance,
        }
    }

    /// Engine over a fresh in-memory store with the lexical scorer.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(TokenOverlapScorer),
            config,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record a working event, merging into the session's existing event
    /// when `dedup_key` matches one.
    pub async fn upsert(
        &self,
        session_id: impl Into<SessionId>,
        source: impl Into<String>,
        content: impl Into<String>,
        tags: &[&str],
        dedup_key: Option<&str>,
    ) -> Result<RecordId, EngineError> {
        self.working
            .upsert(
                session_id.into(),
                source.into(),
                content.into(),
                owned_tags(tags),
                dedup_key.map(str::to_string),
            )
            .await
    }

    /// Commit an episode summarizing the given working events.
    pub async fn commit(
        &self,
        session_id: impl Into<SessionId>,
        summary: impl Into<String>,
        covers: &[RecordId],
        tags: &[&str],
    ) -> Result<CommitReceipt, EngineError> {
        self.episodes
            .commit(
                session_id.into(),
                summary.into(),
                covers.to_vec(),
                owned_tags(tags),
            )
            .await
    }

    /// Mint a new canonical node. Confidence is clamped to [0, 1].
    pub async fn promote(
        &self,
        content: impl Into<String>,
        kind: NodeKind,
        confidence: f64,
        tags: &[&str],
        source_ref: Option<RecordId>,
    ) -> Result<RecordId, EngineError> {
        self.canonical
            .promote(content.into(), kind, confidence, owned_tags(tags), source_ref)
            .await
    }

    /// Attach a typed directed link between two active canonical nodes.
    /// Re-linking an identical (from, to, relation) triple is a no-op.
    pub async fn link(
        &self,
        from_id: RecordId,
        to_id: RecordId,
        relation_type: impl Into<String>,
    ) -> Result<(), EngineError> {
        let relation = relation_type.into();
        if relation.trim().is_empty() {
            return Err(EngineError::Validation(
                "relation type must not be empty".into(),
            ));
        }
        if from_id == to_id {
            return Err(EngineError::Validation("self-links are not allowed".into()));
        }
        for id in [from_id, to_id] {
            let node = canonical_node(self.store.as_ref(), id).await?;
            match node.state {
                LifecycleState::Active => {}
                LifecycleState::Forgotten => {
                    return Err(EngineError::NotFound(id.to_string()));
                }
                LifecycleState::Deprecated => {
                    return Err(EngineError::InvalidStateTransition {
                        current: node.state,
                        attempted: "link".into(),
                    });
                }
            }
        }

        let _gates = self.locks.acquire_pair(from_id, to_id).await;
        for id in [from_id, to_id] {
            let node = canonical_node(self.store.as_ref(), id).await?;
            if !node.is_active() {
                // Both endpoints were active a moment ago; a concurrent
                // transition got in between.
                return Err(EngineError::Conflict { id });
            }
        }
        let inserted = self
            .graph
            .insert(Link::new(from_id, to_id, relation, self.clock.stamp()))?;
        if inserted {
            debug!(from = %from_id, to = %to_id, "linked canonical nodes");
        }
        Ok(())
    }

    /// Detach one link. Works regardless of endpoint state, so cleanup
    /// around deprecated nodes stays possible.
    pub async fn unlink(
        &self,
        from_id: RecordId,
        to_id: RecordId,
        relation_type: &str,
    ) -> Result<(), EngineError> {
        let missing = || {
            EngineError::NotFound(format!("link {from_id} -[{relation_type}]-> {to_id}"))
        };
        if from_id == to_id {
            return Err(missing());
        }
        let _gates = self.locks.acquire_pair(from_id, to_id).await;
        if self.graph.remove(from_id, to_id, relation_type)? {
            debug!(from = %from_id, to = %to_id, relation = relation_type, "unlinked canonical nodes");
            Ok(())
        } else {
            Err(missing())
        }
    }

    /// Rank active episodic and canonical records against a query.
    pub async fn search(
        &self,
        query: &str,
        view: SearchView,
        tiers: Option<&[Tier]>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, EngineError> {
        self.searcher.search(query, view, tiers, limit).await
    }

    /// Walk the relation graph outward from a canonical node, at most
    /// `depth` hops, optionally keeping only some relation types.
    pub async fn expand(
        &self,
        seed_id: RecordId,
        depth: usize,
        relation_filter: Option<&[String]>,
    ) -> Result<Vec<Expansion>, EngineError> {
        self.graph
            .expand(self.store.as_ref(), seed_id, depth, relation_filter)
            .await
    }

    /// Deprecate an active canonical node, optionally naming its
    /// replacement.
    pub async fn deprecate(
        &self,
        node_id: RecordId,
        reason: impl Into<String>,
        superseded_by: Option<RecordId>,
    ) -> Result<(), EngineError> {
        self.governance
            .deprecate(node_id, reason.into(), superseded_by)
            .await
    }

    /// Forget everything a selector matches. Canonical nodes must be
    /// deprecated first; the whole call fails if any matched node is
    /// still active. Returns the number of records forgotten.
    pub async fn forget(&self, selector: ForgetSelector) -> Result<usize, EngineError> {
        self.governance.forget(&selector).await
    }

    /// Fetch one record by id. Forgotten records are gone from this API
    /// even though the store still holds their tombstones.
    pub async fn get(&self, id: RecordId) -> Result<MemoryRecord, EngineError> {
        match self.store.get(&id).await? {
            Some(record) if record.state != LifecycleState::Forgotten => Ok(record),
            _ => Err(EngineError::NotFound(id.to_string())),
        }
    }

    /// The session's newest working events, newest first.
    pub async fn recent(
        &self,
        session_id: impl Into<SessionId>,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, EngineError> {
        self.working.recent(&session_id.into(), limit).await
    }

    /// Fold the session's oldest working events into an episode once the
    /// session holds at least `consolidation.batch` of them. The folded
    /// events are deleted; the episode covers them. Returns `None` when
    /// the session is below the threshold.
    pub async fn consolidate(
        &self,
        session_id: impl Into<SessionId>,
    ) -> Result<Option<CommitReceipt>, EngineError> {
        let session_id = session_id.into();
        let threshold = self.config.consolidation.batch;
        if threshold == 0 {
            return Ok(None);
        }
        let events = self.working.active_events(&session_id).await?;
        if events.len() < threshold {
            return Ok(None);
        }

        let batch: Vec<MemoryRecord> = events.into_iter().take(threshold).collect();
        let covers: Vec<RecordId> = batch.iter().map(|e| e.id).collect();
        let mut tags: BTreeSet<String> = BTreeSet::new();
        for event in &batch {
            tags.extend(event.tags.iter().cloned());
        }
        let summary = summarize(&batch, self.config.consolidation.summary_chars);
        let receipt = self
            .episodes
            .commit(session_id.clone(), summary, covers, tags)
            .await?;
        for event in &batch {
            match self.store.delete(&event.id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        info!(
            session = %session_id,
            episode = %receipt.id,
            folded = batch.len(),
            "consolidated working events into an episode"
        );
        Ok(Some(receipt))
    }

    /// Run the working-tier maintenance sweep: TTL expiry, then cap
    /// enforcement per session.
    pub async fn maintain(&self) -> Result<MaintenanceReport, EngineError> {
        self.working.sweep().await
    }

    pub async fn stats(&self) -> Result<MemoryStats, EngineError> {
        let active = RecordFilter::new().with_state(LifecycleState::Active);
        let tombstoned = RecordFilter::new().with_state(LifecycleState::Forgotten);

        let working_active = self.store.query(Tier::Working, &active).await?.len();
        let episodes = self.store.query(Tier::Episodic, &active).await?.len();

        let canonical = self
            .store
            .query(Tier::Canonical, &RecordFilter::new())
            .await?;
        let mut canonical_active = 0;
        let mut canonical_deprecated = 0;
        let mut forgotten = 0;
        for node in &canonical {
            match node.state {
                LifecycleState::Active => canonical_active += 1,
                LifecycleState::Deprecated => canonical_deprecated += 1,
                LifecycleState::Forgotten => forgotten += 1,
            }
        }
        forgotten += self.store.query(Tier::Working, &tombstoned).await?.len();
        forgotten += self.store.query(Tier::Episodic, &tombstoned).await?.len();

        let total_records = self.store.count(Tier::Working).await?
            + self.store.count(Tier::Episodic).await?
            + self.store.count(Tier::Canonical).await?;

        Ok(MemoryStats {
            working_active,
            episodes,
            canonical_active,
            canonical_deprecated,
            forgotten,
            links: self.graph.link_count()?,
            total_records,
        })
    }
}

fn owned_tags(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

fn summarize(events: &[MemoryRecord], max_chars: usize) -> String {
    let joined = events
        .iter()
        .map(|e| e.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    excerpt(&joined, max_chars)
}
