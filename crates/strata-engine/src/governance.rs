//! Lifecycle governance: deprecation and forgetting.

use std::sync::Arc;

use strata_store::RecordStore;
use strata_types::{
    ForgetSelector, LifecycleState, MemoryRecord, MonotonicClock, RecordFilter, RecordId, Tier,
    TierData,
};
use tracing::info;

use crate::canonical::canonical_node;
use crate::error::EngineError;
use crate::graph::RelationGraph;
use crate::locks::TransitionLocks;

/// Drives the monotone lifecycle of records: active → deprecated →
/// forgotten for canonical nodes, active → forgotten for the lower tiers.
///
/// Canonical transitions follow a snapshot/lock/re-read protocol. A
/// request that was invalid against the caller's snapshot fails with
/// `InvalidStateTransition`; one invalidated by a concurrent writer while
/// waiting for the record's gate fails with `Conflict`.
pub(crate) struct Governance {
    store: Arc<dyn RecordStore>,
    graph: RelationGraph,
    locks: Arc<TransitionLocks>,
    clock: Arc<MonotonicClock>,
}

impl Governance {
    pub(crate) fn new(
        store: Arc<dyn RecordStore>,
        graph: RelationGraph,
        locks: Arc<TransitionLocks>,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self {
            store,
            graph,
            locks,
            clock,
        }
    }

    /// Move an active canonical node to deprecated.
    ///
    /// `successor`, when given, must name a different canonical node that
    /// is active right now. The pointer is not re-validated later; a
    /// successor that is itself deprecated afterwards stays referenced.
    pub(crate) async fn deprecate(
        &self,
        node_id: RecordId,
        reason: String,
        successor: Option<RecordId>,
    ) -> Result<(), EngineError> {
        let snapshot = canonical_node(self.store.as_ref(), node_id).await?;
        match snapshot.state {
            LifecycleState::Active => {}
            // Tombstones are invisible, same as ids that never existed.
            LifecycleState::Forgotten => {
                return Err(EngineError::NotFound(node_id.to_string()));
            }
            LifecycleState::Deprecated => {
                return Err(EngineError::InvalidStateTransition {
                    current: snapshot.state,
                    attempted: "deprecate".into(),
                });
            }
        }
        if let Some(successor_id) = successor {
            if successor_id == node_id {
                return Err(EngineError::Validation(
                    "a node cannot supersede itself".into(),
                ));
            }
            let valid = match self.store.get(&successor_id).await? {
                Some(record) => record.tier() == Tier::Canonical && record.is_active(),
                None => false,
            };
            if !valid {
                return Err(EngineError::Validation(format!(
                    "superseded_by must name an active canonical node, {successor_id} is not"
                )));
            }
        }

        let _gate = self.locks.acquire(node_id).await;
        let mut current = canonical_node(self.store.as_ref(), node_id).await?;
        if !current.is_active() {
            // Valid when we looked, invalid now: a concurrent transition
            // won the race.
            return Err(if current.version != snapshot.version {
                EngineError::Conflict { id: node_id }
            } else {
                EngineError::InvalidStateTransition {
                    current: current.state,
                    attempted: "deprecate".into(),
                }
            });
        }

        let stamp = self.clock.stamp();
        current.state = LifecycleState::Deprecated;
        current.deprecated_at = Some(stamp);
        if let TierData::Canonical {
            deprecated_reason,
            superseded_by,
            ..
        } = &mut current.data
        {
            *deprecated_reason = Some(reason);
            *superseded_by = successor;
        }
        current.touch(stamp);
        self.store.put(current).await?;
        info!(id = %node_id, successor = ?successor, "deprecated canonical node");
        Ok(())
    }

    /// Forget every record the selector matches. All-or-nothing: if any
    /// matched canonical node is still active, nothing transitions and
    /// the caller is told to deprecate first. Returns how many records
    /// were forgotten.
    ///
    /// Forgotten records keep a tombstone in the store for audit, but
    /// every read path in the engine skips them, and incident links of
    /// forgotten canonical nodes are removed for good.
    pub(crate) async fn forget(&self, selector: &ForgetSelector) -> Result<usize, EngineError> {
        validate_selector(selector)?;
        let matched = self.resolve(selector).await?;
        if matched.is_empty() {
            return Err(EngineError::NotFound(selector.to_string()));
        }
        for record in &matched {
            if record.tier() == Tier::Canonical && record.is_active() {
                return Err(EngineError::InvalidStateTransition {
                    current: LifecycleState::Active,
                    attempted: format!("forget {}", record.id),
                });
            }
        }

        // Gate the canonical targets in id order, then confirm nothing
        // transitioned while we waited. Lower tiers need no gate; their
        // only transition is the one we are making.
        let mut canonical_ids: Vec<RecordId> = matched
            .iter()
            .filter(|r| r.tier() == Tier::Canonical)
            .map(|r| r.id)
            .collect();
        canonical_ids.sort();
        let mut gates = Vec::with_capacity(canonical_ids.len());
        for id in &canonical_ids {
            gates.push(self.locks.acquire(*id).await);
        }

        let mut to_apply = Vec::with_capacity(matched.len());
        for record in matched {
            if record.tier() == Tier::Canonical {
                let current = canonical_node(self.store.as_ref(), record.id).await?;
                match current.state {
                    LifecycleState::Deprecated => to_apply.push(current),
                    _ => return Err(EngineError::Conflict { id: record.id }),
                }
            } else {
                match self.store.get(&record.id).await? {
                    Some(current) if current.state != LifecycleState::Forgotten => {
                        to_apply.push(current);
                    }
                    // Evicted or already forgotten since we resolved.
                    _ => {}
                }
            }
        }
        if to_apply.is_empty() {
            return Err(EngineError::NotFound(selector.to_string()));
        }

        let mut count = 0;
        for mut record in to_apply {
            let stamp = self.clock.stamp();
            let (id, tier) = (record.id, record.tier());
            record.state = LifecycleState::Forgotten;
            record.forgotten_at = Some(stamp);
            record.touch(stamp);
            self.store.put(record).await?;
            if tier == Tier::Canonical {
                self.graph.remove_incident(id)?;
            }
            count += 1;
        }
        info!(selector = %selector, count, "forgot records");
        Ok(count)
    }

    /// Records the selector matches right now, skipping the already
    /// forgotten.
    async fn resolve(&self, selector: &ForgetSelector) -> Result<Vec<MemoryRecord>, EngineError> {
        let not_forgotten = RecordFilter::new()
            .with_state(LifecycleState::Active)
            .with_state(LifecycleState::Deprecated);
        match selector {
            ForgetSelector::Id(id) => Ok(self
                .store
                .get(id)
                .await?
                .filter(|r| r.state != LifecycleState::Forgotten)
                .into_iter()
                .collect()),
            ForgetSelector::TierTag { tier, tag } => Ok(self
                .store
                .query(*tier, &not_forgotten.with_tag(tag.clone()))
                .await?),
            ForgetSelector::TierSession { tier, session_id } => Ok(self
                .store
                .query(*tier, &not_forgotten.with_session(session_id.clone()))
                .await?),
        }
    }
}

fn validate_selector(selector: &ForgetSelector) -> Result<(), EngineError> {
    match selector {
        ForgetSelector::TierSession {
            tier: Tier::Canonical,
            ..
        } => Err(EngineError::Validation(
            "canonical records have no session; select by id or tag".into(),
        )),
        ForgetSelector::TierTag { tag, .. } if tag.is_empty() => Err(EngineError::Validation(
            "selector tag must not be empty".into(),
        )),
        ForgetSelector::TierSession { session_id, .. } if session_id.as_str().is_empty() => Err(
            EngineError::Validation("selector session must not be empty".into()),
        ),
        _ => Ok(()),
    }
}
