//! L2 canonical memory: durable facts, decisions, and constraints.

use std::collections::BTreeSet;
use std::sync::Arc;

use strata_store::RecordStore;
use strata_types::{
    MemoryRecord, MonotonicClock, NodeKind, RecordId, Tier, TierData,
};
use tracing::info;

use crate::error::EngineError;

/// Fetch a canonical record in any lifecycle state. Missing ids and ids
/// belonging to other tiers both come back as `NotFound`; callers check
/// the state themselves.
pub(crate) async fn canonical_node(
    store: &dyn RecordStore,
    id: RecordId,
) -> Result<MemoryRecord, EngineError> {
    match store.get(&id).await? {
        Some(record) if record.tier() == Tier::Canonical => Ok(record),
        _ => Err(EngineError::NotFound(id.to_string())),
    }
}

/// Creates canonical nodes. Promotion always mints a new node; replacing
/// an old statement is modeled by promoting the new one and deprecating
/// the old with `superseded_by`, never by editing in place.
pub(crate) struct CanonicalMemory {
    store: Arc<dyn RecordStore>,
    clock: Arc<MonotonicClock>,
}

impl CanonicalMemory {
    pub(crate) fn new(store: Arc<dyn RecordStore>, clock: Arc<MonotonicClock>) -> Self {
        Self { store, clock }
    }

    pub(crate) async fn promote(
        &self,
        content: String,
        kind: NodeKind,
        confidence: f64,
        tags: BTreeSet<String>,
        source_ref: Option<RecordId>,
    ) -> Result<RecordId, EngineError> {
        if content.trim().is_empty() {
            return Err(EngineError::Validation(
                "canonical content must not be empty".into(),
            ));
        }
        let record = MemoryRecord::builder(
            content,
            TierData::Canonical {
                kind,
                confidence: confidence.clamp(0.0, 1.0),
                deprecated_reason: None,
                superseded_by: None,
                source_ref,
            },
        )
        .tags(tags)
        .created_at(self.clock.stamp())
        .build();
        let id = self.store.put(record).await?;
        info!(id = %id, kind = %kind, "promoted canonical node");
        Ok(id)
    }
}
