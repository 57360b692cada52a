//! L1 episodic memory: immutable summaries committed from working events.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_store::RecordStore;
use strata_types::{MemoryRecord, MonotonicClock, RecordId, SessionId, Tier, TierData};
use tracing::{info, warn};

use crate::error::EngineError;

/// What a commit produced: the new episode's id, plus any cover ids that
/// were dropped because the referenced events no longer existed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub id: RecordId,
    pub missing: Vec<RecordId>,
}

/// Append-only log of episodes. Episodes never change after commit;
/// governance can still forget them.
pub(crate) struct EpisodeLog {
    store: Arc<dyn RecordStore>,
    clock: Arc<MonotonicClock>,
}

impl EpisodeLog {
    pub(crate) fn new(store: Arc<dyn RecordStore>, clock: Arc<MonotonicClock>) -> Self {
        Self { store, clock }
    }

    /// Commit an episode summarizing `covers`.
    ///
    /// Cover ids that do not resolve to an active working event are
    /// dropped and reported in the receipt, not treated as errors. The
    /// working tier evicts on its own schedule and a summary is still
    /// worth keeping when some of its sources already expired. An episode
    /// with no surviving covers is fine too.
    pub(crate) async fn commit(
        &self,
        session_id: SessionId,
        summary: String,
        covers: Vec<RecordId>,
        tags: BTreeSet<String>,
    ) -> Result<CommitReceipt, EngineError> {
        let mut valid = Vec::with_capacity(covers.len());
        let mut missing = Vec::new();
        for cover_id in covers {
            match self.store.get(&cover_id).await? {
                Some(record) if record.tier() == Tier::Working && record.is_active() => {
                    valid.push(cover_id);
                }
                _ => missing.push(cover_id),
            }
        }
        if !missing.is_empty() {
            warn!(
                session = %session_id,
                dropped = missing.len(),
                "episode covers referenced events that no longer exist"
            );
        }

        let record = MemoryRecord::builder(
            summary,
            TierData::Episode {
                session_id: session_id.clone(),
                covers: valid,
            },
        )
        .tags(tags)
        .created_at(self.clock.stamp())
        .build();
        let id = self.store.put(record).await?;
        info!(id = %id, session = %session_id, "committed episode");
        Ok(CommitReceipt { id, missing })
    }
}
