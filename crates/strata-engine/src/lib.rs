//! Tiered memory engine for long-lived agents.
//!
//! Knowledge enters as volatile working events (L0), gets committed into
//! immutable episode summaries (L1), and is promoted into durable
//! canonical nodes (L2) joined by a typed relation graph. Retrieval is
//! recency-weighted relevance search plus bounded graph expansion;
//! governance moves records through a monotone lifecycle (active →
//! deprecated → forgotten) instead of deleting knowledge in place.
//!
//! ```no_run
//! use strata_engine::{EngineConfig, MemoryEngine, NodeKind, SearchView};
//!
//! # async fn demo() -> Result<(), strata_engine::EngineError> {
//! let engine = MemoryEngine::in_memory(EngineConfig::default());
//!
//! let event = engine
//!     .upsert("session-1", "user", "we picked postgres", &["infra"], None)
//!     .await?;
//! let episode = engine
//!     .commit("session-1", "storage decision made", &[event], &[])
//!     .await?;
//! let node = engine
//!     .promote(
//!         "postgres is the primary datastore",
//!         NodeKind::Decision,
//!         0.9,
//!         &["infra"],
//!         Some(episode.id),
//!     )
//!     .await?;
//!
//! let hits = engine
//!     .search("what datastore do we use", SearchView::Index, None, Some(5))
//!     .await?;
//! assert_eq!(hits[0].id, node);
//! # Ok(())
//! # }
//! ```

mod canonical;
pub mod engine;
pub mod episodic;
pub mod error;
mod governance;
pub mod graph;
mod locks;
pub mod scorer;
pub mod search;
pub mod working;

pub use engine::{ConsolidationConfig, EngineConfig, MemoryEngine, MemoryStats};
pub use episodic::CommitReceipt;
pub use error::EngineError;
pub use graph::Expansion;
pub use scorer::{RelevanceScorer, TokenOverlapScorer};
pub use search::{DecayCurve, ResultView, SearchConfig, SearchResult, SearchView};
pub use working::{EvictionMode, MaintenanceReport, WorkingConfig};

pub use strata_store::{InMemoryStore, RecordStore, StoreError};
pub use strata_types::{
    ForgetSelector, LifecycleState, Link, MemoryRecord, NodeKind, RecordFilter, RecordId,
    SessionId, Tier, TierData, Timestamp,
};
