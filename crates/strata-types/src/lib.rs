//! Core data model for the strata memory engine.
//!
//! Three tiers of memory share one record shape:
//! - **L0 (working)**: short-lived events, merged by dedup key, evicted by
//!   recency.
//! - **L1 (episodic)**: immutable summaries referencing the events they
//!   cover.
//! - **L2 (canonical)**: durable facts/decisions with a monotone lifecycle
//!   (active → deprecated → forgotten) and typed links between nodes.
//!
//! Everything tier-specific hangs off the [`TierData`] sum type so the
//! differing eviction and governance rules are handled exhaustively at
//! each call site.

pub mod filter;
pub mod id;
pub mod link;
pub mod record;
pub mod selector;
pub mod time;

pub use filter::RecordFilter;
pub use id::{RecordId, SessionId};
pub use link::Link;
pub use record::{
    LifecycleState, MemoryRecord, MemoryRecordBuilder, NodeKind, Tier, TierData,
};
pub use selector::ForgetSelector;
pub use time::{MonotonicClock, Timestamp};
