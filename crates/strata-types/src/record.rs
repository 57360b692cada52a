use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{RecordId, SessionId};
use crate::time::Timestamp;

/// The three memory tiers, ordered by durability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// L0: short-lived working events, subject to eviction.
    Working,
    /// L1: immutable episode summaries.
    Episodic,
    /// L2: durable canonical facts, decisions and constraints.
    Canonical,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Working => write!(f, "L0"),
            Self::Episodic => write!(f, "L1"),
            Self::Canonical => write!(f, "L2"),
        }
    }
}

/// Lifecycle state of a record. Transitions are monotone: active →
/// deprecated → forgotten, with forgotten terminal. Working and episodic
/// records skip the deprecated stage and go straight to forgotten.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleState {
    Active,
    Deprecated,
    Forgotten,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Forgotten)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Deprecated => write!(f, "deprecated"),
            Self::Forgotten => write!(f, "forgotten"),
        }
    }
}

/// Classification of a canonical (L2) node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Fact,
    Decision,
    Constraint,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fact => write!(f, "fact"),
            Self::Decision => write!(f, "decision"),
            Self::Constraint => write!(f, "constraint"),
        }
    }
}

/// Tier-specific payload. Eviction and governance rules differ per tier,
/// so call sites match on this exhaustively instead of sharing a base
/// class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TierData {
    /// L0 working event.
    Working {
        /// Who or what produced the event.
        source: String,
        session_id: SessionId,
        /// Logical key for merge-on-conflict upserts within a session.
        dedup_key: Option<String>,
    },
    /// L1 episode summary. `content` on the record holds the summary text.
    Episode {
        session_id: SessionId,
        /// The L0 events this episode summarizes, in the order given at
        /// commit time. Referential only: evicting a covered event does
        /// not invalidate the episode.
        covers: Vec<RecordId>,
    },
    /// L2 canonical node.
    Canonical {
        kind: NodeKind,
        /// Confidence in the statement, clamped to [0.0, 1.0].
        confidence: f64,
        /// Set when the node is deprecated.
        deprecated_reason: Option<String>,
        /// Soft pointer to a replacement node. Checked against an active
        /// node when set, never re-validated afterwards.
        superseded_by: Option<RecordId>,
        /// The record that motivated promotion. Referential only.
        source_ref: Option<RecordId>,
    },
}

impl TierData {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Working { .. } => Tier::Working,
            Self::Episode { .. } => Tier::Episodic,
            Self::Canonical { .. } => Tier::Canonical,
        }
    }

    /// Session this payload belongs to, if the tier has sessions.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Working { session_id, .. } | Self::Episode { session_id, .. } => {
                Some(session_id)
            }
            Self::Canonical { .. } => None,
        }
    }

    pub fn dedup_key(&self) -> Option<&str> {
        match self {
            Self::Working { dedup_key, .. } => dedup_key.as_deref(),
            _ => None,
        }
    }
}

/// A single memory record. The common fields live here; everything
/// tier-specific is in `data`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    /// Text payload: event description, episode summary, or fact statement.
    pub content: String,
    pub data: TierData,
    pub state: LifecycleState,
    pub tags: BTreeSet<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Stamped when the record transitioned to deprecated.
    pub deprecated_at: Option<Timestamp>,
    /// Stamped when the record transitioned to forgotten.
    pub forgotten_at: Option<Timestamp>,
    /// Bumped on every mutation; used to detect concurrent transitions.
    pub version: u64,
}

impl MemoryRecord {
    /// Create a builder for ergonomic record construction.
    pub fn builder(content: impl Into<String>, data: TierData) -> MemoryRecordBuilder {
        MemoryRecordBuilder {
            content: content.into(),
            data,
            tags: BTreeSet::new(),
            created_at: None,
        }
    }

    pub fn tier(&self) -> Tier {
        self.data.tier()
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.data.session_id()
    }

    /// Record a mutation: refresh `updated_at` and bump the version.
    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
        self.version += 1;
    }
}

/// Builder for constructing `MemoryRecord` instances.
pub struct MemoryRecordBuilder {
    content: String,
    data: TierData,
    tags: BTreeSet<String>,
    created_at: Option<Timestamp>,
}

impl MemoryRecordBuilder {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    pub fn build(self) -> MemoryRecord {
        let created = self.created_at.unwrap_or_else(Timestamp::now);
        MemoryRecord {
            id: RecordId::new(),
            content: self.content,
            data: self.data,
            state: LifecycleState::Active,
            tags: self.tags,
            created_at: created,
            updated_at: created,
            deprecated_at: None,
            forgotten_at: None,
            version: 0,
        }
    }
}
