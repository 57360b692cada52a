use serde::{Deserialize, Serialize};

use crate::id::RecordId;
use crate::time::Timestamp;

/// Directed typed edge between two canonical (L2) nodes. Owned by the
/// relation graph, not by either endpoint. Relation types are open-ended
/// strings; the engine checks structure, not semantics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Link {
    pub from_id: RecordId,
    pub to_id: RecordId,
    pub relation_type: String,
    pub created_at: Timestamp,
}

impl Link {
    pub fn new(
        from_id: RecordId,
        to_id: RecordId,
        relation_type: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            from_id,
            to_id,
            relation_type: relation_type.into(),
            created_at,
        }
    }

    /// Identity triple. Two links are the same edge when these match,
    /// regardless of `created_at`.
    pub fn key(&self) -> (RecordId, RecordId, &str) {
        (self.from_id, self.to_id, self.relation_type.as_str())
    }

    pub fn same_edge(&self, from: RecordId, to: RecordId, relation: &str) -> bool {
        self.from_id == from && self.to_id == to && self.relation_type == relation
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Link {}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from_id, self.relation_type, self.to_id)
    }
}
