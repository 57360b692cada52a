use serde::{Deserialize, Serialize};

use crate::id::{RecordId, SessionId};
use crate::record::Tier;

/// Identifies the records a bulk governance operation applies to: a single
/// id, everything in a tier carrying a tag, or everything a tier holds for
/// a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForgetSelector {
    Id(RecordId),
    TierTag { tier: Tier, tag: String },
    TierSession { tier: Tier, session_id: SessionId },
}

impl std::fmt::Display for ForgetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::TierTag { tier, tag } => write!(f, "{} tag '{}'", tier, tag),
            Self::TierSession { tier, session_id } => {
                write!(f, "{} session '{}'", tier, session_id)
            }
        }
    }
}
