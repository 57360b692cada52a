use crate::id::SessionId;
use crate::record::{LifecycleState, MemoryRecord};
use crate::time::Timestamp;

/// Record query filter, applied within one tier by the store.
///
/// An empty filter matches everything. `with_state` may be called more
/// than once; a record passes when its state matches any listed state.
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    pub session_id: Option<SessionId>,
    pub states: Option<Vec<LifecycleState>>,
    pub tag: Option<String>,
    pub dedup_key: Option<String>,
    pub created_range: Option<(Timestamp, Timestamp)>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.states.get_or_insert_with(Vec::new).push(state);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Inclusive `created_at` range.
    pub fn with_created_between(mut self, from: Timestamp, to: Timestamp) -> Self {
        self.created_range = Some((from, to));
        self
    }

    /// Check if a record matches this filter.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(ref session) = self.session_id {
            if record.session_id() != Some(session) {
                return false;
            }
        }

        if let Some(ref states) = self.states {
            if !states.contains(&record.state) {
                return false;
            }
        }

        if let Some(ref tag) = self.tag {
            if !record.tags.contains(tag) {
                return false;
            }
        }

        if let Some(ref key) = self.dedup_key {
            if record.data.dedup_key() != Some(key.as_str()) {
                return false;
            }
        }

        if let Some((from, to)) = self.created_range {
            if record.created_at < from || record.created_at > to {
                return false;
            }
        }

        true
    }
}
