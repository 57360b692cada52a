//! Error types surfaced by memory operations.

use strata_store::StoreError;
use strata_types::{LifecycleState, RecordId};
use thiserror::Error;

/// Failure modes of the engine API.
///
/// `Conflict` is reserved for races: the request was valid against the
/// state the caller observed, but a concurrent transition landed first.
/// A request that was never valid gets `InvalidStateTransition` or
/// `Validation` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced record, link, or selector match does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record exists but its lifecycle state does not permit the
    /// requested operation.
    #[error("cannot {attempted}: record is {current}")]
    InvalidStateTransition {
        current: LifecycleState,
        attempted: String,
    },

    /// A concurrent transition on the same record won the race.
    #[error("concurrent transition on {id} invalidated this request")]
    Conflict { id: RecordId },

    /// Malformed argument or selector.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True when retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Store(StoreError::Unavailable(_)))
    }
}
