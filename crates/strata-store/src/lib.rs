//! Storage contract for the strata memory engine.
//!
//! The engine reads and writes through the [`RecordStore`] trait and never
//! assumes a particular backend. [`InMemoryStore`] is the bundled
//! reference implementation; durable backends (embedded databases, remote
//! stores) plug in by implementing the same contract: atomic single-record
//! operations with synchronously maintained tier/tag/session indexes.

pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use store::RecordStore;
