//! Infrastructure adapters for pending-pool storage.

pub mod queue;
pub use queue::InMemoryPendingPool;
