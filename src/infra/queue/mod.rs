//! Pending pool backends.

pub mod memory;

pub use memory::InMemoryPendingPool;
