//! Identifier types shared across scheduler components.

/// Logical resource key addressed by consumers (e.g. `"job-42"`).
pub type ResourceKey = String;

/// Identifier assigned to each batch formed by the assembler.
pub type BatchId = u64;

/// Identifier assigned to each subscription.
pub type SubscriptionId = u64;
