//! Distributed locking for score recomputation
//!
//! Provides:
//! - [`LockToken`] - a TTL-bounded lease on one resource key
//! - [`LockBackend`] - the mutual-exclusion port
//! - [`MemoryLockBackend`] - in-process lease table for tests and single-node use

pub mod lease;

pub use lease::{spawn_lease_sweep_task, LockBackend, LockToken, MemoryLockBackend};
