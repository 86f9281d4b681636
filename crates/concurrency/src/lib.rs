//! Multigranularity locking for Canopy
//!
//! This crate implements hierarchical (multigranularity) locking:
//! - LockManager: grant sets, FIFO wait queues, blocking
//! - LockHierarchy / ResourceNode: the tree of lockable resources
//! - ensure_sufficient_lock_held: declarative lock acquisition computing
//!   the minimal acquire/promote/escalate sequence for a requested access
//!   level
//!
//! Lockable resources form a tree (database → table → page → record). A
//! strong lock (S/X) at a node covers its whole subtree; a transaction never
//! locks a descendant without intent (IS/IX) announced on every strict
//! ancestor. The orchestrator in [`orchestrator`] upholds that invariant for
//! its callers; the manager in [`manager`] is the single serialization point
//! for all lock state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hierarchy;
pub mod manager;
pub mod orchestrator;

pub use hierarchy::{LockHierarchy, ResourceNode};
pub use manager::LockManager;
pub use orchestrator::ensure_sufficient_lock_held;
