//! Canopy - multigranularity locking for hierarchical transactional storage
//!
//! Lockable resources form a tree (database → table → page → record). A
//! transaction announces intent (IS/IX) down the ancestor chain before
//! taking real locks (S/X) at fine granularity, and Canopy's orchestrator
//! computes the minimal sequence of lock operations for any requested
//! access level.
//!
//! # Quick Start
//!
//! ```
//! use canopy::{ensure_sufficient_lock_held, LockHierarchy, LockType, TxnId};
//!
//! let hierarchy = LockHierarchy::new("database");
//! let table = hierarchy.root().child("orders");
//! let row = table.child("row-19");
//!
//! // Read one row: IS is acquired on the database and the table, S on the row
//! let txn = Some(TxnId::new(1));
//! ensure_sufficient_lock_held(txn, Some(&row), LockType::S)?;
//! assert_eq!(row.effective_type(TxnId::new(1)), LockType::S);
//! # Ok::<(), canopy::Error>(())
//! ```
//!
//! # Architecture
//!
//! Lock state lives in a single [`LockManager`] (grant sets, wait queues,
//! blocking). [`LockHierarchy`] nodes enforce the tree discipline and
//! delegate every mutation to the manager. Callers should go through
//! [`ensure_sufficient_lock_held`] rather than driving node operations
//! directly.

// Re-export the public API from the member crates
pub use canopy_concurrency::{
    ensure_sufficient_lock_held, LockHierarchy, LockManager, ResourceNode,
};
pub use canopy_core::{Error, LockType, ResourceName, Result, TxnId};
