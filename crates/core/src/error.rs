//! Error types for the locking subsystem
//!
//! All fallible operations return [`Result`]. We use `thiserror` for
//! automatic `Display` and `Error` trait implementations.
//!
//! Precondition violations of the orchestrator entry point (requesting an
//! intent type directly) are programming errors and panic instead of
//! appearing here: no caller can meaningfully handle them.

use crate::types::{ResourceName, TxnId};
use thiserror::Error;

/// Result type alias for lock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for lock operations
#[derive(Debug, Error)]
pub enum Error {
    /// The transaction already holds a lock on the resource
    ///
    /// Raised by `acquire` when a lock is already held, and by `promote`
    /// when the "new" type equals the type already held.
    #[error("transaction {txn} already holds a lock on {resource}")]
    DuplicateLockRequest {
        /// Requesting transaction
        txn: TxnId,
        /// Resource the duplicate request targeted
        resource: ResourceName,
    },

    /// The transaction holds no lock where one is required
    ///
    /// Raised by `release`, `promote`, and `escalate` when nothing is held,
    /// and by atomic acquire-and-release when a named release is not held.
    #[error("transaction {txn} holds no lock on {resource}")]
    NoLockHeld {
        /// Requesting transaction
        txn: TxnId,
        /// Resource with no lock to operate on
        resource: ResourceName,
    },

    /// The request violates the lattice or the hierarchy
    ///
    /// Covers: acquiring NL, promotions the lattice does not allow,
    /// acquiring under an ancestor whose lock cannot parent the requested
    /// type, releasing while descendant locks remain, escalating a
    /// non-intent lock, and promoting to SIX under an ancestor SIX.
    #[error("invalid lock request: {reason}")]
    InvalidLockRequest {
        /// What was invalid about the request
        reason: String,
    },
}

impl Error {
    /// Shorthand constructor for [`Error::InvalidLockRequest`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidLockRequest {
            reason: reason.into(),
        }
    }
}
